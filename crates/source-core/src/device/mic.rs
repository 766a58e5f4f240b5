use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use daudio_common::{
    AudioData, AudioEvent, AudioEventType, AudioParam, DAudioError, DeviceType, Result,
    RingBuffer,
};
use daudio_transport_core::{AudioTransportCallback, PortCapType};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use super::{
    AshmemRegion, AudioIoDevice, DeviceCore, DeviceDeps, MmapInfo, MmapPosition, SessionState,
};
use crate::hdi::HdfStreamCallback;
use crate::task::TaskHandle;

/// Capture session: remote mic → receiver transport → local framework.
///
/// Received bytes land in a ring buffer; a drain task cuts them into whole
/// frames and queues at most `data_queue_max` of them for the framework,
/// dropping the oldest when the framework falls behind.
pub struct MicDevice {
    core: DeviceCore,
    ring: Mutex<Option<RingBuffer>>,
    frames: Mutex<VecDeque<AudioData>>,
    data_ready: Arc<Notify>,
    drain_task: Mutex<Option<TaskHandle>>,
    mmap_offset: AtomicUsize,
    weak_self: Weak<MicDevice>,
}

impl MicDevice {
    pub fn new(dh_id: i32, deps: DeviceDeps) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            core: DeviceCore::new(dh_id, DeviceType::Mic, deps),
            ring: Mutex::new(None),
            frames: Mutex::new(VecDeque::new()),
            data_ready: Arc::new(Notify::new()),
            drain_task: Mutex::new(None),
            mmap_offset: AtomicUsize::new(0),
            weak_self: weak_self.clone(),
        })
    }

    pub fn dev_id(&self) -> &str {
        &self.core.dev_id
    }

    /// Frames waiting for the framework
    pub fn queued_frames(&self) -> usize {
        self.frames.lock().len()
    }

    fn transport_callback(&self) -> Weak<dyn AudioTransportCallback> {
        self.weak_self.clone()
    }

    fn hdf_callback(&self) -> Result<Arc<dyn HdfStreamCallback>> {
        let this = self
            .weak_self
            .upgrade()
            .ok_or_else(|| DAudioError::nullptr("mic device"))?;
        Ok(this)
    }

    /// Move every whole frame from the ring buffer to the frame queue
    fn drain_ring(&self) {
        let frame_size = self.core.param().frame_size();
        if frame_size == 0 {
            return;
        }
        loop {
            let mut frame = vec![0u8; frame_size];
            {
                let mut guard = self.ring.lock();
                let Some(ring) = guard.as_mut() else { return };
                if frame_size > ring.capacity() {
                    warn!(
                        "Mic {} frame of {} bytes exceeds ring capacity {}",
                        self.core.dh_id,
                        frame_size,
                        ring.capacity()
                    );
                    return;
                }
                if !ring.can_buffer_read_len(frame_size) || ring.get_data(&mut frame).is_err() {
                    return;
                }
            }
            self.push_frame(AudioData::new(frame));
        }
    }

    fn push_frame(&self, frame: AudioData) {
        let mut frames = self.frames.lock();
        while frames.len() >= self.core.config.data_queue_max {
            if frames.pop_front().is_none() {
                break;
            }
            debug!("Mic {} dropped oldest queued frame", self.core.dh_id);
        }
        frames.push_back(frame);
    }

    fn pop_frame(&self) -> Option<AudioData> {
        self.frames.lock().pop_front()
    }

    fn write_to_region(&self, info: &MmapInfo, frame: &AudioData) {
        let offset = self.mmap_offset.load(Ordering::Acquire);
        info.region.write_at(offset, &frame.data);
        let region_len = info.region.len().max(1);
        self.mmap_offset
            .store((offset + frame.len()) % region_len, Ordering::Release);
        let bytes_per_frame = self.core.param().bytes_per_frame().max(1);
        self.core
            .mmap_frames
            .fetch_add((frame.len() / bytes_per_frame) as u64, Ordering::AcqRel);
    }

    fn start_drain_task(&self) {
        let weak = self.weak_self.clone();
        let data_ready = self.data_ready.clone();
        let task = TaskHandle::spawn(
            format!("mic-drain-{}", self.core.dh_id),
            move |cancel| async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = data_ready.notified() => {
                            let Some(mic) = weak.upgrade() else { break };
                            mic.drain_ring();
                        }
                    }
                }
            },
        );
        if let Some(previous) = self.drain_task.lock().replace(task) {
            previous.cancel();
        }
    }

    async fn stop_drain_task(&self) {
        let task = self.drain_task.lock().take();
        if let Some(task) = task {
            task.stop().await;
        }
    }

    fn clear_buffers(&self) {
        if let Some(ring) = self.ring.lock().as_mut() {
            ring.clear();
        }
        self.frames.lock().clear();
    }
}

#[async_trait]
impl AudioIoDevice for MicDevice {
    fn dh_id(&self) -> i32 {
        self.core.dh_id
    }

    fn device_type(&self) -> DeviceType {
        DeviceType::Mic
    }

    fn state(&self) -> SessionState {
        self.core.state()
    }

    fn set_state(&self, state: SessionState) {
        self.core.set_state(state);
    }

    fn is_opened(&self) -> bool {
        self.core.is_opened()
    }

    fn is_enabled(&self) -> bool {
        self.core.is_enabled()
    }

    fn audio_param(&self) -> AudioParam {
        self.core.param()
    }

    async fn enable_device(&self, dh_id: i32, capability: &str) -> Result<()> {
        let callback = self.hdf_callback()?;
        self.core.enable(dh_id, capability, callback).await
    }

    async fn disable_device(&self, dh_id: i32) -> Result<()> {
        self.core.disable(dh_id).await
    }

    async fn init_engine(&self) -> Result<()> {
        self.core.init_engine().await
    }

    async fn set_up(&self) -> Result<()> {
        {
            let mut ring = self.ring.lock();
            if ring.is_none() {
                *ring = Some(RingBuffer::with_capacity(
                    self.core.config.ring_buffer_capacity,
                )?);
            }
        }
        self.core.set_up(self.transport_callback(), PortCapType::Mic).await
    }

    async fn start(&self) -> Result<()> {
        self.core.start().await?;
        self.start_drain_task();
        info!("Mic {} of {} started", self.core.dh_id, self.core.dev_id);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.stop_drain_task().await;
        self.core.stop_mmap_task().await;
        let result = self.core.stop().await;
        self.clear_buffers();
        result
    }

    async fn pause(&self) -> Result<()> {
        self.core.pause().await
    }

    async fn restart(&self, local: &AudioParam, remote: &AudioParam) -> Result<()> {
        self.core.restart(local, remote).await
    }

    async fn release(&self) -> Result<()> {
        self.stop_drain_task().await;
        let result = self.core.release().await;
        *self.ring.lock() = None;
        self.frames.lock().clear();
        result
    }

    async fn mmap_start(&self) -> Result<()> {
        let info = self.core.mmap_info()?;
        self.core.transport()?;
        let period = self.core.mmap_period()?;

        self.core.stop_mmap_task().await;
        self.core.mmap_frames.store(0, Ordering::Release);
        self.mmap_offset.store(0, Ordering::Release);

        let weak = self.weak_self.clone();
        let task = TaskHandle::spawn(
            format!("mic-mmap-{}", self.core.dh_id),
            move |cancel| async move {
                let mut ticker = tokio::time::interval(period);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => {
                            let Some(mic) = weak.upgrade() else { break };
                            if let Some(frame) = mic.pop_frame() {
                                mic.write_to_region(&info, &frame);
                            }
                        }
                    }
                }
            },
        );
        *self.core.mmap_task.lock() = Some(task);
        info!("Mic {} mmap transfer started", self.core.dh_id);
        Ok(())
    }

    async fn mmap_stop(&self) -> Result<()> {
        self.core.stop_mmap_task().await;

        // Hand over what is still queued, but never more than one full queue
        if let Ok(info) = self.core.mmap_info() {
            let mut drained = 0;
            while drained < self.core.config.data_queue_max {
                let Some(frame) = self.pop_frame() else { break };
                self.write_to_region(&info, &frame);
                drained += 1;
            }
            debug!("Mic {} drained {} frames on mmap stop", self.core.dh_id, drained);
        }
        self.frames.lock().clear();
        info!("Mic {} mmap transfer stopped", self.core.dh_id);
        Ok(())
    }
}

impl HdfStreamCallback for MicDevice {
    fn create_stream(&self, stream_id: i32) -> Result<()> {
        self.core.create_stream(stream_id, AudioEventType::OpenMic)
    }

    fn destroy_stream(&self, stream_id: i32) -> Result<()> {
        self.core.destroy_stream(stream_id, AudioEventType::CloseMic)
    }

    fn set_parameters(&self, stream_id: i32, param: &AudioParam) -> Result<()> {
        self.core.set_parameters(stream_id, param)
    }

    fn notify_event(&self, _stream_id: i32, event: &AudioEvent) -> Result<()> {
        self.core.forward_event(event)
    }

    fn write_stream_data(&self, _stream_id: i32, _data: AudioData) -> Result<()> {
        Err(DAudioError::not_support("writing to a mic"))
    }

    fn read_stream_data(&self, _stream_id: i32) -> Result<AudioData> {
        self.core.transport()?;
        match self.pop_frame() {
            Some(frame) => Ok(frame),
            None => Ok(AudioData::silence(self.core.param().frame_size())),
        }
    }

    fn read_mmap_position(&self, _stream_id: i32) -> Result<MmapPosition> {
        self.core.mmap_info()?;
        Ok(self.core.mmap_position())
    }

    fn refresh_ashmem_info(
        &self,
        _stream_id: i32,
        region: Arc<AshmemRegion>,
        length_per_trans: usize,
    ) -> Result<()> {
        self.core.refresh_ashmem(region, length_per_trans)
    }
}

impl AudioTransportCallback for MicDevice {
    fn on_state_change(&self, event_type: AudioEventType) -> Result<()> {
        self.core.on_state_change(
            event_type,
            AudioEventType::MicOpened,
            AudioEventType::MicClosed,
        )
    }

    fn on_decode_trans_data_done(&self, data: AudioData) -> Result<()> {
        {
            let mut guard = self.ring.lock();
            let ring = guard
                .as_mut()
                .ok_or_else(|| DAudioError::nullptr("mic ring buffer"))?;
            if let Err(e) = ring.insert(&data.data) {
                warn!("Mic {} dropped {} received bytes: {}", self.core.dh_id, data.len(), e);
                return Err(e);
            }
        }
        self.data_ready.notify_one();
        Ok(())
    }

    fn on_message(&self, event: AudioEvent) {
        if let Err(e) = self.core.post(event) {
            warn!("Mic {} dropped transport message: {}", self.core.dh_id, e);
        }
    }
}
