use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use daudio_common::json::{get_i32, KEY_MUTE_STATUS, KEY_VOLUME_LEVEL};
use daudio_common::{
    AudioData, AudioEvent, AudioEventType, AudioParam, DAudioError, DeviceType, Result,
};
use daudio_transport_core::{AudioTransportCallback, PortCapType};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::{
    AshmemRegion, AudioIoDevice, DeviceCore, DeviceDeps, MmapPosition, SessionState,
};
use crate::hdi::HdfStreamCallback;
use crate::task::TaskHandle;

/// Volume and mute shadow of the remote speaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeState {
    pub level: i32,
    pub max_level: i32,
    pub min_level: i32,
    pub muted: bool,
}

impl Default for VolumeState {
    fn default() -> Self {
        Self {
            level: 7,
            max_level: 15,
            min_level: 0,
            muted: false,
        }
    }
}

/// Render session: local framework → sender transport → remote speaker
pub struct SpeakerDevice {
    core: DeviceCore,
    volume: RwLock<VolumeState>,
    weak_self: Weak<SpeakerDevice>,
}

impl SpeakerDevice {
    pub fn new(dh_id: i32, deps: DeviceDeps) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            core: DeviceCore::new(dh_id, DeviceType::Speaker, deps),
            volume: RwLock::new(VolumeState::default()),
            weak_self: weak_self.clone(),
        })
    }

    pub fn dev_id(&self) -> &str {
        &self.core.dev_id
    }

    /// Stream id of the last stream the framework created
    pub fn stream_id(&self) -> i32 {
        self.core.cur_port()
    }

    pub fn volume(&self) -> VolumeState {
        *self.volume.read()
    }

    /// Update the shadow from a volume event body
    pub fn apply_volume_event(
        &self,
        event_type: AudioEventType,
        body: &Map<String, Value>,
    ) -> Result<()> {
        match event_type {
            AudioEventType::VolumeSet | AudioEventType::VolumeChange => {
                let level = get_i32(body, KEY_VOLUME_LEVEL)?;
                let mut volume = self.volume.write();
                if level < volume.min_level || level > volume.max_level {
                    return Err(DAudioError::param_invalid(format!(
                        "volume {} outside {}..={}",
                        level, volume.min_level, volume.max_level
                    )));
                }
                volume.level = level;
            }
            AudioEventType::VolumeMuteSet => {
                let muted = get_i32(body, KEY_MUTE_STATUS)? != 0;
                self.volume.write().muted = muted;
            }
            other => {
                return Err(DAudioError::not_support(format!(
                    "{} is not a volume event",
                    other
                )))
            }
        }
        debug!("Speaker {} volume now {:?}", self.core.dh_id, self.volume());
        Ok(())
    }

    fn transport_callback(&self) -> Weak<dyn AudioTransportCallback> {
        self.weak_self.clone()
    }

    fn hdf_callback(&self) -> Result<Arc<dyn HdfStreamCallback>> {
        let this = self
            .weak_self
            .upgrade()
            .ok_or_else(|| DAudioError::nullptr("speaker device"))?;
        Ok(this)
    }
}

#[async_trait]
impl AudioIoDevice for SpeakerDevice {
    fn dh_id(&self) -> i32 {
        self.core.dh_id
    }

    fn device_type(&self) -> DeviceType {
        DeviceType::Speaker
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
        self.core
            .set_up(self.transport_callback(), PortCapType::Speaker)
            .await
    }

    async fn start(&self) -> Result<()> {
        self.core.start().await?;
        info!("Speaker {} of {} started", self.core.dh_id, self.core.dev_id);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.core.stop_mmap_task().await;
        self.core.stop().await
    }

    async fn pause(&self) -> Result<()> {
        self.core.pause().await
    }

    async fn restart(&self, local: &AudioParam, remote: &AudioParam) -> Result<()> {
        self.core.restart(local, remote).await
    }

    async fn release(&self) -> Result<()> {
        self.core.release().await
    }

    async fn mmap_start(&self) -> Result<()> {
        let info = self.core.mmap_info()?;
        let transport = self.core.transport()?;
        let period = self.core.mmap_period()?;
        let bytes_per_frame = self.core.param().bytes_per_frame().max(1);
        let frames_per_trans = (info.length_per_trans / bytes_per_frame) as u64;

        self.core.stop_mmap_task().await;
        self.core.mmap_frames.store(0, Ordering::Release);

        let weak = self.weak_self.clone();
        let task = TaskHandle::spawn(
            format!("speaker-mmap-{}", self.core.dh_id),
            move |cancel| async move {
                let mut ticker = tokio::time::interval(period);
                let mut offset = 0usize;
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => {
                            let Some(speaker) = weak.upgrade() else { break };
                            let mut chunk = vec![0u8; info.length_per_trans];
                            info.region.read_at(offset, &mut chunk);
                            offset = (offset + info.length_per_trans) % info.region.len();
                            match transport.feed_audio_data(AudioData::new(chunk)) {
                                Ok(()) => {
                                    speaker
                                        .core
                                        .mmap_frames
                                        .fetch_add(frames_per_trans, Ordering::AcqRel);
                                }
                                Err(e) => debug!("Speaker mmap frame dropped: {}", e),
                            }
                        }
                    }
                }
            },
        );
        *self.core.mmap_task.lock() = Some(task);
        info!("Speaker {} mmap transfer started", self.core.dh_id);
        Ok(())
    }

    async fn mmap_stop(&self) -> Result<()> {
        self.core.stop_mmap_task().await;
        info!("Speaker {} mmap transfer stopped", self.core.dh_id);
        Ok(())
    }
}

impl HdfStreamCallback for SpeakerDevice {
    fn create_stream(&self, stream_id: i32) -> Result<()> {
        self.core.create_stream(stream_id, AudioEventType::OpenSpeaker)
    }

    fn destroy_stream(&self, stream_id: i32) -> Result<()> {
        self.core.destroy_stream(stream_id, AudioEventType::CloseSpeaker)
    }

    fn set_parameters(&self, stream_id: i32, param: &AudioParam) -> Result<()> {
        self.core.set_parameters(stream_id, param)
    }

    fn notify_event(&self, _stream_id: i32, event: &AudioEvent) -> Result<()> {
        self.core.forward_event(event)
    }

    fn write_stream_data(&self, _stream_id: i32, data: AudioData) -> Result<()> {
        self.core.transport()?.feed_audio_data(data)
    }

    fn read_stream_data(&self, _stream_id: i32) -> Result<AudioData> {
        Err(DAudioError::not_support("reading from a speaker"))
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

impl AudioTransportCallback for SpeakerDevice {
    fn on_state_change(&self, event_type: AudioEventType) -> Result<()> {
        self.core.on_state_change(
            event_type,
            AudioEventType::SpeakerOpened,
            AudioEventType::SpeakerClosed,
        )
    }

    fn on_decode_trans_data_done(&self, _data: AudioData) -> Result<()> {
        Err(DAudioError::not_support("speaker transport delivers no data"))
    }

    fn on_message(&self, event: AudioEvent) {
        if let Err(e) = self.core.post(event) {
            warn!("Speaker {} dropped transport message: {}", self.core.dh_id, e);
        }
    }
}
