//! Speaker and mic device sessions
//!
//! A device is one direction (render or capture) of a remote device. It
//! sits between the local framework, which drives it through
//! [`HdfStreamCallback`](crate::hdi::HdfStreamCallback), and the network
//! transport it owns. Anything that needs the coordinator is posted as an
//! [`AudioEvent`] through a weak [`AudioEventSink`]; a device never owns
//! its coordinator.

mod mic;
mod speaker;

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use daudio_common::json::{dh_id_content, with_dh_id};
use daudio_common::{
    classify_dh_id, AudioEvent, AudioEventType, AudioParam, DAudioError, DeviceType, Result,
    SourceConfig,
};
use daudio_transport_core::{
    AudioDataTransport, AudioTransportCallback, EngineProvider, PortCapType, TransportFactory,
};
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::hdi::{HdfStreamCallback, HdiHandler};
use crate::task::TaskHandle;

pub use mic::MicDevice;
pub use speaker::{SpeakerDevice, VolumeState};

/// Per-direction session state as seen by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Closed,
    Opening,
    Open,
    Closing,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Closed => "CLOSED",
            SessionState::Opening => "OPENING",
            SessionState::Open => "OPEN",
            SessionState::Closing => "CLOSING",
        };
        f.write_str(name)
    }
}

/// Where devices post events for their coordinator
pub trait AudioEventSink: Send + Sync {
    fn notify_event(&self, event: AudioEvent) -> Result<()>;
}

/// Collaborators a device is built with
#[derive(Clone)]
pub struct DeviceDeps {
    pub dev_id: String,
    pub config: SourceConfig,
    pub hdi: Option<Arc<dyn HdiHandler>>,
    pub transport_factory: Option<Arc<dyn TransportFactory>>,
    pub engine: Option<Arc<dyn EngineProvider>>,
    pub sink: Weak<dyn AudioEventSink>,
}

/// Memory region shared with the framework in mmap mode.
///
/// Reads and writes wrap at the end of the region.
#[derive(Debug)]
pub struct AshmemRegion {
    bytes: Mutex<Box<[u8]>>,
}

impl AshmemRegion {
    pub fn new(len: usize) -> Arc<Self> {
        Arc::new(Self {
            bytes: Mutex::new(vec![0u8; len].into_boxed_slice()),
        })
    }

    pub fn len(&self) -> usize {
        self.bytes.lock().len()
    }

    /// Fill `out` starting at `offset`
    pub fn read_at(&self, offset: usize, out: &mut [u8]) {
        let bytes = self.bytes.lock();
        let len = bytes.len();
        if len == 0 {
            return;
        }
        let count = out.len().min(len);
        let start = offset % len;
        let tail = len - start;
        if count <= tail {
            out[..count].copy_from_slice(&bytes[start..start + count]);
        } else {
            out[..tail].copy_from_slice(&bytes[start..]);
            out[tail..count].copy_from_slice(&bytes[..count - tail]);
        }
    }

    /// Copy `data` in starting at `offset`
    pub fn write_at(&self, offset: usize, data: &[u8]) {
        let mut bytes = self.bytes.lock();
        let len = bytes.len();
        if len == 0 {
            return;
        }
        let count = data.len().min(len);
        let start = offset % len;
        let tail = len - start;
        if count <= tail {
            bytes[start..start + count].copy_from_slice(&data[..count]);
        } else {
            bytes[start..].copy_from_slice(&data[..tail]);
            bytes[..count - tail].copy_from_slice(&data[tail..count]);
        }
    }
}

/// Progress of an mmap transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MmapPosition {
    /// PCM frames moved through the region so far
    pub frames: u64,
    /// When the position was sampled, microseconds since the Unix epoch
    pub time_us: u64,
}

#[derive(Debug, Clone)]
pub(crate) struct MmapInfo {
    pub(crate) region: Arc<AshmemRegion>,
    pub(crate) length_per_trans: usize,
}

/// Capabilities shared by speaker and mic sessions
#[async_trait]
pub trait AudioIoDevice: Send + Sync {
    fn dh_id(&self) -> i32;

    fn device_type(&self) -> DeviceType;

    fn state(&self) -> SessionState;

    fn set_state(&self, state: SessionState);

    /// Data channel confirmed open and streaming
    fn is_opened(&self) -> bool;

    /// Registered with the local framework
    fn is_enabled(&self) -> bool;

    fn audio_param(&self) -> AudioParam;

    /// Register with the local framework under `capability`
    async fn enable_device(&self, dh_id: i32, capability: &str) -> Result<()>;

    async fn disable_device(&self, dh_id: i32) -> Result<()>;

    /// Create the transport and attach the engine
    async fn init_engine(&self) -> Result<()>;

    async fn set_up(&self) -> Result<()>;

    /// Start the transport and wait for the data channel
    async fn start(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    async fn pause(&self) -> Result<()>;

    async fn restart(&self, local: &AudioParam, remote: &AudioParam) -> Result<()>;

    async fn release(&self) -> Result<()>;

    async fn mmap_start(&self) -> Result<()>;

    async fn mmap_stop(&self) -> Result<()>;
}

/// A device in the coordinator's map
#[derive(Clone)]
pub enum AudioDevice {
    Speaker(Arc<SpeakerDevice>),
    Mic(Arc<MicDevice>),
}

impl AudioDevice {
    pub fn io(&self) -> &dyn AudioIoDevice {
        match self {
            AudioDevice::Speaker(speaker) => speaker.as_ref(),
            AudioDevice::Mic(mic) => mic.as_ref(),
        }
    }

    pub fn as_speaker(&self) -> Option<&Arc<SpeakerDevice>> {
        match self {
            AudioDevice::Speaker(speaker) => Some(speaker),
            AudioDevice::Mic(_) => None,
        }
    }

    pub fn as_mic(&self) -> Option<&Arc<MicDevice>> {
        match self {
            AudioDevice::Mic(mic) => Some(mic),
            AudioDevice::Speaker(_) => None,
        }
    }
}

/// State common to both directions
pub(crate) struct DeviceCore {
    pub(crate) dev_id: String,
    pub(crate) dh_id: i32,
    pub(crate) role: DeviceType,
    pub(crate) config: SourceConfig,
    hdi: Option<Arc<dyn HdiHandler>>,
    transport_factory: Option<Arc<dyn TransportFactory>>,
    engine: Option<Arc<dyn EngineProvider>>,
    sink: Weak<dyn AudioEventSink>,
    capability: RwLock<Option<String>>,
    state: RwLock<SessionState>,
    opened: AtomicBool,
    paused: AtomicBool,
    ready: watch::Sender<bool>,
    transport: RwLock<Option<Arc<dyn AudioDataTransport>>>,
    param: RwLock<AudioParam>,
    cur_port: AtomicI32,
    mmap: RwLock<Option<MmapInfo>>,
    pub(crate) mmap_task: Mutex<Option<TaskHandle>>,
    pub(crate) mmap_frames: AtomicU64,
}

impl DeviceCore {
    pub(crate) fn new(dh_id: i32, role: DeviceType, deps: DeviceDeps) -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            param: RwLock::new(deps.config.default_param.clone()),
            dev_id: deps.dev_id,
            dh_id,
            role,
            config: deps.config,
            hdi: deps.hdi,
            transport_factory: deps.transport_factory,
            engine: deps.engine,
            sink: deps.sink,
            capability: RwLock::new(None),
            state: RwLock::new(SessionState::Closed),
            opened: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            ready,
            transport: RwLock::new(None),
            cur_port: AtomicI32::new(-1),
            mmap: RwLock::new(None),
            mmap_task: Mutex::new(None),
            mmap_frames: AtomicU64::new(0),
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        *self.state.read()
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        let mut current = self.state.write();
        if *current != state {
            debug!(
                "{} {} of {}: {} -> {}",
                self.role, self.dh_id, self.dev_id, *current, state
            );
            *current = state;
        }
    }

    pub(crate) fn is_opened(&self) -> bool {
        self.opened.load(Ordering::Acquire)
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.capability.read().is_some()
    }

    pub(crate) fn param(&self) -> AudioParam {
        self.param.read().clone()
    }

    pub(crate) fn cur_port(&self) -> i32 {
        self.cur_port.load(Ordering::Acquire)
    }

    /// Post an event to the coordinator
    pub(crate) fn post(&self, event: AudioEvent) -> Result<()> {
        let sink = self
            .sink
            .upgrade()
            .ok_or_else(|| DAudioError::nullptr("audio event callback"))?;
        sink.notify_event(event)
    }

    pub(crate) fn transport(&self) -> Result<Arc<dyn AudioDataTransport>> {
        self.transport
            .read()
            .clone()
            .ok_or_else(|| DAudioError::nullptr(format!("{} transport", self.role)))
    }

    fn check_role(&self, dh_id: i32) -> Result<()> {
        let role = classify_dh_id(dh_id);
        if role != self.role {
            return Err(DAudioError::not_support(format!(
                "dhId {} is a {} handle, not a {}",
                dh_id, role, self.role
            )));
        }
        Ok(())
    }

    pub(crate) async fn enable(
        &self,
        dh_id: i32,
        capability: &str,
        callback: Arc<dyn HdfStreamCallback>,
    ) -> Result<()> {
        self.check_role(dh_id)?;
        let hdi = self
            .hdi
            .clone()
            .ok_or_else(|| DAudioError::nullptr("hdi handler"))?;
        if self.is_enabled() {
            debug!("{} {} already enabled", self.role, dh_id);
            return Ok(());
        }
        hdi.register_audio_device(&self.dev_id, dh_id, capability, callback)
            .await?;
        *self.capability.write() = Some(capability.to_string());
        info!("Enabled {} {} of {}", self.role, dh_id, self.dev_id);
        Ok(())
    }

    pub(crate) async fn disable(&self, dh_id: i32) -> Result<()> {
        self.check_role(dh_id)?;
        if !self.is_enabled() {
            debug!("{} {} already disabled", self.role, dh_id);
            return Ok(());
        }
        let hdi = self
            .hdi
            .clone()
            .ok_or_else(|| DAudioError::nullptr("hdi handler"))?;
        hdi.unregister_audio_device(&self.dev_id, dh_id).await?;
        *self.capability.write() = None;
        info!("Disabled {} {} of {}", self.role, dh_id, self.dev_id);
        Ok(())
    }

    pub(crate) async fn init_engine(&self) -> Result<()> {
        if self.transport.read().is_some() {
            debug!("{} {} engine already initialised", self.role, self.dh_id);
            return Ok(());
        }
        let factory = self
            .transport_factory
            .clone()
            .ok_or_else(|| DAudioError::nullptr("transport factory"))?;
        let transport = match self.role {
            DeviceType::Mic => factory.create_receiver(&self.dev_id)?,
            _ => factory.create_sender(&self.dev_id)?,
        };
        transport.init_engine(self.engine.clone()).await?;
        *self.transport.write() = Some(transport);
        Ok(())
    }

    pub(crate) async fn set_up(
        &self,
        callback: Weak<dyn AudioTransportCallback>,
        cap: PortCapType,
    ) -> Result<()> {
        let transport = self.transport()?;
        let param = self.param();
        transport.set_up(&param, &param, callback, cap).await
    }

    pub(crate) async fn start(&self) -> Result<()> {
        let transport = self.transport()?;
        transport.start().await?;
        self.wait_ready().await?;
        self.paused.store(false, Ordering::Release);
        self.opened.store(true, Ordering::Release);
        Ok(())
    }

    async fn wait_ready(&self) -> Result<()> {
        let timeout = self.config.channel_wait_timeout();
        let mut rx = self.ready.subscribe();
        let waited = tokio::time::timeout(timeout, async move {
            rx.wait_for(|ready| *ready).await.map(|_| ())
        })
        .await;
        match waited {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(DAudioError::failed("data channel state dropped")),
            Err(_) => {
                warn!(
                    "{} {} of {}: data channel not opened within {:?}",
                    self.role, self.dh_id, self.dev_id, timeout
                );
                Err(DAudioError::wait_timeout(
                    format!("{} data channel", self.role),
                    timeout.as_millis() as u64,
                ))
            }
        }
    }

    pub(crate) async fn stop(&self) -> Result<()> {
        let transport = self.transport()?;
        let result = transport.stop().await;
        self.opened.store(false, Ordering::Release);
        self.paused.store(false, Ordering::Release);
        self.ready.send_replace(false);
        result
    }

    pub(crate) async fn pause(&self) -> Result<()> {
        let transport = self.transport()?;
        transport.pause().await?;
        self.paused.store(true, Ordering::Release);
        Ok(())
    }

    pub(crate) async fn restart(&self, local: &AudioParam, remote: &AudioParam) -> Result<()> {
        if self.is_opened() && !self.paused.load(Ordering::Acquire) {
            return Err(DAudioError::illegal_operation("running", "restart"));
        }
        let transport = self.transport()?;
        transport.restart(local, remote).await?;
        *self.param.write() = local.clone();
        self.paused.store(false, Ordering::Release);
        Ok(())
    }

    pub(crate) async fn release(&self) -> Result<()> {
        self.stop_mmap_task().await;
        let transport = self.transport.write().take();
        self.opened.store(false, Ordering::Release);
        self.ready.send_replace(false);
        match transport {
            Some(transport) => transport.release().await,
            None => Ok(()),
        }
    }

    /// Transport reported a data channel change
    pub(crate) fn on_state_change(
        &self,
        event_type: AudioEventType,
        opened: AudioEventType,
        closed: AudioEventType,
    ) -> Result<()> {
        match event_type {
            AudioEventType::DataOpened => {
                self.ready.send_replace(true);
                self.post(AudioEvent::new(opened, dh_id_content(self.dh_id)))
            }
            AudioEventType::DataClosed => {
                self.opened.store(false, Ordering::Release);
                self.ready.send_replace(false);
                self.post(AudioEvent::new(closed, dh_id_content(self.dh_id)))
            }
            other => {
                debug!("{} {} ignores transport event {}", self.role, self.dh_id, other);
                Ok(())
            }
        }
    }

    pub(crate) fn create_stream(&self, stream_id: i32, open: AudioEventType) -> Result<()> {
        self.cur_port.store(stream_id, Ordering::Release);
        self.post(AudioEvent::new(open, dh_id_content(self.dh_id)))
    }

    pub(crate) fn destroy_stream(&self, stream_id: i32, close: AudioEventType) -> Result<()> {
        debug!("{} {} destroys stream {}", self.role, self.dh_id, stream_id);
        self.post(AudioEvent::new(close, dh_id_content(self.dh_id)))
    }

    pub(crate) fn set_parameters(&self, stream_id: i32, param: &AudioParam) -> Result<()> {
        if param.frame_size() == 0 {
            return Err(DAudioError::param_invalid("audio param describes empty frames"));
        }
        debug!(
            "{} {} stream {} params: {}Hz {}ch {:?}",
            self.role, self.dh_id, stream_id, param.sample_rate, param.channels, param.flags
        );
        *self.param.write() = param.clone();
        Ok(())
    }

    /// Forward a framework event, tagged with this device's handle
    pub(crate) fn forward_event(&self, event: &AudioEvent) -> Result<()> {
        self.post(AudioEvent::new(
            event.event_type,
            with_dh_id(self.dh_id, &event.content),
        ))
    }

    pub(crate) fn refresh_ashmem(
        &self,
        region: Arc<AshmemRegion>,
        length_per_trans: usize,
    ) -> Result<()> {
        if !self.param.read().is_mmap() {
            return Err(DAudioError::nullptr("mmap stream"));
        }
        if self.transport.read().is_none() {
            return Err(DAudioError::nullptr(format!("{} transport", self.role)));
        }
        if length_per_trans == 0 || length_per_trans > region.len() {
            return Err(DAudioError::param_invalid(format!(
                "length per transfer {} does not fit region of {}",
                length_per_trans,
                region.len()
            )));
        }
        *self.mmap.write() = Some(MmapInfo {
            region,
            length_per_trans,
        });
        Ok(())
    }

    pub(crate) fn mmap_info(&self) -> Result<MmapInfo> {
        self.mmap
            .read()
            .clone()
            .ok_or_else(|| DAudioError::nullptr("ashmem region"))
    }

    /// Tick of the transfer task; a zero period cannot drive a timer
    pub(crate) fn mmap_period(&self) -> Result<Duration> {
        let period = self.config.mmap_period();
        if period.is_zero() {
            return Err(DAudioError::config("mmap_period_ms must be non-zero"));
        }
        Ok(period)
    }

    pub(crate) fn mmap_position(&self) -> MmapPosition {
        MmapPosition {
            frames: self.mmap_frames.load(Ordering::Acquire),
            time_us: now_us(),
        }
    }

    pub(crate) async fn stop_mmap_task(&self) {
        let task = self.mmap_task.lock().take();
        if let Some(task) = task {
            task.stop().await;
        }
    }
}

fn now_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ashmem_wraps_at_end() {
        let region = AshmemRegion::new(8);
        region.write_at(6, &[1, 2, 3, 4]);

        let mut out = [0u8; 4];
        region.read_at(6, &mut out);
        assert_eq!(out, [1, 2, 3, 4]);

        let mut head = [0u8; 2];
        region.read_at(0, &mut head);
        assert_eq!(head, [3, 4]);
    }

    #[test]
    fn test_empty_ashmem_is_inert() {
        let region = AshmemRegion::new(0);
        region.write_at(3, &[1, 2]);
        let mut out = [9u8; 2];
        region.read_at(0, &mut out);
        assert_eq!(out, [9, 9]);
    }

    struct Detached;

    impl AudioEventSink for Detached {
        fn notify_event(&self, _event: AudioEvent) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_zero_mmap_period_is_refused() {
        let sink: Weak<dyn AudioEventSink> = Weak::<Detached>::new();
        let deps = DeviceDeps {
            dev_id: "dev".to_string(),
            config: SourceConfig::default().with_mmap_period(Duration::ZERO),
            hdi: None,
            transport_factory: None,
            engine: None,
            sink,
        };
        let core = DeviceCore::new(1, DeviceType::Speaker, deps);
        assert!(matches!(core.mmap_period(), Err(DAudioError::Config { .. })));
    }

    #[test]
    fn test_session_state_names() {
        assert_eq!(SessionState::Opening.to_string(), "OPENING");
        assert_eq!(SessionState::Closed.to_string(), "CLOSED");
    }
}
