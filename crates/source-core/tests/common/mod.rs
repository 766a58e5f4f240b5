//! Shared fakes for the source-core integration tests
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use daudio_common::json::result_content;
use daudio_common::{AudioData, AudioEvent, AudioEventType, Result, SourceConfig, DH_SUCCESS};
use daudio_source_core::{
    HdfStreamCallback, HdiHandler, IpcCallback, SinkProxy, SourceDev, SourceDevDeps,
    SourceManager, SourceManagerCallback,
};
use daudio_transport_core::{
    AudioChannel, ChannelBuilder, ChannelListener, ChannelTransportFactory, PortCapType,
    TransportFactory, TransportStatusFactory,
};
use parking_lot::Mutex;

pub const DEV_ID: &str = "remote-dev-1";
pub const SPEAKER: i32 = 1;
pub const MIC: i32 = (1 << 27) | 1;
pub const ATTRS: &str = r#"{"sampleRates":[48000],"channels":[2]}"#;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

pub fn args(dh_id: i32) -> String {
    format!(r#"{{"dhId":"{}"}}"#, dh_id)
}

pub fn enable_args(dh_id: i32) -> String {
    serde_json::json!({ "dhId": dh_id.to_string(), "attrs": ATTRS }).to_string()
}

/// Poll `check` until it holds or two seconds pass
pub async fn wait_until<F: FnMut() -> bool>(mut check: F) -> bool {
    for _ in 0..400 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}

pub async fn with_timeout<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("test step timed out")
}

/// Framework side: remembers registrations and every event it is sent
#[derive(Default)]
pub struct RecordingHdi {
    registered: Mutex<HashMap<i32, Arc<dyn HdfStreamCallback>>>,
    events: Mutex<Vec<(i32, AudioEvent)>>,
}

impl RecordingHdi {
    pub fn callback(&self, dh_id: i32) -> Option<Arc<dyn HdfStreamCallback>> {
        self.registered.lock().get(&dh_id).cloned()
    }

    pub fn is_registered(&self, dh_id: i32) -> bool {
        self.registered.lock().contains_key(&dh_id)
    }

    pub fn events_of(&self, event_type: AudioEventType) -> Vec<(i32, String)> {
        self.events
            .lock()
            .iter()
            .filter(|(_, event)| event.event_type == event_type)
            .map(|(dh_id, event)| (*dh_id, event.content.clone()))
            .collect()
    }

    /// `result` of the last event of `event_type`
    pub fn last_result(&self, event_type: AudioEventType) -> Option<i64> {
        let (_, content) = self.events_of(event_type).pop()?;
        let body: serde_json::Value = serde_json::from_str(&content).ok()?;
        body["result"].as_i64()
    }
}

#[async_trait]
impl HdiHandler for RecordingHdi {
    async fn register_audio_device(
        &self,
        _dev_id: &str,
        dh_id: i32,
        _capability: &str,
        callback: Arc<dyn HdfStreamCallback>,
    ) -> Result<()> {
        self.registered.lock().insert(dh_id, callback);
        Ok(())
    }

    async fn unregister_audio_device(&self, _dev_id: &str, dh_id: i32) -> Result<()> {
        self.registered.lock().remove(&dh_id);
        Ok(())
    }

    fn notify_event(&self, _dev_id: &str, dh_id: i32, event: &AudioEvent) -> Result<()> {
        self.events.lock().push((dh_id, event.clone()));
        Ok(())
    }
}

enum AckTarget {
    Dev(Weak<SourceDev>),
    Manager(Weak<SourceManager>),
}

/// Sink side: records requests and acknowledges them unless told not to
#[derive(Default)]
pub struct FakeSink {
    target: Mutex<Option<AckTarget>>,
    silent: Mutex<HashSet<AudioEventType>>,
    failing: Mutex<HashMap<AudioEventType, i32>>,
    requests: Mutex<Vec<(i32, AudioEventType, String)>>,
}

impl FakeSink {
    pub fn attach(&self, dev: &Arc<SourceDev>) {
        *self.target.lock() = Some(AckTarget::Dev(Arc::downgrade(dev)));
    }

    pub fn attach_manager(&self, manager: &Arc<SourceManager>) {
        *self.target.lock() = Some(AckTarget::Manager(Arc::downgrade(manager)));
    }

    /// Never answer `request`
    pub fn ignore(&self, request: AudioEventType) {
        self.silent.lock().insert(request);
    }

    /// Answer `request` with `code`
    pub fn fail(&self, request: AudioEventType, code: i32) {
        self.failing.lock().insert(request, code);
    }

    pub fn request_types(&self) -> Vec<AudioEventType> {
        self.requests.lock().iter().map(|(_, ty, _)| *ty).collect()
    }

    pub fn requests_of(&self, event_type: AudioEventType) -> Vec<(i32, String)> {
        self.requests
            .lock()
            .iter()
            .filter(|(_, ty, _)| *ty == event_type)
            .map(|(dh_id, _, content)| (*dh_id, content.clone()))
            .collect()
    }

    fn acknowledge(&self, dev_id: &str, dh_id: i32, ack: AudioEventType, code: i32) {
        let content = result_content(dh_id, code);
        match self.target.lock().as_ref() {
            Some(AckTarget::Dev(dev)) => {
                if let Some(dev) = dev.upgrade() {
                    dev.handle_notify_rpc(&AudioEvent::new(ack, content)).unwrap();
                }
            }
            Some(AckTarget::Manager(manager)) => {
                if let Some(manager) = manager.upgrade() {
                    manager
                        .handle_daudio_notify(dev_id, &dh_id.to_string(), ack.code(), &content)
                        .unwrap();
                }
            }
            None => {}
        }
    }
}

#[async_trait]
impl SinkProxy for FakeSink {
    async fn daudio_notify(
        &self,
        dev_id: &str,
        dh_id: i32,
        event_type: AudioEventType,
        content: &str,
    ) -> Result<()> {
        self.requests
            .lock()
            .push((dh_id, event_type, content.to_string()));
        let Some(ack) = event_type.result_event() else {
            return Ok(());
        };
        if self.silent.lock().contains(&event_type) {
            return Ok(());
        }
        let code = self
            .failing
            .lock()
            .get(&event_type)
            .copied()
            .unwrap_or(DH_SUCCESS);
        self.acknowledge(dev_id, dh_id, ack, code);
        Ok(())
    }
}

/// In-memory session; opens at once unless built closed
pub struct FakeChannel {
    auto_open: bool,
    listener: Mutex<Option<Weak<dyn ChannelListener>>>,
    pub sent: Mutex<Vec<AudioData>>,
    pub messages: Mutex<Vec<AudioEvent>>,
}

impl FakeChannel {
    fn new(auto_open: bool) -> Self {
        Self {
            auto_open,
            listener: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            messages: Mutex::new(Vec::new()),
        }
    }

    fn listener(&self) -> Option<Arc<dyn ChannelListener>> {
        self.listener.lock().as_ref().and_then(Weak::upgrade)
    }

    /// The peer went away
    pub fn drop_session(&self) {
        if let Some(listener) = self.listener() {
            listener.on_session_closed();
        }
    }

    /// A frame arrived from the peer
    pub fn deliver(&self, data: AudioData) {
        if let Some(listener) = self.listener() {
            listener.on_data_received(data);
        }
    }

    /// A control message arrived from the peer
    pub fn receive_message(&self, event: AudioEvent) {
        if let Some(listener) = self.listener() {
            listener.on_message_received(event);
        }
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl AudioChannel for FakeChannel {
    async fn open_session(&self, _peer: &str, listener: Weak<dyn ChannelListener>) -> Result<()> {
        *self.listener.lock() = Some(listener);
        if self.auto_open {
            if let Some(listener) = self.listener() {
                listener.on_session_opened();
            }
        }
        Ok(())
    }

    async fn close_session(&self) -> Result<()> {
        self.drop_session();
        Ok(())
    }

    async fn release_session(&self) -> Result<()> {
        *self.listener.lock() = None;
        Ok(())
    }

    fn send_data(&self, data: AudioData) -> Result<()> {
        self.sent.lock().push(data);
        Ok(())
    }

    async fn send_message(&self, event: &AudioEvent) -> Result<()> {
        self.messages.lock().push(event.clone());
        Ok(())
    }
}

/// Builds [`FakeChannel`]s and keeps the latest one per role
pub struct FakeChannelBuilder {
    data_auto_open: bool,
    channels: Mutex<HashMap<PortCapType, Arc<FakeChannel>>>,
}

impl FakeChannelBuilder {
    pub fn new() -> Self {
        Self::with_data_auto_open(true)
    }

    /// Data sessions that never report open
    pub fn stalled() -> Self {
        Self::with_data_auto_open(false)
    }

    fn with_data_auto_open(data_auto_open: bool) -> Self {
        Self {
            data_auto_open,
            channels: Mutex::new(HashMap::new()),
        }
    }

    pub fn channel(&self, cap: PortCapType) -> Arc<FakeChannel> {
        self.channels
            .lock()
            .get(&cap)
            .cloned()
            .expect("no channel built for this role")
    }
}

impl ChannelBuilder for FakeChannelBuilder {
    fn build_channel(&self, _dev_id: &str, cap: PortCapType) -> Result<Arc<dyn AudioChannel>> {
        let auto_open = cap == PortCapType::Ctrl || self.data_auto_open;
        let channel = Arc::new(FakeChannel::new(auto_open));
        self.channels.lock().insert(cap, channel.clone());
        Ok(channel)
    }
}

#[derive(Default)]
pub struct RecordingManager {
    pub enabled: Mutex<Vec<(String, String, i32)>>,
    pub disabled: Mutex<Vec<(String, String, i32)>>,
}

impl SourceManagerCallback for RecordingManager {
    fn on_enable_audio_result(&self, dev_id: &str, dh_id: &str, result: i32) {
        self.enabled
            .lock()
            .push((dev_id.to_string(), dh_id.to_string(), result));
    }

    fn on_disable_audio_result(&self, dev_id: &str, dh_id: &str, result: i32) {
        self.disabled
            .lock()
            .push((dev_id.to_string(), dh_id.to_string(), result));
    }
}

/// (dev_id, dh_id, req_id, status)
pub type IpcRecord = (String, String, String, i32);

#[derive(Default)]
pub struct RecordingIpc {
    pub reg: Mutex<Vec<IpcRecord>>,
    pub unreg: Mutex<Vec<IpcRecord>>,
}

impl IpcCallback for RecordingIpc {
    fn on_notify_reg_result(
        &self,
        dev_id: &str,
        dh_id: &str,
        req_id: &str,
        status: i32,
        _data: &str,
    ) {
        self.reg.lock().push((
            dev_id.to_string(),
            dh_id.to_string(),
            req_id.to_string(),
            status,
        ));
    }

    fn on_notify_unreg_result(
        &self,
        dev_id: &str,
        dh_id: &str,
        req_id: &str,
        status: i32,
        _data: &str,
    ) {
        self.unreg.lock().push((
            dev_id.to_string(),
            dh_id.to_string(),
            req_id.to_string(),
            status,
        ));
    }
}

/// Everything around one coordinator
pub struct Harness {
    pub dev: Arc<SourceDev>,
    pub hdi: Arc<RecordingHdi>,
    pub sink: Arc<FakeSink>,
    pub channels: Arc<FakeChannelBuilder>,
    pub manager: Arc<RecordingManager>,
}

pub fn test_config() -> SourceConfig {
    SourceConfig::default()
        .with_rpc_wait_timeout(Duration::from_millis(500))
        .with_channel_wait_timeout(Duration::from_millis(500))
}

pub fn deps(
    hdi: &Arc<RecordingHdi>,
    sink: &Arc<FakeSink>,
    channels: &Arc<FakeChannelBuilder>,
) -> SourceDevDeps {
    let factory: Arc<dyn TransportFactory> = Arc::new(ChannelTransportFactory::new(
        channels.clone(),
        Arc::new(TransportStatusFactory::new()),
    ));
    SourceDevDeps {
        hdi: Some(hdi.clone()),
        sink_proxy: Some(sink.clone()),
        transport_factory: Some(factory),
        engine: None,
        manager_callback: None,
    }
}

impl Harness {
    pub fn new(config: SourceConfig) -> Self {
        Self::with_channels(config, FakeChannelBuilder::new())
    }

    pub fn with_channels(config: SourceConfig, channels: FakeChannelBuilder) -> Self {
        init_tracing();
        let hdi = Arc::new(RecordingHdi::default());
        let sink = Arc::new(FakeSink::default());
        let channels = Arc::new(channels);
        let manager = Arc::new(RecordingManager::default());

        let manager_weak = Arc::downgrade(&manager);
        let manager_callback: Weak<dyn SourceManagerCallback> = manager_weak;
        let deps = SourceDevDeps {
            manager_callback: Some(manager_callback),
            ..deps(&hdi, &sink, &channels)
        };
        let dev = SourceDev::new(DEV_ID, config, deps).unwrap();
        sink.attach(&dev);
        Self {
            dev,
            hdi,
            sink,
            channels,
            manager,
        }
    }

    /// Enable and open `dh_id` by calling the task bodies directly
    pub async fn open(&self, dh_id: i32) {
        self.dev.task_enable_daudio(&enable_args(dh_id)).await.unwrap();
        if dh_id == MIC {
            self.dev.task_open_dmic(&args(dh_id)).await.unwrap();
        } else {
            self.dev.task_open_dspeaker(&args(dh_id)).await.unwrap();
        }
    }
}
