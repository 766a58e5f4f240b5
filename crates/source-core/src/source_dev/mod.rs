//! Per-remote-device coordinator
//!
//! [`SourceDev`] orchestrates the speaker, mic and control channel of one
//! remote device. Every state-changing operation is queued and executed in
//! order by a single worker task, so task bodies never race each other and
//! the device map has exactly one writer. Requests that need the sink's
//! agreement block that worker until the acknowledgement arrives or the RPC
//! timeout elapses; acknowledgements bypass the queue through
//! [`SourceDev::handle_notify_rpc`].
//!
//! Per-direction lifecycle:
//!
//! ```text
//! CLOSED ──enable/open──▶ OPENING ──ack ok──▶ OPEN ──close / ctrl lost──▶ CLOSING ──▶ CLOSED
//!                            └──── failure or timeout ────▶ CLOSED
//! ```

mod handlers;
mod tasks;
mod worker;

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use daudio_common::json::{KEY_ATTRS, KEY_DH_ID};
use daudio_common::{
    classify_dh_id, parse_dh_id, AudioEvent, AudioEventType, DAudioError, DeviceType, Result,
    SourceConfig,
};
use daudio_transport_core::{EngineProvider, TransportFactory};
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::ctrl::SourceCtrlManager;
use crate::device::{
    AudioDevice, AudioEventSink, DeviceDeps, MicDevice, SessionState, SpeakerDevice,
};
use crate::hdi::HdiHandler;
use crate::rpc::{RpcWaiter, SinkProxy};
use crate::task::TaskHandle;

use worker::{DevTask, Reporter, TaskKind};

/// Device handle used for control channel requests
pub(crate) const CTRL_DH_ID: i32 = -1;

/// Receives the asynchronous outcome of enable/disable requests
pub trait SourceManagerCallback: Send + Sync {
    fn on_enable_audio_result(&self, dev_id: &str, dh_id: &str, result: i32);

    fn on_disable_audio_result(&self, dev_id: &str, dh_id: &str, result: i32);
}

/// Collaborators of a [`SourceDev`]
#[derive(Clone, Default)]
pub struct SourceDevDeps {
    pub hdi: Option<Arc<dyn HdiHandler>>,
    pub sink_proxy: Option<Arc<dyn SinkProxy>>,
    pub transport_factory: Option<Arc<dyn TransportFactory>>,
    pub engine: Option<Arc<dyn EngineProvider>>,
    pub manager_callback: Option<Weak<dyn SourceManagerCallback>>,
}

struct Worker {
    tx: mpsc::Sender<DevTask>,
    task: TaskHandle,
}

/// Coordinator of one remote device
pub struct SourceDev {
    dev_id: String,
    config: SourceConfig,
    deps: SourceDevDeps,
    devices: RwLock<HashMap<i32, AudioDevice>>,
    ctrl: RwLock<Option<Arc<SourceCtrlManager>>>,
    rpc: RpcWaiter,
    worker: Mutex<Option<Worker>>,
    weak_self: Weak<SourceDev>,
}

impl SourceDev {
    /// Fails when `config` does not validate
    pub fn new(
        dev_id: impl Into<String>,
        config: SourceConfig,
        deps: SourceDevDeps,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        Ok(Arc::new_cyclic(|weak_self| Self {
            dev_id: dev_id.into(),
            config,
            deps,
            devices: RwLock::new(HashMap::new()),
            ctrl: RwLock::new(None),
            rpc: RpcWaiter::new(),
            worker: Mutex::new(None),
            weak_self: weak_self.clone(),
        }))
    }

    pub fn dev_id(&self) -> &str {
        &self.dev_id
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// Start the worker and its queue; a no-op when already awake
    pub fn awake_audio_dev(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        if let Some(running) = worker.as_ref() {
            if !running.task.is_finished() {
                debug!("Source dev {} already awake", self.dev_id);
                return Ok(());
            }
        }
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(DAudioError::nullptr("tokio runtime"));
        }

        let (tx, rx) = mpsc::channel(self.config.task_queue_len.max(1));
        let weak = self.weak_self.clone();
        let reporter = Reporter {
            dev_id: self.dev_id.clone(),
            callback: self.deps.manager_callback.clone(),
        };
        let task = TaskHandle::spawn(format!("source-dev-{}", self.dev_id), move |cancel| {
            worker::run(weak, reporter, rx, cancel)
        });
        *worker = Some(Worker { tx, task });
        info!("Source dev {} awake", self.dev_id);
        Ok(())
    }

    /// Stop the worker.
    ///
    /// Queued tasks are discarded; enable/disable requests among them still
    /// report a failure. Pending RPC waits are cancelled.
    pub fn sleep_audio_dev(&self) {
        let Some(worker) = self.worker.lock().take() else {
            debug!("Source dev {} already asleep", self.dev_id);
            return;
        };
        worker.task.cancel();
        drop(worker.tx);
        self.rpc.cancel_all();
        info!("Source dev {} asleep", self.dev_id);
    }

    pub fn is_awake(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .map(|worker| !worker.task.is_finished())
            .unwrap_or(false)
    }

    /// Request enabling `dh_id`; the outcome is reported through
    /// [`SourceManagerCallback::on_enable_audio_result`]
    pub fn enable_daudio(&self, dh_id: &str, attrs: &str) -> Result<()> {
        if !self.is_awake() {
            return Err(DAudioError::nullptr("task worker"));
        }
        let id = parse_dh_id(dh_id)?;
        if classify_dh_id(id) == DeviceType::Unknown {
            warn!("Enable of unsupported dhId {} on {}", dh_id, self.dev_id);
            return Err(DAudioError::not_support(format!("dhId {}", dh_id)));
        }
        info!("Enable {} {} on {}", classify_dh_id(id), dh_id, self.dev_id);
        let content = json!({ KEY_DH_ID: dh_id, KEY_ATTRS: attrs }).to_string();
        let event = AudioEvent::new(AudioEventType::Unknown, content);
        self.enqueue_task(DevTask::reporting(TaskKind::Enable, dh_id, event))
    }

    /// Request disabling `dh_id`; the outcome is reported through
    /// [`SourceManagerCallback::on_disable_audio_result`]
    pub fn disable_daudio(&self, dh_id: &str) -> Result<()> {
        if !self.is_awake() {
            return Err(DAudioError::nullptr("task worker"));
        }
        let id = parse_dh_id(dh_id)?;
        if classify_dh_id(id) == DeviceType::Unknown {
            warn!("Disable of unsupported dhId {} on {}", dh_id, self.dev_id);
            return Err(DAudioError::not_support(format!("dhId {}", dh_id)));
        }
        info!("Disable {} {} on {}", classify_dh_id(id), dh_id, self.dev_id);
        let content = json!({ KEY_DH_ID: dh_id }).to_string();
        let event = AudioEvent::new(AudioEventType::Unknown, content);
        self.enqueue_task(DevTask::reporting(TaskKind::Disable, dh_id, event))
    }

    fn enqueue(&self, kind: TaskKind, event: AudioEvent) -> Result<()> {
        self.enqueue_task(DevTask::new(kind, event))
    }

    fn enqueue_task(&self, task: DevTask) -> Result<()> {
        let kind = task.kind;
        let tx = self
            .worker
            .lock()
            .as_ref()
            .map(|worker| worker.tx.clone())
            .ok_or_else(|| DAudioError::nullptr("task worker"))?;
        tx.try_send(task).map_err(|e| {
            warn!("Cannot queue {:?} task on {}: {}", kind, self.dev_id, e);
            DAudioError::nullptr("task queue")
        })
    }

    pub fn device(&self, dh_id: i32) -> Option<AudioDevice> {
        self.devices.read().get(&dh_id).cloned()
    }

    pub fn speaker(&self, dh_id: i32) -> Option<Arc<SpeakerDevice>> {
        self.device(dh_id)
            .and_then(|device| device.as_speaker().cloned())
    }

    pub fn mic(&self, dh_id: i32) -> Option<Arc<MicDevice>> {
        self.device(dh_id).and_then(|device| device.as_mic().cloned())
    }

    pub fn device_state(&self, dh_id: i32) -> Option<SessionState> {
        self.device(dh_id).map(|device| device.io().state())
    }

    pub fn device_count(&self) -> usize {
        self.devices.read().len()
    }

    pub fn is_ctrl_opened(&self) -> bool {
        self.ctrl.read().is_some()
    }

    fn devices_snapshot(&self) -> Vec<AudioDevice> {
        self.devices.read().values().cloned().collect()
    }

    fn event_sink(&self) -> Weak<dyn AudioEventSink> {
        self.weak_self.clone()
    }

    fn device_deps(&self) -> DeviceDeps {
        DeviceDeps {
            dev_id: self.dev_id.clone(),
            config: self.config.clone(),
            hdi: self.deps.hdi.clone(),
            transport_factory: self.deps.transport_factory.clone(),
            engine: self.deps.engine.clone(),
            sink: self.event_sink(),
        }
    }

    /// Deliver an event to the local framework
    fn notify_hdf(&self, dh_id: i32, event_type: AudioEventType, content: String) -> Result<()> {
        let hdi = self
            .deps
            .hdi
            .as_ref()
            .ok_or_else(|| DAudioError::nullptr("hdi handler"))?;
        hdi.notify_event(&self.dev_id, dh_id, &AudioEvent::new(event_type, content))
            .map_err(|e| {
                warn!("Notify framework of {} for {} failed: {}", event_type, dh_id, e);
                e
            })
    }

    /// Fire-and-forget request to the sink
    async fn notify_sink(&self, dh_id: i32, event_type: AudioEventType, content: &str) -> Result<()> {
        let proxy = self
            .deps
            .sink_proxy
            .clone()
            .ok_or_else(|| DAudioError::nullptr("sink proxy"))?;
        debug!("Notify sink {} of {} for {}", self.dev_id, event_type, dh_id);
        proxy
            .daudio_notify(&self.dev_id, dh_id, event_type, content)
            .await
    }

    /// Send `request` to the sink and wait for its acknowledgement
    async fn request_sink(&self, dh_id: i32, request: AudioEventType, content: &str) -> Result<()> {
        let ack = request.result_event().ok_or_else(|| {
            DAudioError::not_support(format!("{} expects no acknowledgement", request))
        })?;
        let rx = self.rpc.arm(ack)?;
        if let Err(e) = self.notify_sink(dh_id, request, content).await {
            self.rpc.cancel(ack);
            return Err(e);
        }
        self.rpc
            .wait(ack, rx, self.config.rpc_wait_timeout())
            .await
    }
}

impl Drop for SourceDev {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            worker.task.cancel();
        }
    }
}
