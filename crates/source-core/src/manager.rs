//! Process-wide entry point
//!
//! [`SourceManager`] owns one [`SourceDev`] per remote device, routes the
//! sink's inbound notifications to it and reports enable/disable outcomes
//! back to the distributed hardware framework through [`IpcCallback`].

use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use daudio_common::{
    parse_dh_id, AudioEvent, AudioEventType, DAudioError, Result, SourceConfig, DH_SUCCESS,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::device::AudioEventSink;
use crate::source_dev::{SourceDev, SourceDevDeps, SourceManagerCallback};

/// Registration results towards the distributed hardware framework
pub trait IpcCallback: Send + Sync {
    fn on_notify_reg_result(
        &self,
        dev_id: &str,
        dh_id: &str,
        req_id: &str,
        status: i32,
        data: &str,
    );

    fn on_notify_unreg_result(
        &self,
        dev_id: &str,
        dh_id: &str,
        req_id: &str,
        status: i32,
        data: &str,
    );
}

pub struct SourceManager {
    config: SourceConfig,
    deps: SourceDevDeps,
    ipc: Option<Arc<dyn IpcCallback>>,
    devices: DashMap<String, Arc<SourceDev>>,
    /// Outstanding request ids per (devId, dhId), oldest first
    req_ids: DashMap<(String, String), VecDeque<String>>,
    weak_self: Weak<SourceManager>,
}

impl SourceManager {
    /// `deps` is the template every device is built with; its
    /// `manager_callback` is replaced by the manager itself
    pub fn new(
        config: SourceConfig,
        deps: SourceDevDeps,
        ipc: Option<Arc<dyn IpcCallback>>,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        Ok(Arc::new_cyclic(|weak_self| Self {
            config,
            deps,
            ipc,
            devices: DashMap::new(),
            req_ids: DashMap::new(),
            weak_self: weak_self.clone(),
        }))
    }

    pub fn device(&self, dev_id: &str) -> Option<Arc<SourceDev>> {
        self.devices.get(dev_id).map(|dev| dev.value().clone())
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    fn create_device(&self, dev_id: &str) -> Result<Arc<SourceDev>> {
        let callback: Weak<dyn SourceManagerCallback> = self.weak_self.clone();
        let deps = SourceDevDeps {
            manager_callback: Some(callback),
            ..self.deps.clone()
        };
        info!("Creating source dev {}", dev_id);
        SourceDev::new(dev_id, self.config.clone(), deps)
    }

    /// Enable `dh_id` of `dev_id`, creating and waking the device as needed
    pub fn enable_daudio(
        &self,
        dev_id: &str,
        dh_id: &str,
        version: &str,
        attrs: &str,
        req_id: &str,
    ) -> Result<()> {
        if dev_id.is_empty() {
            return Err(DAudioError::param_invalid("empty devId"));
        }
        parse_dh_id(dh_id)?;
        debug!("Enable {} of {} (version {}, req {})", dh_id, dev_id, version, req_id);

        // Registered first so the device cannot be retired underneath us
        self.push_req_id(dev_id, dh_id, req_id);
        let result = self.forward_enable(dev_id, dh_id, attrs);
        if result.is_err() {
            self.drop_last_req_id(dev_id, dh_id);
            self.retire_if_idle(dev_id);
        }
        result
    }

    fn forward_enable(&self, dev_id: &str, dh_id: &str, attrs: &str) -> Result<()> {
        let dev = match self.devices.entry(dev_id.to_string()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => entry.insert(self.create_device(dev_id)?).value().clone(),
        };
        dev.awake_audio_dev()?;
        dev.enable_daudio(dh_id, attrs)
    }

    pub fn disable_daudio(&self, dev_id: &str, dh_id: &str, req_id: &str) -> Result<()> {
        let dev = self.device(dev_id).ok_or_else(|| DAudioError::DeviceNotExist {
            dev_id: dev_id.to_string(),
        })?;
        self.push_req_id(dev_id, dh_id, req_id);
        dev.disable_daudio(dh_id).map_err(|e| {
            self.drop_last_req_id(dev_id, dh_id);
            e
        })
    }

    /// Inbound notification from the sink of `dev_id`
    pub fn handle_daudio_notify(
        &self,
        dev_id: &str,
        dh_id: &str,
        event_type: i32,
        content: &str,
    ) -> Result<()> {
        let dev = self.device(dev_id).ok_or_else(|| DAudioError::DeviceNotExist {
            dev_id: dev_id.to_string(),
        })?;
        let event_type = AudioEventType::from_code(event_type);
        if event_type == AudioEventType::Unknown {
            return Err(DAudioError::not_support("unknown event code"));
        }
        debug!("Notify {} from {} for {}", event_type, dev_id, dh_id);
        dev.notify_event(AudioEvent::new(event_type, content))
    }

    /// Put every device to sleep and forget them
    pub fn release(&self) {
        for entry in self.devices.iter() {
            entry.value().sleep_audio_dev();
        }
        self.devices.clear();
        self.req_ids.clear();
        info!("Source manager released");
    }

    fn push_req_id(&self, dev_id: &str, dh_id: &str, req_id: &str) {
        self.req_ids
            .entry((dev_id.to_string(), dh_id.to_string()))
            .or_default()
            .push_back(req_id.to_string());
    }

    /// Forget the request just pushed, which was refused synchronously
    fn drop_last_req_id(&self, dev_id: &str, dh_id: &str) {
        let key = (dev_id.to_string(), dh_id.to_string());
        if let Some(mut pending) = self.req_ids.get_mut(&key) {
            pending.pop_back();
        }
        self.req_ids.remove_if(&key, |_, pending| pending.is_empty());
    }

    /// Results arrive in request order, so the oldest id is the answer's
    fn take_req_id(&self, dev_id: &str, dh_id: &str) -> String {
        let key = (dev_id.to_string(), dh_id.to_string());
        let req_id = self
            .req_ids
            .get_mut(&key)
            .and_then(|mut pending| pending.pop_front())
            .unwrap_or_default();
        self.req_ids.remove_if(&key, |_, pending| pending.is_empty());
        req_id
    }

    fn has_pending_requests(&self, dev_id: &str) -> bool {
        self.req_ids.iter().any(|entry| entry.key().0 == dev_id)
    }

    /// Drop a device with nothing enabled and nothing in flight
    fn retire_if_idle(&self, dev_id: &str) {
        let removed = self.devices.remove_if(dev_id, |_, dev| {
            dev.device_count() == 0 && !self.has_pending_requests(dev_id)
        });
        if let Some((_, dev)) = removed {
            dev.sleep_audio_dev();
            info!("Source dev {} has no devices left; retired", dev_id);
        }
    }
}

impl SourceManagerCallback for SourceManager {
    fn on_enable_audio_result(&self, dev_id: &str, dh_id: &str, result: i32) {
        let req_id = self.take_req_id(dev_id, dh_id);
        match &self.ipc {
            Some(ipc) => ipc.on_notify_reg_result(dev_id, dh_id, &req_id, result, ""),
            None => warn!("No IPC callback for enable result of {} {}", dev_id, dh_id),
        }
        if result != DH_SUCCESS {
            self.retire_if_idle(dev_id);
        }
    }

    fn on_disable_audio_result(&self, dev_id: &str, dh_id: &str, result: i32) {
        let req_id = self.take_req_id(dev_id, dh_id);
        match &self.ipc {
            Some(ipc) => ipc.on_notify_unreg_result(dev_id, dh_id, &req_id, result, ""),
            None => warn!("No IPC callback for disable result of {} {}", dev_id, dh_id),
        }
        self.retire_if_idle(dev_id);
    }
}
