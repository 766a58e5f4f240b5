//! Control channel with the sink
//!
//! Low-bandwidth link carrying control messages alongside the data
//! transports. Losing it is reported to the coordinator as `CtrlClosed`,
//! which tears down every open session of the device.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use daudio_common::{AudioData, AudioEvent, AudioEventType, AudioParam, DAudioError, Result};
use daudio_transport_core::{
    AudioDataTransport, AudioTransportCallback, PortCapType, TransportFactory,
};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::device::AudioEventSink;

/// Owns the control transport of one remote device
pub struct SourceCtrlManager {
    dev_id: String,
    transport_factory: Option<Arc<dyn TransportFactory>>,
    sink: Weak<dyn AudioEventSink>,
    transport: RwLock<Option<Arc<dyn AudioDataTransport>>>,
    opened: AtomicBool,
    weak_self: Weak<SourceCtrlManager>,
}

impl SourceCtrlManager {
    pub fn new(
        dev_id: impl Into<String>,
        transport_factory: Option<Arc<dyn TransportFactory>>,
        sink: Weak<dyn AudioEventSink>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            dev_id: dev_id.into(),
            transport_factory,
            sink,
            transport: RwLock::new(None),
            opened: AtomicBool::new(false),
            weak_self: weak_self.clone(),
        })
    }

    /// Whether the control session is up
    pub fn is_opened(&self) -> bool {
        self.opened.load(Ordering::Acquire)
    }

    /// Create the control transport and open its session
    pub async fn set_up(&self) -> Result<()> {
        let factory = self
            .transport_factory
            .clone()
            .ok_or_else(|| DAudioError::nullptr("transport factory"))?;
        let transport = factory.create_ctrl(&self.dev_id)?;
        let param = AudioParam::default();
        let callback: Weak<dyn AudioTransportCallback> = self.weak_self.clone();
        transport
            .set_up(&param, &param, callback, PortCapType::Ctrl)
            .await?;
        transport.create_ctrl().await?;
        *self.transport.write() = Some(transport);
        info!("Control channel to {} set up", self.dev_id);
        Ok(())
    }

    /// Close and release the control transport
    pub async fn release(&self) -> Result<()> {
        let transport = self.transport.write().take();
        self.opened.store(false, Ordering::Release);
        match transport {
            Some(transport) => {
                transport.release().await?;
                info!("Control channel to {} released", self.dev_id);
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn post(&self, event: AudioEvent) -> Result<()> {
        let sink = self
            .sink
            .upgrade()
            .ok_or_else(|| DAudioError::nullptr("audio event callback"))?;
        sink.notify_event(event)
    }
}

impl AudioTransportCallback for SourceCtrlManager {
    fn on_state_change(&self, event_type: AudioEventType) -> Result<()> {
        match event_type {
            AudioEventType::CtrlOpened => {
                self.opened.store(true, Ordering::Release);
                self.post(AudioEvent::new(AudioEventType::CtrlOpened, ""))
            }
            AudioEventType::CtrlClosed => {
                // Closes we asked for in release() are not reported
                if !self.opened.swap(false, Ordering::AcqRel) {
                    return Ok(());
                }
                warn!("Control channel to {} closed", self.dev_id);
                self.post(AudioEvent::new(AudioEventType::CtrlClosed, ""))
            }
            other => {
                debug!("Control channel ignores {}", other);
                Ok(())
            }
        }
    }

    fn on_decode_trans_data_done(&self, _data: AudioData) -> Result<()> {
        Err(DAudioError::not_support("control channel carries no audio"))
    }

    fn on_message(&self, event: AudioEvent) {
        debug!("Control message {} from {}", event.event_type, self.dev_id);
        if let Err(e) = self.post(event) {
            warn!("Dropped control message: {}", e);
        }
    }
}
