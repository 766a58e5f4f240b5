//! [`AudioDataTransport`] over a channel and a processor
//!
//! Outgoing frames go processor → channel; incoming frames go channel →
//! processor → callback. Session open/close notifications from the channel
//! are reported to the owner as `DataOpened`/`DataClosed` (or
//! `CtrlOpened`/`CtrlClosed` for a control transport).

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use daudio_common::{AudioData, AudioEvent, AudioEventType, AudioParam, DAudioError, Result};
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::channel::{AudioChannel, ChannelListener};
use crate::processor::{AudioProcessor, PassthroughProcessor};
use crate::status::{TransportContext, TransportState, TransportStatusFactory};
use crate::transport::{
    AudioDataTransport, AudioTransportCallback, EngineProvider, PortCapType, TransportFactory,
};

/// Supplies the channels and processors transports are built from
pub trait ChannelBuilder: Send + Sync {
    fn build_channel(&self, dev_id: &str, cap: PortCapType) -> Result<Arc<dyn AudioChannel>>;

    fn build_processor(&self, _cap: PortCapType) -> Result<Arc<dyn AudioProcessor>> {
        Ok(Arc::new(PassthroughProcessor::new()))
    }
}

/// Transport driving a channel + processor pair through a [`TransportContext`]
pub struct ChannelTransport {
    peer_dev_id: String,
    cap: PortCapType,
    channel: Arc<dyn AudioChannel>,
    processor: Arc<dyn AudioProcessor>,
    context: Mutex<TransportContext>,
    /// Mirror of the context state readable from sync paths
    state: RwLock<TransportState>,
    callback: RwLock<Option<Weak<dyn AudioTransportCallback>>>,
    engine: RwLock<Option<Arc<dyn EngineProvider>>>,
    weak_self: Weak<ChannelTransport>,
}

impl ChannelTransport {
    pub fn new(
        peer_dev_id: impl Into<String>,
        cap: PortCapType,
        channel: Arc<dyn AudioChannel>,
        processor: Arc<dyn AudioProcessor>,
        status_factory: Arc<TransportStatusFactory>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            peer_dev_id: peer_dev_id.into(),
            cap,
            channel,
            processor,
            context: Mutex::new(TransportContext::new(status_factory)),
            state: RwLock::new(TransportState::Stop),
            callback: RwLock::new(None),
            engine: RwLock::new(None),
            weak_self: weak_self.clone(),
        })
    }

    pub fn cap(&self) -> PortCapType {
        self.cap
    }

    pub fn state(&self) -> TransportState {
        *self.state.read()
    }

    /// Name of the attached engine, if any
    pub fn engine_name(&self) -> Option<String> {
        self.engine
            .read()
            .as_ref()
            .map(|engine| engine.engine_name().to_string())
    }

    fn listener(&self) -> Weak<dyn ChannelListener> {
        self.weak_self.clone()
    }

    fn callback(&self) -> Option<Arc<dyn AudioTransportCallback>> {
        self.callback.read().as_ref().and_then(Weak::upgrade)
    }

    fn notify_state(&self, event_type: AudioEventType) {
        match self.callback() {
            Some(callback) => {
                if let Err(e) = callback.on_state_change(event_type) {
                    warn!("{} transport state callback failed: {}", self.cap, e);
                }
            }
            None => debug!("{} transport has no callback for {}", self.cap, event_type),
        }
    }

    fn publish(&self, ctx: &TransportContext) {
        *self.state.write() = ctx.state();
    }
}

#[async_trait]
impl AudioDataTransport for ChannelTransport {
    async fn set_up(
        &self,
        local: &AudioParam,
        remote: &AudioParam,
        callback: Weak<dyn AudioTransportCallback>,
        cap: PortCapType,
    ) -> Result<()> {
        if cap != self.cap {
            return Err(DAudioError::param_invalid(format!(
                "{} transport cannot be set up as {}",
                self.cap, cap
            )));
        }
        *self.callback.write() = Some(callback);

        {
            let mut ctx = self.context.lock().await;
            ctx.set_channel(self.channel.clone());
            ctx.set_processor(self.processor.clone());
        }
        self.processor.configure(local, remote).await?;
        info!("{} transport to {} set up", self.cap, self.peer_dev_id);
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        self.channel
            .open_session(&self.peer_dev_id, self.listener())
            .await?;

        let started = {
            let mut ctx = self.context.lock().await;
            let result = ctx.start().await;
            self.publish(&ctx);
            result
        };
        if let Err(e) = started {
            error!("{} transport start failed: {}", self.cap, e);
            if let Err(close_err) = self.channel.close_session().await {
                warn!("Closing session after failed start: {}", close_err);
            }
            return Err(e);
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if self.state() == TransportState::Stop {
            debug!("{} transport already stopped", self.cap);
            return Ok(());
        }
        let mut ctx = self.context.lock().await;
        let result = ctx.stop().await;
        self.publish(&ctx);
        result
    }

    async fn pause(&self) -> Result<()> {
        let mut ctx = self.context.lock().await;
        let result = ctx.pause().await;
        self.publish(&ctx);
        result
    }

    async fn restart(&self, local: &AudioParam, remote: &AudioParam) -> Result<()> {
        let mut ctx = self.context.lock().await;
        let result = ctx.restart(local, remote).await;
        self.publish(&ctx);
        result
    }

    async fn release(&self) -> Result<()> {
        match self.cap {
            PortCapType::Ctrl => self.channel.close_session().await?,
            _ => self.stop().await?,
        }
        self.channel.release_session().await?;
        self.processor.release().await?;
        *self.callback.write() = None;
        info!("{} transport to {} released", self.cap, self.peer_dev_id);
        Ok(())
    }

    fn feed_audio_data(&self, data: AudioData) -> Result<()> {
        if self.state() != TransportState::Start {
            return Err(DAudioError::illegal_operation(self.state().to_string(), "feed"));
        }
        match self.processor.process(data)? {
            Some(encoded) => self.channel.send_data(encoded),
            None => Ok(()),
        }
    }

    async fn send_message(
        &self,
        event_type: AudioEventType,
        content: &str,
        dst_dev_id: &str,
    ) -> Result<()> {
        debug!("Send {} to {} over {} transport", event_type, dst_dev_id, self.cap);
        self.channel
            .send_message(&AudioEvent::new(event_type, content))
            .await
    }

    async fn create_ctrl(&self) -> Result<()> {
        if self.cap != PortCapType::Ctrl {
            return Err(DAudioError::not_support(format!(
                "create_ctrl on {} transport",
                self.cap
            )));
        }
        self.channel
            .open_session(&self.peer_dev_id, self.listener())
            .await
    }

    async fn init_engine(&self, provider: Option<Arc<dyn EngineProvider>>) -> Result<()> {
        if let Some(provider) = &provider {
            debug!("{} transport uses engine {}", self.cap, provider.engine_name());
        }
        *self.engine.write() = provider;
        Ok(())
    }
}

impl ChannelListener for ChannelTransport {
    fn on_session_opened(&self) {
        info!("{} session with {} opened", self.cap, self.peer_dev_id);
        let event_type = match self.cap {
            PortCapType::Ctrl => AudioEventType::CtrlOpened,
            _ => AudioEventType::DataOpened,
        };
        self.notify_state(event_type);
    }

    fn on_session_closed(&self) {
        info!("{} session with {} closed", self.cap, self.peer_dev_id);
        let event_type = match self.cap {
            PortCapType::Ctrl => AudioEventType::CtrlClosed,
            _ => AudioEventType::DataClosed,
        };
        self.notify_state(event_type);
    }

    fn on_data_received(&self, data: AudioData) {
        let decoded = match self.processor.process(data) {
            Ok(Some(decoded)) => decoded,
            Ok(None) => return,
            Err(e) => {
                warn!("{} transport dropped frame: {}", self.cap, e);
                return;
            }
        };
        if let Some(callback) = self.callback() {
            if let Err(e) = callback.on_decode_trans_data_done(decoded) {
                debug!("{} frame rejected by owner: {}", self.cap, e);
            }
        }
    }

    fn on_message_received(&self, event: AudioEvent) {
        match self.callback() {
            Some(callback) => callback.on_message(event),
            None => debug!("{} message {} has no receiver", self.cap, event.event_type),
        }
    }
}

/// [`TransportFactory`] producing [`ChannelTransport`]s
pub struct ChannelTransportFactory {
    builder: Arc<dyn ChannelBuilder>,
    status_factory: Arc<TransportStatusFactory>,
}

impl ChannelTransportFactory {
    pub fn new(builder: Arc<dyn ChannelBuilder>, status_factory: Arc<TransportStatusFactory>) -> Self {
        Self {
            builder,
            status_factory,
        }
    }

    fn build(&self, dev_id: &str, cap: PortCapType) -> Result<Arc<dyn AudioDataTransport>> {
        let channel = self.builder.build_channel(dev_id, cap)?;
        let processor = self.builder.build_processor(cap)?;
        let transport: Arc<dyn AudioDataTransport> =
            ChannelTransport::new(dev_id, cap, channel, processor, self.status_factory.clone());
        Ok(transport)
    }
}

impl TransportFactory for ChannelTransportFactory {
    fn create_sender(&self, dev_id: &str) -> Result<Arc<dyn AudioDataTransport>> {
        self.build(dev_id, PortCapType::Speaker)
    }

    fn create_receiver(&self, dev_id: &str) -> Result<Arc<dyn AudioDataTransport>> {
        self.build(dev_id, PortCapType::Mic)
    }

    fn create_ctrl(&self, dev_id: &str) -> Result<Arc<dyn AudioDataTransport>> {
        self.build(dev_id, PortCapType::Ctrl)
    }
}
