use std::sync::Arc;

use daudio_common::{AudioParam, Result};
use tracing::debug;

use super::{TransportResources, TransportState, TransportStatus, TransportStatusFactory};
use crate::channel::AudioChannel;
use crate::processor::AudioProcessor;

/// Holds the current status and the resources it operates on
pub struct TransportContext {
    status: Box<dyn TransportStatus>,
    resources: TransportResources,
    factory: Arc<TransportStatusFactory>,
}

impl TransportContext {
    /// New context in the STOP state
    pub fn new(factory: Arc<TransportStatusFactory>) -> Self {
        Self {
            status: factory.create(TransportState::Stop),
            resources: TransportResources::default(),
            factory,
        }
    }

    pub fn state(&self) -> TransportState {
        self.status.state()
    }

    /// Jump to `state` without running any transition effects
    pub fn set_state(&mut self, state: TransportState) {
        if self.status.state() != state {
            debug!("Transport state {} -> {}", self.status.state(), state);
        }
        self.status = self.factory.create(state);
    }

    pub fn set_channel(&mut self, channel: Arc<dyn AudioChannel>) {
        self.resources.channel = Some(channel);
    }

    pub fn set_processor(&mut self, processor: Arc<dyn AudioProcessor>) {
        self.resources.processor = Some(processor);
    }

    pub fn channel(&self) -> Option<&Arc<dyn AudioChannel>> {
        self.resources.channel.as_ref()
    }

    pub fn processor(&self) -> Option<&Arc<dyn AudioProcessor>> {
        self.resources.processor.as_ref()
    }

    pub async fn start(&mut self) -> Result<()> {
        let next = self.status.start(&self.resources).await?;
        self.set_state(next);
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        let next = self.status.stop(&self.resources).await?;
        self.set_state(next);
        Ok(())
    }

    pub async fn pause(&mut self) -> Result<()> {
        let next = self.status.pause(&self.resources).await?;
        self.set_state(next);
        Ok(())
    }

    pub async fn restart(&mut self, local: &AudioParam, remote: &AudioParam) -> Result<()> {
        let next = self.status.restart(&self.resources, local, remote).await?;
        self.set_state(next);
        Ok(())
    }
}
