use async_trait::async_trait;
use daudio_common::{AudioParam, Result};
use tracing::{debug, error};

use super::{TransportResources, TransportState, TransportStatus};

/// Streaming: processor running, session open
#[derive(Debug, Default)]
pub struct StartStatus;

#[async_trait]
impl TransportStatus for StartStatus {
    fn state(&self) -> TransportState {
        TransportState::Start
    }

    async fn stop(&self, resources: &TransportResources) -> Result<TransportState> {
        let processor = resources.processor()?;
        let channel = resources.channel()?;

        if let Err(e) = processor.stop().await {
            error!("Stop processor failed: {}", e);
            return Err(e);
        }
        if let Err(e) = channel.close_session().await {
            error!("Close channel session failed: {}", e);
            return Err(e);
        }
        debug!("Transport START -> STOP");
        Ok(TransportState::Stop)
    }

    async fn pause(&self, resources: &TransportResources) -> Result<TransportState> {
        let processor = resources.processor()?;

        processor.stop().await?;
        processor.release().await?;
        debug!("Transport START -> PAUSE");
        Ok(TransportState::Pause)
    }

    async fn restart(
        &self,
        _resources: &TransportResources,
        _local: &AudioParam,
        _remote: &AudioParam,
    ) -> Result<TransportState> {
        debug!("Transport already started");
        Ok(TransportState::Start)
    }
}
