use async_trait::async_trait;
use daudio_common::{AudioParam, Result};
use tracing::{debug, error};

use super::{TransportResources, TransportState, TransportStatus};

/// Processor released, session kept open
#[derive(Debug, Default)]
pub struct PauseStatus;

#[async_trait]
impl TransportStatus for PauseStatus {
    fn state(&self) -> TransportState {
        TransportState::Pause
    }

    async fn stop(&self, resources: &TransportResources) -> Result<TransportState> {
        let channel = resources.channel()?;

        channel.close_session().await?;
        debug!("Transport PAUSE -> STOP");
        Ok(TransportState::Stop)
    }

    async fn pause(&self, _resources: &TransportResources) -> Result<TransportState> {
        debug!("Transport already paused");
        Ok(TransportState::Pause)
    }

    async fn restart(
        &self,
        resources: &TransportResources,
        local: &AudioParam,
        remote: &AudioParam,
    ) -> Result<TransportState> {
        let processor = resources.processor()?;

        if let Err(e) = processor.configure(local, remote).await {
            error!("Reconfigure processor failed: {}", e);
            return Err(e);
        }
        processor.start().await?;
        debug!("Transport PAUSE -> START");
        Ok(TransportState::Start)
    }
}
