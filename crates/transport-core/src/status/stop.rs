use async_trait::async_trait;
use daudio_common::Result;
use tracing::{debug, error};

use super::{TransportResources, TransportState, TransportStatus};

/// Initial state: nothing running
#[derive(Debug, Default)]
pub struct StopStatus;

#[async_trait]
impl TransportStatus for StopStatus {
    fn state(&self) -> TransportState {
        TransportState::Stop
    }

    async fn start(&self, resources: &TransportResources) -> Result<TransportState> {
        let processor = resources.processor()?;

        if let Err(e) = processor.start().await {
            error!("Start processor failed: {}", e);
            return Err(e);
        }
        debug!("Transport STOP -> START");
        Ok(TransportState::Start)
    }
}
