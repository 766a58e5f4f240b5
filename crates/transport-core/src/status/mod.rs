//! Transport status machine
//!
//! A [`TransportContext`] is always in exactly one [`TransportState`]. Each
//! state is a [`TransportStatus`] object implementing only the operations
//! legal from that state; everything else falls through to the trait's
//! default and is rejected with `IllegalOperation`, leaving the state
//! unchanged.
//!
//! Status objects hold nothing. The context owns the channel and processor
//! and lends them per call through [`TransportResources`]; a status returns
//! the state to move to and the context applies it.

mod context;
mod factory;
mod pause;
mod start;
mod stop;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use daudio_common::{AudioParam, DAudioError, Result};

use crate::channel::AudioChannel;
use crate::processor::AudioProcessor;

pub use context::TransportContext;
pub use factory::TransportStatusFactory;
pub use pause::PauseStatus;
pub use start::StartStatus;
pub use stop::StopStatus;

/// Lifecycle state of a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportState {
    Start,
    Pause,
    Stop,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportState::Start => "START",
            TransportState::Pause => "PAUSE",
            TransportState::Stop => "STOP",
        };
        f.write_str(name)
    }
}

/// Channel and processor owned by the context, lent to the current status
#[derive(Default, Clone)]
pub struct TransportResources {
    pub channel: Option<Arc<dyn AudioChannel>>,
    pub processor: Option<Arc<dyn AudioProcessor>>,
}

impl TransportResources {
    pub(crate) fn channel(&self) -> Result<&Arc<dyn AudioChannel>> {
        self.channel
            .as_ref()
            .ok_or_else(|| DAudioError::nullptr("transport channel"))
    }

    pub(crate) fn processor(&self) -> Result<&Arc<dyn AudioProcessor>> {
        self.processor
            .as_ref()
            .ok_or_else(|| DAudioError::nullptr("transport processor"))
    }
}

/// Behaviour of one transport state.
///
/// Every operation returns the state to transition to.
#[async_trait]
pub trait TransportStatus: Send + Sync {
    /// The state this object represents
    fn state(&self) -> TransportState;

    async fn start(&self, _resources: &TransportResources) -> Result<TransportState> {
        Err(self.illegal("start"))
    }

    async fn stop(&self, _resources: &TransportResources) -> Result<TransportState> {
        Err(self.illegal("stop"))
    }

    async fn pause(&self, _resources: &TransportResources) -> Result<TransportState> {
        Err(self.illegal("pause"))
    }

    async fn restart(
        &self,
        _resources: &TransportResources,
        _local: &AudioParam,
        _remote: &AudioParam,
    ) -> Result<TransportState> {
        Err(self.illegal("restart"))
    }

    /// Rejection for an operation not valid from this state
    fn illegal(&self, operation: &str) -> DAudioError {
        tracing::error!("Illegal transport operation {} in state {}", operation, self.state());
        DAudioError::illegal_operation(self.state().to_string(), operation)
    }
}
