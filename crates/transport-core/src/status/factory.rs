use super::{PauseStatus, StartStatus, StopStatus, TransportState, TransportStatus};

/// Builds the status object for a state.
///
/// Constructed once by the application and shared by every context.
#[derive(Debug, Default)]
pub struct TransportStatusFactory;

impl TransportStatusFactory {
    pub fn new() -> Self {
        Self
    }

    pub fn create(&self, state: TransportState) -> Box<dyn TransportStatus> {
        match state {
            TransportState::Start => Box::new(StartStatus),
            TransportState::Pause => Box::new(PauseStatus),
            TransportState::Stop => Box::new(StopStatus),
        }
    }
}
