//! Transport seams between an audio device and the network
//!
//! A device owns one [`AudioDataTransport`] (a sender for render, a
//! receiver for capture) and receives its notifications through an
//! [`AudioTransportCallback`]. The callback is held weakly so a transport
//! never keeps its device alive.

use std::fmt;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use daudio_common::{AudioData, AudioEvent, AudioEventType, AudioParam, Result};

/// Role a transport is set up for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortCapType {
    /// Render data towards the sink's speaker
    Speaker,
    /// Capture data from the sink's microphone
    Mic,
    /// Control messages only
    Ctrl,
}

impl fmt::Display for PortCapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PortCapType::Speaker => "speaker",
            PortCapType::Mic => "mic",
            PortCapType::Ctrl => "ctrl",
        };
        f.write_str(name)
    }
}

/// Codec/stream engine handed to a transport before set-up
pub trait EngineProvider: Send + Sync {
    /// Name used in logs
    fn engine_name(&self) -> &str;
}

/// Notifications a transport delivers to its owner.
///
/// Called from transport threads; implementations must not block.
pub trait AudioTransportCallback: Send + Sync {
    /// Channel state changed (`DataOpened`, `DataClosed`, `CtrlOpened`, `CtrlClosed`)
    fn on_state_change(&self, event_type: AudioEventType) -> Result<()>;

    /// A frame arrived from the peer and went through the processor
    fn on_decode_trans_data_done(&self, data: AudioData) -> Result<()>;

    /// A control message arrived from the peer
    fn on_message(&self, event: AudioEvent) {
        tracing::debug!("Unhandled transport message: {}", event.event_type);
    }
}

/// One direction of audio (or the control link) to a remote device
#[async_trait]
pub trait AudioDataTransport: Send + Sync {
    /// Wire the transport to its callback and configure the codec leg
    async fn set_up(
        &self,
        local: &AudioParam,
        remote: &AudioParam,
        callback: Weak<dyn AudioTransportCallback>,
        cap: PortCapType,
    ) -> Result<()>;

    /// Open the session with the peer and start processing
    async fn start(&self) -> Result<()>;

    /// Stop processing and close the session
    async fn stop(&self) -> Result<()>;

    /// Suspend processing, keeping the session open
    async fn pause(&self) -> Result<()>;

    /// Resume a paused transport with new parameters
    async fn restart(&self, local: &AudioParam, remote: &AudioParam) -> Result<()>;

    /// Tear everything down
    async fn release(&self) -> Result<()>;

    /// Hand one frame to the network leg
    fn feed_audio_data(&self, data: AudioData) -> Result<()>;

    /// Send a control message to `dst_dev_id`
    async fn send_message(
        &self,
        event_type: AudioEventType,
        content: &str,
        dst_dev_id: &str,
    ) -> Result<()>;

    /// Open the control session (control transports only)
    async fn create_ctrl(&self) -> Result<()>;

    /// Attach the engine provider used for encoding/decoding
    async fn init_engine(&self, provider: Option<Arc<dyn EngineProvider>>) -> Result<()>;
}

/// Builds transports for one remote device
pub trait TransportFactory: Send + Sync {
    fn create_sender(&self, dev_id: &str) -> Result<Arc<dyn AudioDataTransport>>;

    fn create_receiver(&self, dev_id: &str) -> Result<Arc<dyn AudioDataTransport>>;

    fn create_ctrl(&self, dev_id: &str) -> Result<Arc<dyn AudioDataTransport>>;
}
