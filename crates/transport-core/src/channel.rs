//! Session with the peer device
//!
//! The channel is the byte pipe under a transport. Opening is asynchronous:
//! `open_session` only starts the handshake, and the listener hears
//! `on_session_opened` once the peer accepted.

use std::sync::Weak;

use async_trait::async_trait;
use daudio_common::{AudioData, AudioEvent, Result};

/// Network session carrying audio frames and control messages
#[async_trait]
pub trait AudioChannel: Send + Sync {
    /// Start opening a session to `peer_dev_id`
    async fn open_session(&self, peer_dev_id: &str, listener: Weak<dyn ChannelListener>)
        -> Result<()>;

    /// Close the session; the listener hears `on_session_closed`
    async fn close_session(&self) -> Result<()>;

    /// Free the channel's resources
    async fn release_session(&self) -> Result<()>;

    /// Send one encoded frame
    fn send_data(&self, data: AudioData) -> Result<()>;

    /// Send one control message
    async fn send_message(&self, event: &AudioEvent) -> Result<()>;
}

/// Receives channel notifications
pub trait ChannelListener: Send + Sync {
    fn on_session_opened(&self);

    fn on_session_closed(&self);

    fn on_data_received(&self, data: AudioData);

    fn on_message_received(&self, event: AudioEvent);
}
