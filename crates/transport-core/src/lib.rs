//! # daudio-transport-core
//!
//! Network-facing half of a distributed audio session.
//!
//! Devices talk to the network only through [`AudioDataTransport`]. The
//! bundled [`ChannelTransport`] implements it on top of an [`AudioChannel`]
//! (the session with the peer) and an [`AudioProcessor`] (the codec leg),
//! and drives their lifecycle through the [`status`] machine:
//!
//! ```text
//!            start                pause
//!   STOP ─────────────▶ START ─────────────▶ PAUSE
//!    ▲                  │  ▲                  │
//!    │      stop        │  │     restart      │
//!    └──────────────────┘  └──────────────────┘
//!    ▲                                        │
//!    └──────────────────── stop ──────────────┘
//! ```

pub mod channel;
pub mod channel_transport;
pub mod processor;
pub mod status;
pub mod transport;

pub use channel::{AudioChannel, ChannelListener};
pub use channel_transport::{ChannelBuilder, ChannelTransport, ChannelTransportFactory};
pub use processor::{AudioProcessor, PassthroughProcessor};
pub use status::{
    TransportContext, TransportResources, TransportState, TransportStatus, TransportStatusFactory,
};
pub use transport::{
    AudioDataTransport, AudioTransportCallback, EngineProvider, PortCapType, TransportFactory,
};
