//! # daudio-source-core
//!
//! Source side of a distributed audio session. One [`SourceDev`] exists per
//! remote device; it owns that device's [`SpeakerDevice`]s and
//! [`MicDevice`]s and serialises every state change through a single
//! worker task.
//!
//! ```text
//!  HDF layer ──HdfStreamCallback──▶ Speaker/MicDevice ──AudioEventSink──▶ SourceDev
//!      ▲                                  │                                 │ task queue
//!      └──────────── HdiHandler ◀─────────┼──────────── SinkProxy (RPC) ◀───┘
//!                                         ▼
//!                               AudioDataTransport (network)
//! ```
//!
//! Requests that need the sink's agreement (opening the control channel,
//! opening a speaker or mic) block the worker until the matching
//! acknowledgement arrives through [`SourceDev::handle_notify_rpc`] or the
//! configured timeout elapses.

pub mod ctrl;
pub mod device;
pub mod hdi;
pub mod manager;
pub mod rpc;
pub mod source_dev;
mod task;

pub use ctrl::SourceCtrlManager;
pub use device::{
    AshmemRegion, AudioDevice, AudioEventSink, AudioIoDevice, DeviceDeps, MicDevice,
    MmapPosition, SessionState, SpeakerDevice, VolumeState,
};
pub use hdi::{HdfStreamCallback, HdiHandler};
pub use manager::{IpcCallback, SourceManager};
pub use rpc::{RpcWaiter, SinkProxy};
pub use source_dev::{SourceDev, SourceDevDeps, SourceManagerCallback};
