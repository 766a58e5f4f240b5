//! # daudio-common
//!
//! Shared building blocks of the distributed audio source:
//!
//! - [`error`]: the [`DAudioError`] taxonomy and its numeric status codes
//! - [`event`]: [`AudioEvent`]s exchanged with the HDF layer and the sink
//! - [`param`]: stream parameters and PCM frames
//! - [`dh_id`]: device-handle classification into speaker / mic
//! - [`json`]: bounded JSON payload helpers
//! - [`ring_buffer`]: the fixed-capacity circular byte buffer
//! - [`config`] and [`logging`]: ambient setup

pub mod config;
pub mod dh_id;
pub mod error;
pub mod event;
pub mod json;
pub mod logging;
pub mod param;
pub mod ring_buffer;

pub use config::SourceConfig;
pub use dh_id::{classify_dh_id, parse_dh_id, DeviceType};
pub use error::{result_code, DAudioError, Result, DH_SUCCESS};
pub use event::{AudioEvent, AudioEventType};
pub use param::{AudioData, AudioParam, CodecType, SampleFormat, StreamFlags};
pub use ring_buffer::{RingBuffer, RING_BUFFER_CAPACITY};
