//! Device-handle id classification
//!
//! Speaker and mic handles occupy disjoint bit patterns: bit 27 marks a
//! capture (mic) handle, any lower bit alone marks a render (speaker) handle.

use std::fmt;

use crate::error::{DAudioError, Result};

/// Default render (speaker) handle
pub const DEFAULT_RENDER_ID: i32 = 1;
/// Low-latency render handle
pub const LOW_LATENCY_RENDER_ID: i32 = 1 << 1;
/// Default capture (mic) handle
pub const DEFAULT_CAPTURE_ID: i32 = (1 << 27) | 1;

const MIC_MASK: u32 = 1 << 27;
const SPEAKER_MASK: u32 = MIC_MASK - 1;

/// Role a device handle classifies into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    Speaker,
    Mic,
    Unknown,
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceType::Speaker => "speaker",
            DeviceType::Mic => "mic",
            DeviceType::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Classify a device handle by its bit pattern
pub fn classify_dh_id(dh_id: i32) -> DeviceType {
    let bits = dh_id as u32;
    if bits & MIC_MASK != 0 {
        DeviceType::Mic
    } else if bits & SPEAKER_MASK != 0 {
        DeviceType::Speaker
    } else {
        DeviceType::Unknown
    }
}

/// Parse a decimal device handle string
pub fn parse_dh_id(dh_id: &str) -> Result<i32> {
    dh_id
        .trim()
        .parse::<i32>()
        .map_err(|_| DAudioError::param_invalid(format!("dhId '{}' is not a number", dh_id)))
}
