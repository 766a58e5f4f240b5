//! Audio stream parameters and PCM data frames

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// PCM sample format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleFormat {
    U8,
    S16Le,
    S24Le,
    S32Le,
}

impl SampleFormat {
    /// Bytes occupied by one sample of one channel
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::U8 => 1,
            SampleFormat::S16Le => 2,
            SampleFormat::S24Le => 3,
            SampleFormat::S32Le => 4,
        }
    }
}

/// Codec used on the network leg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodecType {
    Pcm,
    Aac,
    Opus,
}

/// How the HDF layer exchanges data with the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StreamFlags {
    /// Frames are pushed/pulled call by call
    #[default]
    Normal,
    /// Low-latency mode over a shared memory region
    Mmap,
}

/// Parameters describing one audio stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioParam {
    pub sample_rate: u32,
    pub channels: u32,
    pub sample_format: SampleFormat,
    pub codec: CodecType,
    /// Frame period in milliseconds
    pub period_ms: u32,
    /// Render stream usage or capture source type, as given by the HDF layer
    pub stream_usage: i32,
    pub flags: StreamFlags,
}

impl Default for AudioParam {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            sample_format: SampleFormat::S16Le,
            codec: CodecType::Pcm,
            period_ms: 20,
            stream_usage: 0,
            flags: StreamFlags::Normal,
        }
    }
}

impl AudioParam {
    /// Bytes in one frame period
    pub fn frame_size(&self) -> usize {
        self.sample_rate as usize
            * self.channels as usize
            * self.sample_format.bytes_per_sample()
            * self.period_ms as usize
            / 1000
    }

    /// Bytes in one PCM frame (one sample for every channel)
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * self.sample_format.bytes_per_sample()
    }

    pub fn is_mmap(&self) -> bool {
        self.flags == StreamFlags::Mmap
    }
}

/// One chunk of audio bytes travelling through the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioData {
    pub data: Bytes,
    /// Capture time in microseconds since the Unix epoch
    pub timestamp_us: u64,
}

impl AudioData {
    /// Wrap bytes, stamping them with the current time
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            timestamp_us: now_us(),
        }
    }

    /// A frame of `len` zero bytes
    pub fn silence(len: usize) -> Self {
        Self::new(vec![0u8; len])
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

fn now_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_size() {
        let param = AudioParam::default();
        // 48kHz * 2ch * 2 bytes * 20ms
        assert_eq!(param.frame_size(), 3840);
        assert_eq!(param.bytes_per_frame(), 4);

        let mono = AudioParam {
            sample_rate: 16000,
            channels: 1,
            period_ms: 5,
            ..AudioParam::default()
        };
        assert_eq!(mono.frame_size(), 160);
    }

    #[test]
    fn test_param_json_shape() {
        let json = serde_json::to_value(AudioParam::default()).unwrap();
        assert_eq!(json["sampleRate"], 48000);
        assert_eq!(json["flags"], "Normal");
    }

    #[test]
    fn test_silence() {
        let frame = AudioData::silence(8);
        assert_eq!(frame.len(), 8);
        assert!(frame.data.iter().all(|b| *b == 0));
    }
}
