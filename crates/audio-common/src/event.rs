//! Audio events exchanged between the HDF layer, the coordinator and the sink
//!
//! The numeric codes are the values used on the wire when an event crosses
//! the RPC boundary to or from the sink device.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of a distributed audio event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AudioEventType {
    Unknown,
    OpenCtrl,
    CloseCtrl,
    CtrlOpened,
    CtrlClosed,
    NotifyOpenCtrlResult,
    NotifyCloseCtrlResult,
    DataOpened,
    DataClosed,
    OpenSpeaker,
    CloseSpeaker,
    SpeakerOpened,
    SpeakerClosed,
    NotifyOpenSpeakerResult,
    NotifyCloseSpeakerResult,
    OpenMic,
    CloseMic,
    MicOpened,
    MicClosed,
    NotifyOpenMicResult,
    NotifyCloseMicResult,
    VolumeSet,
    VolumeGet,
    VolumeChange,
    VolumeMuteSet,
    AudioFocusChange,
    AudioRenderStateChange,
    SetParam,
    SendParam,
    ChangePlayStatus,
    MmapSpkStart,
    MmapSpkStop,
    MmapMicStart,
    MmapMicStop,
}

impl AudioEventType {
    /// Wire code of this event type
    pub fn code(self) -> i32 {
        use AudioEventType::*;
        match self {
            Unknown => 0,
            OpenCtrl => 1,
            CloseCtrl => 2,
            CtrlOpened => 3,
            CtrlClosed => 4,
            NotifyOpenCtrlResult => 5,
            NotifyCloseCtrlResult => 6,
            DataOpened => 7,
            DataClosed => 8,
            OpenSpeaker => 11,
            CloseSpeaker => 12,
            SpeakerOpened => 13,
            SpeakerClosed => 14,
            NotifyOpenSpeakerResult => 15,
            NotifyCloseSpeakerResult => 16,
            OpenMic => 21,
            CloseMic => 22,
            MicOpened => 23,
            MicClosed => 24,
            NotifyOpenMicResult => 25,
            NotifyCloseMicResult => 26,
            VolumeSet => 31,
            VolumeGet => 32,
            VolumeChange => 33,
            VolumeMuteSet => 36,
            AudioFocusChange => 41,
            AudioRenderStateChange => 42,
            SetParam => 51,
            SendParam => 52,
            ChangePlayStatus => 71,
            MmapSpkStart => 81,
            MmapSpkStop => 82,
            MmapMicStart => 83,
            MmapMicStop => 84,
        }
    }

    /// Parse a wire code; unrecognised codes map to [`AudioEventType::Unknown`]
    pub fn from_code(code: i32) -> Self {
        use AudioEventType::*;
        match code {
            1 => OpenCtrl,
            2 => CloseCtrl,
            3 => CtrlOpened,
            4 => CtrlClosed,
            5 => NotifyOpenCtrlResult,
            6 => NotifyCloseCtrlResult,
            7 => DataOpened,
            8 => DataClosed,
            11 => OpenSpeaker,
            12 => CloseSpeaker,
            13 => SpeakerOpened,
            14 => SpeakerClosed,
            15 => NotifyOpenSpeakerResult,
            16 => NotifyCloseSpeakerResult,
            21 => OpenMic,
            22 => CloseMic,
            23 => MicOpened,
            24 => MicClosed,
            25 => NotifyOpenMicResult,
            26 => NotifyCloseMicResult,
            31 => VolumeSet,
            32 => VolumeGet,
            33 => VolumeChange,
            36 => VolumeMuteSet,
            41 => AudioFocusChange,
            42 => AudioRenderStateChange,
            51 => SetParam,
            52 => SendParam,
            71 => ChangePlayStatus,
            81 => MmapSpkStart,
            82 => MmapSpkStop,
            83 => MmapMicStart,
            84 => MmapMicStop,
            _ => Unknown,
        }
    }

    /// The acknowledgement the sink sends back for a request, if any
    pub fn result_event(self) -> Option<Self> {
        use AudioEventType::*;
        match self {
            OpenCtrl => Some(NotifyOpenCtrlResult),
            CloseCtrl => Some(NotifyCloseCtrlResult),
            OpenSpeaker => Some(NotifyOpenSpeakerResult),
            CloseSpeaker => Some(NotifyCloseSpeakerResult),
            OpenMic => Some(NotifyOpenMicResult),
            CloseMic => Some(NotifyCloseMicResult),
            _ => None,
        }
    }

    /// Whether this is an acknowledgement delivered by the sink over RPC
    pub fn is_rpc_result(self) -> bool {
        use AudioEventType::*;
        matches!(
            self,
            NotifyOpenCtrlResult
                | NotifyCloseCtrlResult
                | NotifyOpenSpeakerResult
                | NotifyCloseSpeakerResult
                | NotifyOpenMicResult
                | NotifyCloseMicResult
        )
    }
}

impl fmt::Display for AudioEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

/// A discrete occurrence in the distributed session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioEvent {
    /// Kind of event
    pub event_type: AudioEventType,
    /// JSON payload, device/channel id, or serialized parameters
    pub content: String,
}

impl AudioEvent {
    /// Create a new event
    pub fn new(event_type: AudioEventType, content: impl Into<String>) -> Self {
        Self {
            event_type,
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_round_trip_for_known_types() {
        for code in 0..100 {
            let ty = AudioEventType::from_code(code);
            if ty != AudioEventType::Unknown {
                assert_eq!(ty.code(), code);
            }
        }
    }

    #[test]
    fn test_result_events() {
        assert_eq!(
            AudioEventType::OpenSpeaker.result_event(),
            Some(AudioEventType::NotifyOpenSpeakerResult)
        );
        assert_eq!(
            AudioEventType::OpenMic.result_event(),
            Some(AudioEventType::NotifyOpenMicResult)
        );
        assert_eq!(AudioEventType::VolumeSet.result_event(), None);
        assert!(AudioEventType::NotifyOpenCtrlResult.is_rpc_result());
        assert!(!AudioEventType::CtrlClosed.is_rpc_result());
    }
}
