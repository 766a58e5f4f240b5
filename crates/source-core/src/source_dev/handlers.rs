//! Event dispatch.
//!
//! Handlers run on the caller's thread and never block: they queue a task
//! and return. The one exception is [`SourceDev::handle_notify_rpc`], which
//! resolves a pending wait directly so an acknowledgement can reach a worker
//! that is blocked waiting for it.

use daudio_common::json::{get_i32, parse_dh_id_from_event, parse_json_object, KEY_RESULT};
use daudio_common::{AudioEvent, AudioEventType, DAudioError, Result};
use tracing::{debug, info, warn};

use super::worker::TaskKind;
use super::SourceDev;
use crate::device::{AudioEventSink, SessionState};

impl AudioEventSink for SourceDev {
    fn notify_event(&self, event: AudioEvent) -> Result<()> {
        use AudioEventType::*;
        match event.event_type {
            OpenSpeaker => self.handle_open_dspeaker(event),
            CloseSpeaker => self.handle_close_dspeaker(event),
            SpeakerOpened => self.handle_dspeaker_opened(&event),
            SpeakerClosed => self.handle_dspeaker_closed(event),
            OpenMic => self.handle_open_dmic(event),
            CloseMic => self.handle_close_dmic(event),
            MicOpened => self.handle_dmic_opened(&event),
            MicClosed => self.handle_dmic_closed(event),
            CtrlOpened => self.handle_ctrl_trans_opened(&event),
            CtrlClosed => self.handle_ctrl_trans_closed(event),
            NotifyOpenCtrlResult
            | NotifyCloseCtrlResult
            | NotifyOpenSpeakerResult
            | NotifyCloseSpeakerResult
            | NotifyOpenMicResult
            | NotifyCloseMicResult => self.handle_notify_rpc(&event),
            VolumeSet | VolumeMuteSet => self.handle_volume_set(event),
            VolumeChange => self.handle_volume_change(event),
            AudioFocusChange => self.handle_focus_change(event),
            AudioRenderStateChange => self.handle_render_state_change(event),
            ChangePlayStatus => self.handle_play_status_change(event),
            MmapSpkStart => self.handle_spk_mmap_start(event),
            MmapSpkStop => self.handle_spk_mmap_stop(event),
            MmapMicStart => self.handle_mic_mmap_start(event),
            MmapMicStop => self.handle_mic_mmap_stop(event),
            other => {
                warn!("Unhandled event {} on {}", other, self.dev_id);
                Err(DAudioError::not_support(format!("event {}", other)))
            }
        }
    }
}

impl SourceDev {
    pub fn handle_open_dspeaker(&self, event: AudioEvent) -> Result<()> {
        self.enqueue(TaskKind::OpenSpeaker, event)
    }

    pub fn handle_close_dspeaker(&self, event: AudioEvent) -> Result<()> {
        self.enqueue(TaskKind::CloseSpeaker, event)
    }

    pub fn handle_open_dmic(&self, event: AudioEvent) -> Result<()> {
        self.enqueue(TaskKind::OpenMic, event)
    }

    pub fn handle_close_dmic(&self, event: AudioEvent) -> Result<()> {
        self.enqueue(TaskKind::CloseMic, event)
    }

    pub fn handle_dspeaker_opened(&self, event: &AudioEvent) -> Result<()> {
        info!("Speaker data channel of {} opened: {}", self.dev_id, event.content);
        Ok(())
    }

    pub fn handle_dmic_opened(&self, event: &AudioEvent) -> Result<()> {
        info!("Mic data channel of {} opened: {}", self.dev_id, event.content);
        Ok(())
    }

    /// Only an OPEN speaker is torn down; closes we caused are ignored
    pub fn handle_dspeaker_closed(&self, event: AudioEvent) -> Result<()> {
        if !self.is_open_session(&event.content) {
            debug!("Speaker close on {} ignored: {}", self.dev_id, event.content);
            return Ok(());
        }
        self.enqueue(TaskKind::SpeakerClosed, event)
    }

    /// Only an OPEN mic is torn down; closes we caused are ignored
    pub fn handle_dmic_closed(&self, event: AudioEvent) -> Result<()> {
        if !self.is_open_session(&event.content) {
            debug!("Mic close on {} ignored: {}", self.dev_id, event.content);
            return Ok(());
        }
        self.enqueue(TaskKind::MicClosed, event)
    }

    pub fn handle_ctrl_trans_opened(&self, _event: &AudioEvent) -> Result<()> {
        info!("Control channel of {} reported open", self.dev_id);
        Ok(())
    }

    pub fn handle_ctrl_trans_closed(&self, event: AudioEvent) -> Result<()> {
        warn!("Control channel of {} reported closed", self.dev_id);
        self.enqueue(TaskKind::CtrlClosed, event)
    }

    /// Acknowledgement from the sink: resolve the matching wait
    pub fn handle_notify_rpc(&self, event: &AudioEvent) -> Result<()> {
        let body = parse_json_object(&event.content)?;
        let result = get_i32(&body, KEY_RESULT)?;
        if !event.event_type.is_rpc_result() {
            return Err(DAudioError::not_support(format!(
                "{} is not an acknowledgement",
                event.event_type
            )));
        }
        if !self.rpc.fulfill(event.event_type, result) {
            warn!(
                "{} with result {} arrived on {} with nobody waiting",
                event.event_type, result, self.dev_id
            );
        }
        Ok(())
    }

    pub fn handle_volume_set(&self, event: AudioEvent) -> Result<()> {
        self.enqueue(TaskKind::SetVolume, event)
    }

    pub fn handle_volume_change(&self, event: AudioEvent) -> Result<()> {
        self.enqueue(TaskKind::VolumeChange, event)
    }

    pub fn handle_focus_change(&self, event: AudioEvent) -> Result<()> {
        self.enqueue(TaskKind::FocusChange, event)
    }

    pub fn handle_render_state_change(&self, event: AudioEvent) -> Result<()> {
        self.enqueue(TaskKind::RenderStateChange, event)
    }

    pub fn handle_play_status_change(&self, event: AudioEvent) -> Result<()> {
        self.enqueue(TaskKind::PlayStatusChange, event)
    }

    pub fn handle_spk_mmap_start(&self, event: AudioEvent) -> Result<()> {
        self.enqueue(TaskKind::SpkMmapStart, event)
    }

    pub fn handle_spk_mmap_stop(&self, event: AudioEvent) -> Result<()> {
        self.enqueue(TaskKind::SpkMmapStop, event)
    }

    pub fn handle_mic_mmap_start(&self, event: AudioEvent) -> Result<()> {
        self.enqueue(TaskKind::MicMmapStart, event)
    }

    pub fn handle_mic_mmap_stop(&self, event: AudioEvent) -> Result<()> {
        self.enqueue(TaskKind::MicMmapStop, event)
    }

    fn is_open_session(&self, content: &str) -> bool {
        parse_dh_id_from_event(content)
            .and_then(|dh_id| self.device_state(dh_id))
            .map_or(false, |state| state == SessionState::Open)
    }
}
