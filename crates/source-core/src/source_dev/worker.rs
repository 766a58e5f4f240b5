use std::sync::Weak;

use daudio_common::{result_code, AudioEvent, DAudioError, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{SourceDev, SourceManagerCallback};

/// What a queued task does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum TaskKind {
    Enable,
    Disable,
    OpenSpeaker,
    CloseSpeaker,
    OpenMic,
    CloseMic,
    SpeakerClosed,
    MicClosed,
    CtrlClosed,
    SetVolume,
    VolumeChange,
    FocusChange,
    RenderStateChange,
    PlayStatusChange,
    SpkMmapStart,
    SpkMmapStop,
    MicMmapStart,
    MicMmapStop,
}

impl TaskKind {
    fn reports_to_manager(self) -> bool {
        matches!(self, TaskKind::Enable | TaskKind::Disable)
    }
}

#[derive(Debug)]
pub(super) struct DevTask {
    pub(super) kind: TaskKind,
    pub(super) event: AudioEvent,
    /// Handle the outcome is reported under, as the caller spelled it
    pub(super) dh_id: Option<String>,
}

impl DevTask {
    pub(super) fn new(kind: TaskKind, event: AudioEvent) -> Self {
        Self {
            kind,
            event,
            dh_id: None,
        }
    }

    pub(super) fn reporting(kind: TaskKind, dh_id: &str, event: AudioEvent) -> Self {
        Self {
            kind,
            event,
            dh_id: Some(dh_id.to_string()),
        }
    }
}

/// Delivers enable/disable outcomes to the manager.
///
/// Owned by the worker so queued requests are answered even after the
/// device itself is gone.
pub(super) struct Reporter {
    pub(super) dev_id: String,
    pub(super) callback: Option<Weak<dyn SourceManagerCallback>>,
}

impl Reporter {
    fn report(&self, task: &DevTask, result: &Result<()>) {
        if !task.kind.reports_to_manager() {
            return;
        }
        let Some(callback) = self.callback.as_ref().and_then(Weak::upgrade) else {
            debug!("No manager callback for {:?} on {}", task.kind, self.dev_id);
            return;
        };
        let dh_id = task.dh_id.as_deref().unwrap_or_default();
        let code = result_code(result);
        match task.kind {
            TaskKind::Enable => callback.on_enable_audio_result(&self.dev_id, dh_id, code),
            TaskKind::Disable => callback.on_disable_audio_result(&self.dev_id, dh_id, code),
            _ => {}
        }
    }

    /// Dropped unexecuted; enable/disable callers still get an answer
    fn discard(&self, task: &DevTask) {
        debug!("Discard {:?} on {}", task.kind, self.dev_id);
        self.report(task, &Err(DAudioError::nullptr("task worker")));
    }
}

/// Worker loop: run queued tasks one at a time until cancelled
pub(super) async fn run(
    dev: Weak<SourceDev>,
    reporter: Reporter,
    mut rx: mpsc::Receiver<DevTask>,
    cancel: CancellationToken,
) {
    let mut discarded = 0usize;
    loop {
        let task = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            task = rx.recv() => match task {
                Some(task) => task,
                None => break,
            },
        };
        let Some(dev) = dev.upgrade() else {
            discarded += 1;
            reporter.discard(&task);
            break;
        };
        let result = dev.run_task(&task).await;
        drop(dev);
        reporter.report(&task, &result);
    }

    rx.close();
    while let Ok(task) = rx.try_recv() {
        discarded += 1;
        reporter.discard(&task);
    }
    if discarded > 0 {
        warn!(
            "Worker of {} stopped with {} queued tasks discarded",
            reporter.dev_id, discarded
        );
    } else {
        debug!("Worker of {} stopped", reporter.dev_id);
    }
}

impl SourceDev {
    async fn run_task(&self, task: &DevTask) -> Result<()> {
        let kind = task.kind;
        let args = task.event.content.as_str();
        debug!("Run {:?} on {}", kind, self.dev_id);

        let result = match kind {
            TaskKind::Enable => self.task_enable_daudio(args).await,
            TaskKind::Disable => self.task_disable_daudio(args).await,
            TaskKind::OpenSpeaker => self.task_open_dspeaker(args).await,
            TaskKind::CloseSpeaker => self.task_close_dspeaker(args).await,
            TaskKind::OpenMic => self.task_open_dmic(args).await,
            TaskKind::CloseMic => self.task_close_dmic(args).await,
            TaskKind::SpeakerClosed => self.task_dspeaker_closed(args).await,
            TaskKind::MicClosed => self.task_dmic_closed(args).await,
            TaskKind::CtrlClosed => self.task_ctrl_trans_closed(args).await,
            TaskKind::SetVolume => self.task_set_volume(task.event.event_type, args).await,
            TaskKind::VolumeChange => self.task_volume_change(args).await,
            TaskKind::FocusChange => self.task_focus_change(args).await,
            TaskKind::RenderStateChange => self.task_render_state_change(args).await,
            TaskKind::PlayStatusChange => self.task_play_status_change(args).await,
            TaskKind::SpkMmapStart => self.task_spk_mmap_start(args).await,
            TaskKind::SpkMmapStop => self.task_spk_mmap_stop(args).await,
            TaskKind::MicMmapStart => self.task_mic_mmap_start(args).await,
            TaskKind::MicMmapStop => self.task_mic_mmap_stop(args).await,
        };

        if let Err(e) = &result {
            warn!("{:?} on {} failed: {}", kind, self.dev_id, e);
        }
        result
    }
}
