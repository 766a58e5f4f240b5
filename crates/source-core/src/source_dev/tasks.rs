//! Bodies of the queued tasks.
//!
//! Each body takes the JSON content of the event that queued it. They are
//! public so embedders can drive a step directly; normally the worker calls
//! them in queue order.

use daudio_common::json::{
    dh_id_content, get_dh_id, parse_json_object, result_content, KEY_ATTRS, KEY_AUDIO_PARAM,
    KEY_DEV_ID, KEY_DH_ID, MAX_JSON_LEN,
};
use daudio_common::{
    classify_dh_id, result_code, AudioEventType, DAudioError, DeviceType, Result, DH_SUCCESS,
};
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};

use super::{SourceDev, CTRL_DH_ID};
use crate::ctrl::SourceCtrlManager;
use crate::device::{AudioDevice, AudioIoDevice, MicDevice, SessionState, SpeakerDevice};

/// Parse task content and its mandatory `dhId`
fn parse_task_args(args: &str) -> Result<(Map<String, Value>, i32)> {
    let map = parse_json_object(args)?;
    let dh_id = get_dh_id(&map).map_err(|e| match e {
        DAudioError::NotFoundKey { .. } => DAudioError::param_invalid("task content lacks dhId"),
        other => other,
    })?;
    Ok((map, dh_id))
}

/// How a session came to be closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseCause {
    /// Requested by the framework or a disable
    Local,
    /// Data or control channel went away underneath us
    Lost,
}

fn open_request(device: &AudioDevice) -> (AudioEventType, AudioEventType) {
    match device {
        AudioDevice::Speaker(_) => (
            AudioEventType::OpenSpeaker,
            AudioEventType::NotifyOpenSpeakerResult,
        ),
        AudioDevice::Mic(_) => (AudioEventType::OpenMic, AudioEventType::NotifyOpenMicResult),
    }
}

fn close_request(device: &AudioDevice) -> (AudioEventType, AudioEventType, AudioEventType) {
    match device {
        AudioDevice::Speaker(_) => (
            AudioEventType::CloseSpeaker,
            AudioEventType::NotifyCloseSpeakerResult,
            AudioEventType::SpeakerClosed,
        ),
        AudioDevice::Mic(_) => (
            AudioEventType::CloseMic,
            AudioEventType::NotifyCloseMicResult,
            AudioEventType::MicClosed,
        ),
    }
}

impl SourceDev {
    /// Create (if needed) and register the device named by `dhId`
    pub async fn task_enable_daudio(&self, args: &str) -> Result<()> {
        let (map, dh_id) = parse_task_args(args)?;
        let attrs = map
            .get(KEY_ATTRS)
            .and_then(Value::as_str)
            .ok_or_else(|| DAudioError::param_invalid("enable content lacks attrs"))?;

        let (device, created) = match self.device(dh_id) {
            Some(device) => (device, false),
            None => {
                let device = match classify_dh_id(dh_id) {
                    DeviceType::Speaker => {
                        AudioDevice::Speaker(SpeakerDevice::new(dh_id, self.device_deps()))
                    }
                    DeviceType::Mic => AudioDevice::Mic(MicDevice::new(dh_id, self.device_deps())),
                    DeviceType::Unknown => {
                        return Err(DAudioError::not_support(format!("dhId {}", dh_id)))
                    }
                };
                self.devices.write().insert(dh_id, device.clone());
                (device, true)
            }
        };

        if let Err(e) = device.io().enable_device(dh_id, attrs).await {
            error!("Enable {} on {} failed: {}", dh_id, self.dev_id, e);
            if created {
                self.devices.write().remove(&dh_id);
            }
            return Err(e);
        }
        info!("{} {} of {} enabled", classify_dh_id(dh_id), dh_id, self.dev_id);
        Ok(())
    }

    /// Close, unregister and forget the device named by `dhId`
    pub async fn task_disable_daudio(&self, args: &str) -> Result<()> {
        let (_, dh_id) = parse_task_args(args)?;
        if classify_dh_id(dh_id) == DeviceType::Unknown {
            return Err(DAudioError::not_support(format!("dhId {}", dh_id)));
        }
        let Some(device) = self.device(dh_id) else {
            debug!("Disable of {} on {}: no such session", dh_id, self.dev_id);
            return Ok(());
        };

        if let Err(e) = self.close_device(&device, CloseCause::Local).await {
            warn!("Close before disable of {} failed: {}", dh_id, e);
        }
        let result = device.io().disable_device(dh_id).await;
        self.devices.write().remove(&dh_id);

        if self.device_count() == 0 && self.is_ctrl_opened() {
            if let Err(e) = self.close_ctrl().await {
                warn!("Closing control channel of {} failed: {}", self.dev_id, e);
            }
        }
        result
    }

    pub async fn task_open_dspeaker(&self, args: &str) -> Result<()> {
        let (_, dh_id) = parse_task_args(args)?;
        let speaker = self
            .speaker(dh_id)
            .ok_or_else(|| DAudioError::nullptr(format!("speaker {}", dh_id)))?;
        self.open_session(AudioDevice::Speaker(speaker)).await
    }

    pub async fn task_close_dspeaker(&self, args: &str) -> Result<()> {
        let (_, dh_id) = parse_task_args(args)?;
        let speaker = self
            .speaker(dh_id)
            .ok_or_else(|| DAudioError::nullptr(format!("speaker {}", dh_id)))?;
        self.close_device(&AudioDevice::Speaker(speaker), CloseCause::Local)
            .await
    }

    pub async fn task_open_dmic(&self, args: &str) -> Result<()> {
        let (_, dh_id) = parse_task_args(args)?;
        let mic = self
            .mic(dh_id)
            .ok_or_else(|| DAudioError::nullptr(format!("mic {}", dh_id)))?;
        self.open_session(AudioDevice::Mic(mic)).await
    }

    pub async fn task_close_dmic(&self, args: &str) -> Result<()> {
        let (_, dh_id) = parse_task_args(args)?;
        let mic = self
            .mic(dh_id)
            .ok_or_else(|| DAudioError::nullptr(format!("mic {}", dh_id)))?;
        self.close_device(&AudioDevice::Mic(mic), CloseCause::Local)
            .await
    }

    /// The speaker's data channel dropped while open
    pub async fn task_dspeaker_closed(&self, args: &str) -> Result<()> {
        let (_, dh_id) = parse_task_args(args)?;
        let speaker = self
            .speaker(dh_id)
            .ok_or_else(|| DAudioError::nullptr(format!("speaker {}", dh_id)))?;
        let device = AudioDevice::Speaker(speaker);
        if device.io().state() != SessionState::Open {
            debug!("Speaker {} closed while {}; ignored", dh_id, device.io().state());
            return Ok(());
        }
        self.close_device(&device, CloseCause::Lost).await
    }

    /// The mic's data channel dropped while open
    pub async fn task_dmic_closed(&self, args: &str) -> Result<()> {
        let (_, dh_id) = parse_task_args(args)?;
        let mic = self
            .mic(dh_id)
            .ok_or_else(|| DAudioError::nullptr(format!("mic {}", dh_id)))?;
        let device = AudioDevice::Mic(mic);
        if device.io().state() != SessionState::Open {
            debug!("Mic {} closed while {}; ignored", dh_id, device.io().state());
            return Ok(());
        }
        self.close_device(&device, CloseCause::Lost).await
    }

    /// Bring up the control channel and wait for the sink to accept it
    pub async fn task_open_ctrl_channel(&self, args: &str) -> Result<()> {
        parse_json_object(args)?;
        if self.is_ctrl_opened() {
            debug!("Control channel of {} already open", self.dev_id);
            return Ok(());
        }

        let ctrl = SourceCtrlManager::new(
            self.dev_id.clone(),
            self.deps.transport_factory.clone(),
            self.event_sink(),
        );
        if let Err(e) = ctrl.set_up().await {
            error!("Control channel set up for {} failed: {}", self.dev_id, e);
            return Err(e);
        }
        if let Err(e) = self
            .request_sink(CTRL_DH_ID, AudioEventType::OpenCtrl, args)
            .await
        {
            error!("Sink {} refused control channel: {}", self.dev_id, e);
            if let Err(release) = ctrl.release().await {
                debug!("Control channel release failed: {}", release);
            }
            return Err(e);
        }
        *self.ctrl.write() = Some(ctrl);
        info!("Control channel of {} open", self.dev_id);
        Ok(())
    }

    /// Release the control channel and tell the sink
    pub async fn task_close_ctrl_channel(&self, args: &str) -> Result<()> {
        parse_json_object(args)?;
        self.close_ctrl().await
    }

    /// The control channel dropped: every open session goes with it.
    ///
    /// The channel posts this with empty content, so only the length bound
    /// applies.
    pub async fn task_ctrl_trans_closed(&self, args: &str) -> Result<()> {
        if args.len() > MAX_JSON_LEN {
            return Err(DAudioError::param_invalid(format!(
                "content of {} bytes exceeds {}",
                args.len(),
                MAX_JSON_LEN
            )));
        }
        let ctrl = self.ctrl.write().take();
        if let Some(ctrl) = ctrl {
            if let Err(e) = ctrl.release().await {
                debug!("Control channel release failed: {}", e);
            }
        }

        let mut first_err = None;
        for device in self.devices_snapshot() {
            if device.io().state() != SessionState::Open {
                continue;
            }
            if let Err(e) = self.close_device(&device, CloseCause::Lost).await {
                first_err.get_or_insert(e);
            }
        }
        warn!("Control channel of {} lost; sessions closed", self.dev_id);
        first_err.map_or(Ok(()), Err)
    }

    /// Volume or mute change from the framework, relayed to the sink
    pub async fn task_set_volume(&self, event_type: AudioEventType, args: &str) -> Result<()> {
        let (map, dh_id) = parse_task_args(args)?;
        let speaker = self
            .speaker(dh_id)
            .ok_or_else(|| DAudioError::nullptr(format!("speaker {}", dh_id)))?;
        speaker.apply_volume_event(event_type, &map)?;
        self.notify_sink(dh_id, event_type, args).await
    }

    /// Volume changed on the sink; update the shadow and tell the framework
    pub async fn task_volume_change(&self, args: &str) -> Result<()> {
        let (map, dh_id) = parse_task_args(args)?;
        let speaker = self
            .speaker(dh_id)
            .ok_or_else(|| DAudioError::nullptr(format!("speaker {}", dh_id)))?;
        speaker.apply_volume_event(AudioEventType::VolumeChange, &map)?;
        self.notify_hdf(dh_id, AudioEventType::VolumeChange, args.to_string())
    }

    pub async fn task_focus_change(&self, args: &str) -> Result<()> {
        let (_, dh_id) = parse_task_args(args)?;
        self.speaker(dh_id)
            .ok_or_else(|| DAudioError::nullptr(format!("speaker {}", dh_id)))?;
        self.notify_hdf(dh_id, AudioEventType::AudioFocusChange, args.to_string())
    }

    pub async fn task_render_state_change(&self, args: &str) -> Result<()> {
        let (_, dh_id) = parse_task_args(args)?;
        self.speaker(dh_id)
            .ok_or_else(|| DAudioError::nullptr(format!("speaker {}", dh_id)))?;
        self.notify_hdf(dh_id, AudioEventType::AudioRenderStateChange, args.to_string())
    }

    pub async fn task_play_status_change(&self, args: &str) -> Result<()> {
        let (_, dh_id) = parse_task_args(args)?;
        self.speaker(dh_id)
            .ok_or_else(|| DAudioError::nullptr(format!("speaker {}", dh_id)))?;
        self.notify_sink(dh_id, AudioEventType::ChangePlayStatus, args)
            .await
    }

    pub async fn task_spk_mmap_start(&self, args: &str) -> Result<()> {
        let (_, dh_id) = parse_task_args(args)?;
        let speaker = self
            .speaker(dh_id)
            .ok_or_else(|| DAudioError::nullptr(format!("speaker {}", dh_id)))?;
        speaker.mmap_start().await
    }

    pub async fn task_spk_mmap_stop(&self, args: &str) -> Result<()> {
        let (_, dh_id) = parse_task_args(args)?;
        let speaker = self
            .speaker(dh_id)
            .ok_or_else(|| DAudioError::nullptr(format!("speaker {}", dh_id)))?;
        speaker.mmap_stop().await
    }

    pub async fn task_mic_mmap_start(&self, args: &str) -> Result<()> {
        let (_, dh_id) = parse_task_args(args)?;
        let mic = self
            .mic(dh_id)
            .ok_or_else(|| DAudioError::nullptr(format!("mic {}", dh_id)))?;
        mic.mmap_start().await
    }

    pub async fn task_mic_mmap_stop(&self, args: &str) -> Result<()> {
        let (_, dh_id) = parse_task_args(args)?;
        let mic = self
            .mic(dh_id)
            .ok_or_else(|| DAudioError::nullptr(format!("mic {}", dh_id)))?;
        mic.mmap_stop().await
    }

    /// Open one direction and report the outcome to the framework
    async fn open_session(&self, device: AudioDevice) -> Result<()> {
        let io = device.io();
        let dh_id = io.dh_id();
        let (_, hdf_result) = open_request(&device);

        if io.state() == SessionState::Open {
            debug!("{} {} already open", io.device_type(), dh_id);
            return self.notify_hdf(dh_id, hdf_result, result_content(dh_id, DH_SUCCESS));
        }

        io.set_state(SessionState::Opening);
        let result = self.bring_up(&device).await;
        match &result {
            Ok(()) => {
                io.set_state(SessionState::Open);
                info!("{} {} of {} open", io.device_type(), dh_id, self.dev_id);
            }
            Err(e) => {
                error!("Open {} {} of {} failed: {}", io.device_type(), dh_id, self.dev_id, e);
                if let Err(stop) = io.stop().await {
                    debug!("Stop after failed open: {}", stop);
                }
                if let Err(release) = io.release().await {
                    debug!("Release after failed open: {}", release);
                }
                io.set_state(SessionState::Closed);
            }
        }
        let content = result_content(dh_id, result_code(&result));
        if let Err(e) = self.notify_hdf(dh_id, hdf_result, content) {
            debug!("Open result for {} not delivered: {}", dh_id, e);
        }
        result
    }

    /// Control channel, engine, data channel, then the sink's agreement
    async fn bring_up(&self, device: &AudioDevice) -> Result<()> {
        let io = device.io();
        let dh_id = io.dh_id();
        let (request, _) = open_request(device);

        if !self.is_ctrl_opened() {
            let content = json!({ KEY_DEV_ID: self.dev_id }).to_string();
            self.task_open_ctrl_channel(&content).await?;
        }
        io.init_engine().await?;
        io.set_up().await?;
        io.start().await?;

        let content = json!({
            KEY_DH_ID: dh_id.to_string(),
            KEY_AUDIO_PARAM: io.audio_param(),
        })
        .to_string();
        self.request_sink(dh_id, request, &content).await
    }

    /// Stop and release one direction.
    ///
    /// A closed session is left alone. Local closes tell the sink and
    /// report a close result to the framework; lost sessions report
    /// `SpeakerClosed`/`MicClosed` instead.
    async fn close_device(&self, device: &AudioDevice, cause: CloseCause) -> Result<()> {
        let io = device.io();
        let dh_id = io.dh_id();
        if io.state() == SessionState::Closed {
            debug!("{} {} already closed", io.device_type(), dh_id);
            return Ok(());
        }
        let (request, hdf_result, hdf_closed) = close_request(device);

        io.set_state(SessionState::Closing);
        let stopped = io.stop().await;
        let released = io.release().await;
        if let Err(e) = self.notify_sink(dh_id, request, &dh_id_content(dh_id)).await {
            debug!("Sink not told about closing {}: {}", dh_id, e);
        }
        io.set_state(SessionState::Closed);

        let result = match (stopped, released) {
            (Err(e), _) | (Ok(()), Err(e)) => Err(e),
            _ => Ok(()),
        };
        let notified = match cause {
            CloseCause::Local => {
                self.notify_hdf(dh_id, hdf_result, result_content(dh_id, result_code(&result)))
            }
            CloseCause::Lost => self.notify_hdf(dh_id, hdf_closed, dh_id_content(dh_id)),
        };
        if let Err(e) = notified {
            debug!("Close of {} not delivered to framework: {}", dh_id, e);
        }
        info!("{} {} of {} closed ({:?})", io.device_type(), dh_id, self.dev_id, cause);
        result
    }

    async fn close_ctrl(&self) -> Result<()> {
        let ctrl = self.ctrl.write().take();
        let Some(ctrl) = ctrl else {
            return Ok(());
        };
        let content = json!({ KEY_DEV_ID: self.dev_id }).to_string();
        if let Err(e) = self
            .notify_sink(CTRL_DH_ID, AudioEventType::CloseCtrl, &content)
            .await
        {
            debug!("Sink not told about closing control channel: {}", e);
        }
        ctrl.release().await?;
        info!("Control channel of {} closed", self.dev_id);
        Ok(())
    }
}
