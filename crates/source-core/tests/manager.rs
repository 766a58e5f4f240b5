//! SourceManager routing and IPC reporting

mod common;

use std::sync::Arc;

use common::*;
use daudio_common::error::codes;
use daudio_common::json::result_content;
use daudio_common::{AudioEventType, DAudioError};
use daudio_source_core::{IpcCallback, SessionState, SourceManager};

struct Setup {
    manager: Arc<SourceManager>,
    ipc: Arc<RecordingIpc>,
    hdi: Arc<RecordingHdi>,
    sink: Arc<FakeSink>,
}

fn setup() -> Setup {
    init_tracing();
    let hdi = Arc::new(RecordingHdi::default());
    let sink = Arc::new(FakeSink::default());
    let channels = Arc::new(FakeChannelBuilder::new());
    let ipc = Arc::new(RecordingIpc::default());

    let ipc_callback: Arc<dyn IpcCallback> = ipc.clone();
    let manager = SourceManager::new(
        test_config(),
        deps(&hdi, &sink, &channels),
        Some(ipc_callback),
    )
    .unwrap();
    sink.attach_manager(&manager);
    Setup {
        manager,
        ipc,
        hdi,
        sink,
    }
}

#[tokio::test]
async fn test_enable_and_disable_report_through_ipc() {
    let s = setup();

    s.manager
        .enable_daudio(DEV_ID, "1", "1.0", ATTRS, "req-1")
        .unwrap();
    assert!(wait_until(|| s.ipc.reg.lock().len() == 1).await);
    assert_eq!(
        s.ipc.reg.lock()[0],
        (DEV_ID.to_string(), "1".to_string(), "req-1".to_string(), 0)
    );
    assert_eq!(s.manager.device_count(), 1);
    assert!(s.hdi.is_registered(SPEAKER));

    s.manager.disable_daudio(DEV_ID, "1", "req-2").unwrap();
    assert!(wait_until(|| s.ipc.unreg.lock().len() == 1).await);
    assert_eq!(s.ipc.unreg.lock()[0].2, "req-2");
    assert_eq!(s.ipc.unreg.lock()[0].3, 0);

    // Emptied devices are retired
    assert!(wait_until(|| s.manager.device_count() == 0).await);
}

#[tokio::test]
async fn test_unknown_device_is_rejected() {
    let s = setup();

    assert!(matches!(
        s.manager.disable_daudio("nobody", "1", "req"),
        Err(DAudioError::DeviceNotExist { .. })
    ));
    assert!(matches!(
        s.manager.handle_daudio_notify("nobody", "1", 33, "{}"),
        Err(DAudioError::DeviceNotExist { .. })
    ));
    assert!(matches!(
        s.manager.enable_daudio("", "1", "1.0", ATTRS, "req"),
        Err(DAudioError::ParamInvalid { .. })
    ));
    assert!(matches!(
        s.manager.enable_daudio(DEV_ID, "0", "1.0", ATTRS, "req"),
        Err(DAudioError::NotSupport { .. })
    ));
}

#[tokio::test]
async fn test_sink_notifications_are_routed() {
    let s = setup();
    s.manager
        .enable_daudio(DEV_ID, "1", "1.0", ATTRS, "req-1")
        .unwrap();
    assert!(wait_until(|| s.ipc.reg.lock().len() == 1).await);

    assert!(matches!(
        s.manager.handle_daudio_notify(DEV_ID, "1", 999, "{}"),
        Err(DAudioError::NotSupport { .. })
    ));

    s.manager
        .handle_daudio_notify(
            DEV_ID,
            "1",
            AudioEventType::VolumeChange.code(),
            r#"{"dhId":"1","volumeLevel":4}"#,
        )
        .unwrap();
    assert!(wait_until(|| s.hdi.events_of(AudioEventType::VolumeChange).len() == 1).await);

    // Acknowledgements arriving through the manager resolve the device's waits
    let dev = s.manager.device(DEV_ID).unwrap();
    dev.handle_open_dspeaker(daudio_common::AudioEvent::new(
        AudioEventType::OpenSpeaker,
        args(SPEAKER),
    ))
    .unwrap();
    assert!(wait_until(|| dev.device_state(SPEAKER) == Some(SessionState::Open)).await);
    assert_eq!(s.sink.requests_of(AudioEventType::OpenSpeaker).len(), 1);

    // A stray acknowledgement is accepted and dropped
    s.manager
        .handle_daudio_notify(
            DEV_ID,
            "1",
            AudioEventType::NotifyOpenMicResult.code(),
            &result_content(MIC, 0),
        )
        .unwrap();
}

#[tokio::test]
async fn test_release_forgets_devices() {
    let s = setup();
    s.manager
        .enable_daudio(DEV_ID, "2", "1.0", ATTRS, "req-1")
        .unwrap();
    assert!(wait_until(|| s.ipc.reg.lock().len() == 1).await);
    let dev = s.manager.device(DEV_ID).unwrap();
    assert!(dev.is_awake());

    s.manager.release();
    assert_eq!(s.manager.device_count(), 0);
    assert!(!dev.is_awake());
    assert!(matches!(
        s.manager.disable_daudio(DEV_ID, "2", "req-2"),
        Err(DAudioError::DeviceNotExist { .. })
    ));
}

#[tokio::test]
async fn test_queued_enable_survives_emptied_device() {
    let s = setup();
    s.manager
        .enable_daudio(DEV_ID, "1", "1.0", ATTRS, "req-1")
        .unwrap();
    assert!(wait_until(|| s.ipc.reg.lock().len() == 1).await);

    // The disable empties the device while the mic enable is still queued
    let mic = MIC.to_string();
    s.manager.disable_daudio(DEV_ID, "1", "req-2").unwrap();
    s.manager
        .enable_daudio(DEV_ID, &mic, "1.0", ATTRS, "req-3")
        .unwrap();
    assert!(wait_until(|| s.ipc.reg.lock().len() == 2).await);

    assert_eq!(
        s.ipc.unreg.lock()[0],
        (DEV_ID.to_string(), "1".to_string(), "req-2".to_string(), 0)
    );
    assert_eq!(
        s.ipc.reg.lock()[1],
        (DEV_ID.to_string(), mic, "req-3".to_string(), 0)
    );
    assert!(s.hdi.is_registered(MIC));
    assert!(!s.hdi.is_registered(SPEAKER));
    assert_eq!(s.manager.device_count(), 1);
}

#[tokio::test]
async fn test_failed_enable_reports_its_handle() {
    let s = setup();
    let oversized = format!(r#"{{"pad":"{}"}}"#, "x".repeat(1100));
    let mic = MIC.to_string();

    s.manager
        .enable_daudio(DEV_ID, "1", "1.0", &oversized, "req-1")
        .unwrap();
    s.manager
        .enable_daudio(DEV_ID, &mic, "1.0", ATTRS, "req-2")
        .unwrap();
    assert!(wait_until(|| s.ipc.reg.lock().len() == 2).await);

    let reg = s.ipc.reg.lock().clone();
    assert_eq!(
        reg[0],
        (
            DEV_ID.to_string(),
            "1".to_string(),
            "req-1".to_string(),
            codes::ERR_DH_AUDIO_SA_PARAM_INVALID
        )
    );
    assert_eq!(reg[1], (DEV_ID.to_string(), mic, "req-2".to_string(), 0));
    assert!(s.hdi.is_registered(MIC));
    assert_eq!(s.manager.device_count(), 1);

    // Nothing was left behind: the next disable of "1" gets its own id
    s.manager.disable_daudio(DEV_ID, "1", "req-3").unwrap();
    assert!(wait_until(|| s.ipc.unreg.lock().len() == 1).await);
    assert_eq!(s.ipc.unreg.lock()[0].2, "req-3");
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let hdi = Arc::new(RecordingHdi::default());
    let sink = Arc::new(FakeSink::default());
    let channels = Arc::new(FakeChannelBuilder::new());

    assert!(matches!(
        SourceManager::new(
            test_config().with_data_queue_max(0),
            deps(&hdi, &sink, &channels),
            None,
        ),
        Err(DAudioError::Config { .. })
    ));
}
