//! RPC boundary to the sink and the waits bridging it
//!
//! Requests to the sink are fire-and-forget calls on [`SinkProxy`]. The
//! sink answers later with a `Notify*Result` event delivered on another
//! task. [`RpcWaiter`] keeps one single-slot promise per acknowledgement
//! type, so an answer can only ever resolve the wait it belongs to.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use daudio_common::{AudioEventType, DAudioError, Result, DH_SUCCESS};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Cross-device calls into the sink
#[async_trait]
pub trait SinkProxy: Send + Sync {
    async fn daudio_notify(
        &self,
        dev_id: &str,
        dh_id: i32,
        event_type: AudioEventType,
        content: &str,
    ) -> Result<()>;
}

/// Pending acknowledgement waits, keyed by acknowledgement type
#[derive(Debug, Default)]
pub struct RpcWaiter {
    slots: Mutex<HashMap<AudioEventType, oneshot::Sender<i32>>>,
}

impl RpcWaiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the slot for `event_type`.
    ///
    /// Must happen before the request is sent so an immediate answer is not
    /// lost. A stale slot of the same type is replaced.
    pub fn arm(&self, event_type: AudioEventType) -> Result<oneshot::Receiver<i32>> {
        if !event_type.is_rpc_result() {
            return Err(DAudioError::not_support(format!(
                "{} is not an acknowledgement",
                event_type
            )));
        }
        let (tx, rx) = oneshot::channel();
        if self.slots.lock().insert(event_type, tx).is_some() {
            warn!("Replaced stale wait for {}", event_type);
        }
        Ok(rx)
    }

    /// Resolve the wait for `event_type`; false if nobody waits for it
    pub fn fulfill(&self, event_type: AudioEventType, result: i32) -> bool {
        let Some(tx) = self.slots.lock().remove(&event_type) else {
            return false;
        };
        tx.send(result).is_ok()
    }

    /// Wait for the answer armed with [`RpcWaiter::arm`]
    pub async fn wait(
        &self,
        event_type: AudioEventType,
        rx: oneshot::Receiver<i32>,
        timeout: Duration,
    ) -> Result<()> {
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(DH_SUCCESS)) => {
                debug!("Received {} success", event_type);
                Ok(())
            }
            Ok(Ok(code)) => {
                warn!("Received {} with failure code {}", event_type, code);
                Err(DAudioError::from_code(code).unwrap_or(DAudioError::Remote { code }))
            }
            Ok(Err(_)) => Err(DAudioError::failed(format!(
                "wait for {} cancelled",
                event_type
            ))),
            Err(_) => {
                self.cancel(event_type);
                warn!("Timed out waiting for {}", event_type);
                Err(DAudioError::wait_timeout(
                    event_type.to_string(),
                    timeout.as_millis() as u64,
                ))
            }
        }
    }

    pub fn cancel(&self, event_type: AudioEventType) {
        self.slots.lock().remove(&event_type);
    }

    /// Drop every pending wait; the waiters see a cancellation
    pub fn cancel_all(&self) {
        self.slots.lock().clear();
    }

    pub fn is_pending(&self, event_type: AudioEventType) -> bool {
        self.slots.lock().contains_key(&event_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const ACK: AudioEventType = AudioEventType::NotifyOpenSpeakerResult;

    #[tokio::test]
    async fn test_fulfilled_before_wait() {
        let waiter = RpcWaiter::new();
        let rx = waiter.arm(ACK).unwrap();
        assert!(waiter.fulfill(ACK, DH_SUCCESS));
        waiter.wait(ACK, rx, Duration::from_secs(1)).await.unwrap();
        assert!(!waiter.is_pending(ACK));
    }

    #[tokio::test]
    async fn test_remote_failure_keeps_code() {
        let waiter = RpcWaiter::new();
        let rx = waiter.arm(ACK).unwrap();
        waiter.fulfill(ACK, -40099);
        let err = waiter.wait(ACK, rx, Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(err.code(), -40099);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_clears_slot() {
        let waiter = RpcWaiter::new();
        let rx = waiter.arm(ACK).unwrap();
        let err = waiter
            .wait(ACK, rx, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, DAudioError::WaitTimeout { .. }));
        assert!(!waiter.is_pending(ACK));
        // A late answer is dropped
        assert!(!waiter.fulfill(ACK, DH_SUCCESS));
    }

    #[tokio::test]
    async fn test_slots_are_separate() {
        let waiter = Arc::new(RpcWaiter::new());
        let speaker_rx = waiter.arm(ACK).unwrap();
        let _mic_rx = waiter.arm(AudioEventType::NotifyOpenMicResult).unwrap();

        // The mic answer must not resolve the speaker wait
        assert!(waiter.fulfill(AudioEventType::NotifyOpenMicResult, DH_SUCCESS));
        assert!(waiter.is_pending(ACK));

        let remote = waiter.clone();
        tokio::spawn(async move {
            remote.fulfill(ACK, DH_SUCCESS);
        });
        waiter
            .wait(ACK, speaker_rx, Duration::from_secs(1))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancel_all_wakes_waiter() {
        let waiter = RpcWaiter::new();
        let rx = waiter.arm(ACK).unwrap();
        waiter.cancel_all();
        assert!(matches!(
            waiter.wait(ACK, rx, Duration::from_secs(1)).await,
            Err(DAudioError::Failed { .. })
        ));
    }

    #[test]
    fn test_only_acknowledgements_can_be_armed() {
        let waiter = RpcWaiter::new();
        assert!(waiter.arm(AudioEventType::OpenSpeaker).is_err());
    }
}
