//! Cancellable background tasks owned by a device or coordinator

use std::future::Future;
use std::time::Instant;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Handle to a spawned task that stops when its token is cancelled
#[derive(Debug)]
pub(crate) struct TaskHandle {
    name: String,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    started_at: Instant,
}

impl TaskHandle {
    /// Spawn `body`, handing it the token it must watch
    pub(crate) fn spawn<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(body(cancel.clone()));
        debug!("Task started: {}", name);
        Self {
            name,
            cancel,
            handle,
            started_at: Instant::now(),
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signal the task without waiting for it
    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancel and wait for the task to wind down
    pub(crate) async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            debug!("Task {} ended abnormally: {}", self.name, e);
        }
        debug!(
            "Task stopped: {} after {:?}",
            self.name,
            self.started_at.elapsed()
        );
    }
}
