//! Codec leg of a transport

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use daudio_common::{AudioData, AudioParam, DAudioError, Result};
use parking_lot::RwLock;
use tracing::debug;

/// Encoder or decoder sitting between a device and its channel
#[async_trait]
pub trait AudioProcessor: Send + Sync {
    /// Configure for the given local and remote parameters
    async fn configure(&self, local: &AudioParam, remote: &AudioParam) -> Result<()>;

    async fn start(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    /// Free codec resources; `configure` is needed before the next start
    async fn release(&self) -> Result<()>;

    /// Process one frame. `Ok(None)` means the frame was consumed without output.
    fn process(&self, data: AudioData) -> Result<Option<AudioData>>;
}

/// PCM processor that forwards frames unchanged
#[derive(Debug, Default)]
pub struct PassthroughProcessor {
    running: AtomicBool,
    param: RwLock<Option<AudioParam>>,
}

impl PassthroughProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

#[async_trait]
impl AudioProcessor for PassthroughProcessor {
    async fn configure(&self, local: &AudioParam, remote: &AudioParam) -> Result<()> {
        if local.sample_rate != remote.sample_rate || local.channels != remote.channels {
            return Err(DAudioError::not_support(format!(
                "pcm passthrough cannot resample {}Hz/{}ch to {}Hz/{}ch",
                local.sample_rate, local.channels, remote.sample_rate, remote.channels
            )));
        }
        *self.param.write() = Some(local.clone());
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        if self.param.read().is_none() {
            return Err(DAudioError::nullptr("processor parameters"));
        }
        self.running.store(true, Ordering::Release);
        debug!("Passthrough processor started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.running.store(false, Ordering::Release);
        Ok(())
    }

    async fn release(&self) -> Result<()> {
        self.running.store(false, Ordering::Release);
        *self.param.write() = None;
        Ok(())
    }

    fn process(&self, data: AudioData) -> Result<Option<AudioData>> {
        if !self.is_running() {
            return Ok(None);
        }
        Ok(Some(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_requires_configure() {
        let processor = PassthroughProcessor::new();
        assert!(matches!(
            processor.start().await,
            Err(DAudioError::Nullptr { .. })
        ));

        let param = AudioParam::default();
        processor.configure(&param, &param).await.unwrap();
        processor.start().await.unwrap();
        assert!(processor.is_running());
    }

    #[tokio::test]
    async fn test_process_only_while_running() {
        let processor = PassthroughProcessor::new();
        let param = AudioParam::default();
        processor.configure(&param, &param).await.unwrap();

        let frame = AudioData::silence(4);
        assert!(processor.process(frame.clone()).unwrap().is_none());

        processor.start().await.unwrap();
        assert_eq!(processor.process(frame.clone()).unwrap(), Some(frame));

        processor.release().await.unwrap();
        assert!(processor.start().await.is_err());
    }

    #[tokio::test]
    async fn test_rejects_resampling() {
        let processor = PassthroughProcessor::new();
        let local = AudioParam::default();
        let remote = AudioParam {
            sample_rate: 16000,
            ..AudioParam::default()
        };
        assert!(processor.configure(&local, &remote).await.is_err());
    }
}
