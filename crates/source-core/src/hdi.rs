//! Seams towards the local audio framework (HDF/HDI)
//!
//! The framework sees every remote speaker or mic as a local device. It
//! drives the device through [`HdfStreamCallback`]; the source side reports
//! results and remote events back through [`HdiHandler`].

use std::sync::Arc;

use async_trait::async_trait;
use daudio_common::{AudioData, AudioEvent, AudioParam, Result};

use crate::device::{AshmemRegion, MmapPosition};

/// Local audio framework adapter
#[async_trait]
pub trait HdiHandler: Send + Sync {
    /// Expose a remote device handle to the framework
    async fn register_audio_device(
        &self,
        dev_id: &str,
        dh_id: i32,
        capability: &str,
        callback: Arc<dyn HdfStreamCallback>,
    ) -> Result<()>;

    /// Withdraw a previously registered handle
    async fn unregister_audio_device(&self, dev_id: &str, dh_id: i32) -> Result<()>;

    /// Deliver an event (open/close results, volume, focus) to the framework
    fn notify_event(&self, dev_id: &str, dh_id: i32, event: &AudioEvent) -> Result<()>;
}

/// Calls the framework makes into a registered device
pub trait HdfStreamCallback: Send + Sync {
    /// A stream was created on the device; requests the remote open
    fn create_stream(&self, stream_id: i32) -> Result<()>;

    /// The stream was destroyed; requests the remote close
    fn destroy_stream(&self, stream_id: i32) -> Result<()>;

    fn set_parameters(&self, stream_id: i32, param: &AudioParam) -> Result<()>;

    /// Volume, focus or play-state change raised by the framework
    fn notify_event(&self, stream_id: i32, event: &AudioEvent) -> Result<()>;

    /// Render path: one frame to send to the sink
    fn write_stream_data(&self, stream_id: i32, data: AudioData) -> Result<()>;

    /// Capture path: next frame received from the sink
    fn read_stream_data(&self, stream_id: i32) -> Result<AudioData>;

    fn read_mmap_position(&self, stream_id: i32) -> Result<MmapPosition>;

    /// Hand over the shared region used in mmap mode
    fn refresh_ashmem_info(
        &self,
        stream_id: i32,
        region: Arc<AshmemRegion>,
        length_per_trans: usize,
    ) -> Result<()>;
}
