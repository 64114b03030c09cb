//! Collaborator interfaces consumed by the hardware controller.
//!
//! Each call either completes or fails with an error; the controller maps
//! any failure to the command's status byte.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

/// Light strip / LED actuator.
#[async_trait]
pub trait Illumination: Send + Sync {
    async fn set(&self, on: bool) -> Result<()>;
}

/// The still/video sensor.  Callers must serialise access.
#[async_trait]
pub trait Camera: Send + Sync {
    async fn take_still(&self, path: &Path) -> Result<()>;

    /// Record `duration_secs` of video.  `with_audio` selects the external
    /// encoder that muxes in the microphone.
    async fn record_video(&self, path: &Path, duration_secs: u32, with_audio: bool) -> Result<()>;

    /// Release the device at shutdown.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// An in-progress audio playback.
#[async_trait]
pub trait Playback: Send {
    fn is_active(&mut self) -> bool;
    async fn stop(self: Box<Self>) -> Result<()>;
}

#[async_trait]
pub trait Audio: Send + Sync {
    async fn record(&self, path: &Path, duration_secs: u32) -> Result<()>;

    /// Start playback and return immediately.
    async fn play(&self, path: &Path) -> Result<Box<dyn Playback>>;
}

/// Display output switch.
#[async_trait]
pub trait Display: Send + Sync {
    /// `port` is 1-based.
    async fn set_output(&self, port: u16, on: bool) -> Result<()>;
}

/// The full set of collaborators owned by the controller.
pub struct Hardware {
    pub light: Box<dyn Illumination>,
    pub camera: Box<dyn Camera>,
    pub audio: Box<dyn Audio>,
    pub display: Box<dyn Display>,
}
