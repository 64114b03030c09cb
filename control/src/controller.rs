//! Hardware controller – turns decoded commands into collaborator calls.
//!
//! Owns every collaborator handle, the recording state machine and the
//! media store.  Exactly one instance exists per server; handlers share it
//! through an `Arc`.
//!
//! Locking:
//!   - `recording` (std mutex, never held across an await) makes the
//!     VIDEO check-and-set atomic.
//!   - `camera` serialises every use of the sensor (PHOTO and VIDEO).
//!   - `microphone` serialises AUDIO_REC and VIDEO-with-audio.  It is
//!     always taken after `camera`.
//!   - `playback` holds the active playback handle, if any.

use std::path::PathBuf;
use std::sync::Mutex;

use thiserror::Error;
use tracing::{debug, info, warn};

use kestrel_common::config::Config;
use kestrel_common::protocol::{Command, CommandFrame, MediaKind, Status};

use crate::hardware::{Hardware, Playback};
use crate::push::MediaPush;
use crate::storage::MediaStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    Idle,
    Recording,
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("video recording already in progress")]
    DeviceBusy,
    #[error("no active playback")]
    NothingPlaying,
    #[error(transparent)]
    Hardware(#[from] anyhow::Error),
}

/// Returns the recording state to `Idle` when dropped.
struct RecordingGuard<'a> {
    state: &'a Mutex<RecordingState>,
}

impl Drop for RecordingGuard<'_> {
    fn drop(&mut self) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = RecordingState::Idle;
    }
}

pub struct HardwareController {
    hw: Hardware,
    store: MediaStore,
    pusher: MediaPush,
    default_record_secs: u32,
    playback_file: PathBuf,
    recording: Mutex<RecordingState>,
    camera: tokio::sync::Mutex<()>,
    microphone: tokio::sync::Mutex<()>,
    playback: tokio::sync::Mutex<Option<Box<dyn Playback>>>,
}

impl HardwareController {
    pub fn new(hw: Hardware, config: &Config) -> Self {
        Self {
            hw,
            store: MediaStore::new(&config.storage_dir),
            pusher: MediaPush::new(config.push_addr(), config.push_connect_timeout),
            default_record_secs: config.default_record_secs,
            playback_file: config.playback_file.clone(),
            recording: Mutex::new(RecordingState::Idle),
            camera: tokio::sync::Mutex::new(()),
            microphone: tokio::sync::Mutex::new(()),
            playback: tokio::sync::Mutex::new(None),
        }
    }

    pub fn store(&self) -> &MediaStore {
        &self.store
    }

    #[cfg(test)]
    pub fn recording_state(&self) -> RecordingState {
        *self.recording.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Execute one command frame and return the status byte for the peer.
    pub async fn dispatch(&self, frame: CommandFrame) -> Status {
        let cmd = match Command::decode(frame) {
            Ok(cmd) => cmd,
            Err(e) => {
                warn!("Rejected frame {:02X?}: {e}", frame.to_bytes());
                return Status::UnknownCommand;
            }
        };

        debug!("Dispatching {cmd:?}");
        match self.execute(cmd).await {
            Ok(()) => {
                info!("{} ok", cmd.name());
                Status::Ok
            }
            Err(e) => {
                warn!("{} failed: {e:#}", cmd.name());
                cmd.failure_status()
            }
        }
    }

    async fn execute(&self, cmd: Command) -> Result<(), CommandError> {
        match cmd {
            Command::Light { on } => {
                // LIGHT always reports success; a failing actuator is only logged.
                if let Err(e) = self.hw.light.set(on).await {
                    warn!("Illumination error: {e:#}");
                }
                Ok(())
            }
            Command::Photo => self.take_photo().await,
            Command::Video {
                with_audio,
                duration_secs,
            } => self.record_video(self.duration(duration_secs), with_audio).await,
            Command::AudioRecord { duration_secs } => {
                self.record_audio(self.duration(duration_secs)).await
            }
            Command::AudioPlay => self.play_audio().await,
            Command::AudioStop => self.stop_audio().await,
            Command::Hdmi { port, on } => Ok(self.hw.display.set_output(port, on).await?),
        }
    }

    fn duration(&self, requested: Option<u8>) -> u32 {
        requested.map(u32::from).unwrap_or(self.default_record_secs)
    }

    /// `Idle → Recording` in a single lock acquisition, or `None` if a
    /// recording is already running.
    fn begin_recording(&self) -> Option<RecordingGuard<'_>> {
        let mut state = self.recording.lock().unwrap_or_else(|e| e.into_inner());
        if *state == RecordingState::Recording {
            return None;
        }
        *state = RecordingState::Recording;
        Some(RecordingGuard {
            state: &self.recording,
        })
    }

    // ── capture commands ─────────────────────────────────────────────────

    async fn take_photo(&self) -> Result<(), CommandError> {
        let _camera = self.camera.lock().await;
        let staging = self.store.staging_path(MediaKind::Photo);
        let result = self.hw.camera.take_still(&staging).await;
        self.finish_capture(MediaKind::Photo, result).await
    }

    async fn record_video(&self, duration_secs: u32, with_audio: bool) -> Result<(), CommandError> {
        let _recording = self.begin_recording().ok_or(CommandError::DeviceBusy)?;
        let _camera = self.camera.lock().await;
        let _microphone = if with_audio {
            Some(self.microphone.lock().await)
        } else {
            None
        };

        info!("Recording {duration_secs}s of video (audio={with_audio})");
        let staging = self.store.staging_path(MediaKind::Video);
        let result = self
            .hw
            .camera
            .record_video(&staging, duration_secs, with_audio)
            .await;
        self.finish_capture(MediaKind::Video, result).await
    }

    async fn record_audio(&self, duration_secs: u32) -> Result<(), CommandError> {
        let _microphone = self.microphone.lock().await;
        info!("Recording {duration_secs}s of audio");
        let staging = self.store.staging_path(MediaKind::Audio);
        let result = self.hw.audio.record(&staging, duration_secs).await;
        self.finish_capture(MediaKind::Audio, result).await
    }

    /// Commit a finished capture and push it; clean up after a failed one.
    async fn finish_capture(
        &self,
        kind: MediaKind,
        result: anyhow::Result<()>,
    ) -> Result<(), CommandError> {
        if let Err(e) = result {
            self.store.discard(kind).await;
            return Err(e.into());
        }
        let bytes = self.store.commit(kind).await?;
        info!(
            "Saved {} ({} bytes)",
            self.store.latest_path(kind).display(),
            bytes.len()
        );
        self.pusher.spawn(kind, bytes);
        Ok(())
    }

    // ── playback ─────────────────────────────────────────────────────────

    async fn play_audio(&self) -> Result<(), CommandError> {
        let mut playback = self.playback.lock().await;
        if let Some(previous) = playback.take() {
            if let Err(e) = previous.stop().await {
                warn!("Cannot stop previous playback: {e:#}");
            }
        }
        *playback = Some(self.hw.audio.play(&self.playback_file).await?);
        Ok(())
    }

    async fn stop_audio(&self) -> Result<(), CommandError> {
        let mut playback = self.playback.lock().await;
        let Some(mut active) = playback.take() else {
            return Err(CommandError::NothingPlaying);
        };
        if !active.is_active() {
            return Err(CommandError::NothingPlaying);
        }
        active.stop().await?;
        Ok(())
    }

    // ── lifecycle ────────────────────────────────────────────────────────

    /// Release hardware: light off, playback stopped, camera closed.  Waits
    /// for a capture still holding the camera.
    pub async fn shutdown(&self) {
        if let Err(e) = self.hw.light.set(false).await {
            warn!("Cannot switch illumination off: {e:#}");
        }
        if let Some(active) = self.playback.lock().await.take() {
            if let Err(e) = active.stop().await {
                warn!("Cannot stop playback: {e:#}");
            }
        }
        let _camera = self.camera.lock().await;
        if let Err(e) = self.hw.camera.close().await {
            warn!("Cannot close camera: {e:#}");
        }
        info!("Hardware released");
    }
}
