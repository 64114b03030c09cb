//! Raspberry Pi collaborators backed by command-line tools.
//!
//! - illumination: `gpioset`
//! - camera: `rpicam-still` / `rpicam-vid`, or `ffmpeg` (v4l2 + ALSA) when
//!   audio is muxed into the video
//! - audio: `arecord` / `aplay`
//! - display: `xrandr`

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};

use kestrel_common::config::{Config, Resolution};

use crate::hardware::{Audio, Camera, Display, Hardware, Illumination, Playback};
use crate::process::{self, Supervised};

/// Build the process-backed collaborator set from the config.
pub fn from_config(config: &Config) -> Hardware {
    Hardware {
        light: Box::new(GpioLight {
            chip: config.gpio_chip.clone(),
            line: config.led_gpio,
        }),
        camera: Box::new(RpiCamera {
            photo_resolution: config.photo_resolution,
            video_resolution: config.video_resolution,
            shutter_us: config.photo_shutter_us,
            video_device: config.video_device.clone(),
            audio_device: config.audio_device.clone(),
        }),
        audio: Box::new(AlsaAudio {
            device: config.audio_device.clone(),
        }),
        display: Box::new(XrandrDisplay {
            output_prefix: config.hdmi_output_prefix.clone(),
        }),
    }
}

// ── illumination ─────────────────────────────────────────────────────────

pub struct GpioLight {
    chip: String,
    line: u32,
}

#[async_trait]
impl Illumination for GpioLight {
    async fn set(&self, on: bool) -> Result<()> {
        let value = format!("{}={}", self.line, u8::from(on));
        process::run("gpioset", [self.chip.as_str(), value.as_str()]).await
    }
}

// ── camera ───────────────────────────────────────────────────────────────

pub struct RpiCamera {
    photo_resolution: Resolution,
    video_resolution: Resolution,
    shutter_us: u32,
    video_device: PathBuf,
    audio_device: String,
}

impl RpiCamera {
    async fn record_native(&self, path: &Path, duration_secs: u32) -> Result<()> {
        let Resolution { width, height } = self.video_resolution;
        let args = [
            "-n".to_string(),
            "-t".to_string(),
            (u64::from(duration_secs) * 1000).to_string(),
            "--width".to_string(),
            width.to_string(),
            "--height".to_string(),
            height.to_string(),
            "--codec".to_string(),
            "libav".to_string(),
            "--libav-format".to_string(),
            "mp4".to_string(),
            "-o".to_string(),
            path.display().to_string(),
        ];
        info!("rpicam-vid: {duration_secs}s at {} → {}", self.video_resolution, path.display());
        process::run("rpicam-vid", &args).await
    }

    async fn record_with_audio(&self, path: &Path, duration_secs: u32) -> Result<()> {
        let size = self.video_resolution.to_string();
        let duration = duration_secs.to_string();
        let mut args: Vec<&OsStr> = [
            "-hide_banner",
            "-loglevel",
            "error",
            "-nostdin",
            "-y",
            "-f",
            "v4l2",
            "-video_size",
            size.as_str(),
            "-i",
        ]
        .into_iter()
        .map(OsStr::new)
        .collect();
        args.push(self.video_device.as_os_str());
        args.extend(
            [
                "-f",
                "alsa",
                "-i",
                self.audio_device.as_str(),
                "-t",
                duration.as_str(),
                "-c:v",
                "h264",
                "-c:a",
                "aac",
                "-f",
                "mp4",
            ]
            .into_iter()
            .map(OsStr::new),
        );
        args.push(path.as_os_str());

        info!(
            "ffmpeg: {duration_secs}s from {} + {} → {}",
            self.video_device.display(),
            self.audio_device,
            path.display()
        );
        process::run("ffmpeg", args).await
    }
}

#[async_trait]
impl Camera for RpiCamera {
    async fn take_still(&self, path: &Path) -> Result<()> {
        let Resolution { width, height } = self.photo_resolution;
        let args = [
            "-n".to_string(),
            "--immediate".to_string(),
            "--width".to_string(),
            width.to_string(),
            "--height".to_string(),
            height.to_string(),
            "--shutter".to_string(),
            self.shutter_us.to_string(),
            "--awb".to_string(),
            "auto".to_string(),
            "--encoding".to_string(),
            "jpg".to_string(),
            "-o".to_string(),
            path.display().to_string(),
        ];
        process::run("rpicam-still", &args).await?;

        let probe = path.to_path_buf();
        let (w, h) = tokio::task::spawn_blocking(move || image::image_dimensions(&probe))
            .await?
            .with_context(|| format!("Still is not a readable image: {}", path.display()))?;
        debug!("Still captured: {w}x{h}");
        Ok(())
    }

    async fn record_video(&self, path: &Path, duration_secs: u32, with_audio: bool) -> Result<()> {
        if with_audio {
            self.record_with_audio(path, duration_secs).await
        } else {
            self.record_native(path, duration_secs).await
        }
    }

    async fn close(&self) -> Result<()> {
        // rpicam tools open the sensor per invocation; nothing stays open.
        debug!("Camera released");
        Ok(())
    }
}

// ── audio ────────────────────────────────────────────────────────────────

pub struct AlsaAudio {
    device: String,
}

/// Duration in seconds of a finished WAV recording.
pub fn wav_duration_secs(path: &Path) -> Result<f64> {
    let reader = hound::WavReader::open(path)
        .with_context(|| format!("Not a valid WAV file: {}", path.display()))?;
    let spec = reader.spec();
    Ok(f64::from(reader.duration()) / f64::from(spec.sample_rate.max(1)))
}

#[async_trait]
impl Audio for AlsaAudio {
    async fn record(&self, path: &Path, duration_secs: u32) -> Result<()> {
        let duration = duration_secs.to_string();
        let args = [
            OsStr::new("-D"),
            OsStr::new(&self.device),
            OsStr::new("-d"),
            OsStr::new(&duration),
            OsStr::new("-f"),
            OsStr::new("cd"),
            OsStr::new("-t"),
            OsStr::new("wav"),
            path.as_os_str(),
        ];
        info!("arecord: {duration_secs}s from {} → {}", self.device, path.display());
        process::run("arecord", args).await?;

        let probe = path.to_path_buf();
        let secs = tokio::task::spawn_blocking(move || wav_duration_secs(&probe)).await??;
        debug!("Recorded {secs:.1}s of audio");
        Ok(())
    }

    async fn play(&self, path: &Path) -> Result<Box<dyn Playback>> {
        if !path.exists() {
            anyhow::bail!("Playback file not found: {}", path.display());
        }
        let args = [OsStr::new("-D"), OsStr::new(&self.device), path.as_os_str()];
        let proc = Supervised::start("aplay", args)?;
        info!("Playing {}", path.display());
        Ok(Box::new(ProcessPlayback(proc)))
    }
}

/// Playback backed by an `aplay` child.
struct ProcessPlayback(Supervised);

#[async_trait]
impl Playback for ProcessPlayback {
    fn is_active(&mut self) -> bool {
        self.0.is_running()
    }

    async fn stop(self: Box<Self>) -> Result<()> {
        self.0.stop().await
    }
}

// ── display ──────────────────────────────────────────────────────────────

pub struct XrandrDisplay {
    output_prefix: String,
}

impl XrandrDisplay {
    fn output_name(&self, port: u16) -> String {
        format!("{}{port}", self.output_prefix)
    }
}

#[async_trait]
impl Display for XrandrDisplay {
    async fn set_output(&self, port: u16, on: bool) -> Result<()> {
        let output = self.output_name(port);
        let mode = if on { "--auto" } else { "--off" };
        process::run("xrandr", ["--output", output.as_str(), mode]).await?;
        info!("{output} {}", if on { "on" } else { "off" });
        Ok(())
    }
}
