//! Configuration parsing – reads a KEY=VALUE file (`kestrel.conf`).

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

/// Pixel dimensions for a capture mode, written `WIDTHxHEIGHT` in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    fn parse(s: &str) -> Option<Self> {
        let (w, h) = s.split_once(|c| c == 'x' || c == 'X')?;
        Some(Self::new(w.trim().parse().ok()?, h.trim().parse().ok()?))
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Control server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    // ── network ──────────────────────────────────────────────────────
    /// Address the control listener binds.
    pub control_listen_addr: SocketAddr,
    /// The only peer allowed on the control port; also the push target.
    pub peer_addr: IpAddr,
    pub push_port: u16,
    pub push_connect_timeout: Duration,

    // ── storage ──────────────────────────────────────────────────────
    pub storage_dir: PathBuf,

    // ── recording ────────────────────────────────────────────────────
    pub default_record_secs: u32,
    pub audio_device: String,
    pub playback_file: PathBuf,
    pub photo_resolution: Resolution,
    pub video_resolution: Resolution,
    pub photo_shutter_us: u32,
    pub video_device: PathBuf,

    // ── actuators ────────────────────────────────────────────────────
    pub gpio_chip: String,
    pub led_gpio: u32,
    pub hdmi_output_prefix: String,
}

impl Config {
    /// Default config path.
    pub fn default_path() -> &'static str {
        "/etc/kestrel/kestrel.conf"
    }

    /// Where captured files are pushed.
    pub fn push_addr(&self) -> SocketAddr {
        SocketAddr::new(self.peer_addr, self.push_port)
    }

    /// Parse config text.  Lines starting with `#` are comments, values may
    /// be double-quoted, unknown keys are ignored.
    pub fn from_conf_str(text: &str) -> Result<Self> {
        let map = parse_conf(text);

        let get = |key: &str| -> Option<String> { map.get(key).cloned() };
        let get_u32 = |key: &str, default: u32| -> u32 {
            get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
        };

        let control_listen_addr = get("CONTROL_LISTEN_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8080".into())
            .parse()
            .context("Invalid CONTROL_LISTEN_ADDR")?;
        let peer_addr = get("PEER_ADDR")
            .unwrap_or_else(|| "192.168.106.186".into())
            .parse()
            .context("Invalid PEER_ADDR")?;

        let resolution = |key: &str, default: Resolution| -> Result<Resolution> {
            match get(key) {
                Some(v) => Resolution::parse(&v)
                    .with_context(|| format!("Invalid {key} '{v}' (expected WIDTHxHEIGHT)")),
                None => Ok(default),
            }
        };

        Ok(Config {
            control_listen_addr,
            peer_addr,
            push_port: get("PUSH_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(8800),
            push_connect_timeout: Duration::from_secs(
                get("PUSH_CONNECT_TIMEOUT_SECS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(5),
            ),

            storage_dir: PathBuf::from(
                get("STORAGE_DIR").unwrap_or_else(|| "/home/Documents".into()),
            ),

            default_record_secs: get_u32("DEFAULT_RECORD_SECS", 30).max(1),
            audio_device: get("AUDIO_DEVICE")
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "plughw:CARD=Headphones,DEV=0".into()),
            playback_file: PathBuf::from(
                get("PLAYBACK_FILE").unwrap_or_else(|| "test.wav".into()),
            ),
            photo_resolution: resolution("PHOTO_RESOLUTION", Resolution::new(4608, 2592))?,
            video_resolution: resolution("VIDEO_RESOLUTION", Resolution::new(1920, 1080))?,
            photo_shutter_us: get_u32("PHOTO_SHUTTER_US", 20_000),
            video_device: PathBuf::from(
                get("VIDEO_DEVICE").unwrap_or_else(|| "/dev/video0".into()),
            ),

            gpio_chip: get("GPIO_CHIP").unwrap_or_else(|| "gpiochip0".into()),
            led_gpio: get_u32("LED_GPIO", 26),
            hdmi_output_prefix: get("HDMI_OUTPUT_PREFIX").unwrap_or_else(|| "HDMI-".into()),
        })
    }
}

/// Load a `KEY=VALUE` configuration file.
pub fn load(path: &Path) -> Result<Config> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read config: {}", path.display()))?;
    let config = Config::from_conf_str(&text)
        .with_context(|| format!("Bad config: {}", path.display()))?;
    info!("Loaded config from {}", path.display());
    Ok(config)
}

/// Parse `KEY=VALUE` lines into a map, stripping optional double-quotes.
fn parse_conf(text: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, val)) = line.split_once('=') {
            let key = key.trim();
            let val = val.trim().trim_matches('"');
            map.insert(key.to_string(), val.to_string());
        }
    }
    map
}

// ─── tests ───────────────────────────────────────────────────────────────
