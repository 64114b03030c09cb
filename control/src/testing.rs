//! In-memory collaborators for controller and listener tests.

use std::net::IpAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;

use kestrel_common::config::Config;
use kestrel_common::protocol::{PushHeader, PUSH_HEADER_LEN};

use crate::hardware::{Audio, Camera, Display, Hardware, Illumination, Playback};

const STILL_TIME: Duration = Duration::from_millis(30);
const VIDEO_TIME: Duration = Duration::from_millis(300);

/// Records every collaborator call; `fail` makes all fallible calls error.
#[derive(Default)]
pub struct Probe {
    pub fail: AtomicBool,
    pub light: Mutex<Vec<bool>>,
    pub stills: AtomicUsize,
    pub videos: Mutex<Vec<(u32, bool)>>,
    pub recordings: Mutex<Vec<u32>>,
    pub outputs: Mutex<Vec<(u16, bool)>>,
    pub plays: AtomicUsize,
    pub stops: AtomicUsize,
    pub playing: AtomicBool,
    pub camera_active: AtomicUsize,
    pub camera_peak: AtomicUsize,
    pub camera_closed: AtomicBool,
    pub closed_mid_capture: AtomicBool,
}

impl Probe {
    fn check(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("simulated hardware fault");
        }
        Ok(())
    }

    fn camera_enter(&self) {
        let active = self.camera_active.fetch_add(1, Ordering::SeqCst) + 1;
        self.camera_peak.fetch_max(active, Ordering::SeqCst);
    }

    fn camera_exit(&self) {
        self.camera_active.fetch_sub(1, Ordering::SeqCst);
    }
}

pub fn fake_hardware() -> (Hardware, Arc<Probe>) {
    let probe = Arc::new(Probe::default());
    let hw = Hardware {
        light: Box::new(FakeLight(probe.clone())),
        camera: Box::new(FakeCamera(probe.clone())),
        audio: Box::new(FakeAudio(probe.clone())),
        display: Box::new(FakeDisplay(probe.clone())),
    };
    (hw, probe)
}

/// Config pointing storage at `root` and pushes at `127.0.0.1:push_port`.
pub fn test_config(root: &Path, push_port: u16) -> Config {
    let text = format!(
        "STORAGE_DIR={}\nPEER_ADDR=127.0.0.1\nPUSH_PORT={push_port}\nDEFAULT_RECORD_SECS=1\n",
        root.display()
    );
    Config::from_conf_str(&text).unwrap()
}

pub fn localhost() -> IpAddr {
    IpAddr::from([127, 0, 0, 1])
}

/// Accept one push connection and return its header and payload.
pub async fn receive_push(listener: &TcpListener) -> (PushHeader, Vec<u8>) {
    let (mut conn, _) = tokio::time::timeout(Duration::from_secs(5), listener.accept())
        .await
        .expect("no push connection")
        .unwrap();
    let mut header = [0u8; PUSH_HEADER_LEN];
    conn.read_exact(&mut header).await.unwrap();
    let mut payload = Vec::new();
    conn.read_to_end(&mut payload).await.unwrap();
    (PushHeader::decode(header), payload)
}

struct FakeLight(Arc<Probe>);

#[async_trait]
impl Illumination for FakeLight {
    async fn set(&self, on: bool) -> Result<()> {
        self.0.check()?;
        self.0.light.lock().unwrap().push(on);
        Ok(())
    }
}

struct FakeCamera(Arc<Probe>);

#[async_trait]
impl Camera for FakeCamera {
    async fn take_still(&self, path: &Path) -> Result<()> {
        self.0.camera_enter();
        let result: Result<()> = async {
            tokio::time::sleep(STILL_TIME).await;
            self.0.check()?;
            let n = self.0.stills.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::fs::write(path, format!("still-{n}")).await?;
            Ok(())
        }
        .await;
        self.0.camera_exit();
        result
    }

    async fn record_video(&self, path: &Path, duration_secs: u32, with_audio: bool) -> Result<()> {
        self.0.camera_enter();
        let result: Result<()> = async {
            tokio::time::sleep(VIDEO_TIME).await;
            self.0.check()?;
            self.0.videos.lock().unwrap().push((duration_secs, with_audio));
            tokio::fs::write(path, vec![0x42; 4096]).await?;
            Ok(())
        }
        .await;
        self.0.camera_exit();
        result
    }

    async fn close(&self) -> Result<()> {
        if self.0.camera_active.load(Ordering::SeqCst) > 0 {
            self.0.closed_mid_capture.store(true, Ordering::SeqCst);
        }
        self.0.camera_closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeAudio(Arc<Probe>);

#[async_trait]
impl Audio for FakeAudio {
    async fn record(&self, path: &Path, duration_secs: u32) -> Result<()> {
        self.0.check()?;
        self.0.recordings.lock().unwrap().push(duration_secs);
        tokio::fs::write(path, b"RIFF....WAVE").await?;
        Ok(())
    }

    async fn play(&self, _path: &Path) -> Result<Box<dyn Playback>> {
        self.0.check()?;
        self.0.plays.fetch_add(1, Ordering::SeqCst);
        self.0.playing.store(true, Ordering::SeqCst);
        Ok(Box::new(FakePlayback(self.0.clone())))
    }
}

struct FakePlayback(Arc<Probe>);

#[async_trait]
impl Playback for FakePlayback {
    fn is_active(&mut self) -> bool {
        self.0.playing.load(Ordering::SeqCst)
    }

    async fn stop(self: Box<Self>) -> Result<()> {
        self.0.stops.fetch_add(1, Ordering::SeqCst);
        self.0.playing.store(false, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeDisplay(Arc<Probe>);

#[async_trait]
impl Display for FakeDisplay {
    async fn set_output(&self, port: u16, on: bool) -> Result<()> {
        self.0.check()?;
        self.0.outputs.lock().unwrap().push((port, on));
        Ok(())
    }
}
