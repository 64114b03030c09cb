//! Kestrel Control Server – remote hardware control for a single-board
//! camera/light/audio rig.
//!
//! This binary:
//! 1. Reads configuration from `kestrel.conf`
//! 2. Builds the hardware controller (GPIO light, camera, ALSA, xrandr)
//! 3. Serves 3-byte commands on the control port for the allow-listed peer
//!    and pushes captured media back to that peer.

mod controller;
mod devices;
mod hardware;
mod process;
mod push;
mod server;
mod storage;
#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use controller::HardwareController;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── load config ──────────────────────────────────────────────────
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| kestrel_common::config::Config::default_path().to_string());
    let config = kestrel_common::config::load(&PathBuf::from(&config_path))
        .context("Config load failed")?;

    info!(
        "Kestrel Control Server starting (listen={}, peer={})",
        config.control_listen_addr, config.peer_addr
    );

    if !config.video_device.exists() {
        warn!(
            "Video device {} not found – is the camera connected and enabled?",
            config.video_device.display()
        );
    }

    // ── hardware ─────────────────────────────────────────────────────
    let controller = HardwareController::new(devices::from_config(&config), &config);
    controller
        .store()
        .ensure_dirs()
        .context("Cannot create storage directories")?;
    info!(
        "Storing media under {}, pushing to {}",
        controller.store().root().display(),
        config.push_addr()
    );
    let controller = Arc::new(controller);

    // ── ctrl-c ───────────────────────────────────────────────────────
    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    ctrlc::set_handler(move || {
        info!("Shutdown signal received");
        signal.cancel();
    })
    .context("Cannot set Ctrl-C handler")?;

    // ── control server ───────────────────────────────────────────────
    let listener = server::bind(config.control_listen_addr)?;
    server::serve(listener, config.peer_addr, controller.clone(), shutdown).await?;

    controller.shutdown().await;
    info!("Kestrel Control Server stopped");

    Ok(())
}
