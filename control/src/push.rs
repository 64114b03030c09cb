//! Media push client – delivers a captured file to the peer over a fresh
//! outbound connection: `[file_type:1][length:4 BE][payload]`.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{info, warn};

use kestrel_common::protocol::{MediaKind, PushHeader};

#[derive(Debug, Clone)]
pub struct MediaPush {
    target: SocketAddr,
    connect_timeout: Duration,
}

impl MediaPush {
    pub fn new(target: SocketAddr, connect_timeout: Duration) -> Self {
        Self {
            target,
            connect_timeout,
        }
    }

    /// Send `payload` to the peer.
    pub async fn push(&self, kind: MediaKind, payload: &[u8]) -> Result<()> {
        let length = u32::try_from(payload.len())
            .with_context(|| format!("{kind} file too large to push ({} bytes)", payload.len()))?;
        let header = PushHeader {
            file_type: kind.into(),
            length,
        };

        let mut stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(self.target))
            .await
            .with_context(|| format!("Timed out connecting to {}", self.target))?
            .with_context(|| format!("Cannot connect to {}", self.target))?;

        stream.write_all(&header.encode()).await?;
        stream.write_all(payload).await?;
        stream.shutdown().await?;
        Ok(())
    }

    /// Push in the background.  Failures are logged, never surfaced.
    pub fn spawn(&self, kind: MediaKind, payload: Vec<u8>) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            match this.push(kind, &payload).await {
                Ok(()) => info!("Pushed {kind} ({} bytes) to {}", payload.len(), this.target),
                Err(e) => warn!("Push of {kind} to {} failed: {e:#}", this.target),
            }
        })
    }
}
