//! Command listener – accepts one 3-byte command per connection from the
//! allow-listed peer and answers with one status byte.
//!
//! Connections from any other address are closed without a byte written.
//! A peer that closes before sending a whole frame gets no response.

use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use kestrel_common::protocol::{CommandFrame, ProtocolError, FRAME_LEN};

use crate::controller::HardwareController;

/// Pending-connection backlog for the control socket.
pub const BACKLOG: u32 = 5;

/// Bind the control socket with `SO_REUSEADDR` and a backlog of [`BACKLOG`].
pub fn bind(addr: SocketAddr) -> Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .context("Cannot create control socket")?;
    socket.set_reuseaddr(true)?;
    socket
        .bind(addr)
        .with_context(|| format!("Cannot bind control port {addr}"))?;
    let listener = socket.listen(BACKLOG)?;
    info!("Control server listening on {addr}");
    Ok(listener)
}

/// Accept connections until `shutdown` is cancelled, then wait for the
/// in-flight handlers to finish.
pub async fn serve(
    listener: TcpListener,
    allowed_peer: IpAddr,
    controller: Arc<HardwareController>,
    shutdown: CancellationToken,
) -> Result<()> {
    let allowed_peer = allowed_peer.to_canonical();
    let handlers = TaskTracker::new();
    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    warn!("Accept failed: {e}");
                    continue;
                }
            },
        };

        if peer.ip().to_canonical() != allowed_peer {
            debug!("Rejected connection from {peer}");
            drop(stream);
            continue;
        }

        debug!("Connection from {peer}");
        let controller = controller.clone();
        handlers.spawn(async move {
            if let Err(e) = handle(stream, &controller).await {
                warn!("Connection {peer}: {e:#}");
            }
        });
    }

    info!(
        "Control server stopped accepting; waiting for {} handler(s)",
        handlers.len()
    );
    handlers.close();
    handlers.wait().await;
    Ok(())
}

async fn handle(mut stream: TcpStream, controller: &HardwareController) -> Result<()> {
    let frame = match read_frame(&mut stream).await {
        Ok(frame) => frame,
        Err(ProtocolError::ShortFrame(n)) => {
            info!("Request cancelled after {n} byte(s)");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let status = controller.dispatch(frame).await;
    stream.write_all(&[status.as_byte()]).await?;
    stream.shutdown().await?;
    Ok(())
}

/// Read exactly one frame, or report how many bytes arrived before EOF.
async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<CommandFrame, ProtocolError> {
    let mut buf = [0u8; FRAME_LEN];
    let mut filled = 0;
    while filled < FRAME_LEN {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) => return Err(ProtocolError::ShortFrame(filled)),
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => {
                debug!("Read error: {e}");
                return Err(ProtocolError::ShortFrame(filled));
            }
        }
    }
    Ok(CommandFrame::from_bytes(buf))
}
