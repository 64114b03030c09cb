//! Supervised child processes for the external recorders and players.
//!
//! Every hardware tool (rpicam, ffmpeg, arecord, aplay, xrandr, gpioset) is
//! driven through [`Supervised`] so that command-line construction stays in
//! the device implementations and the controller only sees success/failure.

use std::process::{ExitStatus, Stdio};

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Owns one running child process.
pub struct Supervised {
    program: String,
    child: Child,
}

impl Supervised {
    /// Spawn `program` with `args`.  stderr is drained in the background and
    /// logged so the pipe never fills up and blocks the child.
    pub fn start<I, S>(program: &str, args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn {program}"))?;
        debug!("{program} started (pid={:?})", child.id());

        if let Some(stderr) = child.stderr.take() {
            let tag = program.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if !line.is_empty() {
                        warn!("[{tag}] {line}");
                    }
                }
                debug!("{tag} stderr stream ended");
            });
        }

        Ok(Self {
            program: program.to_string(),
            child,
        })
    }

    /// `true` while the child has not exited.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Wait for the child to exit and return its status.
    pub async fn exit_status(&mut self) -> Result<ExitStatus> {
        self.child
            .wait()
            .await
            .with_context(|| format!("Cannot wait for {}", self.program))
    }

    /// Wait for the child and fail unless it exited successfully.
    pub async fn wait(mut self) -> Result<()> {
        let status = self.exit_status().await?;
        if !status.success() {
            anyhow::bail!("{} exited with {status}", self.program);
        }
        Ok(())
    }

    /// Kill the child (if still running) and reap it.
    pub async fn stop(mut self) -> Result<()> {
        if self.is_running() {
            self.child
                .kill()
                .await
                .with_context(|| format!("Cannot stop {}", self.program))?;
            debug!("{} stopped", self.program);
        }
        Ok(())
    }
}

/// Run `program` to completion, failing on a non-zero exit.
pub async fn run<I, S>(program: &str, args: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    Supervised::start(program, args)?.wait().await
}
