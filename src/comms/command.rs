use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

/// How long to wait for an instrument reply before giving up on the
/// attempt.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(1);

/// Transport seam for instrument command traffic. The serial/ethernet
/// implementation lives outside this crate.
#[async_trait]
pub trait CommandPort: Send {
    /// Write one command to the instrument.
    async fn send(&mut self, command: &str) -> Result<()>;

    /// Wait for the next reply. May block the calling worker; callers wrap
    /// it in a timeout.
    async fn read_reply(&mut self) -> Result<String>;
}

/// Send a command and wait for its reply, retrying exactly once on a
/// timeout or transport failure. A second failure is returned to the
/// caller to surface as a connection warning; there is no cancellation
/// propagation beyond the per-attempt timeout.
pub async fn send_command(
    port: &mut dyn CommandPort,
    command: &str,
    reply_timeout: Duration,
) -> Result<String> {
    match attempt(port, command, reply_timeout).await {
        Ok(reply) => Ok(reply),
        Err(first) => {
            warn!(command, "command failed, retrying once: {first:#}");
            attempt(port, command, reply_timeout)
                .await
                .with_context(|| format!("command {command:?} failed after retry"))
        }
    }
}

async fn attempt(
    port: &mut dyn CommandPort,
    command: &str,
    reply_timeout: Duration,
) -> Result<String> {
    port.send(command).await?;
    match timeout(reply_timeout, port.read_reply()).await {
        Ok(reply) => reply,
        Err(_) => Err(anyhow!("timed out waiting for reply to {command:?}")),
    }
}
