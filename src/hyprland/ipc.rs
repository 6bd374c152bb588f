//! [`Compositor`] implementation backed by Hyprland IPC.
//!
//! Communicates directly with Hyprland through its Unix socket at
//! `$XDG_RUNTIME_DIR/hypr/$HYPRLAND_INSTANCE_SIGNATURE/.socket.sock`.
//! Each request opens a short-lived connection, writes one command and
//! reads the reply until Hyprland closes the stream.  A request that fails
//! with a reset-style error is retried once before the error surfaces.

use crate::traits::{Compositor, CompositorError, NotifyLevel};
use async_trait::async_trait;
use log::{debug, error, warn};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

/// Hyprland-backed compositor handle.
#[derive(Debug, Clone)]
pub struct HyprlandIpc {
    socket: PathBuf,
}

//  Socket discovery

/// Directory holding the sockets of the running Hyprland instance.
pub fn instance_dir() -> Result<PathBuf, CompositorError> {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
        .map_err(|_| CompositorError::Environment("XDG_RUNTIME_DIR not set".into()))?;
    let his = std::env::var("HYPRLAND_INSTANCE_SIGNATURE").map_err(|_| {
        CompositorError::Environment("HYPRLAND_INSTANCE_SIGNATURE not set".into())
    })?;
    Ok(PathBuf::from(format!("{}/hypr/{}", runtime_dir, his)))
}

/// Resolve the Hyprland request socket path.
pub fn socket_path() -> Result<PathBuf, CompositorError> {
    Ok(instance_dir()?.join(".socket.sock"))
}

/// Resolve the Hyprland event socket path.
pub fn socket2_path() -> Result<PathBuf, CompositorError> {
    Ok(instance_dir()?.join(".socket2.sock"))
}

impl HyprlandIpc {
    /// Handle for the Hyprland instance named by the environment.
    ///
    /// No connection is opened eagerly.
    pub fn from_env() -> Result<Self, CompositorError> {
        Ok(Self::new(socket_path()?))
    }

    /// Handle for an explicit request socket.
    pub fn new(socket: impl AsRef<Path>) -> Self {
        Self {
            socket: socket.as_ref().to_path_buf(),
        }
    }

    /// Send a raw command and return the reply, retrying once on reset.
    pub async fn request(&self, command: &str) -> Result<String, CompositorError> {
        match self.request_once(command).await {
            Err(e) if e.is_reset() => {
                warn!("ipc connection problem ({}), retrying", e);
                self.request_once(command).await
            }
            other => other,
        }
    }

    async fn request_once(&self, command: &str) -> Result<String, CompositorError> {
        let mut stream = UnixStream::connect(&self.socket).await?;
        stream.write_all(command.as_bytes()).await?;

        let mut response = Vec::new();
        stream.read_to_end(&mut response).await?;
        if response.is_empty() {
            return Err(CompositorError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "empty reply",
            )));
        }
        Ok(String::from_utf8_lossy(&response).into_owned())
    }

    /// Send `commands` under `base` (`dispatch`, `keyword`) and expect one
    /// `ok` per command.
    async fn batch(&self, base: &str, commands: &[String]) -> Result<(), CompositorError> {
        let request = match commands {
            [] => return Ok(()),
            [single] => format!("/{} {}", base, single),
            many => format!(
                "[[BATCH]]{}",
                many.iter()
                    .map(|c| format!("{} {}", base, c))
                    .collect::<Vec<_>>()
                    .join(" ; ")
            ),
        };
        debug!("{}", request);
        let reply = self.request(&request).await?;
        if is_acknowledged(&reply, commands.len()) {
            Ok(())
        } else {
            error!("FAILED {}: {}", request, reply.trim());
            Err(CompositorError::Rejected {
                command: request,
                reply: reply.trim().to_string(),
            })
        }
    }
}

/// Whether `reply` is exactly `count` acknowledgements, whitespace aside.
fn is_acknowledged(reply: &str, count: usize) -> bool {
    let compact: String = reply.split_whitespace().collect();
    compact == "ok".repeat(count)
}

/// Format a notification request: icon, duration, colour, text.
fn notify_request(level: NotifyLevel, text: &str) -> String {
    let (icon, duration_ms, color) = match level {
        NotifyLevel::Info => (1, 5000, "1010ff"),
        NotifyLevel::Error => (0, 8000, "ff1010"),
    };
    format!("/notify {} {} rgb({})  {}", icon, duration_ms, color, text)
}

//  Compositor implementation

#[async_trait]
impl Compositor for HyprlandIpc {
    async fn dispatch(&self, commands: &[String]) -> Result<(), CompositorError> {
        self.batch("dispatch", commands).await
    }

    async fn keyword(&self, commands: &[String]) -> Result<(), CompositorError> {
        self.batch("keyword", commands).await
    }

    async fn query(&self, what: &str) -> Result<serde_json::Value, CompositorError> {
        debug!("j/{}", what);
        let json = self.request(&format!("j/{}", what)).await?;
        Ok(serde_json::from_str(&json)?)
    }

    async fn notify(&self, level: NotifyLevel, text: &str) -> Result<(), CompositorError> {
        let request = notify_request(level, text);
        let reply = self.request(&request).await?;
        if is_acknowledged(&reply, 1) {
            Ok(())
        } else {
            Err(CompositorError::Rejected {
                command: request,
                reply: reply.trim().to_string(),
            })
        }
    }
}

//  Tests
