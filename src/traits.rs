//! Core traits that decouple hyprmate from the compositor and from the
//! transports that feed the orchestrator.
//!
//! * [`Compositor`] abstracts the request side of the compositor IPC so
//!   plugins are not coupled to Hyprland's socket format and tests can use
//!   a recording double.
//! * [`Source`] abstracts anything that pushes [`Inbound`] messages into the
//!   orchestrator: the compositor event stream and the client control
//!   socket are both sources.

use crate::command::Response;
use crate::hyprland::types::{ClientInfo, MonitorInfo};
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

/// Severity of a desktop notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyLevel {
    Info,
    Error,
}

/// Errors that can occur when talking to the compositor.
#[derive(Debug, thiserror::Error)]
pub enum CompositorError {
    /// The compositor's sockets cannot be located.
    #[error("compositor environment error: {0}")]
    Environment(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json parse error: {0}")]
    Json(#[from] serde_json::Error),
    /// The compositor answered, but not with the expected acknowledgement.
    #[error("compositor rejected `{command}`: {reply}")]
    Rejected { command: String, reply: String },
}

impl CompositorError {
    /// Whether the failure looks like a dropped or refused connection that is
    /// worth one retry.
    pub fn is_reset(&self) -> bool {
        use std::io::ErrorKind;
        match self {
            CompositorError::Io(e) => matches!(
                e.kind(),
                ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::ConnectionRefused
                    | ErrorKind::BrokenPipe
                    | ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

/// Abstraction over the request side of a compositor.
///
/// Dispatcher and keyword strings are opaque: hyprmate builds them, the
/// compositor interprets them.  Every call is independent; implementations
/// open a short-lived connection per request.
#[async_trait]
pub trait Compositor: Send + Sync {
    /// Run one or more dispatchers, in order, as a single request.
    async fn dispatch(&self, commands: &[String]) -> Result<(), CompositorError>;

    /// Set one or more keywords (window rules and the like).
    async fn keyword(&self, commands: &[String]) -> Result<(), CompositorError>;

    /// Run a JSON query such as `monitors`, `clients` or `activewindow`.
    async fn query(&self, what: &str) -> Result<serde_json::Value, CompositorError>;

    /// Show a desktop notification.
    async fn notify(&self, level: NotifyLevel, text: &str) -> Result<(), CompositorError>;

    /// All monitors known to the compositor.
    async fn monitors(&self) -> Result<Vec<MonitorInfo>, CompositorError> {
        Ok(serde_json::from_value(self.query("monitors").await?)?)
    }

    /// All mapped client windows.
    async fn clients(&self) -> Result<Vec<ClientInfo>, CompositorError> {
        Ok(serde_json::from_value(self.query("clients").await?)?)
    }

    /// The client with the given `0x…` address, if it still exists.
    async fn client_by_address(
        &self,
        address: &str,
    ) -> Result<Option<ClientInfo>, CompositorError> {
        Ok(self
            .clients()
            .await?
            .into_iter()
            .find(|c| c.address == address))
    }

    /// The monitor named `name`, or the focused one when `name` is `None`.
    async fn monitor(&self, name: Option<&str>) -> Result<Option<MonitorInfo>, CompositorError> {
        Ok(self.monitors().await?.into_iter().find(|m| match name {
            Some(name) => m.name == name,
            None => m.focused,
        }))
    }
}

/// One compositor event: an opaque `(name, payload)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositorEvent {
    pub name: String,
    pub payload: String,
}

impl CompositorEvent {
    pub fn new(name: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: payload.into(),
        }
    }
}

/// Messages delivered to the orchestrator.
#[derive(Debug)]
pub enum Inbound {
    /// An event read from the compositor event stream.
    Event(CompositorEvent),
    /// A client request line and the channel its single response goes to.
    Request {
        line: String,
        reply: oneshot::Sender<Response>,
    },
    /// Stop the daemon.
    Shutdown,
}

/// A source of [`Inbound`] messages.
///
/// Implementations listen on some transport and forward what they receive
/// into the provided sender.  [`run`](Source::run) returns once the
/// orchestrator has gone away or an unrecoverable error occurs.
#[async_trait]
pub trait Source: Send {
    /// The error type produced by this source.
    type Error: std::error::Error + Send + 'static;

    /// Start listening and forward every incoming message into `sink`.
    async fn run(&mut self, sink: mpsc::UnboundedSender<Inbound>) -> Result<(), Self::Error>;
}
