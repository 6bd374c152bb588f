//! Thin client for the control socket.
//!
//! Sends one request, prints the response and maps the outcome to an
//! [`ExitCode`]: usage errors (no command), environment errors (socket path
//! cannot be resolved), connection errors (daemon not running) and command
//! errors (`ERROR: …` responses) each get their own code.

use super::paths::{control_socket_path, PathError};
use crate::command::{ExitCode, ProtocolError, Request, Response};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

/// Everything that can go wrong on the client side.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("{0}")]
    Usage(#[from] ProtocolError),
    #[error("{0}")]
    Environment(#[from] PathError),
    #[error("cannot reach the daemon at {path}: {source}")]
    Connection {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{0}")]
    Command(String),
}

impl ClientError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            ClientError::Usage(_) => ExitCode::UsageError,
            ClientError::Environment(_) => ExitCode::EnvironmentError,
            ClientError::Connection { .. } => ExitCode::ConnectionError,
            ClientError::Command(_) => ExitCode::CommandError,
        }
    }
}

/// Send `request` to the daemon listening on `path` and read its response.
pub async fn send_request(path: &Path, request: &Request) -> Result<Response, ClientError> {
    let connection_error = |source| ClientError::Connection {
        path: path.to_path_buf(),
        source,
    };
    let mut stream = UnixStream::connect(path).await.map_err(connection_error)?;
    stream
        .write_all(request.to_line().as_bytes())
        .await
        .map_err(connection_error)?;
    stream.shutdown().await.map_err(connection_error)?;

    let mut text = String::new();
    stream
        .read_to_string(&mut text)
        .await
        .map_err(connection_error)?;
    if text.is_empty() {
        return Err(connection_error(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "the daemon closed the connection without replying",
        )));
    }
    Ok(Response::decode(&text))
}

/// Run one client invocation against `path` and return what to print.
pub async fn call(path: &Path, args: &[String]) -> Result<Option<String>, ClientError> {
    let request = Request::from_args(args)?;
    match send_request(path, &request).await? {
        Response::Ok(output) => Ok(output),
        Response::Raw(text) => Ok(Some(text)),
        Response::Error(message) => Err(ClientError::Command(message)),
    }
}

/// Full client flow: resolve the socket, send `args`, print the outcome.
pub async fn run(args: &[String]) -> ExitCode {
    let outcome = match control_socket_path() {
        Ok(path) => call(&path, args).await,
        Err(e) => Err(e.into()),
    };
    match outcome {
        Ok(output) => {
            if let Some(output) = output {
                println!("{}", output);
            }
            ExitCode::Success
        }
        Err(e) => {
            eprintln!("{}", e);
            e.exit_code()
        }
    }
}
