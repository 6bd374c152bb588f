//! Unix-socket [`Source`] for client requests.
//!
//! Binds the control socket and accepts connections concurrently.  Each
//! connection carries exactly one request:
//!
//! ```text
//! client → daemon   toggle term\n        (then shuts down its write side)
//! daemon → client   OK\n                 (then closes)
//! ```
//!
//! The request line is forwarded to the orchestrator as an
//! [`Inbound::Request`] together with a oneshot channel; whatever
//! [`Response`] comes back is written to the client.  A slow command only
//! holds its own connection open.

use crate::command::Response;
use crate::traits::{Inbound, Source};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};

/// A [`Source`] that listens on a Unix stream socket for client requests.
pub struct ControlListener {
    path: PathBuf,
}

/// Errors produced by the control listener.
#[derive(Debug, thiserror::Error)]
pub enum ControlSocketError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("another daemon is already listening on {0}")]
    AlreadyRunning(PathBuf),
}

impl ControlListener {
    /// Create a new listener bound to `path`.
    ///
    /// The socket file is created when [`run`](Source::run) is called and
    /// removed when the source shuts down.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

/// Bind `path`, replacing a stale socket file but never a live daemon.
async fn bind_listener(path: &Path) -> Result<UnixListener, ControlSocketError> {
    match UnixListener::bind(path) {
        Ok(listener) => Ok(listener),
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            if UnixStream::connect(path).await.is_ok() {
                return Err(ControlSocketError::AlreadyRunning(path.to_path_buf()));
            }
            std::fs::remove_file(path)?;
            Ok(UnixListener::bind(path)?)
        }
        Err(e) => Err(e.into()),
    }
}

/// Serve one connection: read a line, wait for the response, write it.
async fn serve_client(
    stream: UnixStream,
    sink: mpsc::UnboundedSender<Inbound>,
) -> Result<(), std::io::Error> {
    let (read, mut write) = stream.into_split();
    let mut bytes = Vec::new();
    BufReader::new(read).read_until(b'\n', &mut bytes).await?;

    let response = match String::from_utf8(bytes) {
        Ok(line) => {
            debug!("request {:?}", line.trim_end());
            forward(line, &sink).await
        }
        Err(_) => {
            warn!("rejecting a request that is not valid UTF-8");
            Response::Error("request is not valid UTF-8".into())
        }
    };

    write
        .write_all(format!("{}\n", response.encode()).as_bytes())
        .await?;
    write.shutdown().await
}

/// Hand `line` to the orchestrator and wait for its answer.
async fn forward(line: String, sink: &mpsc::UnboundedSender<Inbound>) -> Response {
    let shutting_down = || Response::Error("daemon is shutting down".into());
    let (reply, response) = oneshot::channel();
    if sink.send(Inbound::Request { line, reply }).is_err() {
        return shutting_down();
    }
    response.await.unwrap_or_else(|_| shutting_down())
}

#[async_trait]
impl Source for ControlListener {
    type Error = ControlSocketError;

    /// Bind the socket and accept connections until the sink closes.
    async fn run(&mut self, sink: mpsc::UnboundedSender<Inbound>) -> Result<(), Self::Error> {
        let listener = bind_listener(&self.path).await?;
        info!("listening on {}", self.path.display());

        loop {
            tokio::select! {
                _ = sink.closed() => {
                    info!("sink closed, shutting down control socket");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let sink = sink.clone();
                        tokio::spawn(async move {
                            if let Err(e) = serve_client(stream, sink).await {
                                error!("client connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("accept error: {}", e);
                    }
                },
            }
        }

        let _ = std::fs::remove_file(&self.path);
        Ok(())
    }
}

//  Tests

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    /// Monotonic counter to generate unique socket paths per test.
    static TEST_ID: AtomicU32 = AtomicU32::new(0);

    /// Helper: create a unique temporary socket path for each test.
    fn tmp_socket_path() -> PathBuf {
        let id = TEST_ID.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!(
            "hyprmate-test-{}-{}.sock",
            std::process::id(),
            id
        ))
    }

    /// Start a listener whose requests are answered by `answer`.
    async fn start(path: &Path, answer: fn(&str) -> Response) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut listener = ControlListener::new(path);
        tokio::spawn(async move {
            let _ = listener.run(tx).await;
        });
        tokio::spawn(async move {
            while let Some(inbound) = rx.recv().await {
                if let Inbound::Request { line, reply } = inbound {
                    let _ = reply.send(answer(&line));
                }
            }
        });
        // Give the listener a moment to bind.
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    async fn roundtrip(path: &Path, request: impl AsRef<[u8]>) -> String {
        let mut stream = UnixStream::connect(path).await.expect("connect");
        stream.write_all(request.as_ref()).await.unwrap();
        stream.shutdown().await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn one_request_one_response() {
        let path = tmp_socket_path();
        start(&path, |line| {
            if line.trim() == "toggle term" {
                Response::Ok(None)
            } else {
                Response::unknown_command()
            }
        })
        .await;

        assert_eq!(roundtrip(&path, "toggle term\n").await, "OK\n");
        assert_eq!(
            roundtrip(&path, "bogus\n").await,
            "ERROR: unknown command\n"
        );

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn request_without_newline_is_accepted() {
        let path = tmp_socket_path();
        start(&path, |line| Response::Ok(Some(line.trim().to_string()))).await;
        assert_eq!(roundtrip(&path, "version").await, "OK version\n");
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn invalid_utf8_gets_an_error_reply() {
        let path = tmp_socket_path();
        start(&path, |_| Response::Ok(None)).await;
        assert_eq!(
            roundtrip(&path, b"toggle \xff\xfe\n").await,
            "ERROR: request is not valid UTF-8\n"
        );
        assert_eq!(roundtrip(&path, "toggle term\n").await, "OK\n");
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn stale_socket_file_is_replaced() {
        let path = tmp_socket_path();
        std::fs::write(&path, "stale").unwrap();
        let listener = bind_listener(&path).await;
        assert!(listener.is_ok());
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn live_socket_is_kept() {
        let path = tmp_socket_path();
        let _ = std::fs::remove_file(&path);
        let _live = UnixListener::bind(&path).unwrap();
        let err = bind_listener(&path).await.unwrap_err();
        assert!(matches!(err, ControlSocketError::AlreadyRunning(_)));
        let _ = std::fs::remove_file(&path);
    }
}
