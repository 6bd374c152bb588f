//! Hyprland event stream as a [`Source`].
//!
//! Hyprland writes one line per event to its event socket (`socket2`) at
//! `$XDG_RUNTIME_DIR/hypr/$HYPRLAND_INSTANCE_SIGNATURE/.socket2.sock`, in
//! the form `EVENT>>DATA\n`:
//!
//! | Event            | Payload                              |
//! |------------------|--------------------------------------|
//! | `openwindow`     | `ADDRESS,WORKSPACE,CLASS,TITLE`      |
//! | `closewindow`    | `ADDRESS`                            |
//! | `activewindowv2` | `ADDRESS` (without `0x`)             |
//! | `workspace`      | `WORKSPACE_NAME`                     |
//! | `focusedmon`     | `MONITOR,WORKSPACE_NAME`             |
//! | `monitorremoved` | `MONITOR`                            |
//!
//! [`EventStream`] forwards every parsed line as an
//! [`Inbound::Event`].  When the stream drops (Hyprland restarting, a
//! socket hiccup) it reconnects after a fixed delay and resumes; events
//! emitted while disconnected are lost.

use super::ipc::socket2_path;
use crate::traits::{CompositorError, CompositorEvent, Inbound, Source};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UnixStream;
use tokio::sync::mpsc;

/// Delay between reconnection attempts.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Reconnecting reader of the compositor event socket.
pub struct EventStream {
    path: PathBuf,
    reconnect_delay: Duration,
}

impl EventStream {
    /// Event stream of the Hyprland instance named by the environment.
    pub fn from_env() -> Result<Self, CompositorError> {
        Ok(Self::new(socket2_path()?))
    }

    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            reconnect_delay: RECONNECT_DELAY,
        }
    }

    /// Override the reconnection delay.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Read one connection until it ends.  Returns `false` once the sink is
    /// gone and the stream should stop for good.
    async fn pump(&self, stream: UnixStream, sink: &mpsc::UnboundedSender<Inbound>) -> bool {
        let mut reader = BufReader::new(stream);
        let mut bytes = Vec::new();
        loop {
            bytes.clear();
            match reader.read_until(b'\n', &mut bytes).await {
                Ok(0) => {
                    warn!("socket2 stream ended");
                    return true;
                }
                Ok(_) => {
                    // Window titles are not guaranteed to be UTF-8.
                    let line = String::from_utf8_lossy(&bytes);
                    let Some(event) = parse_event(&line) else {
                        continue;
                    };
                    debug!("event {}>>{}", event.name, event.payload);
                    if sink.send(Inbound::Event(event)).is_err() {
                        info!("sink closed, event stream stopping");
                        return false;
                    }
                }
                Err(e) => {
                    error!("socket2 read error: {}", e);
                    return true;
                }
            }
        }
    }
}

/// Parse a single event line from socket2.
///
/// Lines have the form `EVENT>>DATA`.
pub fn parse_event_line(line: &str) -> Option<(&str, &str)> {
    let sep = line.find(">>")?;
    Some((&line[..sep], &line[sep + 2..]))
}

/// Parse a line into an owned [`CompositorEvent`], skipping blank lines.
pub fn parse_event(line: &str) -> Option<CompositorEvent> {
    let line = line.trim_end_matches(['\n', '\r']);
    if line.is_empty() {
        return None;
    }
    parse_event_line(line).map(|(name, payload)| CompositorEvent::new(name, payload))
}

#[async_trait]
impl Source for EventStream {
    type Error = CompositorError;

    /// Connect to the event socket and forward events until the sink closes.
    ///
    /// Connection failures are never fatal: the stream keeps retrying every
    /// `reconnect_delay`.
    async fn run(&mut self, sink: mpsc::UnboundedSender<Inbound>) -> Result<(), Self::Error> {
        loop {
            match UnixStream::connect(&self.path).await {
                Ok(stream) => {
                    info!("connected to socket2: {}", self.path.display());
                    if !self.pump(stream, &sink).await {
                        return Ok(());
                    }
                }
                Err(e) => {
                    warn!("cannot connect to {}: {}", self.path.display(), e);
                }
            }
            if sink.is_closed() {
                return Ok(());
            }
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }
}

//  Tests

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::io::AsyncWriteExt;
    use tokio::net::UnixListener;

    static TEST_ID: AtomicU32 = AtomicU32::new(0);

    fn tmp_socket_path() -> PathBuf {
        let id = TEST_ID.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!(
            "hyprmate-events-test-{}-{}.sock",
            std::process::id(),
            id
        ))
    }

    #[test]
    fn parse_event_line_valid() {
        assert_eq!(parse_event_line("workspace>>2"), Some(("workspace", "2")));
        assert_eq!(
            parse_event_line("openwindow>>abc,1,kitty,fish>>x"),
            Some(("openwindow", "abc,1,kitty,fish>>x"))
        );
    }

    #[test]
    fn parse_event_line_no_separator() {
        assert_eq!(parse_event_line("garbage"), None);
        assert_eq!(parse_event(""), None);
    }

    #[test]
    fn parse_event_keeps_empty_payload() {
        assert_eq!(
            parse_event("configreloaded>>\n"),
            Some(CompositorEvent::new("configreloaded", ""))
        );
    }

    #[tokio::test]
    async fn invalid_utf8_does_not_drop_the_stream() {
        let path = tmp_socket_path();
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path).unwrap();
        tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            conn.write_all(b"openwindow>>abc,1,kitty,caf\xe9\nworkspace>>3\n")
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        // A reconnect would take far longer than the test waits.
        let mut stream = EventStream::new(&path).with_reconnect_delay(Duration::from_secs(60));
        tokio::spawn(async move {
            let _ = stream.run(tx).await;
        });

        let mut events = Vec::new();
        for _ in 0..2 {
            match tokio::time::timeout(Duration::from_secs(2), rx.recv()).await {
                Ok(Some(Inbound::Event(event))) => events.push(event),
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(events[0].name, "openwindow");
        assert_eq!(events[0].payload, "abc,1,kitty,caf\u{fffd}");
        assert_eq!(events[1], CompositorEvent::new("workspace", "3"));
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn reconnects_after_stream_drop() {
        let path = tmp_socket_path();
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path).unwrap();
        tokio::spawn(async move {
            let (mut first, _) = listener.accept().await.unwrap();
            first.write_all(b"workspace>>2\n").await.unwrap();
            drop(first);
            let (mut second, _) = listener.accept().await.unwrap();
            second.write_all(b"activewindowv2>>abc\n").await.unwrap();
            // Keep the second connection open until the test ends.
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut stream = EventStream::new(&path).with_reconnect_delay(Duration::from_millis(10));
        tokio::spawn(async move {
            let _ = stream.run(tx).await;
        });

        let mut names = Vec::new();
        for _ in 0..2 {
            match rx.recv().await {
                Some(Inbound::Event(event)) => names.push(event.name),
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(names, vec!["workspace", "activewindowv2"]);
        let _ = std::fs::remove_file(&path);
    }
}
