//! Client requests, daemon responses and exit codes.
//!
//! This module defines the vocabulary of the control socket.  A client
//! writes a single line, `command [args...]`, and closes its write side.
//! The daemon answers with exactly one response and closes the connection:
//!
//! | Response            | Meaning                                   |
//! |---------------------|-------------------------------------------|
//! | `OK`                | the command succeeded without output      |
//! | `OK <output>`       | the command succeeded and produced output |
//! | `ERROR: <message>`  | the command failed                        |
//! | anything else       | raw text from a legacy command            |
//!
//! Command names are normalized so that `-` and `_` are interchangeable:
//! `toggle-special` and `toggle_special` reach the same handler.

use std::fmt;

/// Prefix of every failed response.
pub const ERROR_PREFIX: &str = "ERROR: ";

/// Normalize a command name: dashes become underscores.
pub fn normalize_command(name: &str) -> String {
    name.replace('-', "_")
}

/// A parsed client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Normalized command name.
    pub command: String,
    /// Whitespace-separated arguments, in order.
    pub args: Vec<String>,
}

/// A request line that cannot be routed at all.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("no command provided")]
    Empty,
}

impl Request {
    /// Parse a request line as received on the control socket.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let mut words = line.split_whitespace();
        let command = words.next().ok_or(ProtocolError::Empty)?;
        Ok(Self {
            command: normalize_command(command),
            args: words.map(str::to_string).collect(),
        })
    }

    /// Build a request from command-line arguments (client side).
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> Result<Self, ProtocolError> {
        let joined = args
            .iter()
            .map(|a| a.as_ref())
            .collect::<Vec<_>>()
            .join(" ");
        Self::parse(&joined)
    }

    /// The request encoded as a single line, newline included.
    pub fn to_line(&self) -> String {
        if self.args.is_empty() {
            format!("{}\n", self.command)
        } else {
            format!("{} {}\n", self.command, self.args.join(" "))
        }
    }
}

/// The daemon's answer to one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// `OK`, optionally followed by command output.
    Ok(Option<String>),
    /// `ERROR: <message>`.
    Error(String),
    /// Raw text, used by `version`, `help` and `dumpjson`.
    Raw(String),
}

impl Response {
    /// The canonical reply for a command nobody handles.
    pub fn unknown_command() -> Self {
        Response::Error("unknown command".into())
    }

    /// Encode the response as written on the socket.
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Decode a response read from the socket (client side).
    pub fn decode(text: &str) -> Self {
        let text = text.trim_end_matches(['\n', '\r']);
        if let Some(message) = text.strip_prefix(ERROR_PREFIX) {
            Response::Error(message.to_string())
        } else if text == "OK" {
            Response::Ok(None)
        } else if let Some(output) = text.strip_prefix("OK ") {
            Response::Ok(Some(output.to_string()))
        } else {
            Response::Raw(text.to_string())
        }
    }

    /// Exit-code class a client should report for this response.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Response::Error(_) => ExitCode::CommandError,
            Response::Ok(_) | Response::Raw(_) => ExitCode::Success,
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Ok(None) => write!(f, "OK"),
            Response::Ok(Some(output)) => write!(f, "OK {}", output),
            Response::Error(message) => write!(f, "{}{}", ERROR_PREFIX, message),
            Response::Raw(text) => write!(f, "{}", text),
        }
    }
}

/// Process exit codes of the thin clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    UsageError = 1,
    EnvironmentError = 2,
    ConnectionError = 3,
    CommandError = 4,
}

impl ExitCode {
    /// Numeric value passed to [`std::process::exit`].
    pub fn code(self) -> i32 {
        self as i32
    }
}

//  Tests
