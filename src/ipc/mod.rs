//! Control socket: the listener the daemon runs, the thin client that talks
//! to it, and where the socket lives.
//!
//! External tools (key-bind helpers, scripts, the `hyprmatectl` binary)
//! connect to the socket and send a single `command [args...]` line.

pub mod client;
pub mod listener;
pub mod paths;
