//! Hyprland-specific implementations.
//!
//! This module provides the concrete [`Compositor`](crate::traits::Compositor)
//! backend and the event-stream [`Source`](crate::traits::Source), both
//! powered by Hyprland's IPC sockets, plus the JSON types they decode.
//!
//! Nothing outside this module should know Hyprland's socket formats.

pub mod events;
pub mod ipc;
pub mod types;
