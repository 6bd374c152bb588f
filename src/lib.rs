//! **hyprmate** — a plugin-based companion daemon for Hyprland.
//!
//! One long-running process listens to the compositor's event stream and to
//! a per-session control socket, and dispatches both to feature plugins.
//! The flagship plugin manages *scratchpads*: application windows that slide
//! in and out of view on demand.
//!
//! # Architecture
//!
//! The crate is organised around a handful of traits:
//!
//! * [`traits::Compositor`] — abstracts the compositor's request IPC so
//!   plugins are not coupled to Hyprland's socket format.
//! * [`traits::Source`] — abstracts the transports that feed the
//!   orchestrator (the event stream, the control socket).
//! * [`plugin::Plugin`] — a feature module with declared capabilities.
//!
//! The [`manager`] owns the routing tables and gives every plugin its own
//! serial queue.  Concrete transports live in [`hyprland`] and [`ipc`].

pub mod command;
pub mod config;
pub mod hyprland;
pub mod ipc;
pub mod manager;
pub mod plugin;
pub mod scratchpad;
pub mod state;
pub mod toggle_special;
pub mod traits;

#[cfg(test)]
mod testing;
