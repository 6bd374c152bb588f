//! The contract every feature module implements.
//!
//! A plugin declares up front which compositor events and which client
//! commands it handles ([`Capabilities`]).  The orchestrator builds its
//! routing tables from those declarations once per (re)load and then feeds
//! the plugin through its own serial queue: every hook of a given plugin
//! runs to completion before the next one starts, so a plugin never needs
//! locks around its own state.
//!
//! Hooks receive a [`PluginContext`] carrying everything a plugin may touch
//! outside itself: a read-only view of the shared state, the compositor,
//! its keyed timers, a mailbox to post notices onto its own queue, and a
//! subscription to the raw event broadcast.

use crate::command::normalize_command;
use crate::manager::queue::Mailbox;
use crate::manager::timers::Timers;
use crate::state::StateView;
use crate::traits::{Compositor, CompositorError, CompositorEvent, NotifyLevel};
use async_trait::async_trait;
use log::warn;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// A client command a plugin answers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Normalized command name.
    pub name: String,
    /// One-line description shown by `help`.
    pub description: String,
}

/// Events and commands a plugin handles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub events: Vec<String>,
    pub commands: Vec<CommandSpec>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to the compositor event `name`.
    pub fn event(mut self, name: &str) -> Self {
        self.events.push(name.to_string());
        self
    }

    /// Answer the client command `name`.
    pub fn command(mut self, name: &str, description: &str) -> Self {
        self.commands.push(CommandSpec {
            name: normalize_command(name),
            description: description.to_string(),
        });
        self
    }
}

/// Errors a hook can return.  The message is what the client sees after
/// `ERROR: `.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),
    #[error("usage: {0}")]
    Usage(String),
    #[error("{0}")]
    Compositor(#[from] CompositorError),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }
}

/// Everything a plugin may use besides its own state.
pub struct PluginContext {
    /// Name the plugin was loaded under.
    pub name: String,
    /// Read-only shared state.
    pub state: StateView,
    pub compositor: Arc<dyn Compositor>,
    /// Keyed timers; firing ones come back through [`Plugin::on_timer`].
    pub timers: Timers,
    /// Posts notices onto this plugin's own queue.
    pub mailbox: Mailbox,
    /// Cancelled when the plugin is torn down.
    pub cancel: CancellationToken,
    events: broadcast::Sender<CompositorEvent>,
}

impl PluginContext {
    pub fn new(
        name: &str,
        state: StateView,
        compositor: Arc<dyn Compositor>,
        mailbox: Mailbox,
        events: broadcast::Sender<CompositorEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            name: name.to_string(),
            state,
            compositor,
            timers: Timers::new(mailbox.clone()),
            mailbox,
            cancel,
            events,
        }
    }

    /// A receiver of every routed compositor event, from now on.
    ///
    /// This bypasses the plugin's queue and is meant for short, bounded
    /// waits inside a running hook.
    pub fn subscribe(&self) -> broadcast::Receiver<CompositorEvent> {
        self.events.subscribe()
    }

    /// Best-effort desktop notification; failures are only logged.
    pub async fn notify(&self, level: NotifyLevel, text: &str) {
        if let Err(e) = self.compositor.notify(level, text).await {
            warn!("[{}] notification failed: {}", self.name, e);
        }
    }

    pub async fn notify_error(&self, text: &str) {
        self.notify(NotifyLevel::Error, text).await
    }
}

/// A feature module.
///
/// Only [`name`](Plugin::name), [`capabilities`](Plugin::capabilities) and
/// [`on_reload`](Plugin::on_reload) are mandatory; every other hook
/// defaults to doing nothing.
#[async_trait]
pub trait Plugin: Send {
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    /// Called once, before the first [`on_reload`](Plugin::on_reload).
    async fn init(&mut self, _ctx: &mut PluginContext) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Apply the plugin's configuration section.  Called after `init` and
    /// on every reload.  Returns human-readable validation errors; invalid
    /// entries are skipped, valid ones still apply.
    async fn on_reload(&mut self, ctx: &mut PluginContext, section: &toml::Table) -> Vec<String>;

    async fn handle_event(
        &mut self,
        _ctx: &mut PluginContext,
        _event: &CompositorEvent,
    ) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Run a client command.  `Some(text)` becomes `OK <text>`.
    async fn run_command(
        &mut self,
        _ctx: &mut PluginContext,
        command: &str,
        _args: &[String],
    ) -> Result<Option<String>, HandlerError> {
        Err(HandlerError::failed(format!("{} does not handle {}", self.name(), command)))
    }

    /// A timer armed through [`PluginContext::timers`] fired.
    async fn on_timer(&mut self, _ctx: &mut PluginContext, _key: &str) -> Result<(), HandlerError> {
        Ok(())
    }

    /// A notice posted through [`PluginContext::mailbox`] arrived.
    async fn on_notice(
        &mut self,
        _ctx: &mut PluginContext,
        _notice: &str,
    ) -> Result<(), HandlerError> {
        Ok(())
    }

    /// The plugin is being unloaded or the daemon is stopping.
    async fn exit(&mut self, _ctx: &mut PluginContext) -> Result<(), HandlerError> {
        Ok(())
    }
}

/// Instantiate a built-in plugin by configuration name.
pub fn create(name: &str) -> Option<Box<dyn Plugin>> {
    match name {
        crate::scratchpad::PLUGIN_NAME => Some(Box::new(crate::scratchpad::Scratchpads::new())),
        crate::toggle_special::PLUGIN_NAME => {
            Some(Box::new(crate::toggle_special::ToggleSpecial::new()))
        }
        _ => None,
    }
}
