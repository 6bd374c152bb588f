//! The orchestrator.
//!
//! [`Manager`] is an actor: it owns the shared-state writer, the loaded
//! plugins and their queues, the routing tables and the debouncer, and it
//! processes [`Inbound`] messages one at a time from a single channel fed by
//! every [`Source`](crate::traits::Source).
//!
//! * **Events** update the shared state first, pass the debouncer, are
//!   broadcast to in-flight waits and are then enqueued on every subscribed
//!   plugin's queue.
//! * **Requests** are parsed and normalized.  Built-in commands (`reload`,
//!   `exit`, `version`, `help`, `dumpjson`) are answered here; plugin
//!   commands are enqueued together with the client's reply channel, so the
//!   orchestrator never waits on a plugin to answer a client.
//!
//! Plugins never call back into the manager, so awaiting a plugin (during
//! reload or shutdown) cannot deadlock.

pub mod dedup;
pub mod queue;
pub mod registry;
pub mod timers;

use crate::command::{Request, Response};
use crate::config::{Config, ConfigError};
use crate::plugin::{self, Capabilities, Plugin, PluginContext};
use crate::state::{Environment, SharedState, StateWriter};
use crate::traits::{Compositor, CompositorEvent, Inbound, NotifyLevel};
use dedup::Debouncer;
use log::{debug, error, info, warn};
use queue::{spawn_worker, Job, Mailbox, TASK_TIMEOUT};
use registry::{Registry, BUILTIN_OWNER};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How long a plugin gets to run its `exit` hook.
const EXIT_GRACE: Duration = Duration::from_secs(5);

/// Capacity of the raw event broadcast used by in-flight waits.
const EVENT_BROADCAST_CAPACITY: usize = 256;

/// Builds plugins by configuration name.
pub type PluginFactory = Box<dyn Fn(&str) -> Option<Box<dyn Plugin>> + Send>;

/// A loaded plugin as seen by the orchestrator.
struct PluginHandle {
    name: String,
    capabilities: Capabilities,
    mailbox: Mailbox,
    cancel: CancellationToken,
    worker: JoinHandle<()>,
}

/// Whether the run loop keeps going after a request.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

pub struct Manager {
    compositor: Arc<dyn Compositor>,
    state: StateWriter,
    config: Config,
    config_path: Option<PathBuf>,
    plugins: Vec<PluginHandle>,
    registry: Registry,
    debouncer: Debouncer,
    events: broadcast::Sender<CompositorEvent>,
    factory: PluginFactory,
    task_timeout: Duration,
}

fn builtin_capabilities() -> Capabilities {
    Capabilities::new()
        .command("reload", "re-read the configuration and reload plugins")
        .command("exit", "stop the daemon")
        .command("version", "print the daemon version")
        .command("help", "list available commands")
        .command("dumpjson", "print the effective configuration as JSON")
}

impl Manager {
    /// Create a manager.  `config_path` is re-read on `reload`.
    pub fn new(
        compositor: Arc<dyn Compositor>,
        config: Config,
        config_path: Option<PathBuf>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_BROADCAST_CAPACITY);
        let debouncer = Debouncer::new(Duration::from_millis(config.daemon.dedup_window_ms));
        Self {
            compositor,
            state: StateWriter::new(SharedState::default()),
            config,
            config_path,
            plugins: Vec::new(),
            registry: Registry::default(),
            debouncer,
            events,
            factory: Box::new(plugin::create),
            task_timeout: TASK_TIMEOUT,
        }
    }

    /// Replace the built-in plugin factory.
    pub fn with_factory(mut self, factory: PluginFactory) -> Self {
        self.factory = factory;
        self
    }

    /// Override the per-hook timeout.
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    /// Take the initial state snapshot and load the configured plugins.
    /// Returns the configuration errors that were reported.
    pub async fn initialize(&mut self) -> Vec<String> {
        if let Err(e) = self.state.refresh_from(self.compositor.as_ref()).await {
            warn!("cannot read initial compositor state: {}", e);
            self.state.update(|s| s.environment = Environment::Standalone);
        } else {
            info!("connected to Hyprland {}", self.state.view().version());
        }
        self.apply_config().await
    }

    /// Process inbound messages until `exit`, a shutdown message or the end
    /// of all sources, then tear every plugin down.
    pub async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<Inbound>) {
        info!("hyprmate running with {} plugin(s)", self.plugins.len());
        while let Some(message) = inbox.recv().await {
            match message {
                Inbound::Event(event) => self.on_event(event),
                Inbound::Request { line, reply } => {
                    if self.on_request(&line, reply).await == Flow::Exit {
                        break;
                    }
                }
                Inbound::Shutdown => break,
            }
        }
        self.shutdown().await;
    }

    /// Route one compositor event.
    fn on_event(&mut self, event: CompositorEvent) {
        self.state.apply_event(&event);
        if !self.debouncer.admit(&event, tokio::time::Instant::now()) {
            debug!("dropping duplicate {}>>{}", event.name, event.payload);
            return;
        }
        let _ = self.events.send(event.clone());
        for name in self.registry.subscribers(&event.name) {
            if let Some(handle) = self.plugins.iter().find(|p| &p.name == name) {
                handle.mailbox.send(Job::Event(event.clone()));
            }
        }
    }

    /// Answer or route one client request.
    async fn on_request(&mut self, line: &str, reply: oneshot::Sender<Response>) -> Flow {
        let request = match Request::parse(line) {
            Ok(request) => request,
            Err(e) => {
                let _ = reply.send(Response::Error(e.to_string()));
                return Flow::Continue;
            }
        };
        debug!("request {} {:?}", request.command, request.args);

        let owner = self
            .registry
            .command_owner(&request.command)
            .map(str::to_string);
        match owner.as_deref() {
            Some(BUILTIN_OWNER) => {
                let (response, flow) = self.run_builtin(&request).await;
                let _ = reply.send(response);
                flow
            }
            Some(owner) => {
                let handle = self.plugins.iter().find(|p| p.name == owner);
                let job = Job::Command {
                    name: request.command,
                    args: request.args,
                    reply,
                };
                if let Some(handle) = handle {
                    if !handle.mailbox.send(job) {
                        error!("{} is not running", handle.name);
                    }
                }
                Flow::Continue
            }
            None => {
                let _ = reply.send(Response::unknown_command());
                Flow::Continue
            }
        }
    }

    async fn run_builtin(&mut self, request: &Request) -> (Response, Flow) {
        match request.command.as_str() {
            "reload" => match self.reload().await {
                Ok(errors) if errors.is_empty() => (Response::Ok(None), Flow::Continue),
                Ok(errors) => (Response::Error(errors.join("; ")), Flow::Continue),
                Err(e) => (Response::Error(e.to_string()), Flow::Continue),
            },
            "exit" => (Response::Ok(None), Flow::Exit),
            "version" => (
                Response::Raw(format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))),
                Flow::Continue,
            ),
            "help" => (Response::Raw(self.registry.help()), Flow::Continue),
            "dumpjson" => (
                Response::Raw(
                    serde_json::to_string_pretty(&self.config.to_json()).unwrap_or_default(),
                ),
                Flow::Continue,
            ),
            _ => (Response::unknown_command(), Flow::Continue),
        }
    }

    /// Re-read the configuration file and apply it.
    async fn reload(&mut self) -> Result<Vec<String>, ConfigError> {
        if let Some(path) = &self.config_path {
            self.config = Config::load(path)?;
            info!("reloaded config from {}", path.display());
        }
        Ok(self.apply_config().await)
    }

    /// Reconcile the loaded plugins with the configuration: unload removed
    /// plugins, load new ones, reload all, rebuild the routing tables.
    async fn apply_config(&mut self) -> Vec<String> {
        let daemon = self.config.daemon.clone();
        self.state
            .update(|s| s.variables = daemon.variables.clone());
        self.debouncer
            .set_window(Duration::from_millis(daemon.dedup_window_ms));

        let mut errors = Vec::new();

        let (kept, removed): (Vec<_>, Vec<_>) = std::mem::take(&mut self.plugins)
            .into_iter()
            .partition(|p| daemon.plugins.contains(&p.name));
        for handle in removed {
            info!("unloading {}", handle.name);
            stop_plugin(handle).await;
        }

        let mut kept = kept;
        for name in &daemon.plugins {
            if let Some(index) = kept.iter().position(|p| &p.name == name) {
                self.plugins.push(kept.remove(index));
                continue;
            }
            if self.plugins.iter().any(|p| &p.name == name) {
                continue;
            }
            match (self.factory)(name) {
                Some(plugin) => {
                    info!("loading {}", name);
                    let handle = self.start_plugin(name, plugin);
                    self.plugins.push(handle);
                }
                None => errors.push(format!("unknown plugin `{}`", name)),
            }
        }

        let mut pending = Vec::new();
        for handle in &self.plugins {
            let (reply, rx) = oneshot::channel();
            handle.mailbox.send(Job::Reload {
                section: self.config.section(&handle.name),
                reply,
            });
            pending.push((handle.name.clone(), rx));
        }
        for (name, rx) in pending {
            match rx.await {
                Ok(plugin_errors) => {
                    errors.extend(plugin_errors.into_iter().map(|e| format!("[{}] {}", name, e)))
                }
                Err(_) => errors.push(format!("[{}] stopped during reload", name)),
            }
        }

        let builtins = builtin_capabilities();
        let entries = std::iter::once((BUILTIN_OWNER, &builtins)).chain(
            self.plugins
                .iter()
                .map(|p| (p.name.as_str(), &p.capabilities)),
        );
        let (registry, conflicts) = Registry::build(entries);
        self.registry = registry;
        errors.extend(conflicts);

        for e in &errors {
            error!("config: {}", e);
        }
        if !errors.is_empty() {
            let text = format!("configuration errors:\n{}", errors.join("\n"));
            if let Err(e) = self.compositor.notify(NotifyLevel::Error, &text).await {
                warn!("notification failed: {}", e);
            }
        }
        errors
    }

    fn start_plugin(&self, name: &str, plugin: Box<dyn Plugin>) -> PluginHandle {
        let capabilities = plugin.capabilities();
        let (tx, rx) = mpsc::unbounded_channel();
        let mailbox = Mailbox::new(tx);
        let cancel = CancellationToken::new();
        let ctx = PluginContext::new(
            name,
            self.state.view(),
            self.compositor.clone(),
            mailbox.clone(),
            self.events.clone(),
            cancel.clone(),
        );
        let worker = spawn_worker(plugin, ctx, rx, self.task_timeout);
        PluginHandle {
            name: name.to_string(),
            capabilities,
            mailbox,
            cancel,
            worker,
        }
    }

    async fn shutdown(&mut self) {
        info!("shutting down");
        for handle in self.plugins.drain(..) {
            stop_plugin(handle).await;
        }
    }
}

/// Cancel a plugin's in-flight waits, run its `exit` hook and wait for the
/// worker to finish.
async fn stop_plugin(handle: PluginHandle) {
    handle.cancel.cancel();
    let (reply, rx) = oneshot::channel();
    if handle.mailbox.send(Job::Exit { reply }) {
        if tokio::time::timeout(EXIT_GRACE, rx).await.is_err() {
            warn!("{} did not exit in time", handle.name);
        }
    }
    handle.worker.abort();
}

//  Tests
