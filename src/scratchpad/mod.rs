//! Scratchpads: named application windows toggled in and out of view.
//!
//! A scratchpad is started on first use (or at load time when not lazy),
//! parked on a hidden special workspace and slid onto the focused monitor
//! when shown.  The state machine lives in [`lifecycle`]; this module wires
//! it to the plugin hooks: client commands, compositor events, unfocus
//! timers and process exit notices.

mod definition;
mod geometry;
mod instance;
mod lifecycle;
mod matcher;
mod process;
mod rules;

use crate::hyprland::types::full_address;
use crate::plugin::{Capabilities, HandlerError, Plugin, PluginContext};
use crate::traits::{CompositorError, CompositorEvent};
use async_trait::async_trait;
use definition::ScratchpadDefinition;
use instance::{Instance, Phase};
use lifecycle::{unfocus_timer, HideMode};
use log::{debug, info, warn};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

pub const PLUGIN_NAME: &str = "scratchpads";

/// Prefix of the special workspaces scratchpads hide on.
pub(crate) const HIDDEN_PREFIX: &str = "special:scratch_";

/// Focus changes this soon after a show never trigger an unfocus hide.
const AFTER_SHOW_INHIBITION: Duration = Duration::from_millis(300);

/// How long a process gets between SIGTERM and SIGKILL.
const TERMINATE_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum ScratchpadError {
    #[error("scratchpad `{0}` not found")]
    Unknown(String),
    #[error("scratchpad `{0}` is not visible")]
    NotVisible(String),
    #[error("no window appeared for `{name}` within {timeout:?}")]
    StartTimeout { name: String, timeout: Duration },
    #[error("the command of `{name}` failed with code {code}")]
    CommandFailed { name: String, code: i32 },
    #[error("the command of `{0}` exited without opening a window, is it already running?")]
    CommandEnded(String),
    #[error("the command of `{0}` was killed before opening a window")]
    CommandKilled(String),
    #[error("no window matches scratchpad `{0}`")]
    NoWindow(String),
    #[error("the window of `{0}` is gone")]
    WindowGone(String),
    #[error("no monitor to show `{0}` on")]
    NoMonitor(String),
    #[error("starting `{0}` was cancelled")]
    Cancelled(String),
    #[error(transparent)]
    Spawn(#[from] process::SpawnError),
    #[error(transparent)]
    Compositor(#[from] CompositorError),
}

impl From<ScratchpadError> for HandlerError {
    fn from(err: ScratchpadError) -> Self {
        match err {
            ScratchpadError::Compositor(e) => HandlerError::Compositor(e),
            other => HandlerError::Failed(other.to_string()),
        }
    }
}

/// The scratchpads plugin.
#[derive(Default)]
pub struct Scratchpads {
    definitions: BTreeMap<String, ScratchpadDefinition>,
    instances: HashMap<String, Instance>,
    /// Last scratchpad shown or focused; the target of `attach`.
    last_used: Option<String>,
}

impl Scratchpads {
    pub fn new() -> Self {
        Self::default()
    }

    fn instance(&mut self, name: &str) -> &mut Instance {
        self.instances.entry(name.to_string()).or_default()
    }

    fn owner_of(&self, address: &str) -> Option<&str> {
        self.instances
            .iter()
            .find(|(_, instance)| instance.owns(address))
            .map(|(name, _)| name.as_str())
    }

    /// Start the non-lazy scratchpads that are not running yet.
    async fn prestart(&mut self, ctx: &mut PluginContext) -> Vec<String> {
        let eager: Vec<String> = self
            .definitions
            .values()
            .filter(|d| !d.options.lazy && d.options.command.is_some())
            .map(|d| d.name.clone())
            .collect();
        let mut errors = Vec::new();
        for name in eager {
            let phase = self.instance(&name).phase;
            if !matches!(phase, Phase::Unstarted | Phase::Closed) {
                continue;
            }
            if let Err(e) = self.start_hidden(ctx, &name).await {
                errors.push(format!("could not start scratchpad `{}`: {}", name, e));
            }
        }
        errors
    }

    async fn start_hidden(
        &mut self,
        ctx: &mut PluginContext,
        name: &str,
    ) -> Result<(), ScratchpadError> {
        let Some(monitor) = ctx.compositor.monitor(None).await? else {
            return Err(ScratchpadError::NoMonitor(name.to_string()));
        };
        let opts = match self.definitions.get(name) {
            Some(definition) => definition.options_for(&monitor.name).clone(),
            None => return Err(ScratchpadError::Unknown(name.to_string())),
        };
        let address = self.ensure_alive(ctx, name, &opts, &monitor).await?;
        ctx.compositor
            .dispatch(&[format!(
                "movetoworkspacesilent {},address:{}",
                rules::hidden_workspace(name),
                address
            )])
            .await?;
        Ok(())
    }

    async fn on_focus_change(
        &mut self,
        ctx: &mut PluginContext,
        address: &str,
    ) -> Result<(), ScratchpadError> {
        if let Some(owner) = self.owner_of(address).map(str::to_string) {
            ctx.timers.cancel(&unfocus_timer(&owner));
            self.last_used = Some(owner);
        }
        let mut hide_now = Vec::new();
        for (name, instance) in &self.instances {
            if !instance.is_shown() || instance.owns(address) {
                continue;
            }
            let Some(definition) = self.definitions.get(name) else {
                continue;
            };
            let opts = definition.options_for(instance.monitor.as_deref().unwrap_or_default());
            if !opts.unfocus_hide {
                continue;
            }
            if instance
                .shown_at
                .is_some_and(|at| at.elapsed() < AFTER_SHOW_INHIBITION)
            {
                debug!("[{}] ignoring focus change right after showing {}", ctx.name, name);
                continue;
            }
            if opts.hysteresis.is_zero() {
                hide_now.push(name.clone());
            } else {
                ctx.timers.schedule(&unfocus_timer(name), opts.hysteresis);
            }
        }
        for name in hide_now {
            self.hide(ctx, &name, HideMode::Unfocused).await?;
        }
        Ok(())
    }

    /// Fold a new window into a visible multi-window scratchpad.
    async fn on_window_opened(
        &mut self,
        ctx: &mut PluginContext,
        payload: &str,
    ) -> Result<(), ScratchpadError> {
        let address = full_address(payload.split(',').next().unwrap_or_default());
        if self.owner_of(&address).is_some() {
            return Ok(());
        }
        let candidates: Vec<String> = self
            .instances
            .iter()
            .filter(|(_, instance)| instance.is_shown())
            .map(|(name, _)| name.clone())
            .collect();
        if candidates.is_empty() {
            return Ok(());
        }
        let Some(client) = ctx.compositor.client_by_address(&address).await? else {
            return Ok(());
        };
        for name in candidates {
            let Some(definition) = self.definitions.get(&name) else {
                continue;
            };
            let Some(instance) = self.instances.get_mut(&name) else {
                continue;
            };
            let opts = definition.options_for(instance.monitor.as_deref().unwrap_or_default());
            if !opts.multi {
                continue;
            }
            let pids = match (opts.matching.is_pid(), instance.pid) {
                (true, Some(pid)) => process::process_tree(pid),
                (true, None) => continue,
                (false, _) => Default::default(),
            };
            if opts.matching.matches(&client, &pids) {
                debug!("[{}] {} gains window {}", ctx.name, name, address);
                instance.extra.push(address);
                break;
            }
        }
        Ok(())
    }

    fn on_window_closed(&mut self, ctx: &mut PluginContext, address: &str) {
        for (name, instance) in self.instances.iter_mut() {
            if instance.address.as_deref() == Some(address) {
                info!("[{}] window of {} closed", ctx.name, name);
                // A process still running is stopped before the next start.
                let pid = instance.pid;
                instance.reset(Phase::Closed);
                instance.pid = pid;
                ctx.timers.cancel(&unfocus_timer(name));
            } else {
                instance.extra.retain(|a| a != address);
                instance.extra_offsets.remove(address);
            }
        }
    }

    async fn on_monitor_removed(
        &mut self,
        ctx: &mut PluginContext,
        monitor: &str,
    ) -> Result<(), ScratchpadError> {
        let stranded: Vec<String> = self
            .instances
            .iter()
            .filter(|(_, i)| i.is_shown() && i.monitor.as_deref() == Some(monitor))
            .map(|(name, _)| name.clone())
            .collect();
        for name in stranded {
            self.hide(ctx, &name, HideMode::Detached).await?;
        }
        Ok(())
    }

    /// A compositor config reload dropped our window rules.
    async fn on_config_reloaded(&mut self, ctx: &mut PluginContext) -> Result<(), ScratchpadError> {
        for instance in self.instances.values_mut() {
            instance.rules_applied = false;
        }
        let Some(monitor) = ctx.compositor.monitor(None).await? else {
            return Ok(());
        };
        let managed: Vec<(String, definition::ScratchpadOptions)> = self
            .definitions
            .values()
            .filter(|d| d.options.command.is_some())
            .map(|d| (d.name.clone(), d.options_for(&monitor.name).clone()))
            .collect();
        for (name, opts) in managed {
            self.apply_rules(ctx, &name, &opts, &monitor).await;
        }
        Ok(())
    }

    /// Toggle the focused window in or out of the last used scratchpad.
    async fn attach(&mut self, ctx: &mut PluginContext) -> Result<Option<String>, HandlerError> {
        let Some(name) = self.last_used.clone() else {
            return Err(HandlerError::failed("no scratchpad used yet"));
        };
        let focused = ctx.state.active_window();
        if focused.is_empty() {
            return Err(HandlerError::failed("no focused window"));
        }
        match self.owner_of(&focused) {
            Some(owner) if owner != name => {
                return Err(HandlerError::failed(format!("window belongs to {}", owner)));
            }
            _ => {}
        }
        let instance = self.instance(&name);
        if instance.address.as_deref() == Some(focused.as_str()) {
            return Err(HandlerError::failed(format!(
                "{} is the main window of {}",
                focused, name
            )));
        }
        if instance.extra.contains(&focused) {
            instance.extra.retain(|a| *a != focused);
            instance.extra_offsets.remove(&focused);
            info!("[{}] detached {} from {}", ctx.name, focused, name);
        } else {
            instance.extra.push(focused.clone());
            info!("[{}] attached {} to {}", ctx.name, focused, name);
        }
        Ok(None)
    }

    async fn hide_named(
        &mut self,
        ctx: &mut PluginContext,
        name: &str,
    ) -> Result<(), ScratchpadError> {
        if name != "*" {
            return self.hide(ctx, name, HideMode::Requested).await;
        }
        let shown: Vec<String> = self
            .instances
            .iter()
            .filter(|(_, i)| i.is_shown())
            .map(|(n, _)| n.clone())
            .collect();
        for name in shown {
            self.hide(ctx, &name, HideMode::Requested).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Plugin for Scratchpads {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::new()
            .event("activewindowv2")
            .event("openwindow")
            .event("closewindow")
            .event("monitorremoved")
            .event("configreloaded")
            .command("toggle", "<name...> show or hide scratchpads")
            .command("show", "<name> show a scratchpad")
            .command("hide", "<name|*> hide a scratchpad")
            .command(
                "attach",
                "attach or detach the focused window to the last used scratchpad",
            )
    }

    async fn on_reload(&mut self, ctx: &mut PluginContext, section: &toml::Table) -> Vec<String> {
        let (definitions, mut errors) = definition::parse_section(section);
        errors.extend(definition::dangling_excludes(&definitions));
        self.instances.retain(|name, _| {
            let kept = definitions.contains_key(name);
            if !kept {
                warn!("[{}] {} is no longer configured, leaving its window alone", ctx.name, name);
                ctx.timers.cancel(&unfocus_timer(name));
            }
            kept
        });
        for instance in self.instances.values_mut() {
            instance.rules_applied = false;
        }
        if self
            .last_used
            .as_ref()
            .is_some_and(|n| !definitions.contains_key(n))
        {
            self.last_used = None;
        }
        info!("[{}] {} scratchpads configured", ctx.name, definitions.len());
        self.definitions = definitions;
        errors.extend(self.prestart(ctx).await);
        errors
    }

    async fn handle_event(
        &mut self,
        ctx: &mut PluginContext,
        event: &CompositorEvent,
    ) -> Result<(), HandlerError> {
        match event.name.as_str() {
            "activewindowv2" => {
                let payload = event.payload.trim();
                let address = if payload.is_empty() {
                    String::new()
                } else {
                    full_address(payload)
                };
                self.on_focus_change(ctx, &address).await?
            }
            "openwindow" => self.on_window_opened(ctx, &event.payload).await?,
            "closewindow" => self.on_window_closed(ctx, &full_address(&event.payload)),
            "monitorremoved" => self.on_monitor_removed(ctx, event.payload.trim()).await?,
            "configreloaded" => self.on_config_reloaded(ctx).await?,
            _ => {}
        }
        Ok(())
    }

    async fn run_command(
        &mut self,
        ctx: &mut PluginContext,
        command: &str,
        args: &[String],
    ) -> Result<Option<String>, HandlerError> {
        match (command, args) {
            ("toggle", []) => Err(HandlerError::Usage("toggle <name...>".into())),
            ("toggle", names) => {
                self.toggle(ctx, names).await?;
                Ok(None)
            }
            ("show", [name]) => {
                self.show(ctx, name).await?;
                Ok(None)
            }
            ("show", _) => Err(HandlerError::Usage("show <name>".into())),
            ("hide", [name]) => {
                self.hide_named(ctx, name).await?;
                Ok(None)
            }
            ("hide", _) => Err(HandlerError::Usage("hide <name|*>".into())),
            ("attach", []) => self.attach(ctx).await,
            ("attach", _) => Err(HandlerError::Usage("attach".into())),
            _ => Err(HandlerError::failed(format!("unknown command {}", command))),
        }
    }

    async fn on_timer(&mut self, ctx: &mut PluginContext, key: &str) -> Result<(), HandlerError> {
        let Some(name) = key.strip_prefix("unfocus:") else {
            return Ok(());
        };
        let focused = ctx.state.active_window();
        let name = name.to_string();
        match self.instances.get(&name) {
            Some(instance) if instance.is_shown() && !instance.owns(&focused) => {
                self.hide(ctx, &name, HideMode::Unfocused).await?;
            }
            _ => {}
        }
        Ok(())
    }

    async fn on_notice(
        &mut self,
        ctx: &mut PluginContext,
        notice: &str,
    ) -> Result<(), HandlerError> {
        let Some((name, pid)) = process::parse_exited_notice(notice) else {
            return Ok(());
        };
        let Some(instance) = self.instances.get_mut(name) else {
            return Ok(());
        };
        if instance.pid != Some(pid) {
            return Ok(());
        }
        ctx.timers.cancel(&unfocus_timer(name));
        if instance.is_shown() {
            warn!("[{}] process of {} exited while shown", ctx.name, name);
        } else {
            info!("[{}] process of {} exited", ctx.name, name);
        }
        instance.reset(Phase::Closed);
        Ok(())
    }

    async fn exit(&mut self, ctx: &mut PluginContext) -> Result<(), HandlerError> {
        let pids: Vec<u32> = self.instances.values().filter_map(|i| i.pid).collect();
        if !pids.is_empty() {
            info!("[{}] stopping {} scratchpad processes", ctx.name, pids.len());
        }
        futures_util::future::join_all(
            pids.into_iter()
                .map(|pid| process::terminate(pid, TERMINATE_GRACE)),
        )
        .await;
        for instance in self.instances.values_mut() {
            instance.reset(Phase::Unstarted);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::queue::Job;
    use crate::testing::{MockCompositor, PluginHarness};
    use crate::traits::Compositor;

    fn section(text: &str) -> toml::Table {
        text.parse().unwrap()
    }

    async fn loaded(mock: MockCompositor, config: &str) -> (Scratchpads, PluginHarness) {
        let mut harness = PluginHarness::new(PLUGIN_NAME, mock);
        let mut pads = Scratchpads::new();
        let errors = pads.on_reload(&mut harness.ctx, &section(config)).await;
        assert!(errors.is_empty(), "{:?}", errors);
        (pads, harness)
    }

    fn args(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn two_windows() -> MockCompositor {
        let mock = MockCompositor::single_monitor();
        mock.add_client("0xa", "alpha", "A", 10);
        mock.add_client("0xb", "beta", "B", 11);
        mock
    }

    #[tokio::test]
    async fn toggle_twice_restores_visibility() {
        let (mut pads, mut h) = loaded(two_windows(), "[a]\nclass = \"alpha\"\n").await;

        pads.run_command(&mut h.ctx, "toggle", &args(&["a"])).await.unwrap();
        let client = h.compositor.client("0xa").unwrap();
        assert_eq!(client.workspace.name, "1");
        assert_eq!(client.size, [1536, 864]);
        assert_eq!(client.at, [192, 60]);
        assert!(client.pinned);
        assert_eq!(pads.instances["a"].phase, Phase::Shown);
        assert!(h
            .compositor
            .dispatched()
            .contains(&"focuswindow address:0xa".to_string()));

        pads.run_command(&mut h.ctx, "toggle", &args(&["a"])).await.unwrap();
        let client = h.compositor.client("0xa").unwrap();
        assert_eq!(client.workspace.name, "special:scratch_a");
        assert!(!client.pinned);
        assert_eq!(client.at, [192, 60 - 864 - 60]);
        assert_eq!(pads.instances["a"].phase, Phase::Hidden);
    }

    #[tokio::test]
    async fn show_is_idempotent() {
        let (mut pads, mut h) = loaded(two_windows(), "[a]\nclass = \"alpha\"\n").await;
        pads.run_command(&mut h.ctx, "show", &args(&["a"])).await.unwrap();
        h.compositor.clear_log();
        pads.run_command(&mut h.ctx, "show", &args(&["a"])).await.unwrap();
        assert!(h.compositor.dispatched().is_empty());
    }

    #[tokio::test]
    async fn command_errors() {
        let (mut pads, mut h) = loaded(two_windows(), "[a]\nclass = \"alpha\"\n").await;
        let err = pads
            .run_command(&mut h.ctx, "hide", &args(&["a"]))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "scratchpad `a` is not visible");
        let err = pads
            .run_command(&mut h.ctx, "toggle", &args(&["nope"]))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "scratchpad `nope` not found");
        let err = pads.run_command(&mut h.ctx, "toggle", &[]).await.unwrap_err();
        assert!(matches!(err, HandlerError::Usage(_)));
        let err = pads.run_command(&mut h.ctx, "attach", &[]).await.unwrap_err();
        assert_eq!(err.to_string(), "no scratchpad used yet");
    }

    #[tokio::test]
    async fn unmanaged_without_window_fails() {
        let (mut pads, mut h) = loaded(
            MockCompositor::single_monitor(),
            "[a]\nclass = \"alpha\"\n",
        )
        .await;
        let err = pads
            .run_command(&mut h.ctx, "show", &args(&["a"]))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "no window matches scratchpad `a`");
    }

    #[tokio::test]
    async fn excluded_scratchpads_hide_first_and_come_back() {
        let config = r#"
            [a]
            class = "alpha"
            excludes = ["b"]
            restore_excluded = true
            [b]
            class = "beta"
        "#;
        let (mut pads, mut h) = loaded(two_windows(), config).await;
        pads.run_command(&mut h.ctx, "show", &args(&["b"])).await.unwrap();
        h.compositor.clear_log();

        pads.run_command(&mut h.ctx, "show", &args(&["a"])).await.unwrap();
        let log = h.compositor.dispatched();
        let position = |cmd: &str| log.iter().position(|c| c == cmd).unwrap();
        assert!(
            position("movetoworkspacesilent special:scratch_b,address:0xb")
                < position("movetoworkspacesilent 1,address:0xa")
        );
        assert_eq!(pads.instances["b"].phase, Phase::Hidden);

        pads.run_command(&mut h.ctx, "hide", &args(&["a"])).await.unwrap();
        assert_eq!(pads.instances["b"].phase, Phase::Shown);
        assert_eq!(h.compositor.client("0xb").unwrap().workspace.name, "1");
    }

    #[tokio::test]
    async fn toggle_direction_follows_first_name() {
        let config = "[a]\nclass = \"alpha\"\n[b]\nclass = \"beta\"\n";
        let (mut pads, mut h) = loaded(two_windows(), config).await;
        pads.run_command(&mut h.ctx, "show", &args(&["b"])).await.unwrap();
        pads.run_command(&mut h.ctx, "toggle", &args(&["a", "b"])).await.unwrap();
        assert!(pads.instances["a"].is_shown());
        assert!(pads.instances["b"].is_shown());
        pads.run_command(&mut h.ctx, "toggle", &args(&["a", "b"])).await.unwrap();
        assert!(!pads.instances["a"].is_shown());
        assert!(!pads.instances["b"].is_shown());
    }

    #[tokio::test]
    async fn attach_moves_extra_windows_along() {
        let mock = two_windows();
        mock.add_client("0xc", "gamma", "C", 12);
        let (mut pads, mut h) = loaded(mock, "[a]\nclass = \"alpha\"\n").await;
        pads.run_command(&mut h.ctx, "show", &args(&["a"])).await.unwrap();

        h.focus("0xc");
        assert_eq!(pads.run_command(&mut h.ctx, "attach", &[]).await.unwrap(), None);
        assert_eq!(pads.instances["a"].extra, vec!["0xc"]);

        h.focus("0xb");
        pads.run_command(&mut h.ctx, "hide", &args(&["a"])).await.unwrap();
        assert_eq!(
            h.compositor.client("0xc").unwrap().workspace.name,
            "special:scratch_a"
        );

        h.focus("0xc");
        pads.run_command(&mut h.ctx, "attach", &[]).await.unwrap();
        assert!(pads.instances["a"].extra.is_empty());

        h.focus("0xa");
        let err = pads.run_command(&mut h.ctx, "attach", &[]).await.unwrap_err();
        assert!(err.to_string().contains("main window"));
    }

    #[tokio::test]
    async fn new_matching_windows_join_a_multi_scratchpad() {
        let (mut pads, mut h) = loaded(two_windows(), "[a]\nclass = \"alpha\"\n").await;
        pads.run_command(&mut h.ctx, "show", &args(&["a"])).await.unwrap();
        h.compositor.add_client("0xd", "alpha", "second", 10);
        pads.handle_event(&mut h.ctx, &CompositorEvent::new("openwindow", "d,1,alpha,second"))
            .await
            .unwrap();
        assert_eq!(pads.instances["a"].extra, vec!["0xd"]);
    }

    #[tokio::test(start_paused = true)]
    async fn unfocus_hides_after_hysteresis() {
        let config = "[a]\nclass = \"alpha\"\nunfocus = \"hide\"\nhysteresis = 0.4\n";
        let (mut pads, mut h) = loaded(two_windows(), config).await;
        let focus = |addr: &str| CompositorEvent::new("activewindowv2", addr);
        pads.run_command(&mut h.ctx, "show", &args(&["a"])).await.unwrap();

        // Too soon after showing.
        pads.handle_event(&mut h.ctx, &focus("b")).await.unwrap();
        assert!(!h.ctx.timers.is_armed("unfocus:a"));

        tokio::time::advance(Duration::from_millis(500)).await;
        pads.handle_event(&mut h.ctx, &focus("b")).await.unwrap();
        assert!(h.ctx.timers.is_armed("unfocus:a"));

        // Coming back in time cancels the hide.
        pads.handle_event(&mut h.ctx, &focus("a")).await.unwrap();
        assert!(!h.ctx.timers.is_armed("unfocus:a"));

        pads.handle_event(&mut h.ctx, &focus("b")).await.unwrap();
        h.focus("0xb");
        let Some(Job::Timer { key, generation }) = h.jobs.recv().await else {
            panic!("expected a timer");
        };
        assert!(h.ctx.timers.claim(&key, generation));
        pads.on_timer(&mut h.ctx, &key).await.unwrap();
        assert_eq!(pads.instances["a"].phase, Phase::Hidden);
        assert_eq!(
            h.compositor.client("0xa").unwrap().workspace.name,
            "special:scratch_a"
        );
    }

    #[tokio::test]
    async fn closed_window_and_exited_process_reset_the_instance() {
        let config = "[a]\nclass = \"alpha\"\n[b]\nclass = \"beta\"\n";
        let (mut pads, mut h) = loaded(two_windows(), config).await;
        pads.run_command(&mut h.ctx, "show", &args(&["a"])).await.unwrap();
        pads.handle_event(&mut h.ctx, &CompositorEvent::new("closewindow", "a"))
            .await
            .unwrap();
        assert_eq!(pads.instances["a"].phase, Phase::Closed);
        assert!(pads.instances["a"].address.is_none());

        pads.run_command(&mut h.ctx, "show", &args(&["b"])).await.unwrap();
        pads.instance("b").pid = Some(42);
        pads.on_notice(&mut h.ctx, "exited b 41").await.unwrap();
        assert!(pads.instances["b"].is_shown());
        pads.on_notice(&mut h.ctx, "exited b 42").await.unwrap();
        assert_eq!(pads.instances["b"].phase, Phase::Closed);
    }

    #[tokio::test]
    async fn preserved_geometry_survives_a_hide() {
        let config = "[a]\nclass = \"alpha\"\npreserve_aspect = true\n";
        let (mut pads, mut h) = loaded(two_windows(), config).await;
        pads.run_command(&mut h.ctx, "show", &args(&["a"])).await.unwrap();
        h.compositor
            .dispatch(&["resizewindowpixel exact 500 400,address:0xa".to_string()])
            .await
            .unwrap();
        pads.run_command(&mut h.ctx, "hide", &args(&["a"])).await.unwrap();
        pads.run_command(&mut h.ctx, "show", &args(&["a"])).await.unwrap();
        let client = h.compositor.client("0xa").unwrap();
        assert_eq!(client.size, [500, 400]);
        assert_eq!(client.at, [192, 60]);
    }

    #[tokio::test]
    async fn monitor_removal_hides_its_scratchpads() {
        let (mut pads, mut h) = loaded(two_windows(), "[a]\nclass = \"alpha\"\n").await;
        pads.run_command(&mut h.ctx, "show", &args(&["a"])).await.unwrap();
        pads.handle_event(&mut h.ctx, &CompositorEvent::new("monitorremoved", "DP-1"))
            .await
            .unwrap();
        assert_eq!(pads.instances["a"].phase, Phase::Hidden);
    }

    #[tokio::test]
    async fn reload_reports_errors_and_forgets_removed_scratchpads() {
        let (mut pads, mut h) = loaded(two_windows(), "[a]\nclass = \"alpha\"\n").await;
        pads.run_command(&mut h.ctx, "show", &args(&["a"])).await.unwrap();
        let errors = pads
            .on_reload(&mut h.ctx, &section("[b]\nanimation = \"up\"\nclass = \"beta\"\n"))
            .await;
        assert!(!errors.is_empty());
        assert!(pads.definitions.is_empty());
        assert!(pads.instances.is_empty());
    }

    #[tokio::test]
    async fn spawned_scratchpad_is_shown_once_its_window_maps() {
        let config = r#"
            [term]
            command = "sleep 30"
            class = "dropterm"
            match_by = "class"
            start_timeout = 5
        "#;
        let (mut pads, mut h) = loaded(MockCompositor::single_monitor(), config).await;
        h.open_window_later("0xt", "dropterm", Duration::from_millis(100));

        pads.run_command(&mut h.ctx, "toggle", &args(&["term"])).await.unwrap();
        let instance = &pads.instances["term"];
        assert_eq!(instance.phase, Phase::Shown);
        assert_eq!(instance.address.as_deref(), Some("0xt"));
        assert!(instance.pid.is_some());
        assert!(h
            .compositor
            .keywords()
            .contains(&"windowrule float,^(dropterm)$".to_string()));

        pads.exit(&mut h.ctx).await.unwrap();
        assert!(pads.instances["term"].pid.is_none());
    }

    #[tokio::test]
    async fn start_timeout_returns_to_unstarted() {
        let config = r#"
            [term]
            command = "sleep 30"
            class = "never"
            match_by = "class"
            start_timeout = 0.5
        "#;
        let (mut pads, mut h) = loaded(MockCompositor::single_monitor(), config).await;
        let err = pads
            .run_command(&mut h.ctx, "show", &args(&["term"]))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("no window appeared for `term`"));
        let instance = &pads.instances["term"];
        assert_eq!(instance.phase, Phase::Unstarted);
        assert!(instance.pid.is_none());
    }

    #[tokio::test]
    async fn eager_scratchpad_starts_hidden_on_load() {
        let config = r#"
            [term]
            command = "sleep 30"
            class = "dropterm"
            match_by = "class"
            lazy = false
            start_timeout = 5
        "#;
        let mut h = PluginHarness::new(PLUGIN_NAME, MockCompositor::single_monitor());
        h.open_window_later("0xt", "dropterm", Duration::from_millis(100));
        let mut pads = Scratchpads::new();
        let errors = pads.on_reload(&mut h.ctx, &section(config)).await;
        assert!(errors.is_empty(), "{:?}", errors);

        let instance = &pads.instances["term"];
        assert_eq!(instance.phase, Phase::Hidden);
        assert_eq!(instance.address.as_deref(), Some("0xt"));
        assert_eq!(
            h.compositor.client("0xt").unwrap().workspace.name,
            "special:scratch_term"
        );

        pads.exit(&mut h.ctx).await.unwrap();
    }

    #[tokio::test]
    async fn failing_command_ends_the_wait_early() {
        let config = r#"
            [broken]
            command = "exit 3"
            class = "never"
            match_by = "class"
            start_timeout = 5
            [quiet]
            command = "true"
            class = "never"
            match_by = "class"
            start_timeout = 5
        "#;
        let (mut pads, mut h) = loaded(MockCompositor::single_monitor(), config).await;

        let started = std::time::Instant::now();
        let err = pads
            .run_command(&mut h.ctx, "show", &args(&["broken"]))
            .await
            .unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(err.to_string(), "the command of `broken` failed with code 3");
        assert_eq!(pads.instances["broken"].phase, Phase::Unstarted);
        assert!(pads.instances["broken"].pid.is_none());

        let err = pads
            .run_command(&mut h.ctx, "show", &args(&["quiet"]))
            .await
            .unwrap_err();
        assert!(err.to_string().ends_with("is it already running?"), "{}", err);
    }

    #[tokio::test]
    async fn closed_window_process_is_stopped_before_restart() {
        let config = r#"
            [term]
            command = "sleep 30"
            class = "dropterm"
            match_by = "class"
            start_timeout = 5
        "#;
        let (mut pads, mut h) = loaded(MockCompositor::single_monitor(), config).await;
        h.open_window_later("0xt", "dropterm", Duration::from_millis(100));
        pads.run_command(&mut h.ctx, "show", &args(&["term"])).await.unwrap();
        let first = pads.instances["term"].pid.unwrap();

        h.compositor.remove_client("0xt");
        pads.handle_event(&mut h.ctx, &CompositorEvent::new("closewindow", "t"))
            .await
            .unwrap();
        assert_eq!(pads.instances["term"].phase, Phase::Closed);

        h.open_window_later("0xu", "dropterm", Duration::from_millis(100));
        pads.run_command(&mut h.ctx, "show", &args(&["term"])).await.unwrap();
        let second = pads.instances["term"].pid.unwrap();
        assert_ne!(first, second);
        assert_eq!(pads.instances["term"].address.as_deref(), Some("0xu"));

        let expected = process::exited_notice("term", first);
        let reaped = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(job) = h.jobs.recv().await {
                if matches!(job, Job::Notice(ref notice) if *notice == expected) {
                    return true;
                }
            }
            false
        })
        .await;
        assert_eq!(reaped.ok(), Some(true));

        pads.exit(&mut h.ctx).await.unwrap();
    }
}
