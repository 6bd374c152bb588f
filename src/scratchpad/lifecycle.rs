//! Show, hide and toggle: the scratchpad state machine.

use super::definition::{ScratchpadDefinition, ScratchpadOptions};
use super::instance::Phase;
use super::matcher::MatchRule;
use super::rules::{hidden_workspace, window_rules};
use super::{process, ScratchpadError, Scratchpads, HIDDEN_PREFIX, TERMINATE_GRACE};
use crate::config::apply_variables;
use crate::hyprland::types::{ClientInfo, MonitorInfo};
use crate::plugin::PluginContext;
use crate::traits::CompositorEvent;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tokio::time::{Instant, MissedTickBehavior};

/// How often the client list is polled while waiting for a new window.
const WINDOW_POLL: Duration = Duration::from_millis(250);

/// Why a scratchpad is being hidden.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum HideMode {
    /// A client asked for it.
    Requested,
    /// Focus moved away from it.
    Unfocused,
    /// Another scratchpad excluding it is being shown.
    Excluded,
    /// Its monitor went away.
    Detached,
}

pub(super) fn unfocus_timer(name: &str) -> String {
    format!("unfocus:{}", name)
}

/// The monitor `definition` shows on: the forced one if connected, the
/// focused one otherwise.
async fn target_monitor(
    ctx: &PluginContext,
    definition: &ScratchpadDefinition,
) -> Result<MonitorInfo, ScratchpadError> {
    if let Some(forced) = definition.options.force_monitor.as_deref() {
        if let Some(monitor) = ctx.compositor.monitor(Some(forced)).await? {
            return Ok(monitor);
        }
        warn!(
            "[{}] monitor {} for {} is not connected, using the focused one",
            ctx.name, forced, definition.name
        );
    }
    ctx.compositor
        .monitor(None)
        .await?
        .ok_or_else(|| ScratchpadError::NoMonitor(definition.name.clone()))
}

async fn find_window(
    ctx: &PluginContext,
    rule: &MatchRule,
    root: Option<u32>,
    taken: &HashSet<String>,
) -> Result<Option<ClientInfo>, ScratchpadError> {
    let pids = root.map(process::process_tree).unwrap_or_default();
    Ok(ctx
        .compositor
        .clients()
        .await?
        .into_iter()
        .find(|c| c.mapped && !taken.contains(&c.address) && rule.matches(c, &pids)))
}

/// The error for a child that exited before its window showed up.
fn exit_error(name: &str, code: Option<i32>) -> ScratchpadError {
    match code {
        Some(0) => ScratchpadError::CommandEnded(name.to_string()),
        Some(code) => ScratchpadError::CommandFailed {
            name: name.to_string(),
            code,
        },
        None => ScratchpadError::CommandKilled(name.to_string()),
    }
}

/// Wait until a window matching `rule` exists.
///
/// Woken by `openwindow` events and by a slow poll of the client list, so
/// a window that appeared before the subscription is still found.  With
/// `exited`, the wait also ends as soon as the launched process is gone.
#[allow(clippy::too_many_arguments)]
async fn wait_for_window(
    ctx: &PluginContext,
    events: &mut broadcast::Receiver<CompositorEvent>,
    exited: Option<oneshot::Receiver<Option<i32>>>,
    name: &str,
    rule: &MatchRule,
    root: Option<u32>,
    taken: &HashSet<String>,
    timeout: Duration,
) -> Result<ClientInfo, ScratchpadError> {
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);
    let mut poll = tokio::time::interval(WINDOW_POLL);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut listening = true;
    let exit = async move {
        match exited {
            Some(rx) => rx.await.ok(),
            None => std::future::pending::<Option<Option<i32>>>().await,
        }
    };
    tokio::pin!(exit);
    let mut watching = true;
    loop {
        tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(ScratchpadError::Cancelled(name.to_string())),
            _ = &mut deadline => {
                return Err(ScratchpadError::StartTimeout {
                    name: name.to_string(),
                    timeout,
                })
            }
            _ = poll.tick() => {}
            status = &mut exit, if watching => {
                watching = false;
                if let Some(code) = status {
                    // Last look: the window may have mapped right before the exit.
                    return match find_window(ctx, rule, root, taken).await? {
                        Some(client) => Ok(client),
                        None => Err(exit_error(name, code)),
                    };
                }
                continue;
            }
            received = events.recv(), if listening => match received {
                Ok(event) if event.name != "openwindow" => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    listening = false;
                    continue;
                }
                _ => {}
            },
        }
        if let Some(client) = find_window(ctx, rule, root, taken).await? {
            return Ok(client);
        }
    }
}

impl Scratchpads {
    fn definition(&self, name: &str) -> Result<&ScratchpadDefinition, ScratchpadError> {
        self.definitions
            .get(name)
            .ok_or_else(|| ScratchpadError::Unknown(name.to_string()))
    }

    /// Addresses owned by any scratchpad.
    fn taken_addresses(&self) -> HashSet<String> {
        self.instances
            .values()
            .flat_map(|instance| instance.addresses())
            .collect()
    }

    /// Toggle `names`.  The first one decides the direction: if it is
    /// visible here all of them are hidden, otherwise all are shown.
    pub(super) async fn toggle(
        &mut self,
        ctx: &mut PluginContext,
        names: &[String],
    ) -> Result<(), ScratchpadError> {
        for name in names {
            self.definition(name)?;
        }
        let Some(first) = names.first() else {
            return Ok(());
        };
        let hide = self.is_visible_here(ctx, first).await?;
        for name in names {
            if !hide {
                self.show(ctx, name).await?;
            } else if self.instance(name).is_shown() {
                self.hide(ctx, name, HideMode::Requested).await?;
            }
        }
        Ok(())
    }

    /// Whether `name` is shown where the user is looking.
    ///
    /// With `alt_toggle` any monitor's visible workspace counts, otherwise
    /// only the monitor the scratchpad would be shown on.
    async fn is_visible_here(
        &self,
        ctx: &PluginContext,
        name: &str,
    ) -> Result<bool, ScratchpadError> {
        let definition = self.definition(name)?;
        let Some(instance) = self.instances.get(name).filter(|i| i.is_shown()) else {
            return Ok(false);
        };
        if definition.options.alt_toggle {
            let Some(workspace) = instance.workspace.as_deref() else {
                return Ok(false);
            };
            return Ok(ctx.compositor.monitors().await?.iter().any(|m| {
                m.active_workspace.name == workspace || m.special_workspace.name == workspace
            }));
        }
        let monitor = target_monitor(ctx, definition).await?;
        let options = definition.options_for(&monitor.name);
        let workspace = monitor.target_workspace(options.allow_special_workspaces, HIDDEN_PREFIX);
        Ok(instance.is_visible_on(&monitor.name, workspace))
    }

    /// Show `name` on the target monitor's active workspace, starting it
    /// first if needed.  Showing where it is already visible does nothing.
    pub(super) async fn show(
        &mut self,
        ctx: &mut PluginContext,
        name: &str,
    ) -> Result<(), ScratchpadError> {
        let definition = self.definition(name)?.clone();
        ctx.timers.cancel(&unfocus_timer(name));
        let monitor = target_monitor(ctx, &definition).await?;
        let opts = definition.options_for(&monitor.name).clone();
        let workspace = monitor
            .target_workspace(opts.allow_special_workspaces, HIDDEN_PREFIX)
            .to_string();
        if self.instance(name).is_visible_on(&monitor.name, &workspace) {
            debug!("[{}] {} is already shown", ctx.name, name);
            return Ok(());
        }
        self.last_used = Some(name.to_string());
        let moving = self.instance(name).is_shown();

        let address = self.ensure_alive(ctx, name, &opts, &monitor).await?;
        let Some(client) = ctx.compositor.client_by_address(&address).await? else {
            self.instance(name).reset(Phase::Closed);
            return Err(ScratchpadError::WindowGone(name.to_string()));
        };
        if opts.multi {
            self.collect_windows(ctx, name, &opts).await?;
        }
        if !moving {
            self.hide_excluded(ctx, name, &opts).await;
        }

        let focused = ctx.state.active_window();
        let cached = if opts.preserve_aspect {
            self.instance(name).cached.get(&monitor.name).copied()
        } else {
            None
        };
        let plan = opts
            .geometry
            .plan_show(&monitor, (client.size[0], client.size[1]), cached);

        let instance = self.instance(name);
        let target = format!("address:{}", address);
        let mut commands = Vec::new();
        if instance.pinned {
            commands.push(format!("pin {}", target));
            instance.pinned = false;
        }
        if let (Some((x, y)), false) = (plan.start, moving) {
            commands.push(format!("movewindowpixel exact {} {},{}", x, y, target));
        }
        commands.push(format!("movetoworkspacesilent {},{}", workspace, target));
        if let Some((width, height)) = plan.size {
            commands.push(format!("resizewindowpixel exact {} {},{}", width, height, target));
        }
        let (x, y) = plan.position;
        commands.push(format!("movewindowpixel exact {} {},{}", x, y, target));
        commands.push(format!("alterzorder top,{}", target));
        for extra in &instance.extra {
            let (dx, dy) = instance.extra_offsets.get(extra).copied().unwrap_or_default();
            commands.push(format!("movetoworkspacesilent {},address:{}", workspace, extra));
            commands.push(format!("movewindowpixel exact {} {},address:{}", x + dx, y + dy, extra));
        }
        commands.push(format!("focuswindow {}", target));
        let pin = opts.pinned && !client.pinned;
        if pin {
            commands.push(format!("pin {}", target));
        }
        ctx.compositor.dispatch(&commands).await?;

        let instance = self.instance(name);
        instance.phase = Phase::Shown;
        instance.monitor = Some(monitor.name.clone());
        instance.workspace = Some(workspace.clone());
        instance.shown_at = Some(Instant::now());
        instance.pinned = pin;
        if !moving {
            instance.previous_focus = Some(focused).filter(|f| !f.is_empty() && !instance.owns(f));
        }
        info!("[{}] showing {} on {} ({})", ctx.name, name, monitor.name, workspace);
        Ok(())
    }

    /// Hide `name` into its special workspace, or close it with
    /// `close_on_hide`.
    pub(super) async fn hide(
        &mut self,
        ctx: &mut PluginContext,
        name: &str,
        mode: HideMode,
    ) -> Result<(), ScratchpadError> {
        let definition = self.definition(name)?.clone();
        ctx.timers.cancel(&unfocus_timer(name));
        let instance = self.instance(name);
        if !instance.is_shown() {
            return match mode {
                HideMode::Requested => Err(ScratchpadError::NotVisible(name.to_string())),
                _ => Ok(()),
            };
        }
        let monitor_name = instance.monitor.clone().unwrap_or_default();
        let opts = definition.options_for(&monitor_name).clone();
        let addresses = instance.addresses();
        let main = instance.address.clone().unwrap_or_default();
        let was_pinned = instance.pinned;
        let excluded = std::mem::take(&mut instance.excluded);
        let previous_focus = instance.previous_focus.take();
        instance.phase = Phase::Hidden;
        instance.pinned = false;

        let monitor = ctx.compositor.monitor(Some(&monitor_name)).await?;
        let clients = ctx.compositor.clients().await?;
        let main_client = clients.iter().find(|c| c.address == main);

        let instance = self.instance(name);
        if let (Some(main_client), Some(monitor)) = (main_client, &monitor) {
            if opts.preserve_aspect {
                instance.cached.insert(
                    monitor.name.clone(),
                    super::geometry::CachedGeometry {
                        x: main_client.at[0] - monitor.x,
                        y: main_client.at[1] - monitor.y,
                        width: main_client.size[0],
                        height: main_client.size[1],
                    },
                );
            }
            let extra = instance.extra.clone();
            for client in clients.iter().filter(|c| extra.contains(&c.address)) {
                instance.extra_offsets.insert(
                    client.address.clone(),
                    (client.at[0] - main_client.at[0], client.at[1] - main_client.at[1]),
                );
            }
        }

        let mut commands = Vec::new();
        if was_pinned {
            commands.push(format!("pin address:{}", main));
        }
        let slide = match (main_client, &monitor) {
            (Some(c), Some(m)) => opts.geometry.slide_vector(m, (c.size[0], c.size[1])),
            _ => None,
        };
        if let Some((dx, dy)) = slide {
            for address in &addresses {
                commands.push(format!("movewindowpixel {} {},address:{}", dx, dy, address));
            }
        }
        if !commands.is_empty() {
            ctx.compositor.dispatch(&commands).await?;
        }
        if !opts.hide_delay.is_zero() {
            tokio::time::sleep(opts.hide_delay).await;
        }

        if opts.close_on_hide {
            let commands: Vec<String> = addresses
                .iter()
                .map(|a| format!("closewindow address:{}", a))
                .collect();
            ctx.compositor.dispatch(&commands).await?;
            let pid = self.instance(name).pid;
            if let Some(pid) = pid {
                process::terminate(pid, TERMINATE_GRACE).await;
            }
            self.instance(name).reset(Phase::Closed);
        } else {
            let hidden = hidden_workspace(name);
            let commands: Vec<String> = addresses
                .iter()
                .map(|a| format!("movetoworkspacesilent {},address:{}", hidden, a))
                .collect();
            ctx.compositor.dispatch(&commands).await?;
        }
        info!("[{}] hid {}", ctx.name, name);

        if mode == HideMode::Requested && opts.smart_focus {
            if let Some(previous) = previous_focus {
                let still_there = clients.iter().any(|c| c.address == previous);
                if still_there && !addresses.contains(&previous) {
                    ctx.compositor
                        .dispatch(&[format!("focuswindow address:{}", previous)])
                        .await?;
                }
            }
        }
        if opts.restore_excluded && mode != HideMode::Excluded && !excluded.is_empty() {
            self.restore(ctx, excluded).await;
        }
        Ok(())
    }

    /// Show again the scratchpads hidden on our behalf.
    fn restore<'a>(
        &'a mut self,
        ctx: &'a mut PluginContext,
        names: Vec<String>,
    ) -> BoxFuture<'a, ()> {
        async move {
            for name in names {
                if let Err(e) = self.show(ctx, &name).await {
                    warn!("[{}] could not restore {}: {}", ctx.name, name, e);
                }
            }
        }
        .boxed()
    }

    /// Hide the visible scratchpads `opts` excludes, remembering them when
    /// they should come back.
    async fn hide_excluded(
        &mut self,
        ctx: &mut PluginContext,
        name: &str,
        opts: &ScratchpadOptions,
    ) {
        let victims: Vec<String> = self
            .instances
            .iter()
            .filter(|(other, instance)| {
                other.as_str() != name && instance.is_shown() && opts.excludes.contains(other)
            })
            .map(|(other, _)| other.clone())
            .collect();
        for victim in victims {
            match self.hide(ctx, &victim, HideMode::Excluded).await {
                Ok(()) if opts.restore_excluded => self.instance(name).excluded.push(victim),
                Ok(()) => {}
                Err(e) => warn!("[{}] could not hide {}: {}", ctx.name, victim, e),
            }
        }
    }

    /// Make sure `name` has a live window and return its address.
    pub(super) async fn ensure_alive(
        &mut self,
        ctx: &mut PluginContext,
        name: &str,
        opts: &ScratchpadOptions,
        monitor: &MonitorInfo,
    ) -> Result<String, ScratchpadError> {
        if let Some(address) = self.instance(name).address.clone() {
            if ctx.compositor.client_by_address(&address).await?.is_some() {
                return Ok(address);
            }
            warn!("[{}] window of {} is gone", ctx.name, name);
            let instance = self.instance(name);
            let pid = instance.pid;
            instance.reset(Phase::Closed);
            instance.pid = pid;
        }
        // Without a window the process, if any, is a leftover.
        if let Some(pid) = self.instance(name).pid.take() {
            debug!("[{}] stopping leftover process {} of {}", ctx.name, pid, name);
            process::terminate(pid, TERMINATE_GRACE).await;
        }

        if opts.command.is_some() {
            self.apply_rules(ctx, name, opts, monitor).await;
        }
        if opts.command.is_none() || !opts.process_tracking {
            let taken = self.taken_addresses();
            if let Some(client) = find_window(ctx, &opts.matching, None, &taken).await? {
                debug!("[{}] {} adopts window {}", ctx.name, name, client.address);
                let instance = self.instance(name);
                instance.address = Some(client.address.clone());
                instance.phase = Phase::Hidden;
                return Ok(client.address);
            }
        }
        match opts.command.as_deref() {
            Some(command) => self.start(ctx, name, command, opts).await,
            None => Err(ScratchpadError::NoWindow(name.to_string())),
        }
    }

    /// Spawn the command of `name` and wait for its window.
    async fn start(
        &mut self,
        ctx: &mut PluginContext,
        name: &str,
        command: &str,
        opts: &ScratchpadOptions,
    ) -> Result<String, ScratchpadError> {
        let command = apply_variables(command, &ctx.state.variables());
        // Subscribe before spawning so a fast window is not missed.
        let mut events = ctx.subscribe();
        let child = process::spawn(name, &command, &ctx.mailbox)?;
        let pid = child.pid;
        let instance = self.instance(name);
        instance.phase = Phase::Starting;
        instance.pid = Some(pid);

        let taken = self.taken_addresses();
        // Untracked commands may hand the window to another process and exit.
        let (root, exited) = if opts.process_tracking {
            (Some(pid), Some(child.exited))
        } else {
            (None, None)
        };
        let found = wait_for_window(
            ctx,
            &mut events,
            exited,
            name,
            &opts.matching,
            root,
            &taken,
            opts.start_timeout,
        )
        .await;
        match found {
            Ok(client) => {
                info!("[{}] {} started with window {}", ctx.name, name, client.address);
                let instance = self.instance(name);
                instance.address = Some(client.address.clone());
                instance.phase = Phase::Hidden;
                Ok(client.address)
            }
            Err(e) => {
                warn!("[{}] {}: {}", ctx.name, name, e);
                process::terminate(pid, TERMINATE_GRACE).await;
                self.instance(name).reset(Phase::Unstarted);
                Err(e)
            }
        }
    }

    /// Adopt further windows matching `name` that nobody owns yet.
    async fn collect_windows(
        &mut self,
        ctx: &PluginContext,
        name: &str,
        opts: &ScratchpadOptions,
    ) -> Result<(), ScratchpadError> {
        let taken = self.taken_addresses();
        let root = self.instance(name).pid.filter(|_| opts.matching.is_pid());
        let pids = root.map(process::process_tree).unwrap_or_default();
        if opts.matching.is_pid() && pids.is_empty() {
            return Ok(());
        }
        let found: Vec<String> = ctx
            .compositor
            .clients()
            .await?
            .into_iter()
            .filter(|c| c.mapped && !taken.contains(&c.address) && opts.matching.matches(c, &pids))
            .map(|c| c.address)
            .collect();
        if !found.is_empty() {
            debug!("[{}] {} gathers {:?}", ctx.name, name, found);
            self.instance(name).extra.extend(found);
        }
        Ok(())
    }

    /// Send the window rules of `name` unless they are already in place.
    pub(super) async fn apply_rules(
        &mut self,
        ctx: &PluginContext,
        name: &str,
        opts: &ScratchpadOptions,
        monitor: &MonitorInfo,
    ) {
        if self.instance(name).rules_applied {
            return;
        }
        let Some(class) = opts.class.as_deref() else {
            return;
        };
        let class = class.strip_prefix("re:").unwrap_or(class);
        let lines = window_rules(name, class, opts, monitor, ctx.state.version());
        match ctx.compositor.keyword(&lines).await {
            Ok(()) => self.instance(name).rules_applied = true,
            Err(e) => warn!("[{}] window rules for {} failed: {}", ctx.name, name, e),
        }
    }
}
