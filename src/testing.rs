//! Test doubles shared by the unit tests.

use crate::hyprland::types::{ClientInfo, MonitorInfo, WorkspaceRef};
use crate::manager::queue::{Job, Mailbox};
use crate::plugin::PluginContext;
use crate::state::{SharedState, StateWriter};
use crate::traits::{Compositor, CompositorError, CompositorEvent, NotifyLevel};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

/// A compositor double that records every request and applies the few
/// dispatchers hyprmate uses to its fake window list.
#[derive(Debug, Default)]
pub struct MockCompositor {
    state: Mutex<MockState>,
}

#[derive(Debug, Default)]
struct MockState {
    monitors: Vec<MonitorInfo>,
    clients: Vec<ClientInfo>,
    active_window: String,
    dispatched: Vec<String>,
    keywords: Vec<String>,
    notifications: Vec<String>,
    failing: bool,
}

impl MockCompositor {
    /// One focused 1920×1080 monitor `DP-1` showing workspace `1`.
    pub fn single_monitor() -> Self {
        let mock = Self::default();
        mock.add_monitor("DP-1", 1920, 1080, 0, true, "1");
        mock
    }

    pub fn add_monitor(
        &self,
        name: &str,
        width: u32,
        height: u32,
        x: i32,
        focused: bool,
        ws: &str,
    ) {
        let mut state = self.state.lock().unwrap();
        let id = state.monitors.len() as i64;
        state.monitors.push(MonitorInfo {
            id,
            name: name.into(),
            width,
            height,
            x,
            focused,
            active_workspace: WorkspaceRef {
                id: ws.parse().unwrap_or(0),
                name: ws.into(),
            },
            ..MonitorInfo::default()
        });
    }

    pub fn add_client(&self, address: &str, class: &str, title: &str, pid: i64) {
        let mut state = self.state.lock().unwrap();
        state.clients.push(ClientInfo {
            address: address.into(),
            mapped: true,
            size: [800, 600],
            workspace: WorkspaceRef {
                id: 1,
                name: "1".into(),
            },
            class: class.into(),
            title: title.into(),
            initial_class: class.into(),
            initial_title: title.into(),
            pid,
            ..ClientInfo::default()
        });
    }

    pub fn remove_client(&self, address: &str) {
        self.state.lock().unwrap().clients.retain(|c| c.address != address);
    }

    pub fn set_active_window(&self, address: &str) {
        self.state.lock().unwrap().active_window = address.into();
    }

    /// Make every dispatch fail from now on.
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().unwrap().failing = failing;
    }

    pub fn client(&self, address: &str) -> Option<ClientInfo> {
        let state = self.state.lock().unwrap();
        state.clients.iter().find(|c| c.address == address).cloned()
    }

    pub fn dispatched(&self) -> Vec<String> {
        self.state.lock().unwrap().dispatched.clone()
    }

    pub fn keywords(&self) -> Vec<String> {
        self.state.lock().unwrap().keywords.clone()
    }

    pub fn notifications(&self) -> Vec<String> {
        self.state.lock().unwrap().notifications.clone()
    }

    pub fn clear_log(&self) {
        let mut state = self.state.lock().unwrap();
        state.dispatched.clear();
        state.keywords.clear();
        state.notifications.clear();
    }
}

impl MockState {
    fn client_mut(&mut self, target: &str) -> Option<&mut ClientInfo> {
        let address = target.trim().strip_prefix("address:")?;
        self.clients.iter_mut().find(|c| c.address == address)
    }

    /// Apply the dispatchers whose effect the tests observe.
    fn apply(&mut self, command: &str) {
        let Some((verb, rest)) = command.split_once(' ') else {
            return;
        };
        match verb {
            "movetoworkspacesilent" => {
                if let Some((ws, target)) = rest.split_once(',') {
                    let ws = ws.to_string();
                    if let Some(client) = self.client_mut(target) {
                        client.workspace = WorkspaceRef { id: 0, name: ws };
                    }
                }
            }
            "resizewindowpixel" => {
                if let Some((size, target)) = rest.split_once(',') {
                    let nums: Vec<i32> = size
                        .split_whitespace()
                        .filter_map(|n| n.parse().ok())
                        .collect();
                    if let (Some(client), [w, h]) = (self.client_mut(target), nums.as_slice()) {
                        client.size = [*w, *h];
                    }
                }
            }
            "movewindowpixel" => {
                if let Some((pos, target)) = rest.split_once(',') {
                    let exact = pos.starts_with("exact");
                    let nums: Vec<i32> = pos
                        .split_whitespace()
                        .filter_map(|n| n.parse().ok())
                        .collect();
                    if let (Some(client), [x, y]) = (self.client_mut(target), nums.as_slice()) {
                        client.at = if exact {
                            [*x, *y]
                        } else {
                            [client.at[0] + x, client.at[1] + y]
                        };
                    }
                }
            }
            "focuswindow" => {
                if let Some(address) = rest.trim().strip_prefix("address:") {
                    self.active_window = address.to_string();
                }
            }
            "pin" => {
                if let Some(client) = self.client_mut(rest) {
                    client.pinned = !client.pinned;
                }
            }
            _ => {}
        }
    }
}

#[async_trait]
impl Compositor for MockCompositor {
    async fn dispatch(&self, commands: &[String]) -> Result<(), CompositorError> {
        let mut state = self.state.lock().unwrap();
        if state.failing {
            return Err(CompositorError::Rejected {
                command: commands.join(" ; "),
                reply: "mock failure".into(),
            });
        }
        for command in commands {
            state.dispatched.push(command.clone());
            state.apply(command);
        }
        Ok(())
    }

    async fn keyword(&self, commands: &[String]) -> Result<(), CompositorError> {
        self.state
            .lock()
            .unwrap()
            .keywords
            .extend(commands.iter().cloned());
        Ok(())
    }

    async fn query(&self, what: &str) -> Result<serde_json::Value, CompositorError> {
        let state = self.state.lock().unwrap();
        let value = match what {
            "monitors" => serde_json::to_value(&state.monitors)?,
            "clients" => serde_json::to_value(&state.clients)?,
            "activewindow" => {
                let active = state
                    .clients
                    .iter()
                    .find(|c| c.address == state.active_window);
                match active {
                    Some(client) => serde_json::to_value(client)?,
                    None => serde_json::json!({}),
                }
            }
            "activeworkspace" => match state.monitors.iter().find(|m| m.focused) {
                Some(m) => serde_json::json!({
                    "id": m.active_workspace.id,
                    "name": m.active_workspace.name,
                    "monitor": m.name,
                }),
                None => serde_json::json!({}),
            },
            "version" => serde_json::json!({"tag": "v0.45.2", "version": "0.45.2"}),
            _ => serde_json::json!({}),
        };
        Ok(value)
    }

    async fn notify(&self, _level: NotifyLevel, text: &str) -> Result<(), CompositorError> {
        self.state
            .lock()
            .unwrap()
            .notifications
            .push(text.to_string());
        Ok(())
    }
}

/// A [`PluginContext`] wired to a [`MockCompositor`], with the other ends
/// of its channels kept around for inspection.
pub struct PluginHarness {
    pub compositor: Arc<MockCompositor>,
    pub state: StateWriter,
    pub events: broadcast::Sender<CompositorEvent>,
    pub jobs: mpsc::UnboundedReceiver<Job>,
    pub ctx: PluginContext,
}

impl PluginHarness {
    pub fn new(name: &str, compositor: MockCompositor) -> Self {
        let compositor = Arc::new(compositor);
        let state = StateWriter::new(SharedState::default());
        let (tx, jobs) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(64);
        let ctx = PluginContext::new(
            name,
            state.view(),
            compositor.clone(),
            Mailbox::new(tx),
            events.clone(),
            CancellationToken::new(),
        );
        Self {
            compositor,
            state,
            events,
            jobs,
            ctx,
        }
    }

    /// Map a `class` window at `address` after `delay` and announce it with
    /// an `openwindow` event, like an application finishing its startup.
    pub fn open_window_later(&self, address: &str, class: &str, delay: Duration) {
        let mock = self.compositor.clone();
        let events = self.events.clone();
        let (address, class) = (address.to_string(), class.to_string());
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            mock.add_client(&address, &class, &class, 1);
            let payload = format!("{},1,{},{}", address.trim_start_matches("0x"), class, class);
            let _ = events.send(CompositorEvent::new("openwindow", payload));
        });
    }

    /// Record `address` as the focused window in the shared state.
    pub fn focus(&self, address: &str) {
        self.compositor.set_active_window(address);
        self.state
            .update(|s| s.active_window = address.to_string());
    }
}
