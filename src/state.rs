//! Process-wide shared state.
//!
//! The orchestrator is the only writer: it refreshes the state from an
//! initial compositor snapshot and then from state-bearing events, always
//! *before* those events are routed to plugins.  Plugins only ever hold a
//! [`StateView`], a cheap cloneable read handle.

use crate::traits::{Compositor, CompositorError, CompositorEvent};
use crate::hyprland::types::full_address;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Compositor version, compared to pick version-specific syntax.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse `0.45.2`, `v0.45.2` or `v0.45.2-12-gdeadbee`.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim().trim_start_matches('v');
        let mut parts = text.split('.').map(|part| {
            let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse::<u32>().ok()
        });
        let major = parts.next()??;
        let minor = parts.next()??;
        let patch = parts.next().flatten().unwrap_or(0);
        Some(Self::new(major, minor, patch))
    }

    /// Extract the version from the `j/version` reply.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        ["version", "tag"]
            .iter()
            .filter_map(|key| value.get(*key).and_then(|v| v.as_str()))
            .find_map(Self::parse)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// What hyprmate is attached to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Hyprland,
    /// No compositor reachable; only client-side commands work.
    Standalone,
}

/// Snapshot of everything the orchestrator tracks on behalf of plugins.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SharedState {
    /// Name of the focused workspace.
    pub active_workspace: String,
    /// Name of the focused monitor.
    pub active_monitor: String,
    /// `0x`-prefixed address of the focused window, empty when none.
    pub active_window: String,
    pub environment: Environment,
    /// User variables from `[daemon.variables]`.
    pub variables: BTreeMap<String, String>,
    /// Names of the connected monitors.
    pub monitors: Vec<String>,
    pub version: Version,
}

/// The single writer of the shared state.
pub struct StateWriter {
    inner: Arc<RwLock<SharedState>>,
}

/// Read-only handle on the shared state.
#[derive(Clone)]
pub struct StateView {
    inner: Arc<RwLock<SharedState>>,
}

impl StateWriter {
    pub fn new(initial: SharedState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    /// A new read handle.
    pub fn view(&self) -> StateView {
        StateView {
            inner: self.inner.clone(),
        }
    }

    /// Mutate the state in place.
    pub fn update<R>(&self, f: impl FnOnce(&mut SharedState) -> R) -> R {
        let mut state = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    /// Fold a state-bearing event into the state.  Returns whether anything
    /// was recognized.
    pub fn apply_event(&self, event: &CompositorEvent) -> bool {
        let payload = event.payload.trim();
        self.update(|state| match event.name.as_str() {
            "activewindowv2" => {
                state.active_window = if payload.is_empty() || payload == "," {
                    String::new()
                } else {
                    full_address(payload)
                };
                true
            }
            "workspace" => {
                state.active_workspace = payload.to_string();
                true
            }
            "focusedmon" => {
                if let Some((monitor, workspace)) = payload.split_once(',') {
                    state.active_monitor = monitor.to_string();
                    state.active_workspace = workspace.to_string();
                }
                true
            }
            "monitoradded" => {
                if !state.monitors.iter().any(|m| m == payload) {
                    state.monitors.push(payload.to_string());
                }
                true
            }
            "monitorremoved" => {
                state.monitors.retain(|m| m != payload);
                true
            }
            _ => false,
        })
    }

    /// Take an initial snapshot from the compositor.
    pub async fn refresh_from(&self, compositor: &dyn Compositor) -> Result<(), CompositorError> {
        let workspace = compositor.query("activeworkspace").await?;
        let monitors = compositor.monitors().await?;
        let window = compositor.query("activewindow").await?;
        let version = compositor.query("version").await.ok();

        self.update(|state| {
            if let Some(name) = workspace.get("name").and_then(|v| v.as_str()) {
                state.active_workspace = name.to_string();
            }
            if let Some(focused) = monitors.iter().find(|m| m.focused) {
                state.active_monitor = focused.name.clone();
            }
            state.monitors = monitors.iter().map(|m| m.name.clone()).collect();
            state.active_window = window
                .get("address")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            if let Some(version) = version.as_ref().and_then(Version::from_json) {
                state.version = version;
            }
            state.environment = Environment::Hyprland;
        });
        Ok(())
    }
}

impl StateView {
    /// A consistent copy of the whole state.
    pub fn snapshot(&self) -> SharedState {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn read<R>(&self, f: impl FnOnce(&SharedState) -> R) -> R {
        let state = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    pub fn active_workspace(&self) -> String {
        self.read(|s| s.active_workspace.clone())
    }

    pub fn active_monitor(&self) -> String {
        self.read(|s| s.active_monitor.clone())
    }

    pub fn active_window(&self) -> String {
        self.read(|s| s.active_window.clone())
    }

    pub fn variables(&self) -> BTreeMap<String, String> {
        self.read(|s| s.variables.clone())
    }

    pub fn version(&self) -> Version {
        self.read(|s| s.version)
    }
}
