//! Runtime state of one scratchpad.

use super::geometry::CachedGeometry;
use std::collections::HashMap;
use tokio::time::Instant;

/// Lifecycle phase.
///
/// ```text
/// Unstarted ──show──▶ Starting ──window──▶ Hidden ◀──hide── Shown
///     ▲                  │                   └──show──▶ Shown
///     └────timeout───────┘          Shown/Hidden ──closed──▶ Closed
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Unstarted,
    Starting,
    Shown,
    Hidden,
    /// The window or its process went away; the next show starts afresh.
    Closed,
}

#[derive(Debug, Default)]
pub struct Instance {
    pub phase: Phase,
    /// Spawned process, while it runs.
    pub pid: Option<u32>,
    /// Main window address.
    pub address: Option<String>,
    /// Further windows moved along with the main one.
    pub extra: Vec<String>,
    /// Offsets of the extra windows from the main one, taken at hide time.
    pub extra_offsets: HashMap<String, (i32, i32)>,
    /// Monitor and workspace it was last shown on.
    pub monitor: Option<String>,
    pub workspace: Option<String>,
    /// Whether hyprmate pinned the main window.
    pub pinned: bool,
    /// Geometry kept across hides, per monitor name.
    pub cached: HashMap<String, CachedGeometry>,
    /// Scratchpads hidden because this one was shown.
    pub excluded: Vec<String>,
    pub shown_at: Option<Instant>,
    /// Window focused before the last show.
    pub previous_focus: Option<String>,
    pub rules_applied: bool,
}

impl Instance {
    pub fn is_shown(&self) -> bool {
        self.phase == Phase::Shown
    }

    /// Main window first, then the extra ones.
    pub fn addresses(&self) -> Vec<String> {
        self.address
            .iter()
            .chain(self.extra.iter())
            .cloned()
            .collect()
    }

    pub fn owns(&self, address: &str) -> bool {
        self.address.as_deref() == Some(address) || self.extra.iter().any(|a| a == address)
    }

    pub fn is_visible_on(&self, monitor: &str, workspace: &str) -> bool {
        self.is_shown()
            && self.monitor.as_deref() == Some(monitor)
            && self.workspace.as_deref() == Some(workspace)
    }

    /// Forget windows and process and move to `phase`.  Rule and geometry
    /// caches survive.
    pub fn reset(&mut self, phase: Phase) {
        *self = Instance {
            phase,
            cached: std::mem::take(&mut self.cached),
            rules_applied: self.rules_applied,
            ..Instance::default()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ownership_and_visibility() {
        let mut instance = Instance {
            phase: Phase::Shown,
            address: Some("0xa".into()),
            extra: vec!["0xb".into()],
            monitor: Some("DP-1".into()),
            workspace: Some("1".into()),
            ..Instance::default()
        };
        assert!(instance.owns("0xa") && instance.owns("0xb") && !instance.owns("0xc"));
        assert_eq!(instance.addresses(), vec!["0xa", "0xb"]);
        assert!(instance.is_visible_on("DP-1", "1"));
        assert!(!instance.is_visible_on("DP-1", "2"));
        instance.phase = Phase::Hidden;
        assert!(!instance.is_visible_on("DP-1", "1"));
    }

    #[test]
    fn reset_keeps_caches() {
        let mut instance = Instance {
            phase: Phase::Shown,
            pid: Some(42),
            address: Some("0xa".into()),
            rules_applied: true,
            ..Instance::default()
        };
        instance.cached.insert(
            "DP-1".into(),
            CachedGeometry {
                x: 0,
                y: 0,
                width: 10,
                height: 10,
            },
        );
        instance.reset(Phase::Closed);
        assert_eq!(instance.phase, Phase::Closed);
        assert!(instance.pid.is_none() && instance.address.is_none());
        assert!(instance.rules_applied);
        assert_eq!(instance.cached.len(), 1);
    }
}
