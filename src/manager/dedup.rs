//! Collapses bursts of identical compositor events.
//!
//! Hyprland frequently repeats the same event (`activewindowv2` with the same
//! address, `workspace` with the same name) within a few milliseconds.  An
//! event identical in name and payload to one admitted less than `window`
//! ago is dropped.  The window is measured from the admitted event, so a
//! steady stream of duplicates still gets through once per window.

use crate::traits::CompositorEvent;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    recent: HashMap<CompositorEvent, Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            recent: HashMap::new(),
        }
    }

    pub fn set_window(&mut self, window: Duration) {
        self.window = window;
        self.recent.clear();
    }

    /// Whether `event`, arriving at `now`, should be routed.
    pub fn admit(&mut self, event: &CompositorEvent, now: Instant) -> bool {
        if self.window.is_zero() {
            return true;
        }
        let window = self.window;
        self.recent
            .retain(|_, seen| now.saturating_duration_since(*seen) < window);
        if self.recent.contains_key(event) {
            return false;
        }
        self.recent.insert(event.clone(), now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicates_within_window_collapse() {
        let mut debouncer = Debouncer::new(Duration::from_millis(100));
        let t0 = Instant::now();
        let event = CompositorEvent::new("activewindowv2", "abc");

        assert!(debouncer.admit(&event, t0));
        assert!(!debouncer.admit(&event, t0 + Duration::from_millis(10)));
        assert!(!debouncer.admit(&event, t0 + Duration::from_millis(99)));
        assert!(debouncer.admit(&event, t0 + Duration::from_millis(150)));
    }

    #[test]
    fn different_payloads_are_distinct() {
        let mut debouncer = Debouncer::new(Duration::from_millis(100));
        let t0 = Instant::now();
        assert!(debouncer.admit(&CompositorEvent::new("workspace", "1"), t0));
        assert!(debouncer.admit(&CompositorEvent::new("workspace", "2"), t0));
        assert!(debouncer.admit(&CompositorEvent::new("focusedmon", "1"), t0));
    }

    #[test]
    fn zero_window_disables_dedup() {
        let mut debouncer = Debouncer::new(Duration::ZERO);
        let t0 = Instant::now();
        let event = CompositorEvent::new("workspace", "1");
        assert!(debouncer.admit(&event, t0));
        assert!(debouncer.admit(&event, t0));
    }
}
