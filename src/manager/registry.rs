//! Routing tables built from plugin capabilities.
//!
//! Built once per (re)load.  Events fan out to every subscriber; a command
//! name has exactly one owner.  When two plugins claim the same command the
//! first one registered keeps it and the clash is reported as a
//! configuration error.

use crate::plugin::{Capabilities, CommandSpec};
use std::collections::{BTreeMap, HashMap};

/// Owner name used for the orchestrator's built-in commands.
pub const BUILTIN_OWNER: &str = "daemon";

#[derive(Debug, Default)]
pub struct Registry {
    commands: HashMap<String, String>,
    events: HashMap<String, Vec<String>>,
    descriptions: BTreeMap<String, String>,
}

impl Registry {
    /// Build the tables from `(plugin, capabilities)` pairs in registration
    /// order.  Returns the registry and the ambiguity errors found.
    pub fn build<'a>(
        entries: impl IntoIterator<Item = (&'a str, &'a Capabilities)>,
    ) -> (Self, Vec<String>) {
        let mut registry = Self::default();
        let mut errors = Vec::new();
        for (owner, caps) in entries {
            for event in &caps.events {
                let subscribers = registry.events.entry(event.clone()).or_default();
                if !subscribers.iter().any(|s| s == owner) {
                    subscribers.push(owner.to_string());
                }
            }
            for CommandSpec { name, description } in &caps.commands {
                match registry.commands.get(name) {
                    Some(existing) if existing != owner => errors.push(format!(
                        "command `{}` is claimed by both {} and {}; keeping {}",
                        name, existing, owner, existing
                    )),
                    Some(_) => {}
                    None => {
                        registry.commands.insert(name.clone(), owner.to_string());
                        registry
                            .descriptions
                            .insert(name.clone(), description.clone());
                    }
                }
            }
        }
        (registry, errors)
    }

    /// The plugin owning the normalized command `name`.
    pub fn command_owner(&self, name: &str) -> Option<&str> {
        self.commands.get(name).map(String::as_str)
    }

    /// Plugins subscribed to the event `name`, in registration order.
    pub fn subscribers(&self, name: &str) -> &[String] {
        self.events.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// One `name: description` line per command, sorted by name.
    pub fn help(&self) -> String {
        self.descriptions
            .iter()
            .map(|(name, description)| format!("{}: {}", name, description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_commands_and_events() {
        let builtins = Capabilities::new().command("reload", "reload the config");
        let pads = Capabilities::new()
            .command("toggle", "toggle a scratchpad")
            .event("openwindow")
            .event("activewindowv2");
        let special = Capabilities::new()
            .command("toggle-special", "minimize")
            .event("activewindowv2");

        let (registry, errors) = Registry::build([
            (BUILTIN_OWNER, &builtins),
            ("scratchpads", &pads),
            ("toggle_special", &special),
        ]);
        assert!(errors.is_empty());
        assert_eq!(registry.command_owner("toggle"), Some("scratchpads"));
        assert_eq!(registry.command_owner("toggle_special"), Some("toggle_special"));
        assert_eq!(registry.command_owner("reload"), Some(BUILTIN_OWNER));
        assert_eq!(registry.command_owner("bogus"), None);
        assert_eq!(
            registry.subscribers("activewindowv2"),
            &["scratchpads".to_string(), "toggle_special".to_string()]
        );
        assert!(registry.subscribers("workspace").is_empty());
    }

    #[test]
    fn ambiguous_command_is_reported_and_first_wins() {
        let a = Capabilities::new().command("toggle", "a");
        let b = Capabilities::new().command("toggle", "b");
        let (registry, errors) = Registry::build([("first", &a), ("second", &b)]);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("first") && errors[0].contains("second"));
        assert_eq!(registry.command_owner("toggle"), Some("first"));
    }

    #[test]
    fn help_lists_commands_sorted() {
        let caps = Capabilities::new()
            .command("toggle", "toggle a scratchpad")
            .command("attach", "attach the focused window");
        let (registry, _) = Registry::build([("scratchpads", &caps)]);
        assert_eq!(
            registry.help(),
            "attach: attach the focused window\ntoggle: toggle a scratchpad"
        );
    }
}
