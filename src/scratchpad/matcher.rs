//! Deciding which client window belongs to a scratchpad.

use crate::hyprland::types::ClientInfo;
use regex::Regex;
use std::collections::HashSet;

/// A text pattern: a plain substring, or a regex when prefixed with `re:`.
///
/// Regexes are anchored at the start of the value.
#[derive(Debug, Clone)]
pub enum Pattern {
    Substring(String),
    Regex(Regex),
}

impl Pattern {
    pub fn parse(text: &str) -> Result<Self, regex::Error> {
        match text.strip_prefix("re:") {
            Some(expr) => Ok(Pattern::Regex(Regex::new(&format!("^(?:{})", expr))?)),
            None => Ok(Pattern::Substring(text.to_string())),
        }
    }

    pub fn matches(&self, value: &str) -> bool {
        match self {
            Pattern::Substring(needle) => value.contains(needle.as_str()),
            Pattern::Regex(re) => re.is_match(value),
        }
    }
}

/// Client property a pattern is tested against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientProperty {
    Class,
    Title,
    InitialClass,
    InitialTitle,
}

impl ClientProperty {
    pub const ALL: [ClientProperty; 4] = [
        ClientProperty::Class,
        ClientProperty::Title,
        ClientProperty::InitialClass,
        ClientProperty::InitialTitle,
    ];

    /// Configuration key naming this property.
    pub fn key(self) -> &'static str {
        match self {
            ClientProperty::Class => "class",
            ClientProperty::Title => "title",
            ClientProperty::InitialClass => "initialClass",
            ClientProperty::InitialTitle => "initialTitle",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.key() == key)
    }

    pub fn value(self, client: &ClientInfo) -> &str {
        match self {
            ClientProperty::Class => &client.class,
            ClientProperty::Title => &client.title,
            ClientProperty::InitialClass => &client.initial_class,
            ClientProperty::InitialTitle => &client.initial_title,
        }
    }
}

/// How a scratchpad recognises its window.
#[derive(Debug, Clone)]
pub enum MatchRule {
    /// The window belongs to the spawned process or one of its descendants.
    Pid,
    Property {
        property: ClientProperty,
        pattern: Pattern,
    },
}

impl MatchRule {
    /// `pids` is the spawned process tree; it is only consulted for
    /// [`MatchRule::Pid`].
    pub fn matches(&self, client: &ClientInfo, pids: &HashSet<u32>) -> bool {
        match self {
            MatchRule::Pid => u32::try_from(client.pid).is_ok_and(|pid| pids.contains(&pid)),
            MatchRule::Property { property, pattern } => pattern.matches(property.value(client)),
        }
    }

    pub fn is_pid(&self) -> bool {
        matches!(self, MatchRule::Pid)
    }
}
