//! Application configuration.
//!
//! The configuration is a TOML file, by default
//! `$XDG_CONFIG_HOME/hypr/hyprmate.toml`.  The `[daemon]` section belongs to
//! the orchestrator; every other top-level table is handed verbatim to the
//! plugin of the same name, which validates it itself.
//!
//! # Example
//!
//! ```toml
//! [daemon]
//! plugins = ["scratchpads", "toggle_special"]
//! dedup_window_ms = 100
//! include = ["~/.config/hypr/hyprmate.d"]
//!
//! [daemon.variables]
//! term_classed = "kitty --class"
//!
//! [scratchpads.term]
//! command = "[term_classed] kitty-dropterm"
//! class = "kitty-dropterm"
//! size = "75% 60%"
//! animation = "fromTop"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Name of the orchestrator's own section.
pub const DAEMON_SECTION: &str = "daemon";

/// Top-level configuration.
///
/// Every field is optional: an empty file is valid and the daemon section
/// falls back to its compiled-in defaults.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Orchestrator settings.
    pub daemon: DaemonConfig,
    /// Every top-level table as parsed, includes merged in.
    pub sections: toml::Table,
}

/// The `[daemon]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Plugins to load, in registration order.
    pub plugins: Vec<String>,
    /// Identical events arriving within this window collapse into one (ms).
    pub dedup_window_ms: u64,
    /// Extra files, or directories of `*.toml` files, merged into this one.
    pub include: Vec<String>,
    /// Values substituted for `[name]` tokens in launch commands.
    pub variables: BTreeMap<String, String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            plugins: Vec::new(),
            dedup_window_ms: 100,
            include: Vec::new(),
            variables: BTreeMap::new(),
        }
    }
}

/// Error from loading or parsing a configuration file.
#[derive(Debug, thiserror::Error)]
#[error("config error: {0}")]
pub struct ConfigError(String);

impl Config {
    /// Load configuration from a TOML file at `path`, merging includes.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut table = read_table(path)?;
        for include in include_list(&table) {
            for file in expand_include(&include)? {
                let extra = read_table(&file)?;
                merge_tables(&mut table, extra);
            }
        }
        Self::from_table(table)
    }

    /// Parse configuration from TOML text. Includes are not followed.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let table: toml::Table = text
            .parse()
            .map_err(|e| ConfigError(format!("failed to parse: {}", e)))?;
        Self::from_table(table)
    }

    /// Build a configuration from an already merged table.
    pub fn from_table(sections: toml::Table) -> Result<Self, ConfigError> {
        let daemon = match sections.get(DAEMON_SECTION) {
            Some(value) => value
                .clone()
                .try_into::<DaemonConfig>()
                .map_err(|e| ConfigError(format!("invalid [{}] section: {}", DAEMON_SECTION, e)))?,
            None => DaemonConfig::default(),
        };
        Ok(Self { daemon, sections })
    }

    /// A copy of the section named `name`, or an empty table.
    pub fn section(&self, name: &str) -> toml::Table {
        match self.sections.get(name) {
            Some(toml::Value::Table(table)) => table.clone(),
            _ => toml::Table::new(),
        }
    }

    /// The effective configuration as JSON, for `dumpjson`.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.sections).unwrap_or(serde_json::Value::Null)
    }
}

/// Default configuration path: `$XDG_CONFIG_HOME/hypr/hyprmate.toml`.
pub fn default_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME").unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        format!("{}/.config", home)
    });
    PathBuf::from(base).join("hypr").join("hyprmate.toml")
}

/// Expand a leading `~/` to `$HOME`.
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(path),
    }
}

/// Replace `[name]` tokens in `text` with the matching variable.
///
/// Unknown names are left as they are, brackets included.
pub fn apply_variables(text: &str, variables: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find('[') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find(']') {
            Some(close) if is_variable_name(&after[..close]) => {
                let name = &after[..close];
                match variables.get(name) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push('[');
                        out.push_str(name);
                        out.push(']');
                    }
                }
                rest = &after[close + 1..];
            }
            _ => {
                out.push('[');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn is_variable_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn read_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| ConfigError(format!("failed to read {}: {}", path.display(), e)))?;
    contents
        .parse()
        .map_err(|e| ConfigError(format!("failed to parse {}: {}", path.display(), e)))
}

fn include_list(table: &toml::Table) -> Vec<String> {
    table
        .get(DAEMON_SECTION)
        .and_then(|daemon| daemon.get("include"))
        .and_then(|include| include.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// A file include yields itself; a directory yields its `*.toml` files in
/// name order.
fn expand_include(include: &str) -> Result<Vec<PathBuf>, ConfigError> {
    let path = expand_home(include);
    if !path.is_dir() {
        return Ok(vec![path]);
    }
    let entries = std::fs::read_dir(&path)
        .map_err(|e| ConfigError(format!("failed to list {}: {}", path.display(), e)))?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    files.sort();
    Ok(files)
}

/// Deep-merge `overlay` into `base`; on conflicts the overlay wins.
pub fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        if let (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) =
            (base.get_mut(&key), &value)
        {
            merge_tables(existing, incoming.clone());
            continue;
        }
        base.insert(key, value);
    }
}
