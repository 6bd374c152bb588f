//! Scratchpad definitions parsed from the `[scratchpads.<name>]` tables.
//!
//! Parsing is lenient in the way the daemon reload needs it: unknown keys
//! are reported but the entry still loads, while an entry with an invalid
//! value is reported and skipped so the remaining ones keep working.

use super::geometry::{Animation, GeometryRules, Length, Pair};
use super::matcher::{ClientProperty, MatchRule, Pattern};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use toml::Value;

const KNOWN_KEYS: &[&str] = &[
    "command",
    "class",
    "title",
    "initialClass",
    "initialTitle",
    "match_by",
    "process_tracking",
    "size",
    "max_size",
    "position",
    "margin",
    "offset",
    "animation",
    "lazy",
    "pinned",
    "multi",
    "excludes",
    "restore_excluded",
    "unfocus",
    "hysteresis",
    "preserve_aspect",
    "hide_delay",
    "force_monitor",
    "alt_toggle",
    "allow_special_workspaces",
    "smart_focus",
    "close_on_hide",
    "skip_windowrules",
    "start_timeout",
    "use",
    "monitor",
];

/// Keys a per-monitor override may not change.
const NOT_OVERRIDABLE: &[&str] = &["command", "use", "monitor"];

const SKIPPABLE_RULES: &[&str] = &["aspect", "float", "workspace"];

/// Which other scratchpads to hide while this one is shown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Excludes {
    #[default]
    None,
    All,
    Names(Vec<String>),
}

impl Excludes {
    pub fn contains(&self, name: &str) -> bool {
        match self {
            Excludes::None => false,
            Excludes::All => true,
            Excludes::Names(names) => names.iter().any(|n| n == name),
        }
    }
}

/// Fully resolved options of one scratchpad on one monitor.
#[derive(Debug, Clone)]
pub struct ScratchpadOptions {
    /// Shell command; `None` for an unmanaged scratchpad adopting an
    /// existing window.
    pub command: Option<String>,
    /// Class used for window rules.
    pub class: Option<String>,
    pub matching: MatchRule,
    pub process_tracking: bool,
    pub geometry: GeometryRules,
    pub lazy: bool,
    pub pinned: bool,
    pub multi: bool,
    pub excludes: Excludes,
    pub restore_excluded: bool,
    pub unfocus_hide: bool,
    pub hysteresis: Duration,
    pub preserve_aspect: bool,
    pub hide_delay: Duration,
    pub force_monitor: Option<String>,
    pub alt_toggle: bool,
    pub allow_special_workspaces: bool,
    pub smart_focus: bool,
    pub close_on_hide: bool,
    pub skip_windowrules: Vec<String>,
    pub start_timeout: Duration,
}

impl ScratchpadOptions {
    pub fn skips_rule(&self, rule: &str) -> bool {
        self.skip_windowrules.iter().any(|r| r == rule)
    }
}

/// A named scratchpad with its per-monitor variants.
#[derive(Debug, Clone)]
pub struct ScratchpadDefinition {
    pub name: String,
    pub options: ScratchpadOptions,
    pub per_monitor: BTreeMap<String, ScratchpadOptions>,
}

impl ScratchpadDefinition {
    /// Options in effect on `monitor`.
    pub fn options_for(&self, monitor: &str) -> &ScratchpadOptions {
        self.per_monitor.get(monitor).unwrap_or(&self.options)
    }
}

/// Parse every scratchpad of `section`.  Returns the valid definitions and
/// the errors found along the way.
pub fn parse_section(
    section: &toml::Table) -> (BTreeMap<String,
    ScratchpadDefinition>, Vec<String>,
) {
    let mut definitions = BTreeMap::new();
    let mut errors = Vec::new();
    for (name, value) in section {
        if !value.is_table() {
            errors.push(format!("scratchpad `{}`: expected a table", name));
            continue;
        }
        if !is_valid_name(name) {
            errors.push(format!(
                "scratchpad `{}`: names may only contain letters, digits, `_` and `-`",
                name
            ));
            errors.push(format!("scratchpad `{}` skipped", name));
            continue;
        }
        match parse_definition(name, section, &mut errors) {
            Ok(definition) => {
                definitions.insert(name.clone(), definition);
            }
            Err(mut found) => {
                found.push(format!("scratchpad `{}` skipped", name));
                errors.append(&mut found);
            }
        }
    }
    (definitions, errors)
}

/// Names end up in special workspace names.
fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn parse_definition(
    name: &str,
    section: &toml::Table,
    warnings: &mut Vec<String>,
) -> Result<ScratchpadDefinition, Vec<String>> {
    let raw = resolve_use(name, section, &mut Vec::new()).map_err(|e| vec![e])?;
    for key in raw.keys() {
        if !KNOWN_KEYS.contains(&key.as_str()) {
            warnings.push(format!("scratchpad `{}`: unknown option `{}`", name, key));
        }
    }

    let mut errors = Vec::new();
    let options = parse_options(name, &raw, &mut errors);
    let mut per_monitor = BTreeMap::new();
    if let Some(monitors) = raw.get("monitor") {
        match monitors.as_table() {
            Some(monitors) => {
                for (monitor, overrides) in monitors {
                    let Some(overrides) = overrides.as_table() else {
                        errors.push(format!("{}.monitor.{}: expected a table", name, monitor));
                        continue;
                    };
                    let mut merged = raw.clone();
                    for (key, value) in overrides {
                        if NOT_OVERRIDABLE.contains(&key.as_str()) {
                            errors.push(format!(
                                "{}.monitor.{}: `{}` cannot be overridden per monitor",
                                name, monitor, key
                            ));
                        } else {
                            merged.insert(key.clone(), value.clone());
                        }
                    }
                    let context = format!("{}.monitor.{}", name, monitor);
                    if let Some(opts) = parse_options(&context, &merged, &mut errors) {
                        per_monitor.insert(monitor.clone(), opts);
                    }
                }
            }
            None => errors.push(format!("{}.monitor: expected a table", name)),
        }
    }

    match options {
        Some(options) if errors.is_empty() => Ok(ScratchpadDefinition {
            name: name.to_string(),
            options,
            per_monitor,
        }),
        _ => Err(errors),
    }
}

/// Merge the `use` chain of `name`: referenced definitions supply defaults,
/// the entry's own keys win.
fn resolve_use(
    name: &str,
    section: &toml::Table,
    visiting: &mut Vec<String>,
) -> Result<toml::Table, String> {
    if visiting.iter().any(|v| v == name) {
        visiting.push(name.to_string());
        return Err(format!("`use` cycle: {}", visiting.join(" -> ")));
    }
    let own = section
        .get(name)
        .and_then(Value::as_table)
        .ok_or_else(|| format!("`use` refers to unknown scratchpad `{}`", name))?;
    visiting.push(name.to_string());

    let parents: Vec<String> = match own.get("use") {
        None => Vec::new(),
        Some(Value::String(parent)) => parent
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| format!("{}.use: expected strings", name))
            })
            .collect::<Result<_, _>>()?,
        Some(_) => return Err(format!("{}.use: expected a string or a list", name)),
    };

    let mut merged = toml::Table::new();
    for parent in parents {
        let inherited = resolve_use(&parent, section, visiting)?;
        merged.extend(inherited);
    }
    visiting.pop();
    merged.remove("use");
    merged.extend(own.clone());
    Ok(merged)
}

/// Typed accessors over one raw table that collect type errors.
struct Fields<'a> {
    context: &'a str,
    table: &'a toml::Table,
    errors: &'a mut Vec<String>,
}

impl Fields<'_> {
    fn error(&mut self, key: &str, message: impl std::fmt::Display) {
        self.errors
            .push(format!("{}.{}: {}", self.context, key, message));
    }

    fn string(&mut self, key: &str) -> Option<String> {
        let table = self.table;
        match table.get(key)? {
            Value::String(s) => Some(s.clone()),
            _ => {
                self.error(key, "expected a string");
                None
            }
        }
    }

    fn boolean(&mut self, key: &str, default: bool) -> bool {
        let table = self.table;
        match table.get(key) {
            None => default,
            Some(Value::Boolean(b)) => *b,
            Some(_) => {
                self.error(key, "expected a boolean");
                default
            }
        }
    }

    fn seconds(&mut self, key: &str, default: f64) -> Duration {
        let table = self.table;
        let secs = match table.get(key) {
            None => default,
            Some(Value::Float(f)) => *f,
            Some(Value::Integer(i)) => *i as f64,
            Some(_) => {
                self.error(key, "expected a number of seconds");
                default
            }
        };
        if secs.is_finite() && secs >= 0.0 {
            Duration::from_secs_f64(secs)
        } else {
            self.error(key, "must not be negative");
            Duration::from_secs_f64(default)
        }
    }

    fn strings(&mut self, key: &str) -> Vec<String> {
        let table = self.table;
        match table.get(key) {
            None => Vec::new(),
            Some(Value::String(s)) => vec![s.clone()],
            Some(Value::Array(items)) => {
                let names: Option<Vec<String>> =
                    items.iter().map(|v| v.as_str().map(str::to_string)).collect();
                names.unwrap_or_else(|| {
                    self.error(key, "expected a list of strings");
                    Vec::new()
                })
            }
            Some(_) => {
                self.error(key, "expected a list of strings");
                Vec::new()
            }
        }
    }

    fn pair(&mut self, key: &str) -> Option<Pair> {
        let text = self.string(key)?;
        Pair::parse(&text)
            .map_err(|e| self.error(key, e))
            .ok()
    }

    fn length(&mut self, key: &str, default: Length) -> Length {
        let table = self.table;
        match table.get(key) {
            None => default,
            Some(Value::Integer(px)) => Length::Pixels(*px as i32),
            Some(Value::String(text)) => Length::parse(text).unwrap_or_else(|e| {
                self.error(key, e);
                default
            }),
            Some(_) => {
                self.error(key, "expected pixels or a length string");
                default
            }
        }
    }
}

fn parse_options(
    context: &str,
    table: &toml::Table,
    errors: &mut Vec<String>,
) -> Option<ScratchpadOptions> {
    let before = errors.len();
    let mut f = Fields {
        context,
        table,
        errors,
    };
    let table = f.table;

    let command = f.string("command").filter(|c| !c.trim().is_empty());
    let class = f.string("class");
    let mut process_tracking = f.boolean("process_tracking", true);
    if command.is_none() {
        process_tracking = false;
        if class.is_none() {
            f.error("class", "required when no command is given");
        }
    }

    let match_by = f.string("match_by").unwrap_or_else(|| {
        if process_tracking { "pid" } else { "class" }.to_string()
    });
    let matching = if match_by == "pid" {
        if !process_tracking {
            f.error("match_by", "`pid` needs process tracking");
        }
        MatchRule::Pid
    } else {
        match ClientProperty::from_key(&match_by) {
            Some(property) => match f.string(property.key()) {
                Some(text) => match Pattern::parse(&text) {
                    Ok(pattern) => MatchRule::Property { property, pattern },
                    Err(e) => {
                        f.error(property.key(), e);
                        MatchRule::Pid
                    }
                },
                None => {
                    f.error(property.key(), format!("required by match_by = \"{}\"", match_by));
                    MatchRule::Pid
                }
            },
            None => {
                f.error("match_by", format!("unknown property `{}`", match_by));
                MatchRule::Pid
            }
        }
    };

    let defaults = GeometryRules::default();
    let animation = match f.string("animation") {
        None => defaults.animation,
        Some(text) => Animation::parse(&text).unwrap_or_else(|e| {
            f.error("animation", e);
            None
        }),
    };
    let geometry = GeometryRules {
        size: if table.contains_key("size") {
            f.pair("size")
        } else {
            defaults.size
        },
        max_size: f.pair("max_size"),
        position: f.pair("position"),
        margin: f.length("margin", defaults.margin),
        offset: f.length("offset", defaults.offset),
        animation,
    };

    let excludes = match table.get("excludes") {
        Some(Value::String(s)) if s == "*" => Excludes::All,
        Some(_) => Excludes::Names(f.strings("excludes")),
        None => Excludes::None,
    };

    let unfocus_hide = match f.string("unfocus").as_deref() {
        None | Some("") => false,
        Some("hide") => true,
        Some(other) => {
            f.error("unfocus", format!("expected \"hide\" or \"\", got `{}`", other));
            false
        }
    };

    let skip_windowrules = f.strings("skip_windowrules");
    for rule in &skip_windowrules {
        if !SKIPPABLE_RULES.contains(&rule.as_str()) {
            let message = format!("unknown rule `{}`", rule);
            f.error("skip_windowrules", message);
        }
    }

    let preserve_aspect = f.boolean("preserve_aspect", false);
    let close_on_hide = f.boolean("close_on_hide", false);
    let mut lazy = f.boolean("lazy", true);
    if preserve_aspect || close_on_hide || !process_tracking {
        lazy = true;
    }

    let options = ScratchpadOptions {
        command,
        class,
        matching,
        process_tracking,
        geometry,
        lazy,
        pinned: f.boolean("pinned", true),
        multi: f.boolean("multi", true),
        excludes,
        restore_excluded: f.boolean("restore_excluded", false),
        unfocus_hide,
        hysteresis: f.seconds("hysteresis", 0.4),
        preserve_aspect,
        hide_delay: f.seconds("hide_delay", 0.0),
        force_monitor: f.string("force_monitor"),
        alt_toggle: f.boolean("alt_toggle", false),
        allow_special_workspaces: f.boolean("allow_special_workspaces", true),
        smart_focus: f.boolean("smart_focus", true),
        close_on_hide,
        skip_windowrules,
        start_timeout: f.seconds("start_timeout", 8.0),
    };
    (errors.len() == before).then_some(options)
}

/// Names referenced by `excludes` that are not defined.
pub fn dangling_excludes(definitions: &BTreeMap<String, ScratchpadDefinition>) -> Vec<String> {
    let known: HashSet<&str> = definitions.keys().map(String::as_str).collect();
    let mut errors = Vec::new();
    for definition in definitions.values() {
        if let Excludes::Names(names) = &definition.options.excludes {
            for name in names.iter().filter(|n| !known.contains(n.as_str())) {
                errors.push(format!(
                    "scratchpad `{}` excludes unknown scratchpad `{}`",
                    definition.name, name
                ));
            }
        }
    }
    errors
}
