//! Window rules that make a scratchpad window start floating, off-screen
//! and on its hidden workspace.
//!
//! Hyprland changed the rule syntax twice, so the keyword lines depend on
//! the running version.

use super::definition::ScratchpadOptions;
use super::geometry::Animation;
use crate::hyprland::types::MonitorInfo;
use crate::state::Version;

/// First version accepting `windowrule <rule>, class:<regex>`.
const FIELD_SYNTAX: Version = Version::new(0, 48, 0);
/// First version with named rule blocks.
const NAMED_SYNTAX: Version = Version::new(0, 53, 0);

/// Hidden special workspace of scratchpad `name`.
pub fn hidden_workspace(name: &str) -> String {
    format!("{}{}", super::HIDDEN_PREFIX, name)
}

/// `(rule, value)` pairs for scratchpad `name` on `monitor`.
fn rule_params(
    name: &str,
    opts: &ScratchpadOptions,
    monitor: &MonitorInfo,
) -> Vec<(&'static str, String)> {
    let mut params = Vec::new();
    if !opts.skips_rule("float") {
        params.push(("float", String::new()));
    }
    if !opts.skips_rule("workspace") {
        params.push(("workspace", format!("{} silent", hidden_workspace(name))));
    }
    if !opts.skips_rule("aspect") {
        if let Some((width, height)) = opts.geometry.resolve_size(monitor) {
            let (mon_w, mon_h) = monitor.logical_size();
            let margin_x = (mon_w - width) / 2;
            let margin_y = (mon_h - height) / 2;
            let start = match opts.geometry.animation {
                Some(Animation::FromTop) => Some(format!("{} -200%", margin_x)),
                Some(Animation::FromBottom) => Some(format!("{} 200%", margin_x)),
                Some(Animation::FromLeft) => Some(format!("-200% {}", margin_y)),
                Some(Animation::FromRight) => Some(format!("200% {}", margin_y)),
                None => None,
            };
            if let Some(start) = start {
                params.push(("move", start));
            }
            params.push(("size", format!("{} {}", width, height)));
        }
    }
    params
}

/// Keyword lines setting the rules for windows of class `class`.
pub fn window_rules(
    name: &str,
    class: &str,
    opts: &ScratchpadOptions,
    monitor: &MonitorInfo,
    version: Version,
) -> Vec<String> {
    let params = rule_params(name, opts, monitor);
    if version >= NAMED_SYNTAX {
        let rule = format!("hyprmate-{}", name);
        let mut lines = vec![
            format!("windowrule[{}]:enable true", rule),
            format!("windowrule[{}]:match:class ^({})$", rule, class),
        ];
        lines.extend(params.into_iter().map(|(param, value)| {
            let value = if value.is_empty() { "on".to_string() } else { value };
            format!("windowrule[{}]:{} {}", rule, param, value)
        }));
        lines
    } else {
        params
            .into_iter()
            .map(|(param, value)| {
                let rule = if value.is_empty() {
                    param.to_string()
                } else {
                    format!("{} {}", param, value)
                };
                if version >= FIELD_SYNTAX {
                    format!("windowrule {}, class:^({})$", rule, class)
                } else {
                    format!("windowrule {},^({})$", rule, class)
                }
            })
            .collect()
    }
}
