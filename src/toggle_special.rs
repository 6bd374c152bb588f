//! Park the focused window on a special workspace and bring it back.

use crate::hyprland::types::ClientInfo;
use crate::plugin::{Capabilities, HandlerError, Plugin, PluginContext};
use async_trait::async_trait;
use log::debug;

pub const PLUGIN_NAME: &str = "toggle_special";

const DEFAULT_WORKSPACE: &str = "minimized";

#[derive(Debug, Default)]
pub struct ToggleSpecial {
    default_workspace: String,
}

impl ToggleSpecial {
    pub fn new() -> Self {
        Self {
            default_workspace: DEFAULT_WORKSPACE.to_string(),
        }
    }
}

#[async_trait]
impl Plugin for ToggleSpecial {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::new().command(
            "toggle_special",
            "[name] move the focused window to or from the special workspace `name`",
        )
    }

    async fn on_reload(&mut self, _ctx: &mut PluginContext, section: &toml::Table) -> Vec<String> {
        match section.get("name") {
            None => {
                self.default_workspace = DEFAULT_WORKSPACE.to_string();
                Vec::new()
            }
            Some(toml::Value::String(name)) if !name.is_empty() => {
                self.default_workspace = name.clone();
                Vec::new()
            }
            Some(_) => vec!["toggle_special.name: expected a workspace name".to_string()],
        }
    }

    async fn run_command(
        &mut self,
        ctx: &mut PluginContext,
        _command: &str,
        args: &[String],
    ) -> Result<Option<String>, HandlerError> {
        let name = match args {
            [] => self.default_workspace.as_str(),
            [name] => name.as_str(),
            _ => return Err(HandlerError::Usage("toggle_special [name]".into())),
        };
        let window: ClientInfo = serde_json::from_value(ctx.compositor.query("activewindow").await?)
            .map_err(crate::traits::CompositorError::from)?;
        if window.address.is_empty() {
            return Err(HandlerError::failed("no focused window"));
        }
        let target = format!("address:{}", window.address);

        let commands = if window.workspace.name.starts_with("special:") {
            let active = ctx.compositor.query("activeworkspace").await?;
            let workspace = active
                .get("name")
                .and_then(|n| n.as_str())
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| ctx.state.active_workspace());
            vec![
                format!("togglespecialworkspace {}", name),
                format!("movetoworkspacesilent {},{}", workspace, target),
                format!("focuswindow {}", target),
            ]
        } else {
            vec![format!("movetoworkspacesilent special:{},{}", name, target)]
        };
        debug!("[{}] {}", ctx.name, commands.join(" ; "));
        ctx.compositor.dispatch(&commands).await?;
        Ok(None)
    }
}
