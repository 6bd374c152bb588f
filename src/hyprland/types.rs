//! Minimal serde structs for the Hyprland JSON we care about.

use serde::{Deserialize, Serialize};

/// Workspace reference as embedded in monitor and client objects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceRef {
    pub id: i64,
    pub name: String,
}

/// Subset of the JSON object returned by `j/monitors`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MonitorInfo {
    pub id: i64,
    pub name: String,
    /// Physical width in pixels.
    pub width: u32,
    /// Physical height in pixels.
    pub height: u32,
    pub x: i32,
    pub y: i32,
    pub scale: f64,
    /// Wayland output transform; odd values are rotated by 90° or 270°.
    pub transform: u8,
    pub focused: bool,
    pub active_workspace: WorkspaceRef,
    pub special_workspace: WorkspaceRef,
}

impl Default for MonitorInfo {
    fn default() -> Self {
        Self {
            id: 0,
            name: String::new(),
            width: 0,
            height: 0,
            x: 0,
            y: 0,
            scale: 1.0,
            transform: 0,
            focused: false,
            active_workspace: WorkspaceRef::default(),
            special_workspace: WorkspaceRef::default(),
        }
    }
}

impl MonitorInfo {
    /// Logical size in layout pixels: physical size divided by the scale,
    /// axes swapped on rotated outputs.
    pub fn logical_size(&self) -> (i32, i32) {
        let scale = if self.scale > 0.0 { self.scale } else { 1.0 };
        let width = (self.width as f64 / scale) as i32;
        let height = (self.height as f64 / scale) as i32;
        if self.transform % 2 == 1 {
            (height, width)
        } else {
            (width, height)
        }
    }

    /// The workspace a window should land on when shown on this monitor.
    ///
    /// An open special workspace wins over the regular one when
    /// `allow_special` is set, unless it is one of our own hiding spots.
    pub fn target_workspace(&self, allow_special: bool, private_prefix: &str) -> &str {
        let special = &self.special_workspace.name;
        if allow_special && !special.is_empty() && !special.starts_with(private_prefix) {
            special
        } else {
            &self.active_workspace.name
        }
    }
}

/// Subset of the JSON object returned by `j/clients` and `j/activewindow`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientInfo {
    /// `0x`-prefixed window address.
    pub address: String,
    pub mapped: bool,
    pub at: [i32; 2],
    pub size: [i32; 2],
    pub workspace: WorkspaceRef,
    pub floating: bool,
    pub pinned: bool,
    pub monitor: i64,
    pub class: String,
    pub title: String,
    pub initial_class: String,
    pub initial_title: String,
    pub pid: i64,
}

/// Normalize an event payload address to the `0x…` form used in JSON.
pub fn full_address(address: &str) -> String {
    let address = address.trim();
    if address.starts_with("0x") {
        address.to_string()
    } else {
        format!("0x{}", address)
    }
}
