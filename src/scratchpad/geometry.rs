//! Size, placement and slide-in arithmetic for scratchpad windows.
//!
//! Everything here is pure: given a monitor and the configured lengths it
//! computes where a window goes.  All values are logical pixels; fractional
//! results are truncated.

use crate::hyprland::types::MonitorInfo;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {what} `{value}`")]
pub struct GeometryError {
    what: &'static str,
    value: String,
}

impl GeometryError {
    fn new(what: &'static str, value: &str) -> Self {
        Self {
            what,
            value: value.to_string(),
        }
    }
}

/// A length given either in pixels or as a share of a reference extent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Length {
    Pixels(i32),
    Percent(f64),
}

impl Length {
    /// Parse `80%`, `120px` or a bare integer (pixels).
    pub fn parse(token: &str) -> Result<Self, GeometryError> {
        let token = token.trim();
        if let Some(percent) = token.strip_suffix('%') {
            return percent
                .trim()
                .parse::<f64>()
                .map(Length::Percent)
                .map_err(|_| GeometryError::new("length", token));
        }
        token
            .strip_suffix("px")
            .unwrap_or(token)
            .trim()
            .parse::<i32>()
            .map(Length::Pixels)
            .map_err(|_| GeometryError::new("length", token))
    }

    /// Resolve against `reference` pixels.
    pub fn resolve(self, reference: i32) -> i32 {
        match self {
            Length::Pixels(px) => px,
            Length::Percent(pct) => (reference as f64 * pct / 100.0) as i32,
        }
    }
}

/// An `x y` pair such as `"75% 60%"`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pair {
    pub x: Length,
    pub y: Length,
}

impl Pair {
    pub fn parse(text: &str) -> Result<Self, GeometryError> {
        let mut parts = text.split_whitespace();
        match (parts.next(), parts.next(), parts.next()) {
            (Some(x), Some(y), None) => Ok(Self {
                x: Length::parse(x)?,
                y: Length::parse(y)?,
            }),
            _ => Err(GeometryError::new("pair", text)),
        }
    }

    pub fn resolve(self, (width, height): (i32, i32)) -> (i32, i32) {
        (self.x.resolve(width), self.y.resolve(height))
    }
}

/// Edge a scratchpad slides in from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Animation {
    FromTop,
    FromBottom,
    FromLeft,
    FromRight,
}

impl Animation {
    /// Case-insensitive; the empty string disables the animation.
    pub fn parse(text: &str) -> Result<Option<Self>, GeometryError> {
        match text.trim().to_ascii_lowercase().as_str() {
            "" => Ok(None),
            "fromtop" => Ok(Some(Animation::FromTop)),
            "frombottom" => Ok(Some(Animation::FromBottom)),
            "fromleft" => Ok(Some(Animation::FromLeft)),
            "fromright" => Ok(Some(Animation::FromRight)),
            _ => Err(GeometryError::new("animation", text)),
        }
    }

    /// Unit vector pointing from the shown position towards the edge.
    fn direction(self) -> (i32, i32) {
        match self {
            Animation::FromTop => (0, -1),
            Animation::FromBottom => (0, 1),
            Animation::FromLeft => (-1, 0),
            Animation::FromRight => (1, 0),
        }
    }
}

/// Geometry settings of one scratchpad.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryRules {
    pub size: Option<Pair>,
    pub max_size: Option<Pair>,
    pub position: Option<Pair>,
    pub margin: Length,
    pub offset: Length,
    pub animation: Option<Animation>,
}

impl Default for GeometryRules {
    fn default() -> Self {
        Self {
            size: Pair::parse("80% 80%").ok(),
            max_size: None,
            position: None,
            margin: Length::Pixels(60),
            offset: Length::Percent(100.0),
            animation: Some(Animation::FromTop),
        }
    }
}

/// Window geometry remembered relative to its monitor's origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachedGeometry {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Where and how a window is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShowPlan {
    /// Size to apply, `None` to keep the current one.
    pub size: Option<(i32, i32)>,
    /// Final top-left corner.
    pub position: (i32, i32),
    /// Off-screen top-left corner the slide starts from.
    pub start: Option<(i32, i32)>,
}

impl GeometryRules {
    /// Configured size on `monitor`, clamped per axis by `max_size`.
    pub fn resolve_size(&self, monitor: &MonitorInfo) -> Option<(i32, i32)> {
        let extent = monitor.logical_size();
        let (mut width, mut height) = self.size?.resolve(extent);
        if let Some(max) = self.max_size {
            let (max_w, max_h) = max.resolve(extent);
            width = width.min(max_w);
            height = height.min(max_h);
        }
        Some((width, height))
    }

    fn margins(&self, monitor: &MonitorInfo) -> (i32, i32) {
        let (width, height) = monitor.logical_size();
        (self.margin.resolve(width), self.margin.resolve(height))
    }

    /// Final top-left corner of a `size` window on `monitor`.
    ///
    /// An explicit `position` wins; otherwise the window is centered on the
    /// axis parallel to the animation edge and kept `margin` away from it.
    pub fn placement(&self, monitor: &MonitorInfo, size: (i32, i32)) -> (i32, i32) {
        let (mon_w, mon_h) = monitor.logical_size();
        let (w, h) = size;
        if let Some(position) = self.position {
            let (x, y) = position.resolve((mon_w, mon_h));
            return (monitor.x + x, monitor.y + y);
        }
        let (margin_x, margin_y) = self.margins(monitor);
        let centered_x = monitor.x + (mon_w - w) / 2;
        let centered_y = monitor.y + (mon_h - h) / 2;
        match self.animation {
            Some(Animation::FromTop) => (centered_x, monitor.y + margin_y),
            Some(Animation::FromBottom) => (centered_x, monitor.y + mon_h - h - margin_y),
            Some(Animation::FromLeft) => (monitor.x + margin_x, centered_y),
            Some(Animation::FromRight) => (monitor.x + mon_w - w - margin_x, centered_y),
            None => (centered_x, centered_y),
        }
    }

    /// Relative move that takes a shown `size` window off-screen, or `None`
    /// without an animation.
    pub fn slide_vector(&self, monitor: &MonitorInfo, size: (i32, i32)) -> Option<(i32, i32)> {
        let animation = self.animation?;
        let (margin_x, margin_y) = self.margins(monitor);
        let (dx, dy) = animation.direction();
        Some((
            dx * (self.offset.resolve(size.0) + margin_x),
            dy * (self.offset.resolve(size.1) + margin_y),
        ))
    }

    /// Plan a show on `monitor` for a window currently `current_size` big.
    ///
    /// A `cached` geometry (kept when the aspect is preserved) replaces the
    /// computed size and position.
    pub fn plan_show(
        &self,
        monitor: &MonitorInfo,
        current_size: (i32, i32),
        cached: Option<CachedGeometry>,
    ) -> ShowPlan {
        let (size, position) = match cached {
            Some(c) => (
                Some((c.width, c.height)),
                (monitor.x + c.x, monitor.y + c.y),
            ),
            None => {
                let size = self.resolve_size(monitor);
                let position = self.placement(monitor, size.unwrap_or(current_size));
                (size, position)
            }
        };
        let start = self
            .slide_vector(monitor, size.unwrap_or(current_size))
            .map(|(dx, dy)| (position.0 + dx, position.1 + dy));
        ShowPlan {
            size,
            position,
            start,
        }
    }
}
