use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::{Error, Result},
    primitives::Color,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// Memory-mapped Linux framebuffer device.
    #[default]
    Framebuffer,
    /// Wayland window, for development on a desktop.
    Window,
}

/// Startup options of the display and touch pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineOptions {
    pub render_mode: RenderMode,
    pub framebuffer_device: PathBuf,
    /// Device node path, or `"auto"` to pick the first touch-capable device.
    pub touch_device: Option<String>,
    pub keyboard_device: Option<PathBuf>,
    /// Grab input devices so the console does not see their events.
    pub exclusive_input: bool,

    pub swap_touch_xy: bool,
    pub invert_touch_x: bool,
    pub invert_touch_y: bool,

    /// Window size; the framebuffer reports its own geometry.
    pub render_width: i32,
    pub render_height: i32,

    pub background_color: Color,
    pub foreground_color: Color,

    pub show_metrics: bool,
    pub show_debug_ui: bool,
    pub hide_console_caret: bool,

    pub skip_touch_calibration: bool,
    pub calibration_hold_ms: u64,
    /// Smallest accepted raw distance between the two calibration corners.
    pub calibration_min_span: i32,
    pub runtime_config_path: PathBuf,

    pub font_path: Option<PathBuf>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            render_mode: RenderMode::Framebuffer,
            framebuffer_device: PathBuf::from("/dev/fb0"),
            touch_device: None,
            keyboard_device: None,
            exclusive_input: false,
            swap_touch_xy: false,
            invert_touch_x: false,
            invert_touch_y: false,
            render_width: 1920,
            render_height: 1080,
            background_color: Color::BLACK,
            foreground_color: Color::WHITE,
            show_metrics: false,
            show_debug_ui: false,
            hide_console_caret: false,
            skip_touch_calibration: false,
            calibration_hold_ms: 3500,
            calibration_min_span: 16,
            runtime_config_path: PathBuf::from("./runtime_config.toml"),
            font_path: None,
        }
    }
}

impl EngineOptions {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let options = Self::from_toml(&text).map_err(|message| Error::Config {
            path: path.to_path_buf(),
            message,
        })?;
        debug!(path = %path.display(), ?options, "loaded engine options");
        Ok(options)
    }

    pub fn from_toml(text: &str) -> std::result::Result<Self, String> {
        toml::from_str(text).map_err(|e| e.to_string())
    }
}
