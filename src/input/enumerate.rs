use std::path::{Path, PathBuf};

use evdev_rs::{
    Device, DeviceWrapper,
    enums::{EV_ABS, EV_KEY, EventCode},
};
use tracing::{debug, info};

pub const INPUT_DIR: &str = "/dev/input";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDeviceInfo {
    pub path: PathBuf,
    pub name: Option<String>,
    pub is_touch: bool,
}

/// Lists the `event*` nodes under `dir`, skipping ones that cannot be opened.
pub fn enumerate_devices(dir: impl AsRef<Path>) -> Vec<InputDeviceInfo> {
    let dir = dir.as_ref();
    let Ok(entries) = std::fs::read_dir(dir) else {
        debug!(dir = %dir.display(), "input directory not readable");
        return Vec::new();
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("event"))
        })
        .collect();
    paths.sort_by_key(|p| event_index(p));

    paths.into_iter().filter_map(|p| device_info(&p)).collect()
}

pub fn device_info(path: &Path) -> Option<InputDeviceInfo> {
    let device = match Device::new_from_path(path) {
        Ok(device) => device,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "skipping input device");
            return None;
        }
    };
    let is_touch = device.has_event_code(&EventCode::EV_KEY(EV_KEY::BTN_TOUCH))
        && (device.has_event_code(&EventCode::EV_ABS(EV_ABS::ABS_X))
            || device.has_event_code(&EventCode::EV_ABS(EV_ABS::ABS_MT_POSITION_X)));
    Some(InputDeviceInfo {
        path: path.to_path_buf(),
        name: device.name().map(str::to_owned),
        is_touch,
    })
}

/// First touch-capable device under [`INPUT_DIR`].
pub fn auto_detect_touch_device() -> Option<PathBuf> {
    let found = enumerate_devices(INPUT_DIR)
        .into_iter()
        .find(|d| d.is_touch)
        .map(|d| d.path);
    if let Some(path) = &found {
        info!(path = %path.display(), "auto-detected touch device");
    }
    found
}

fn event_index(path: &Path) -> u32 {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.strip_prefix("event"))
        .and_then(|n| n.parse().ok())
        .unwrap_or(u32::MAX)
}
