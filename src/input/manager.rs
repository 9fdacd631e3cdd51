use std::{
    path::PathBuf,
    sync::atomic::{AtomicBool, Ordering},
};

use tracing::{info, warn};

use super::{
    enumerate::auto_detect_touch_device,
    keyboard::KeyboardReader,
    touch::{CalibrationBounds, NormalizedTouch, TouchSample, TouchState},
};
use crate::{
    config::EngineOptions,
    error::Result,
    primitives::{Rectangle, Size},
};

/// Orientation fix-ups applied after normalization, for panels mounted
/// rotated or mirrored relative to the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TouchTransform {
    pub swap_xy: bool,
    pub invert_x: bool,
    pub invert_y: bool,
}

impl TouchTransform {
    pub fn from_options(options: &EngineOptions) -> Self {
        Self {
            swap_xy: options.swap_touch_xy,
            invert_x: options.invert_touch_x,
            invert_y: options.invert_touch_y,
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }

    /// Device-normalized to screen-normalized. Swap first, then invert.
    pub fn apply(&self, touch: NormalizedTouch) -> NormalizedTouch {
        let (x, y) = self.apply_xy(touch.x as f64, touch.y as f64);
        NormalizedTouch {
            x: x as f32,
            y: y as f32,
            pressed: touch.pressed,
        }
    }

    pub fn apply_xy(&self, x: f64, y: f64) -> (f64, f64) {
        let (x, y) = if self.swap_xy { (y, x) } else { (x, y) };
        (
            if self.invert_x { 1.0 - x } else { x },
            if self.invert_y { 1.0 - y } else { y },
        )
    }

    /// Maps a screen-space displacement back onto the raw device axes.
    pub fn screen_delta_to_device(&self, dx: f64, dy: f64) -> (f64, f64) {
        let dx = if self.invert_x { -dx } else { dx };
        let dy = if self.invert_y { -dy } else { dy };
        if self.swap_xy { (dy, dx) } else { (dx, dy) }
    }
}

/// Owns the input readers and turns raw touch samples into screen positions.
pub struct InputManager {
    touch: Option<TouchState>,
    keyboard: Option<KeyboardReader>,
    transform: TouchTransform,
    bounds: CalibrationBounds,
    screen: Size,
    warned_uncalibrated: AtomicBool,
}

impl InputManager {
    pub fn new(
        touch: Option<TouchState>,
        keyboard: Option<KeyboardReader>,
        transform: TouchTransform,
    ) -> Self {
        Self {
            touch,
            keyboard,
            transform,
            bounds: CalibrationBounds::default(),
            screen: Size::ZERO,
            warned_uncalibrated: AtomicBool::new(false),
        }
    }

    /// Opens the devices named in `options`. A configured device that cannot
    /// be opened is an error; an `auto` touch device that finds nothing is not.
    pub fn from_options(options: &EngineOptions) -> Result<Self> {
        let touch_path = match options.touch_device.as_deref() {
            None | Some("") => None,
            Some("auto") => {
                let found = auto_detect_touch_device();
                if found.is_none() {
                    warn!("no touch-capable input device found, touch disabled");
                }
                found
            }
            Some(path) => Some(PathBuf::from(path)),
        };

        let touch = touch_path
            .map(|path| TouchState::open(path, options.exclusive_input))
            .transpose()?;
        let keyboard = options
            .keyboard_device
            .as_ref()
            .map(|path| KeyboardReader::open(path, options.exclusive_input))
            .transpose()?;

        Ok(Self::new(
            touch,
            keyboard,
            TouchTransform::from_options(options),
        ))
    }

    /// Starts the reader threads. `screen` is used for pixel hit-testing.
    pub fn initialize(&mut self, screen: Size) -> Result<()> {
        self.screen = screen;
        if let Some(touch) = &mut self.touch {
            touch.start_event_loop()?;
        }
        if let Some(keyboard) = &mut self.keyboard {
            keyboard.start_event_loop()?;
        }
        info!(
            touch = self.touch.is_some(),
            keyboard = self.keyboard.is_some(),
            "input initialized"
        );
        Ok(())
    }

    pub fn set_screen_size(&mut self, screen: Size) {
        self.screen = screen;
    }

    pub fn set_calibration(&mut self, bounds: CalibrationBounds) {
        self.bounds = bounds;
        self.warned_uncalibrated.store(false, Ordering::Relaxed);
    }

    pub fn calibration(&self) -> CalibrationBounds {
        self.bounds
    }

    pub fn transform(&self) -> TouchTransform {
        self.transform
    }

    pub fn touch(&self) -> Option<&TouchState> {
        self.touch.as_ref()
    }

    pub fn has_touch(&self) -> bool {
        self.touch.is_some()
    }

    pub fn abs_touch_state(&self) -> TouchSample {
        self.touch
            .as_ref()
            .map(TouchState::abs_touch_state)
            .unwrap_or_default()
    }

    /// Normalized and orientation-corrected position. Falls back to
    /// `(0, 0, pressed)` while uncalibrated.
    pub fn touch_state(&self) -> NormalizedTouch {
        let Some(touch) = &self.touch else {
            return NormalizedTouch::fallback(false);
        };
        match touch.normalized_touch_state(&self.bounds) {
            Ok(normalized) => self.transform.apply(normalized),
            Err(e) => {
                if !self.warned_uncalibrated.swap(true, Ordering::Relaxed) {
                    warn!(error = %e, bounds = ?self.bounds, "touch queries fall back to origin");
                }
                NormalizedTouch::fallback(touch.abs_touch_state().pressed)
            }
        }
    }

    pub fn is_touching(&self) -> bool {
        self.touch_state().pressed
    }

    /// Pressed inside `region`, given in screen pixels. Edges are inclusive.
    pub fn is_touching_region(&self, region: Rectangle) -> bool {
        let touch = self.touch_state();
        if !touch.pressed {
            return false;
        }
        let x = touch.x * self.screen.width as f32;
        let y = touch.y * self.screen.height as f32;
        x >= region.x as f32
            && x <= region.right() as f32
            && y >= region.y as f32
            && y <= region.bottom() as f32
    }

    pub fn is_key_down(&self, code: u16) -> bool {
        self.keyboard.as_ref().is_some_and(|k| k.is_key_down(code))
    }

    /// Stops every reader thread. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if let Some(touch) = &mut self.touch {
            touch.stop_event_loop();
        }
        if let Some(keyboard) = &mut self.keyboard {
            keyboard.stop_event_loop();
        }
    }
}

impl Drop for InputManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_swaps_then_inverts() {
        let t = TouchTransform {
            swap_xy: true,
            invert_x: true,
            invert_y: false,
        };
        let out = t.apply(NormalizedTouch {
            x: 0.25,
            y: 0.75,
            pressed: true,
        });
        assert_eq!((out.x, out.y, out.pressed), (0.25, 0.25, true));
        assert_eq!(TouchTransform::default().apply_xy(0.1, 0.9), (0.1, 0.9));
    }

    #[test]
    fn screen_delta_maps_back_to_device_axes() {
        let t = TouchTransform {
            swap_xy: true,
            invert_x: false,
            invert_y: true,
        };
        assert_eq!(t.screen_delta_to_device(2.0, 3.0), (-3.0, 2.0));
        assert_eq!(TouchTransform::default().screen_delta_to_device(2.0, 3.0), (2.0, 3.0));
    }

    #[test]
    fn without_devices_queries_are_inert() {
        let mut manager = InputManager::new(None, None, TouchTransform::default());
        manager.initialize(Size::new(800, 480)).unwrap();
        assert_eq!(manager.touch_state(), NormalizedTouch::fallback(false));
        assert_eq!(manager.abs_touch_state(), TouchSample::default());
        assert!(!manager.is_touching());
        assert!(!manager.is_touching_region(Rectangle::new(0, 0, 800, 480)));
        assert!(!manager.is_key_down(30));
        manager.shutdown();
        manager.shutdown();
    }

    #[test]
    fn missing_configured_device_fails() {
        let options = EngineOptions {
            touch_device: Some("/nonexistent/event7".into()),
            ..EngineOptions::default()
        };
        assert!(InputManager::from_options(&options).is_err());
    }
}
