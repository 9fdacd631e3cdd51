//! Kernel input devices: the generic record reader, touch and keyboard
//! decoders built on it, and touch calibration.

pub mod calibrator;
pub mod enumerate;
mod keyboard;
mod manager;
pub mod raw_event;
mod reader;
mod touch;

pub use calibrator::{CalibrationSettings, TouchCalibrator, TouchSource};
pub use enumerate::{InputDeviceInfo, auto_detect_touch_device, enumerate_devices};
pub use keyboard::{KeyboardDecoder, KeyboardReader};
pub use manager::{InputManager, TouchTransform};
pub use raw_event::{EventType, RawEvent};
pub use reader::{InputEventHandler, RawInputReader};
pub use touch::{CalibrationBounds, NormalizedTouch, TouchDecoder, TouchSample, TouchState};
