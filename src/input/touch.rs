use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{
    raw_event::{EventType, RawEvent, codes},
    reader::{InputEventHandler, RawInputReader},
};
use crate::error::{Error, Result};

/// Latest raw touch sample reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TouchSample {
    pub x: i32,
    pub y: i32,
    pub pressed: bool,
}

impl TouchSample {
    pub const fn new(x: i32, y: i32, pressed: bool) -> Self {
        Self { x, y, pressed }
    }
}

/// Touch position mapped into `[0, 1] × [0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NormalizedTouch {
    pub x: f32,
    pub y: f32,
    pub pressed: bool,
}

impl NormalizedTouch {
    /// What queries answer while uncalibrated.
    pub const fn fallback(pressed: bool) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            pressed,
        }
    }
}

/// Raw device range that maps onto the screen. All zero means "never calibrated".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationBounds {
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

impl CalibrationBounds {
    pub const fn new(min_x: i32, min_y: i32, max_x: i32, max_y: i32) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn is_uncalibrated(&self) -> bool {
        *self == Self::default()
    }

    /// Usable for normalization: non-zero with `max > min` on both axes.
    pub fn is_valid(&self) -> bool {
        !self.is_uncalibrated() && self.max_x > self.min_x && self.max_y > self.min_y
    }

    pub fn normalize(&self, sample: TouchSample) -> Result<NormalizedTouch> {
        if !self.is_valid() {
            return Err(Error::NotCalibrated);
        }
        let range_x = (self.max_x - self.min_x) as f32;
        let range_y = (self.max_y - self.min_y) as f32;
        Ok(NormalizedTouch {
            x: ((sample.x - self.min_x) as f32 / range_x).clamp(0.0, 1.0),
            y: ((sample.y - self.min_y) as f32 / range_y).clamp(0.0, 1.0),
            pressed: sample.pressed,
        })
    }
}

/// Decodes absolute position and `BTN_TOUCH` from the event stream.
#[derive(Debug, Default)]
pub struct TouchDecoder {
    sample: TouchSample,
}

impl InputEventHandler for TouchDecoder {
    fn on_input_event(&mut self, event: &RawEvent) {
        match event.event_type() {
            Some(EventType::Abs) => match event.code {
                codes::ABS_X | codes::ABS_MT_POSITION_X => self.sample.x = event.value,
                codes::ABS_Y | codes::ABS_MT_POSITION_Y => self.sample.y = event.value,
                _ => {}
            },
            Some(EventType::Key) if event.code == codes::BTN_TOUCH => {
                self.sample.pressed = event.value != 0;
            }
            // SYN_REPORT only marks the end of a frame.
            _ => {}
        }
    }
}

/// Mutex-guarded touch sample fed by a background reader.
pub struct TouchState {
    reader: RawInputReader<TouchDecoder>,
}

impl TouchState {
    pub fn open(path: impl AsRef<Path>, exclusive: bool) -> Result<Self> {
        Ok(Self {
            reader: RawInputReader::open(path, exclusive)?,
        })
    }

    pub fn path(&self) -> &Path {
        self.reader.path()
    }

    pub fn start_event_loop(&mut self) -> Result<()> {
        self.reader.start_event_loop()
    }

    pub fn stop_event_loop(&mut self) {
        self.reader.stop_event_loop();
    }

    pub fn is_faulted(&self) -> bool {
        self.reader.is_faulted()
    }

    pub fn is_running(&self) -> bool {
        self.reader.is_running()
    }

    /// Raw, unconverted sample.
    pub fn abs_touch_state(&self) -> TouchSample {
        self.reader.with_state(|d| d.sample)
    }

    /// Sample mapped through `bounds`; `NotCalibrated` when the bounds are
    /// all zero or degenerate.
    pub fn normalized_touch_state(&self, bounds: &CalibrationBounds) -> Result<NormalizedTouch> {
        bounds.normalize(self.abs_touch_state())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn feed(decoder: &mut TouchDecoder, events: &[RawEvent]) {
        for ev in events {
            decoder.on_input_event(ev);
        }
    }

    #[test]
    fn decodes_single_and_multitouch_axes() {
        let mut d = TouchDecoder::default();
        feed(
            &mut d,
            &[
                RawEvent::new(EventType::Abs, codes::ABS_X, 120),
                RawEvent::new(EventType::Abs, codes::ABS_Y, 340),
                RawEvent::new(EventType::Syn, codes::SYN_REPORT, 0),
            ],
        );
        assert_eq!(d.sample, TouchSample::new(120, 340, false));

        feed(
            &mut d,
            &[
                RawEvent::new(EventType::Abs, codes::ABS_MT_POSITION_X, 7),
                RawEvent::new(EventType::Abs, codes::ABS_MT_POSITION_Y, 8),
                RawEvent::new(EventType::Abs, 0x18, 999), // ABS_PRESSURE
            ],
        );
        assert_eq!(d.sample, TouchSample::new(7, 8, false));
    }

    #[test]
    fn btn_touch_sets_pressed() {
        let mut d = TouchDecoder::default();
        feed(&mut d, &[RawEvent::new(EventType::Key, codes::BTN_TOUCH, 1)]);
        assert!(d.sample.pressed);
        feed(&mut d, &[RawEvent::new(EventType::Key, 0x110, 0)]); // BTN_LEFT
        assert!(d.sample.pressed);
        feed(&mut d, &[RawEvent::new(EventType::Key, codes::BTN_TOUCH, 0)]);
        assert!(!d.sample.pressed);
    }

    #[test]
    fn uncalibrated_bounds_are_rejected() {
        let sample = TouchSample::new(10, 10, true);
        assert!(matches!(
            CalibrationBounds::default().normalize(sample),
            Err(Error::NotCalibrated)
        ));
        assert!(matches!(
            CalibrationBounds::new(100, 100, 100, 400).normalize(sample),
            Err(Error::NotCalibrated)
        ));
        assert!(matches!(
            CalibrationBounds::new(500, 100, 100, 400).normalize(sample),
            Err(Error::NotCalibrated)
        ));
    }

    #[test]
    fn normalizes_inside_bounds() {
        let bounds = CalibrationBounds::new(100, 200, 300, 600);
        let n = bounds.normalize(TouchSample::new(200, 300, true)).unwrap();
        assert_eq!((n.x, n.y, n.pressed), (0.5, 0.25, true));
    }

    proptest! {
        #[test]
        fn normalized_values_stay_in_unit_square(
            min_x in -5000i32..5000, span_x in 1i32..5000,
            min_y in -5000i32..5000, span_y in 1i32..5000,
            x in -20000i32..20000, y in -20000i32..20000,
        ) {
            let bounds = CalibrationBounds::new(min_x, min_y, min_x + span_x, min_y + span_y);
            prop_assume!(bounds.is_valid());
            let n = bounds.normalize(TouchSample::new(x, y, false)).unwrap();
            prop_assert!((0.0..=1.0).contains(&n.x));
            prop_assert!((0.0..=1.0).contains(&n.y));
            if x <= min_x { prop_assert_eq!(n.x, 0.0); }
            if x >= min_x + span_x { prop_assert_eq!(n.x, 1.0); }
        }
    }
}
