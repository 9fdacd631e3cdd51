use std::{collections::HashSet, path::Path};

use super::{
    raw_event::{EventType, RawEvent},
    reader::{InputEventHandler, RawInputReader},
};
use crate::error::Result;

/// Tracks which key codes are currently held.
#[derive(Debug, Default)]
pub struct KeyboardDecoder {
    keys_down: HashSet<u16>,
}

impl InputEventHandler for KeyboardDecoder {
    fn on_input_event(&mut self, event: &RawEvent) {
        if event.event_type() != Some(EventType::Key) {
            return;
        }
        // 1 = press, 2 = autorepeat, 0 = release
        if event.value > 0 {
            self.keys_down.insert(event.code);
        } else {
            self.keys_down.remove(&event.code);
        }
    }
}

pub struct KeyboardReader {
    reader: RawInputReader<KeyboardDecoder>,
}

impl KeyboardReader {
    pub fn open(path: impl AsRef<Path>, exclusive: bool) -> Result<Self> {
        Ok(Self {
            reader: RawInputReader::open(path, exclusive)?,
        })
    }

    pub fn start_event_loop(&mut self) -> Result<()> {
        self.reader.start_event_loop()
    }

    pub fn stop_event_loop(&mut self) {
        self.reader.stop_event_loop();
    }

    /// `code` is a `KEY_*` value from `linux/input-event-codes.h`.
    pub fn is_key_down(&self, code: u16) -> bool {
        self.reader.with_state(|d| d.keys_down.contains(&code))
    }
}
