use std::{io::Cursor, mem::size_of};

use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};
use num_enum::TryFromPrimitive;

/// Event type field of a kernel input record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u16)]
pub enum EventType {
    Syn = 0x00,
    Key = 0x01,
    Rel = 0x02,
    Abs = 0x03,
    Msc = 0x04,
}

/// Event codes used by the decoders (`linux/input-event-codes.h`).
pub mod codes {
    pub const SYN_REPORT: u16 = 0x00;

    pub const ABS_X: u16 = 0x00;
    pub const ABS_Y: u16 = 0x01;
    pub const ABS_MT_POSITION_X: u16 = 0x35;
    pub const ABS_MT_POSITION_Y: u16 = 0x36;

    pub const BTN_TOUCH: u16 = 0x14a;
}

const LONG_SIZE: usize = size_of::<libc::c_long>();

/// One `struct input_event` as produced by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawEvent {
    pub tv_sec: i64,
    pub tv_usec: i64,
    pub kind: u16,
    pub code: u16,
    pub value: i32,
}

impl RawEvent {
    /// Size of one record on this platform: a `timeval` followed by
    /// `u16 type, u16 code, i32 value`.
    pub const SIZE: usize = 2 * LONG_SIZE + 8;

    pub fn new(kind: EventType, code: u16, value: i32) -> Self {
        Self {
            kind: kind as u16,
            code,
            value,
            ..Self::default()
        }
    }

    pub fn event_type(&self) -> Option<EventType> {
        EventType::try_from(self.kind).ok()
    }

    /// Decodes one record from the first [`Self::SIZE`] bytes of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        let mut cur = Cursor::new(bytes);
        let tv_sec = read_long(&mut cur)?;
        let tv_usec = read_long(&mut cur)?;
        Some(Self {
            tv_sec,
            tv_usec,
            kind: cur.read_u16::<NativeEndian>().ok()?,
            code: cur.read_u16::<NativeEndian>().ok()?,
            value: cur.read_i32::<NativeEndian>().ok()?,
        })
    }

    /// Encodes the record in the kernel layout; mostly useful for feeding
    /// synthetic devices.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        write_long(&mut out, self.tv_sec);
        write_long(&mut out, self.tv_usec);
        // Writing into a Vec cannot fail.
        let _ = out.write_u16::<NativeEndian>(self.kind);
        let _ = out.write_u16::<NativeEndian>(self.code);
        let _ = out.write_i32::<NativeEndian>(self.value);
        out
    }
}

fn read_long(cur: &mut Cursor<&[u8]>) -> Option<i64> {
    if LONG_SIZE == 8 {
        cur.read_i64::<NativeEndian>().ok()
    } else {
        cur.read_i32::<NativeEndian>().ok().map(i64::from)
    }
}

fn write_long(out: &mut Vec<u8>, v: i64) {
    if LONG_SIZE == 8 {
        let _ = out.write_i64::<NativeEndian>(v);
    } else {
        let _ = out.write_i32::<NativeEndian>(v as i32);
    }
}
