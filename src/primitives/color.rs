use std::fmt;

use serde::{Deserialize, Serialize};

/// Device independent 8-bit RGB color.
///
/// Conversion to a raw pixel encoding happens only when writing into a
/// [`DrawBuffer`](crate::graphics::DrawBuffer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color::new(0, 0, 0);
    pub const WHITE: Color = Color::new(255, 255, 255);
    pub const GRAY: Color = Color::new(50, 50, 50);
    pub const LIGHT_GRAY: Color = Color::new(211, 211, 211);
    pub const ORANGE: Color = Color::new(255, 165, 0);
    pub const RED: Color = Color::new(255, 0, 0);
    pub const GREEN: Color = Color::new(0, 255, 0);
    pub const BLUE: Color = Color::new(0, 0, 255);
    pub const DODGER_BLUE: Color = Color::new(30, 144, 255);
    pub const SKY_BLUE: Color = Color::new(25, 62, 100);
    pub const FUCHSIA: Color = Color::new(255, 0, 255);

    /// Magic color treated as transparent by legacy opaque images.
    pub const TRANSPARENT_KEY: Color = Color::FUCHSIA;

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parses `#RRGGBB` or `RRGGBB`.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }

    pub fn to_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    /// Linear blend of `self` over `dst` with coverage `alpha`.
    pub fn blend_over(self, dst: Color, alpha: u8) -> Color {
        let a = alpha as u32;
        let mix = |s: u8, d: u8| ((s as u32 * a + d as u32 * (255 - a)) / 255) as u8;
        Color::new(mix(self.r, dst.r), mix(self.g, dst.g), mix(self.b, dst.b))
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgb({}, {}, {})", self.r, self.g, self.b)
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Color::from_hex(&value).ok_or_else(|| format!("'{value}' is not a #RRGGBB color"))
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_hex()
    }
}
