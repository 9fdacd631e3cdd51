use std::fmt;

use crate::primitives::Color;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 16-bit `RRRRRGGGGGGBBBBB`, little-endian.
    Rgb565,
    /// Bytes R, G, B, A.
    Rgba8888,
    /// Bytes B, G, R, A.
    Bgra8888,
}

impl PixelFormat {
    pub const fn bits_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Rgb565 => 16,
            PixelFormat::Rgba8888 | PixelFormat::Bgra8888 => 32,
        }
    }

    pub const fn bytes_per_pixel(self) -> usize {
        self.bits_per_pixel() as usize / 8
    }

    pub fn encode(self, color: Color) -> RawPixel {
        let Color { r, g, b } = color;
        match self {
            PixelFormat::Rgb565 => {
                let packed = ((r as u16 >> 3) << 11) | ((g as u16 >> 2) << 5) | (b as u16 >> 3);
                let [lo, hi] = packed.to_le_bytes();
                RawPixel::new([lo, hi, 0, 0], 2)
            }
            PixelFormat::Rgba8888 => RawPixel::new([r, g, b, 0xFF], 4),
            PixelFormat::Bgra8888 => RawPixel::new([b, g, r, 0xFF], 4),
        }
    }

    /// Decodes the first pixel of `bytes`.
    pub fn decode(self, bytes: &[u8]) -> Color {
        match self {
            PixelFormat::Rgb565 => {
                let packed = u16::from_le_bytes([bytes[0], bytes[1]]) as u32;
                Color::new(
                    (((packed >> 11) & 0x1F) * 255 / 31) as u8,
                    (((packed >> 5) & 0x3F) * 255 / 63) as u8,
                    ((packed & 0x1F) * 255 / 31) as u8,
                )
            }
            PixelFormat::Rgba8888 => Color::new(bytes[0], bytes[1], bytes[2]),
            PixelFormat::Bgra8888 => Color::new(bytes[2], bytes[1], bytes[0]),
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelFormat::Rgb565 => "RGB565",
            PixelFormat::Rgba8888 => "RGBA8888",
            PixelFormat::Bgra8888 => "BGRA8888",
        };
        f.write_str(name)
    }
}

/// A color already encoded for a specific [`PixelFormat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawPixel {
    bytes: [u8; 4],
    len: usize,
}

impl RawPixel {
    const fn new(bytes: [u8; 4], len: usize) -> Self {
        Self { bytes, len }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

/// Output geometry and encoding negotiated between a render target and a draw buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphicsContext {
    pub width: i32,
    pub height: i32,
    pub pixel_format: PixelFormat,
    pub bits_per_pixel: u32,
}

impl GraphicsContext {
    pub fn new(width: i32, height: i32, pixel_format: PixelFormat) -> Self {
        Self {
            width,
            height,
            pixel_format,
            bits_per_pixel: pixel_format.bits_per_pixel(),
        }
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.bits_per_pixel as usize / 8
    }

    /// Exact size in bytes of a full frame.
    pub fn buffer_len(&self) -> usize {
        self.width.max(0) as usize * self.height.max(0) as usize * self.bytes_per_pixel()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb565_packing() {
        let raw = PixelFormat::Rgb565.encode(Color::new(255, 0, 0));
        assert_eq!(raw.as_bytes(), &[0x00, 0xF8]);
        let raw = PixelFormat::Rgb565.encode(Color::new(0, 255, 0));
        assert_eq!(raw.as_bytes(), &[0xE0, 0x07]);
        let raw = PixelFormat::Rgb565.encode(Color::WHITE);
        assert_eq!(PixelFormat::Rgb565.decode(raw.as_bytes()), Color::WHITE);
    }

    #[test]
    fn channel_order() {
        let c = Color::new(1, 2, 3);
        assert_eq!(PixelFormat::Rgba8888.encode(c).as_bytes(), &[1, 2, 3, 0xFF]);
        assert_eq!(PixelFormat::Bgra8888.encode(c).as_bytes(), &[3, 2, 1, 0xFF]);
        assert_eq!(PixelFormat::Bgra8888.decode(&[3, 2, 1, 0xFF]), c);
    }

    #[test]
    fn buffer_len_matches_format() {
        assert_eq!(GraphicsContext::new(100, 50, PixelFormat::Bgra8888).buffer_len(), 20_000);
        assert_eq!(GraphicsContext::new(100, 50, PixelFormat::Rgb565).buffer_len(), 10_000);
    }
}
