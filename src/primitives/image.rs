use std::path::Path;

use image::imageops::FilterType;
use tracing::debug;

use super::Color;
use crate::{
    error::{Error, Result},
    graphics::PixelFormat,
};

/// Decoded pixel storage of a [`BitmapImage`].
#[derive(Debug, Clone, PartialEq)]
pub enum ImagePixels {
    /// Little-endian RGB565 with an optional separate alpha plane.
    Rgb565 { data: Vec<u8>, alpha: Option<Vec<u8>> },
    /// Interleaved B, G, R, A bytes.
    Bgra32(Vec<u8>),
}

/// Image pre-converted for fast blitting into a draw buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct BitmapImage {
    width: i32,
    height: i32,
    pixels: ImagePixels,
    color_key: Option<Color>,
}

impl BitmapImage {
    pub fn new(width: i32, height: i32, pixels: ImagePixels) -> Result<Self> {
        let count = (width.max(0) * height.max(0)) as usize;
        let valid = match &pixels {
            ImagePixels::Rgb565 { data, alpha } => {
                data.len() == count * 2 && alpha.as_ref().is_none_or(|a| a.len() == count)
            }
            ImagePixels::Bgra32(data) => data.len() == count * 4,
        };
        if !valid {
            return Err(Error::Image(format!(
                "pixel data does not match {width}x{height}"
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
            color_key: None,
        })
    }

    /// Loads and resizes an image file, converting it to the layout matching `format`.
    pub fn load(path: impl AsRef<Path>, format: PixelFormat, width: u32, height: u32) -> Result<Self> {
        let path = path.as_ref();
        let img = image::open(path).map_err(|e| Error::Image(format!("{}: {e}", path.display())))?;
        let rgba = img
            .resize_exact(width, height, FilterType::Triangle)
            .to_rgba8();
        debug!(path = %path.display(), width, height, ?format, "loaded image");
        Self::from_rgba(width as i32, height as i32, rgba.as_raw(), format)
    }

    /// Converts tightly packed RGBA bytes.
    pub fn from_rgba(width: i32, height: i32, rgba: &[u8], format: PixelFormat) -> Result<Self> {
        let pixels = match format {
            PixelFormat::Rgb565 => {
                let mut data = Vec::with_capacity(rgba.len() / 2);
                let mut alpha = Vec::with_capacity(rgba.len() / 4);
                for px in rgba.chunks_exact(4) {
                    let raw = PixelFormat::Rgb565.encode(Color::new(px[0], px[1], px[2]));
                    data.extend_from_slice(raw.as_bytes());
                    alpha.push(px[3]);
                }
                ImagePixels::Rgb565 {
                    data,
                    alpha: Some(alpha),
                }
            }
            PixelFormat::Rgba8888 | PixelFormat::Bgra8888 => ImagePixels::Bgra32(
                rgba.chunks_exact(4)
                    .flat_map(|px| [px[2], px[1], px[0], px[3]])
                    .collect(),
            ),
        };
        Self::new(width, height, pixels)
    }

    /// Treats pixels equal to `key` as fully transparent.
    pub fn with_color_key(mut self, key: Color) -> Self {
        self.color_key = Some(key);
        self
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn pixels(&self) -> &ImagePixels {
        &self.pixels
    }

    /// Color and alpha of the pixel at `index` (row-major).
    pub fn pixel(&self, index: usize) -> (Color, u8) {
        let (color, alpha) = match &self.pixels {
            ImagePixels::Rgb565 { data, alpha } => (
                PixelFormat::Rgb565.decode(&data[index * 2..index * 2 + 2]),
                alpha.as_ref().map_or(255, |a| a[index]),
            ),
            ImagePixels::Bgra32(data) => {
                let px = &data[index * 4..index * 4 + 4];
                (Color::new(px[2], px[1], px[0]), px[3])
            }
        };
        match self.color_key {
            Some(key) if key == color => (color, 0),
            _ => (color, alpha),
        }
    }
}
