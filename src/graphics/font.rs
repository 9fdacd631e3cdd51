//! Text rendering collaborator for [`DrawBuffer`](super::DrawBuffer).
//!
//! The draw buffer knows nothing about glyphs: a [`FontRenderer`] turns text
//! into per-pixel coverage and the buffer blends that coverage in.

use std::{collections::HashMap, path::Path};

use fontdue::{Font, FontSettings, Metrics};
use tracing::debug;

use crate::{
    error::{Error, Result},
    primitives::Size,
};

pub trait FontRenderer: Send {
    fn measure_text(&mut self, text: &str, font_size: f32) -> Size;

    /// Calls `plot(dx, dy, coverage)` for every covered pixel, relative to
    /// the top-left corner of the text box.
    fn rasterize(&mut self, text: &str, font_size: f32, plot: &mut dyn FnMut(i32, i32, u8));
}

/// TrueType/OpenType renderer backed by `fontdue`, caching rasterized glyphs
/// per character and pixel size.
pub struct TrueTypeFont {
    font: Font,
    glyphs: HashMap<(char, u32), (Metrics, Vec<u8>)>,
}

impl TrueTypeFont {
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let font = Font::from_bytes(data, FontSettings::default()).map_err(|e| Error::Font(e.to_string()))?;
        Ok(Self {
            font,
            glyphs: HashMap::new(),
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        debug!(path = %path.display(), "loaded font");
        Self::from_bytes(&data)
    }

    fn ascent(&self, font_size: f32) -> f32 {
        self.font
            .horizontal_line_metrics(font_size)
            .map_or(font_size, |m| m.ascent)
    }

    fn line_height(&self, font_size: f32) -> f32 {
        self.font
            .horizontal_line_metrics(font_size)
            .map_or(font_size, |m| m.new_line_size)
    }

    fn glyph(&mut self, c: char, font_size: f32) -> &(Metrics, Vec<u8>) {
        let font = &self.font;
        self.glyphs
            .entry((c, font_size.to_bits()))
            .or_insert_with(|| font.rasterize(c, font_size))
    }
}

impl FontRenderer for TrueTypeFont {
    fn measure_text(&mut self, text: &str, font_size: f32) -> Size {
        let width: f32 = text
            .chars()
            .map(|c| self.font.metrics(c, font_size).advance_width)
            .sum();
        Size::new(width.ceil() as i32, self.line_height(font_size).ceil() as i32)
    }

    fn rasterize(&mut self, text: &str, font_size: f32, plot: &mut dyn FnMut(i32, i32, u8)) {
        let baseline = self.ascent(font_size).round() as i32;
        let mut pen_x = 0f32;

        for c in text.chars() {
            let (metrics, bitmap) = self.glyph(c, font_size);
            let left = pen_x.round() as i32 + metrics.xmin;
            let top = baseline - metrics.height as i32 - metrics.ymin;

            for row in 0..metrics.height {
                for col in 0..metrics.width {
                    let coverage = bitmap[row * metrics.width + col];
                    if coverage > 0 {
                        plot(left + col as i32, top + row as i32, coverage);
                    }
                }
            }

            pen_x += metrics.advance_width;
        }
    }
}
