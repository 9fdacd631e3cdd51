mod color;
mod geometry;
mod image;

pub use color::Color;
pub use geometry::{Point, Rectangle, Size, Vector2};
pub use image::{BitmapImage, ImagePixels};
