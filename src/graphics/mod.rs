mod context;
mod draw_buffer;
pub mod font;

pub use context::{GraphicsContext, PixelFormat, RawPixel};
pub use draw_buffer::DrawBuffer;
pub use font::{FontRenderer, TrueTypeFont};
