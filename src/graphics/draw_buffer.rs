use tracing::trace;

use super::{
    context::{GraphicsContext, PixelFormat, RawPixel},
    font::FontRenderer,
};
use crate::primitives::{BitmapImage, Color, Rectangle, Size, Vector2};

/// Off-screen rasterizer writing directly in the negotiated pixel format.
///
/// Every mutating draw call records the area it touched; the owner is
/// expected to call [`DrawBuffer::clear_dirty_regions`] once per frame.
/// Overlapping dirty rectangles are neither merged nor deduplicated.
pub struct DrawBuffer {
    context: GraphicsContext,
    bytes_per_pixel: usize,
    back_buffer: Vec<u8>,
    dirty_regions: Vec<Rectangle>,
    clear_color: Color,
    clip_rect: Option<Rectangle>,
    font: Option<Box<dyn FontRenderer>>,
}

impl DrawBuffer {
    pub fn new(context: GraphicsContext) -> Self {
        Self {
            context,
            bytes_per_pixel: context.bytes_per_pixel(),
            back_buffer: vec![0; context.buffer_len()],
            dirty_regions: Vec::new(),
            clear_color: Color::BLACK,
            clip_rect: None,
            font: None,
        }
    }

    /// Reallocates for a new context and clears. The font, clear color and
    /// clip rect are kept; pending dirty regions are dropped.
    pub fn resize(&mut self, context: GraphicsContext) {
        self.context = context;
        self.bytes_per_pixel = context.bytes_per_pixel();
        self.back_buffer = vec![0; context.buffer_len()];
        self.clear();
    }

    pub fn graphics_context(&self) -> GraphicsContext {
        self.context
    }

    pub fn width(&self) -> i32 {
        self.context.width
    }

    pub fn height(&self) -> i32 {
        self.context.height
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.context.pixel_format
    }

    /// Raw pixel bytes, ready to hand to a render target.
    pub fn buffer(&self) -> &[u8] {
        &self.back_buffer
    }

    pub fn dirty_regions(&self) -> &[Rectangle] {
        &self.dirty_regions
    }

    pub fn set_clear_color(&mut self, color: Color) {
        self.clear_color = color;
    }

    pub fn clear_color(&self) -> Color {
        self.clear_color
    }

    pub fn set_font_renderer(&mut self, font: Box<dyn FontRenderer>) {
        self.font = Some(font);
    }

    /// Suppresses all pixel writes outside `rect` until [`Self::clear_clip_rect`].
    ///
    /// There is a single active clip; a second call replaces the first.
    pub fn set_clip_rect(&mut self, rect: Rectangle) {
        self.clip_rect = Some(rect);
    }

    pub fn clear_clip_rect(&mut self) {
        self.clip_rect = None;
    }

    pub fn clip_rect(&self) -> Option<Rectangle> {
        self.clip_rect
    }

    fn bounds(&self) -> Rectangle {
        Rectangle::new(0, 0, self.context.width, self.context.height)
    }

    fn encode(&self, color: Color) -> RawPixel {
        self.context.pixel_format.encode(color)
    }

    /// Byte offset of `(x, y)` if it is inside the buffer and the clip rect.
    fn writable_offset(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || x >= self.context.width || y < 0 || y >= self.context.height {
            return None;
        }
        if let Some(clip) = &self.clip_rect {
            if !clip.contains_point(x, y) {
                return None;
            }
        }
        Some((y as usize * self.context.width as usize + x as usize) * self.bytes_per_pixel)
    }

    fn plot_raw(&mut self, x: i32, y: i32, raw: RawPixel) {
        if let Some(offset) = self.writable_offset(x, y) {
            self.back_buffer[offset..offset + self.bytes_per_pixel].copy_from_slice(raw.as_bytes());
        }
    }

    fn plot(&mut self, x: i32, y: i32, color: Color, alpha: u8) {
        if alpha == 0 {
            return;
        }
        let Some(offset) = self.writable_offset(x, y) else {
            return;
        };
        let format = self.context.pixel_format;
        let dst = &mut self.back_buffer[offset..offset + self.bytes_per_pixel];
        let color = if alpha < 255 {
            color.blend_over(format.decode(dst), alpha)
        } else {
            color
        };
        dst.copy_from_slice(format.encode(color).as_bytes());
    }

    /// Fills `region`, which must already lie inside the buffer.
    fn fill_region(&mut self, region: Rectangle, raw: RawPixel) {
        let bpp = self.bytes_per_pixel;
        let pitch = self.context.width as usize * bpp;
        for y in region.y..region.bottom() {
            let start = y as usize * pitch + region.x as usize * bpp;
            let end = start + region.width as usize * bpp;
            for pixel in self.back_buffer[start..end].chunks_exact_mut(bpp) {
                pixel.copy_from_slice(raw.as_bytes());
            }
        }
    }

    /// Fills the whole buffer with the clear color.
    pub fn clear(&mut self) {
        self.clear_with(self.clear_color);
    }

    /// Fills the whole buffer with `color`. Pending dirty regions are
    /// dropped since every pixel has just been rewritten.
    pub fn clear_with(&mut self, color: Color) {
        let raw = self.encode(color);
        for pixel in self.back_buffer.chunks_exact_mut(self.bytes_per_pixel) {
            pixel.copy_from_slice(raw.as_bytes());
        }
        self.dirty_regions.clear();
    }

    /// Fills `rect`, clamped to the buffer, with the clear color.
    pub fn clear_rect(&mut self, rect: Rectangle) {
        self.clear_rect_with(self.clear_color, rect);
    }

    pub fn clear_rect_with(&mut self, color: Color, rect: Rectangle) {
        if let Some(region) = rect.intersect(&self.bounds()) {
            let raw = self.encode(color);
            self.fill_region(region, raw);
        }
    }

    /// Clears every region drawn since the previous call, then forgets them.
    pub fn clear_dirty_regions(&mut self) {
        let regions = std::mem::take(&mut self.dirty_regions);
        trace!(count = regions.len(), "clearing dirty regions");
        for region in &regions {
            self.clear_rect(*region);
        }
    }

    fn mark_dirty(&mut self, rect: Rectangle) {
        if !rect.is_empty() {
            self.dirty_regions.push(rect);
        }
    }

    /// Writes one pixel, blending against the existing one when `alpha < 255`.
    pub fn draw_pixel(&mut self, x: i32, y: i32, color: Color, alpha: u8) {
        self.plot(x, y, color, alpha);
        self.mark_dirty(Rectangle::new(x, y, 1, 1));
    }

    /// Bresenham line, inclusive of both endpoints.
    pub fn draw_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, color: Color) {
        let raw = self.encode(color);
        let dx = (x1 - x0).abs();
        let dy = (y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx - dy;
        let (mut x, mut y) = (x0, y0);

        loop {
            self.plot_raw(x, y, raw);
            if x == x1 && y == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 > -dy {
                err -= dy;
                x += sx;
            }
            if e2 < dx {
                err += dx;
                y += sy;
            }
        }

        self.mark_dirty(Rectangle::new(x0.min(x1), y0.min(y1), dx + 1, dy + 1));
    }

    fn fill_span(&mut self, y: i32, sx: f32, ex: f32, raw: RawPixel) {
        if y < 0 || y >= self.context.height {
            return;
        }
        let (mut start, mut end) = (sx.round() as i32, ex.round() as i32);
        if start > end {
            std::mem::swap(&mut start, &mut end);
        }
        for x in start..=end {
            self.plot_raw(x, y, raw);
        }
    }

    /// Scan-converts a filled triangle as a flat-bottom half followed by a
    /// flat-top half.
    pub fn fill_triangle(&mut self, p1: Vector2, p2: Vector2, p3: Vector2, color: Color) {
        let raw = self.encode(color);
        let (mut p1, mut p2, mut p3) = (p1, p2, p3);
        if p2.y < p1.y {
            std::mem::swap(&mut p1, &mut p2);
        }
        if p3.y < p1.y {
            std::mem::swap(&mut p1, &mut p3);
        }
        if p3.y < p2.y {
            std::mem::swap(&mut p2, &mut p3);
        }

        let inv_slope = |a: Vector2, b: Vector2| {
            if b.y - a.y > 0.0 {
                (b.x - a.x) / (b.y - a.y)
            } else {
                0.0
            }
        };
        let dx1 = inv_slope(p1, p2);
        let dx2 = inv_slope(p1, p3);
        let dx3 = inv_slope(p2, p3);

        let (mut sx, mut ex) = (p1.x, p1.x);
        let mut y = p1.y as i32;
        while y as f32 <= p2.y {
            self.fill_span(y, sx, ex, raw);
            sx += dx1;
            ex += dx2;
            y += 1;
        }

        sx = p2.x;
        ex = p1.x + dx2 * (p2.y - p1.y);
        let mut y = p2.y as i32;
        while y as f32 <= p3.y {
            self.fill_span(y, sx, ex, raw);
            sx += dx3;
            ex += dx2;
            y += 1;
        }

        let min_x = p1.x.min(p2.x).min(p3.x).floor() as i32;
        let max_x = p1.x.max(p2.x).max(p3.x).ceil() as i32;
        let min_y = p1.y.floor() as i32;
        let max_y = p3.y.ceil() as i32;
        self.mark_dirty(Rectangle::new(min_x, min_y, max_x - min_x + 1, max_y - min_y + 1));
    }

    /// Outline of `rect` made of `border_width` (clamped to 1..=10) concentric
    /// one-pixel rings.
    pub fn draw_rect(&mut self, rect: Rectangle, border_width: i32, color: Color) {
        if rect.is_empty() {
            return;
        }
        let border = border_width.clamp(1, 10);
        let raw = self.encode(color);
        let Rectangle {
            x,
            y,
            width,
            height,
        } = rect;

        for i in 0..border {
            let top = y + i;
            let bottom = y + height - 1 - i;
            let left = x + i;
            let right = x + width - 1 - i;
            if left > right || top > bottom {
                break;
            }

            for px in left..=right {
                self.plot_raw(px, top, raw);
            }
            if bottom != top {
                for px in left..=right {
                    self.plot_raw(px, bottom, raw);
                }
            }
            for py in top + 1..bottom {
                self.plot_raw(left, py, raw);
                if right != left {
                    self.plot_raw(right, py, raw);
                }
            }
        }

        // Rings stop at the centre of thin rects, so do the strips.
        let strip = border.min(width.min(height) / 2).max(1);
        let side = (height - 2 * strip).max(0);
        self.mark_dirty(Rectangle::new(x, y, width, strip));
        self.mark_dirty(Rectangle::new(x, y + height - strip, width, strip));
        self.mark_dirty(Rectangle::new(x, y + strip, strip, side));
        self.mark_dirty(Rectangle::new(x + width - strip, y + strip, strip, side));
    }

    /// Solid rectangle, with corners rounded to `corner_radius` when positive.
    pub fn fill_rect(&mut self, rect: Rectangle, color: Color, corner_radius: i32) {
        if rect.is_empty() {
            return;
        }
        let raw = self.encode(color);
        let mut region = rect.intersect(&self.bounds());
        if let (Some(r), Some(clip)) = (region, self.clip_rect) {
            region = r.intersect(&clip);
        }

        if let Some(region) = region {
            let r = corner_radius.clamp(0, rect.width.min(rect.height) / 2);
            if r == 0 {
                self.fill_region(region, raw);
            } else {
                for py in region.y..region.bottom() {
                    for px in region.x..region.right() {
                        if in_rounded_rect(px - rect.x, py - rect.y, rect.width, rect.height, r) {
                            self.plot_raw(px, py, raw);
                        }
                    }
                }
            }
        }

        self.mark_dirty(rect);
    }

    /// Blits `image` with its top-left corner at `(x, y)`.
    ///
    /// Pixels with zero alpha are skipped, partially transparent ones are
    /// blended against the buffer.
    pub fn draw_image(&mut self, x: i32, y: i32, image: &BitmapImage) {
        let format = self.context.pixel_format;
        let bpp = self.bytes_per_pixel;

        for iy in 0..image.height() {
            for ix in 0..image.width() {
                let Some(offset) = self.writable_offset(x + ix, y + iy) else {
                    continue;
                };
                let (color, alpha) = image.pixel((iy * image.width() + ix) as usize);
                if alpha == 0 {
                    continue;
                }
                let dst = &mut self.back_buffer[offset..offset + bpp];
                let color = if alpha < 255 {
                    color.blend_over(format.decode(dst), alpha)
                } else {
                    color
                };
                dst.copy_from_slice(format.encode(color).as_bytes());
            }
        }

        self.mark_dirty(Rectangle::new(x, y, image.width(), image.height()));
    }

    /// Size of `text` as the installed font renderer would draw it.
    pub fn measure_text(&mut self, text: &str, font_size: f32) -> Size {
        self.font
            .as_mut()
            .map_or(Size::ZERO, |font| font.measure_text(text, font_size))
    }

    /// Draws `text` with its top-left corner at `(x, y)` and returns its size.
    ///
    /// Without a font renderer nothing is drawn.
    pub fn draw_text(&mut self, x: i32, y: i32, text: &str, font_size: f32, color: Color) -> Size {
        let Some(mut font) = self.font.take() else {
            trace!(text, "no font renderer installed, skipping text");
            return Size::ZERO;
        };

        let size = font.measure_text(text, font_size);
        font.rasterize(text, font_size, &mut |dx, dy, coverage| {
            self.plot(x + dx, y + dy, color, coverage)
        });
        self.font = Some(font);

        self.mark_dirty(Rectangle::new(x, y, size.width, size.height));
        size
    }
}

/// Circle-distance test for the four corner zones of a `width × height`
/// rectangle with radius `r`, in rectangle-local coordinates.
fn in_rounded_rect(lx: i32, ly: i32, width: i32, height: i32, r: i32) -> bool {
    let r2 = r * r;
    let cx = if lx < r {
        r
    } else if lx >= width - r {
        width - r - 1
    } else {
        return true;
    };
    let cy = if ly < r {
        r
    } else if ly >= height - r {
        height - r - 1
    } else {
        return true;
    };
    (lx - cx) * (lx - cx) + (ly - cy) * (ly - cy) <= r2
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(format: PixelFormat) -> DrawBuffer {
        DrawBuffer::new(GraphicsContext::new(100, 50, format))
    }

    fn pixel_at(buf: &DrawBuffer, x: i32, y: i32) -> Color {
        let bpp = buf.graphics_context().bytes_per_pixel();
        let offset = (y as usize * buf.width() as usize + x as usize) * bpp;
        buf.pixel_format().decode(&buf.buffer()[offset..offset + bpp])
    }

    fn painted(buf: &DrawBuffer, background: Color) -> usize {
        (0..buf.height())
            .flat_map(|y| (0..buf.width()).map(move |x| (x, y)))
            .filter(|&(x, y)| pixel_at(buf, x, y) != background)
            .count()
    }

    #[test]
    fn clear_is_idempotent() {
        let mut buf = buffer(PixelFormat::Rgb565);
        buf.set_clear_color(Color::DODGER_BLUE);
        buf.clear();
        let once = buf.buffer().to_vec();
        buf.clear();
        assert_eq!(buf.buffer(), &once[..]);
        assert_eq!(&once[..2], PixelFormat::Rgb565.encode(Color::DODGER_BLUE).as_bytes());
    }

    #[test]
    fn clear_rect_is_clamped() {
        let mut buf = buffer(PixelFormat::Bgra8888);
        buf.clear_rect_with(Color::WHITE, Rectangle::new(90, 40, 50, 50));
        assert_eq!(painted(&buf, Color::BLACK), 10 * 10);
        assert_eq!(pixel_at(&buf, 99, 49), Color::WHITE);
    }

    #[test]
    fn degenerate_line_draws_one_pixel() {
        let mut buf = buffer(PixelFormat::Rgba8888);
        buf.draw_line(7, 9, 7, 9, Color::RED);
        assert_eq!(painted(&buf, Color::BLACK), 1);
        assert_eq!(pixel_at(&buf, 7, 9), Color::RED);
        assert_eq!(buf.dirty_regions(), &[Rectangle::new(7, 9, 1, 1)]);
    }

    #[test]
    fn diagonal_line_follows_bresenham() {
        let mut buf = buffer(PixelFormat::Rgba8888);
        buf.draw_line(0, 0, 4, 2, Color::GREEN);
        let lit: Vec<_> = [(0, 0), (1, 0), (2, 1), (3, 1), (4, 2)]
            .into_iter()
            .filter(|&(x, y)| pixel_at(&buf, x, y) == Color::GREEN)
            .collect();
        assert_eq!(lit.len(), 5);
        assert_eq!(painted(&buf, Color::BLACK), 5);
    }

    #[test]
    fn pixel_alpha_blends_with_existing() {
        let mut buf = buffer(PixelFormat::Bgra8888);
        buf.clear_with(Color::new(0, 0, 200));
        buf.draw_pixel(3, 3, Color::new(200, 0, 0), 128);
        assert_eq!(pixel_at(&buf, 3, 3), Color::new(100, 0, 99));
        buf.draw_pixel(-1, 3, Color::WHITE, 255);
        buf.draw_pixel(100, 3, Color::WHITE, 255);
        assert_eq!(painted(&buf, Color::new(0, 0, 200)), 1);
    }

    #[test]
    fn clip_rect_discards_outside_writes() {
        let mut buf = buffer(PixelFormat::Rgba8888);
        buf.set_clip_rect(Rectangle::new(10, 10, 5, 5));
        buf.fill_rect(Rectangle::new(0, 0, 100, 50), Color::WHITE, 0);
        buf.draw_line(0, 0, 99, 0, Color::WHITE);
        assert_eq!(painted(&buf, Color::BLACK), 25);

        buf.clear_clip_rect();
        buf.draw_pixel(0, 0, Color::WHITE, 255);
        assert_eq!(painted(&buf, Color::BLACK), 26);
    }

    #[test]
    fn rounded_fill_leaves_corners_open() {
        let mut buf = buffer(PixelFormat::Rgb565);
        let rect = Rectangle::new(10, 10, 20, 20);
        buf.fill_rect(rect, Color::WHITE, 5);
        assert_eq!(pixel_at(&buf, 10, 10), Color::BLACK);
        assert_eq!(pixel_at(&buf, 29, 10), Color::BLACK);
        assert_eq!(pixel_at(&buf, 10, 29), Color::BLACK);
        assert_eq!(pixel_at(&buf, 29, 29), Color::BLACK);
        assert_eq!(pixel_at(&buf, 20, 20), Color::WHITE);
        assert_eq!(pixel_at(&buf, 20, 10), Color::WHITE);
        assert_eq!(buf.dirty_regions(), &[rect]);
    }

    #[test]
    fn square_fill_covers_corners() {
        let mut buf = buffer(PixelFormat::Rgb565);
        buf.fill_rect(Rectangle::new(10, 10, 20, 20), Color::WHITE, 0);
        assert_eq!(pixel_at(&buf, 10, 10), Color::WHITE);
        assert_eq!(pixel_at(&buf, 29, 29), Color::WHITE);
        assert_eq!(painted(&buf, Color::BLACK), 400);
    }

    #[test]
    fn outline_marks_four_strips() {
        let mut buf = buffer(PixelFormat::Rgba8888);
        buf.draw_rect(Rectangle::new(10, 10, 20, 10), 2, Color::RED);
        assert_eq!(
            buf.dirty_regions(),
            &[
                Rectangle::new(10, 10, 20, 2),
                Rectangle::new(10, 18, 20, 2),
                Rectangle::new(10, 12, 2, 6),
                Rectangle::new(28, 12, 2, 6),
            ]
        );
        // 20*10 minus the 16*6 interior
        assert_eq!(painted(&buf, Color::BLACK), 200 - 96);
        assert_eq!(pixel_at(&buf, 20, 15), Color::BLACK);
    }

    #[test]
    fn border_width_is_clamped() {
        let mut buf = buffer(PixelFormat::Rgba8888);
        buf.draw_rect(Rectangle::new(0, 0, 40, 40), 0, Color::RED);
        assert_eq!(painted(&buf, Color::BLACK), 4 * 39);

        let mut buf = buffer(PixelFormat::Rgba8888);
        buf.draw_rect(Rectangle::new(0, 0, 40, 40), 25, Color::RED);
        assert_eq!(pixel_at(&buf, 9, 20), Color::RED);
        assert_eq!(pixel_at(&buf, 10, 20), Color::BLACK);
    }

    #[test]
    fn thin_outline_is_drawn_once() {
        let mut buf = buffer(PixelFormat::Rgba8888);
        buf.draw_rect(Rectangle::new(5, 5, 10, 1), 1, Color::RED);
        assert_eq!(painted(&buf, Color::BLACK), 10);
        let mut buf = buffer(PixelFormat::Rgba8888);
        buf.draw_rect(Rectangle::new(5, 5, 1, 10), 3, Color::RED);
        assert_eq!(painted(&buf, Color::BLACK), 10);
    }

    #[test]
    fn triangle_fills_between_edges() {
        let mut buf = buffer(PixelFormat::Bgra8888);
        buf.fill_triangle(
            Vector2::new(10.0, 30.0),
            Vector2::new(10.0, 10.0),
            Vector2::new(30.0, 30.0),
            Color::GREEN,
        );
        assert_eq!(pixel_at(&buf, 10, 10), Color::GREEN);
        assert_eq!(pixel_at(&buf, 12, 28), Color::GREEN);
        assert_eq!(pixel_at(&buf, 30, 30), Color::GREEN);
        assert_eq!(pixel_at(&buf, 28, 12), Color::BLACK);
        assert_eq!(buf.dirty_regions(), &[Rectangle::new(10, 10, 21, 21)]);
    }

    #[test]
    fn flat_triangle_does_not_panic() {
        let mut buf = buffer(PixelFormat::Bgra8888);
        let p = Vector2::new(5.0, 5.0);
        buf.fill_triangle(p, p, p, Color::GREEN);
        assert_eq!(painted(&buf, Color::BLACK), 1);
    }

    #[test]
    fn transparent_image_leaves_buffer_untouched() {
        let mut buf = buffer(PixelFormat::Bgra8888);
        buf.clear_with(Color::SKY_BLUE);
        let before = buf.buffer().to_vec();
        let rgba = [10u8, 20, 30, 0].repeat(16 * 8);
        let image = BitmapImage::from_rgba(16, 8, &rgba, PixelFormat::Bgra8888).unwrap();
        buf.draw_image(4, 4, &image);
        assert_eq!(buf.buffer(), &before[..]);
    }

    #[test]
    fn image_is_clipped_to_buffer() {
        let mut buf = buffer(PixelFormat::Rgb565);
        let rgba = [255u8, 255, 255, 255].repeat(10 * 10);
        let image = BitmapImage::from_rgba(10, 10, &rgba, PixelFormat::Rgb565).unwrap();
        buf.draw_image(95, 45, &image);
        assert_eq!(painted(&buf, Color::BLACK), 25);
        assert_eq!(buf.dirty_regions(), &[Rectangle::new(95, 45, 10, 10)]);
    }

    #[test]
    fn dirty_regions_are_cleared_and_reset() {
        let mut buf = buffer(PixelFormat::Rgba8888);
        buf.set_clear_color(Color::GRAY);
        buf.clear();
        buf.fill_rect(Rectangle::new(0, 0, 10, 10), Color::WHITE, 0);
        buf.draw_line(20, 20, 30, 20, Color::WHITE);
        assert_eq!(buf.dirty_regions().len(), 2);

        buf.clear_dirty_regions();
        assert!(buf.dirty_regions().is_empty());
        assert_eq!(painted(&buf, Color::GRAY), 0);
    }

    #[test]
    fn full_clear_drops_pending_dirty_regions() {
        let mut buf = buffer(PixelFormat::Bgra8888);
        for _ in 0..100 {
            buf.clear();
            buf.fill_rect(Rectangle::new(5, 5, 10, 10), Color::WHITE, 0);
            buf.draw_rect(Rectangle::new(20, 5, 30, 20), 2, Color::WHITE);
        }
        assert_eq!(buf.dirty_regions().len(), 5);

        buf.clear_with(Color::RED);
        assert!(buf.dirty_regions().is_empty());
        assert_eq!(painted(&buf, Color::RED), 0);
    }

    #[test]
    fn thick_border_on_thin_rect_stays_inside() {
        let mut buf = buffer(PixelFormat::Bgra8888);
        let rect = Rectangle::new(40, 10, 1, 10);
        buf.draw_rect(rect, 3, Color::WHITE);
        assert_eq!(painted(&buf, Color::BLACK), 10);
        assert!(!buf.dirty_regions().is_empty());
        for dirty in buf.dirty_regions() {
            assert_eq!(dirty.intersect(&rect), Some(*dirty), "{dirty:?} leaks out of {rect:?}");
        }

        buf.clear_with(Color::BLACK);
        let wide = Rectangle::new(10, 30, 20, 4);
        buf.draw_rect(wide, 10, Color::WHITE);
        assert_eq!(painted(&buf, Color::BLACK), 80);
        for dirty in buf.dirty_regions() {
            assert_eq!(dirty.intersect(&wide), Some(*dirty), "{dirty:?} leaks out of {wide:?}");
        }
    }

    #[test]
    fn resize_reallocates_and_clears() {
        let mut buf = buffer(PixelFormat::Bgra8888);
        buf.set_clear_color(Color::BLUE);
        buf.fill_rect(Rectangle::new(0, 0, 10, 10), Color::WHITE, 0);

        buf.resize(GraphicsContext::new(30, 20, PixelFormat::Bgra8888));
        assert_eq!(buf.buffer().len(), 30 * 20 * 4);
        assert!(buf.dirty_regions().is_empty());
        assert_eq!(painted(&buf, Color::BLUE), 0);
    }

    struct BlockFont;

    impl FontRenderer for BlockFont {
        fn measure_text(&mut self, text: &str, _font_size: f32) -> Size {
            Size::new(text.len() as i32 * 2, 2)
        }

        fn rasterize(&mut self, text: &str, _font_size: f32, plot: &mut dyn FnMut(i32, i32, u8)) {
            for i in 0..text.len() as i32 {
                plot(i * 2, 0, 255);
                plot(i * 2, 1, 255);
            }
        }
    }

    #[test]
    fn text_goes_through_font_renderer() {
        let mut buf = buffer(PixelFormat::Rgba8888);
        assert_eq!(buf.draw_text(0, 0, "abc", 12.0, Color::WHITE), Size::ZERO);

        buf.set_font_renderer(Box::new(BlockFont));
        assert_eq!(buf.measure_text("abc", 12.0), Size::new(6, 2));
        let size = buf.draw_text(10, 10, "abc", 12.0, Color::WHITE);
        assert_eq!(size, Size::new(6, 2));
        assert_eq!(painted(&buf, Color::BLACK), 6);
        assert_eq!(pixel_at(&buf, 14, 11), Color::WHITE);
        assert_eq!(buf.dirty_regions(), &[Rectangle::new(10, 10, 6, 2)]);
    }
}
