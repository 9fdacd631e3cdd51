use crate::{
    error::{Error, Result},
    graphics::GraphicsContext,
    primitives::Size,
};

/// # Framebuffer backend
///
/// Memory-maps a Linux `/dev/fbN` device. Geometry and channel layout come
/// from `fbset -fb <device>`.
pub mod backend_framebuffer;
/// # Wayland backend
///
/// A plain `xdg_toplevel` window backed by a `wl_shm` buffer, for running on
/// a desktop instead of the panel.
///
/// https://wayland.app/protocols/xdg-shell
pub mod backend_wayland;

pub use backend_framebuffer::{FbInfo, FramebufferTarget};
pub use backend_wayland::WindowTarget;

/// Owns the physical output surface and receives finished frames.
///
/// The render thread owns its target exclusively; nothing here is shared
/// with the input threads.
pub trait RenderTarget {
    /// Geometry and pixel format the draw buffer has to match.
    fn graphics_context(&self) -> GraphicsContext;

    /// Copies a complete frame to the surface. `buffer` must be exactly
    /// `width * height * bytes_per_pixel` long.
    fn swap_buffer(&mut self, buffer: &[u8]) -> Result<()>;

    /// New surface size if the user resized it since the last call. The
    /// caller rebuilds its draw buffer against [`Self::graphics_context`].
    fn poll_resize(&mut self) -> Option<Size> {
        None
    }

    /// True once the host asked the surface to close.
    fn should_close(&self) -> bool {
        false
    }
}

pub(crate) fn check_frame_len(context: &GraphicsContext, buffer: &[u8]) -> Result<()> {
    let expected = context.buffer_len();
    if buffer.len() != expected {
        return Err(Error::BufferSizeMismatch {
            expected,
            actual: buffer.len(),
        });
    }
    Ok(())
}
