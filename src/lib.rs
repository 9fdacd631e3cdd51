/// Crate-wide error type
pub mod error;

/// Engine options and the persisted runtime state
pub mod config;

/// Colors, geometry and bitmap images
pub mod primitives;

/// Pixel formats and the software draw buffer
pub mod graphics;

/// Raw kernel input devices, touch decoding and calibration
pub mod input;

/// Output surfaces: memory-mapped framebuffer and Wayland window
pub mod render_target;

/// Frame loop glue between render target, draw buffer and input
pub mod engine;

pub use engine::{Engine, RenderTimingMetrics};
pub use error::{Error, Result};

// Threads: the render thread owns the engine (target, buffer, calibrator)
// outright and never locks. Every open input device gets one reader thread
// that decodes records into a mutex-guarded state; the lock is taken per
// batch, never across the read itself.

// Touch coordinates stay raw inside `input::TouchState`. Calibration bounds
// are applied on query, then the swap/invert transform. All-zero bounds mean
// "never calibrated" and queries fall back to (0, 0, pressed).

// The draw buffer writes straight in the target's pixel format so a swap is
// a plain copy. On the framebuffer the copy goes row by row because the
// virtual width can be larger than the visible one.
