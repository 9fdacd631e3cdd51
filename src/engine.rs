use std::{
    io::Write,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use tracing::{debug, info, warn};

use crate::{
    config::{EngineOptions, RenderMode, RuntimeConfig},
    error::{Error, Result},
    graphics::{DrawBuffer, GraphicsContext, TrueTypeFont},
    input::{CalibrationBounds, CalibrationSettings, InputManager, TouchCalibrator},
    primitives::{Color, Rectangle, Size},
    render_target::{FramebufferTarget, RenderTarget, WindowTarget},
};

const WINDOW_TITLE: &str = "touchfb";

/// Durations of the phases of the last presented frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderTimingMetrics {
    /// Time since the previous frame began.
    pub frame_delta: Duration,
    pub clear: Duration,
    pub draw: Duration,
    pub overlay: Duration,
    pub swap: Duration,
    pub total: Duration,
}

impl RenderTimingMetrics {
    fn lines(&self) -> [String; 6] {
        let ms = |d: Duration| d.as_secs_f64() * 1000.0;
        [
            format!("Frame: {:.2} ms", ms(self.frame_delta)),
            format!("Clear: {:.2} ms", ms(self.clear)),
            format!("Draw: {:.2} ms", ms(self.draw)),
            format!("Overlay: {:.2} ms", ms(self.overlay)),
            format!("Swap: {:.2} ms", ms(self.swap)),
            format!("Total: {:.2} ms", ms(self.total)),
        ]
    }
}

struct FrameTimer {
    started: Instant,
    clear: Duration,
}

/// Ties a render target, its draw buffer and the input devices together.
///
/// The frame loop is `begin_frame`, draw into [`Engine::buffer_mut`], then
/// `present`.
pub struct Engine {
    options: EngineOptions,
    runtime: RuntimeConfig,
    target: Box<dyn RenderTarget>,
    buffer: DrawBuffer,
    input: InputManager,
    stop: Arc<AtomicBool>,
    metrics: Option<RenderTimingMetrics>,
    frame: Option<FrameTimer>,
    last_frame_start: Option<Instant>,
    caret_hidden: bool,
    shut_down: bool,
}

impl Engine {
    /// Opens the render target selected by `options.render_mode` and the
    /// configured input devices.
    pub fn new(options: EngineOptions) -> Result<Self> {
        let target: Box<dyn RenderTarget> = match options.render_mode {
            RenderMode::Framebuffer => Box::new(FramebufferTarget::open(&options.framebuffer_device)?),
            RenderMode::Window => Box::new(WindowTarget::open(
                WINDOW_TITLE,
                options.render_width,
                options.render_height,
            )?),
        };
        let input = InputManager::from_options(&options)?;
        Self::with_parts(options, target, input)
    }

    /// Builds an engine around an already opened target and input manager.
    pub fn with_parts(
        options: EngineOptions,
        target: Box<dyn RenderTarget>,
        input: InputManager,
    ) -> Result<Self> {
        let context = target.graphics_context();
        let mut buffer = DrawBuffer::new(context);
        buffer.set_clear_color(options.background_color);
        if let Some(path) = &options.font_path {
            buffer.set_font_renderer(Box::new(TrueTypeFont::load(path)?));
        }
        buffer.clear();

        info!(
            width = context.width,
            height = context.height,
            format = %context.pixel_format,
            mode = ?options.render_mode,
            "engine created"
        );
        Ok(Self {
            runtime: RuntimeConfig::default(),
            options,
            target,
            buffer,
            input,
            stop: Arc::new(AtomicBool::new(false)),
            metrics: None,
            frame: None,
            last_frame_start: None,
            caret_hidden: false,
            shut_down: false,
        })
    }

    /// Loads the runtime config, starts the input readers and calibrates
    /// touch when the stored bounds are unusable.
    pub fn initialize(&mut self) -> Result<()> {
        self.runtime = RuntimeConfig::load(&self.options.runtime_config_path)?;

        if self.options.render_mode == RenderMode::Framebuffer && self.options.hide_console_caret {
            set_console_caret(false);
            self.caret_hidden = true;
        }

        self.input.initialize(self.screen_size())?;
        self.input.set_calibration(self.runtime.touch_calibration);

        if self.input.has_touch() && self.runtime.needs_calibration() {
            if self.options.skip_touch_calibration {
                warn!("touch is not calibrated and calibration is skipped");
            } else {
                self.calibrate()?;
            }
        }
        Ok(())
    }

    /// Runs the interactive calibration and persists the result. On failure
    /// the previous bounds stay in effect.
    pub fn calibrate(&mut self) -> Result<CalibrationBounds> {
        if !self.input.has_touch() {
            warn!("no touch device to calibrate");
            return Err(Error::CalibrationIncomplete);
        }

        let settings = CalibrationSettings::from_options(&self.options);
        let bounds = TouchCalibrator::new(settings, &mut self.buffer, self.target.as_mut(), &self.stop)
            .run(&self.input)?;

        self.runtime.touch_calibration = bounds;
        self.runtime.save(&self.options.runtime_config_path)?;
        self.input.set_calibration(bounds);
        self.buffer.clear();
        Ok(bounds)
    }

    /// Picks up window resizes and clears what the previous frame drew.
    pub fn begin_frame(&mut self) {
        let started = Instant::now();

        if let Some(size) = self.target.poll_resize() {
            info!(width = size.width, height = size.height, "render target resized");
            self.buffer.resize(self.target.graphics_context());
            self.input.set_screen_size(size);
        }

        self.buffer.clear_dirty_regions();
        self.frame = Some(FrameTimer {
            started,
            clear: started.elapsed(),
        });
    }

    /// Draws the overlays, swaps the buffer to the target and records timing.
    pub fn present(&mut self) -> Result<()> {
        let now = Instant::now();
        let frame = self.frame.take().unwrap_or(FrameTimer {
            started: now,
            clear: Duration::ZERO,
        });
        let draw = now.saturating_duration_since(frame.started + frame.clear);

        let overlay_start = Instant::now();
        if self.options.show_debug_ui && self.input.has_touch() {
            self.draw_touch_cursor();
        }
        if self.options.show_metrics {
            self.draw_metrics();
        }
        let overlay = overlay_start.elapsed();

        let swap_start = Instant::now();
        self.target.swap_buffer(self.buffer.buffer())?;
        let swap = swap_start.elapsed();

        let frame_delta = self
            .last_frame_start
            .map(|last| frame.started.saturating_duration_since(last))
            .unwrap_or_default();
        self.last_frame_start = Some(frame.started);

        self.metrics = Some(RenderTimingMetrics {
            frame_delta,
            clear: frame.clear,
            draw,
            overlay,
            swap,
            total: frame.started.elapsed(),
        });
        Ok(())
    }

    fn draw_touch_cursor(&mut self) {
        let touch = self.input.touch_state();
        let x = (touch.x * self.buffer.width() as f32) as i32;
        let y = (touch.y * self.buffer.height() as f32) as i32;
        let color = if touch.pressed { Color::RED } else { Color::GRAY };
        self.buffer.fill_rect(Rectangle::new(x, y, 10, 10), color, 0);
    }

    fn draw_metrics(&mut self) {
        let Some(metrics) = self.metrics else {
            return;
        };
        const LINE_HEIGHT: i32 = 14;
        const FONT_SIZE: f32 = 12.0;

        let lines = metrics.lines();
        let panel = Rectangle::new(0, 0, 170, LINE_HEIGHT * (lines.len() as i32 + 1));
        self.buffer.fill_rect(panel, self.options.background_color, 0);
        for (i, line) in lines.iter().enumerate() {
            self.buffer.draw_text(
                15,
                8 + i as i32 * LINE_HEIGHT,
                line,
                FONT_SIZE,
                self.options.foreground_color,
            );
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn runtime_config(&self) -> &RuntimeConfig {
        &self.runtime
    }

    pub fn graphics_context(&self) -> GraphicsContext {
        self.buffer.graphics_context()
    }

    pub fn screen_size(&self) -> Size {
        Size::new(self.buffer.width(), self.buffer.height())
    }

    pub fn buffer(&self) -> &DrawBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut DrawBuffer {
        &mut self.buffer
    }

    pub fn input(&self) -> &InputManager {
        &self.input
    }

    pub fn metrics(&self) -> Option<RenderTimingMetrics> {
        self.metrics
    }

    /// Setting this flag interrupts calibration and ends [`Self::is_running`].
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn is_running(&self) -> bool {
        !self.stop.load(Ordering::Acquire) && !self.target.should_close()
    }

    /// Stops the input threads and restores the console. Idempotent.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.input.shutdown();
        if self.caret_hidden {
            set_console_caret(true);
            self.caret_hidden = false;
        }
        debug!("engine shut down");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn set_console_caret(visible: bool) {
    let sequence: &[u8] = if visible { b"\x1b[?25h" } else { b"\x1b[?25l" };
    let mut stdout = std::io::stdout();
    if let Err(e) = stdout.write_all(sequence).and_then(|()| stdout.flush()) {
        warn!(error = %e, "could not toggle console caret");
    }
}
