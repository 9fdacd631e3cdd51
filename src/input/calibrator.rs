use std::{
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::{Duration, Instant},
};

use tracing::{debug, info, warn};

use super::{
    manager::{InputManager, TouchTransform},
    touch::{CalibrationBounds, TouchSample, TouchState},
};
use crate::{
    config::EngineOptions,
    error::{Error, Result},
    graphics::DrawBuffer,
    primitives::{Color, Point, Rectangle, Size},
    render_target::RenderTarget,
};

/// Anything the calibrator can poll for raw touch samples.
pub trait TouchSource {
    fn abs_touch_state(&self) -> TouchSample;

    /// A faulted source never changes again, so waiting on it is pointless.
    fn is_faulted(&self) -> bool {
        false
    }
}

impl TouchSource for TouchState {
    fn abs_touch_state(&self) -> TouchSample {
        TouchState::abs_touch_state(self)
    }

    fn is_faulted(&self) -> bool {
        TouchState::is_faulted(self)
    }
}

impl TouchSource for InputManager {
    fn abs_touch_state(&self) -> TouchSample {
        InputManager::abs_touch_state(self)
    }

    fn is_faulted(&self) -> bool {
        self.touch().is_none_or(TouchState::is_faulted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldStatus {
    /// Not touching.
    Idle,
    /// Touching for this long, below the threshold.
    Holding(Duration),
    /// Threshold reached; the point is captured once the finger lifts.
    WaitingForRelease,
    Complete(TouchSample),
}

#[derive(Debug, Clone, Copy)]
enum HoldPhase {
    Idle,
    Holding { since: Instant },
    WaitForRelease { point: TouchSample },
}

/// Press-and-hold detector for one calibration corner. Lifting the finger
/// before the threshold throws the progress away.
#[derive(Debug, Clone)]
pub struct HoldTracker {
    hold: Duration,
    phase: HoldPhase,
}

impl HoldTracker {
    pub fn new(hold: Duration) -> Self {
        Self {
            hold,
            phase: HoldPhase::Idle,
        }
    }

    pub fn update(&mut self, sample: TouchSample, now: Instant) -> HoldStatus {
        match self.phase {
            HoldPhase::Idle if sample.pressed => {
                self.phase = HoldPhase::Holding { since: now };
                self.check_threshold(sample, now, now)
            }
            HoldPhase::Idle => HoldStatus::Idle,
            HoldPhase::Holding { .. } if !sample.pressed => {
                self.phase = HoldPhase::Idle;
                HoldStatus::Idle
            }
            HoldPhase::Holding { since } => self.check_threshold(sample, since, now),
            HoldPhase::WaitForRelease { .. } if sample.pressed => HoldStatus::WaitingForRelease,
            HoldPhase::WaitForRelease { point } => {
                self.phase = HoldPhase::Idle;
                HoldStatus::Complete(point)
            }
        }
    }

    fn check_threshold(&mut self, sample: TouchSample, since: Instant, now: Instant) -> HoldStatus {
        let held = now.saturating_duration_since(since);
        if held >= self.hold {
            self.phase = HoldPhase::WaitForRelease { point: sample };
            HoldStatus::WaitingForRelease
        } else {
            HoldStatus::Holding(held)
        }
    }
}

/// Reports the position where a touch went down, once it is released.
#[derive(Debug, Clone, Default)]
pub struct TapTracker {
    down: Option<TouchSample>,
}

impl TapTracker {
    pub fn update(&mut self, sample: TouchSample) -> Option<TouchSample> {
        match (self.down, sample.pressed) {
            (None, true) => {
                self.down = Some(sample);
                None
            }
            (Some(_), false) => self.down.take(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationSettings {
    pub hold: Duration,
    pub poll_interval: Duration,
    /// Distance of the corner refinement targets from the screen edges.
    pub target_inset: i32,
    /// Smallest raw span accepted between the two bounding corners.
    pub min_span: i32,
    pub transform: TouchTransform,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            hold: Duration::from_millis(3500),
            poll_interval: Duration::from_millis(10),
            target_inset: 50,
            min_span: 16,
            transform: TouchTransform::default(),
        }
    }
}

impl CalibrationSettings {
    pub fn from_options(options: &EngineOptions) -> Self {
        Self {
            hold: Duration::from_millis(options.calibration_hold_ms),
            min_span: options.calibration_min_span,
            transform: TouchTransform::from_options(options),
            ..Self::default()
        }
    }
}

/// Interactive two-phase touch calibration. Owns the draw and swap cycle
/// while it runs.
///
/// Phase one captures two held corners and sorts them into provisional
/// bounds. Phase two asks for five taps, maps each through the provisional
/// bounds and shifts the bounds by the average error.
pub struct TouchCalibrator<'a> {
    settings: CalibrationSettings,
    buffer: &'a mut DrawBuffer,
    target: &'a mut dyn RenderTarget,
    cancel: &'a AtomicBool,
}

impl<'a> TouchCalibrator<'a> {
    pub fn new(
        settings: CalibrationSettings,
        buffer: &'a mut DrawBuffer,
        target: &'a mut dyn RenderTarget,
        cancel: &'a AtomicBool,
    ) -> Self {
        Self {
            settings,
            buffer,
            target,
            cancel,
        }
    }

    /// Runs both phases. Fails with `CalibrationIncomplete` when cancelled,
    /// when the window closes or when the touch source faults; the caller
    /// persists nothing in that case.
    pub fn run(&mut self, source: &dyn TouchSource) -> Result<CalibrationBounds> {
        info!(hold = ?self.settings.hold, "starting touch calibration");
        let provisional = self.bounding_box(source)?;
        info!(bounds = ?provisional, "bounding box captured");
        let refined = self.refine(source, provisional)?;
        info!(bounds = ?refined, "touch calibration complete");
        Ok(refined)
    }

    fn bounding_box(&mut self, source: &dyn TouchSource) -> Result<CalibrationBounds> {
        let min_span = self.settings.min_span.max(1);
        loop {
            let a = self.wait_for_hold(source, "Top Left")?;
            let b = self.wait_for_hold(source, "Bottom Right")?;
            // Either diagonal works.
            let bounds = CalibrationBounds::new(a.x.min(b.x), a.y.min(b.y), a.x.max(b.x), a.y.max(b.y));

            let span_x = bounds.max_x - bounds.min_x;
            let span_y = bounds.max_y - bounds.min_y;
            if span_x >= min_span && span_y >= min_span {
                return Ok(bounds);
            }
            warn!(span_x, span_y, min_span, "calibration corners too close together, restarting");
        }
    }

    fn refine(&mut self, source: &dyn TouchSource, bounds: CalibrationBounds) -> Result<CalibrationBounds> {
        let screen = Size::new(self.buffer.width(), self.buffer.height());
        let mut errors = Vec::with_capacity(5);

        for target in calibration_targets(screen, self.settings.target_inset) {
            self.draw_target(target, "Tap the square")?;
            let tap = self.wait_for_tap(source)?;
            let mapped = map_to_screen(tap, &bounds, self.settings.transform, screen);
            debug!(?target, ?tap, ?mapped, "refinement tap");
            errors.push((target.x - mapped.x, target.y - mapped.y));
        }

        Ok(adjust_bounds(bounds, &errors, self.settings.transform))
    }

    fn check_interrupted(&self, source: &dyn TouchSource) -> Result<()> {
        if self.cancel.load(Ordering::Acquire) || self.target.should_close() {
            warn!("touch calibration interrupted");
            return Err(Error::CalibrationIncomplete);
        }
        if source.is_faulted() {
            warn!("touch device failed during calibration");
            return Err(Error::CalibrationIncomplete);
        }
        Ok(())
    }

    fn wait_for_hold(&mut self, source: &dyn TouchSource, label: &str) -> Result<TouchSample> {
        let mut tracker = HoldTracker::new(self.settings.hold);
        loop {
            self.check_interrupted(source)?;
            let sample = source.abs_touch_state();
            match tracker.update(sample, Instant::now()) {
                HoldStatus::Complete(point) => {
                    debug!(label, ?point, "corner captured");
                    return Ok(point);
                }
                HoldStatus::Idle => self.draw_hold_screen(label, Duration::ZERO, sample)?,
                HoldStatus::Holding(held) => self.draw_hold_screen(label, held, sample)?,
                HoldStatus::WaitingForRelease => self.draw_hold_screen(label, self.settings.hold, sample)?,
            }
            thread::sleep(self.settings.poll_interval);
        }
    }

    fn wait_for_tap(&mut self, source: &dyn TouchSource) -> Result<TouchSample> {
        let mut tracker = TapTracker::default();
        loop {
            self.check_interrupted(source)?;
            if let Some(tap) = tracker.update(source.abs_touch_state()) {
                return Ok(tap);
            }
            thread::sleep(self.settings.poll_interval);
        }
    }

    fn draw_hold_screen(&mut self, label: &str, held: Duration, sample: TouchSample) -> Result<()> {
        let (width, height) = (self.buffer.width(), self.buffer.height());
        self.buffer.clear();

        let title = format!("Hold {label} Corner");
        let size = self.buffer.measure_text(&title, 25.0);
        self.buffer.draw_text(
            (width - size.width) / 2,
            (height - size.height) / 2 - 20,
            &title,
            25.0,
            Color::WHITE,
        );

        let progress = format!(
            "{:.1} / {:.1} sec",
            held.as_secs_f64(),
            self.settings.hold.as_secs_f64()
        );
        let size = self.buffer.measure_text(&progress, 20.0);
        self.buffer.draw_text(
            (width - size.width) / 2,
            (height - size.height) / 2 + 20,
            &progress,
            20.0,
            Color::LIGHT_GRAY,
        );

        let raw = format!("x: {}  y: {}", sample.x, sample.y);
        let size = self.buffer.measure_text(&raw, 20.0);
        self.buffer.draw_text(
            (width - size.width) / 2,
            (height - size.height) / 2 + 50,
            &raw,
            20.0,
            Color::LIGHT_GRAY,
        );

        let bar = Rectangle::new(width / 4, height / 2 + 80, width / 2, 8);
        self.buffer.draw_rect(bar, 1, Color::GRAY);
        let fraction = if self.settings.hold.is_zero() {
            1.0
        } else {
            (held.as_secs_f64() / self.settings.hold.as_secs_f64()).min(1.0)
        };
        let filled = (bar.width as f64 * fraction) as i32;
        if filled > 0 {
            self.buffer.fill_rect(
                Rectangle::new(bar.x, bar.y, filled, bar.height),
                Color::DODGER_BLUE,
                0,
            );
        }

        self.target.swap_buffer(self.buffer.buffer())
    }

    fn draw_target(&mut self, target: Point, message: &str) -> Result<()> {
        const MARKER: i32 = 20;
        let (width, height) = (self.buffer.width(), self.buffer.height());
        self.buffer.clear();
        self.buffer.draw_rect(
            Rectangle::new(target.x - MARKER / 2, target.y - MARKER / 2, MARKER, MARKER),
            2,
            Color::RED,
        );
        self.buffer.draw_line(target.x - 4, target.y, target.x + 4, target.y, Color::RED);
        self.buffer.draw_line(target.x, target.y - 4, target.x, target.y + 4, Color::RED);

        let size = self.buffer.measure_text(message, 20.0);
        self.buffer.draw_text(
            (width - size.width) / 2,
            height - size.height - 20,
            message,
            20.0,
            Color::WHITE,
        );
        self.target.swap_buffer(self.buffer.buffer())
    }
}

/// Four corners at `inset` from the edges plus the center, in tap order.
pub fn calibration_targets(screen: Size, inset: i32) -> [Point; 5] {
    let (w, h) = (screen.width, screen.height);
    [
        Point::new(inset, inset),
        Point::new(w - inset, inset),
        Point::new(w / 2, h / 2),
        Point::new(inset, h - inset),
        Point::new(w - inset, h - inset),
    ]
}

/// Where `sample` lands on screen through `bounds`, unclamped.
pub fn map_to_screen(
    sample: TouchSample,
    bounds: &CalibrationBounds,
    transform: TouchTransform,
    screen: Size,
) -> Point {
    let fx = (sample.x - bounds.min_x) as f64 / (bounds.max_x - bounds.min_x) as f64;
    let fy = (sample.y - bounds.min_y) as f64 / (bounds.max_y - bounds.min_y) as f64;
    let (sx, sy) = transform.apply_xy(fx, fy);
    Point::new(
        (sx * screen.width as f64).round() as i32,
        (sy * screen.height as f64).round() as i32,
    )
}

/// Shifts `bounds` by the mean `target - mapped` error. A negative mean grows
/// the max edge, a positive one lowers the min edge.
pub fn adjust_bounds(
    bounds: CalibrationBounds,
    errors: &[(i32, i32)],
    transform: TouchTransform,
) -> CalibrationBounds {
    if errors.is_empty() {
        return bounds;
    }
    let n = errors.len() as f64;
    let avg_x = errors.iter().map(|e| e.0 as f64).sum::<f64>() / n;
    let avg_y = errors.iter().map(|e| e.1 as f64).sum::<f64>() / n;
    let (dx, dy) = transform.screen_delta_to_device(avg_x, avg_y);
    let (dx, dy) = (dx as i32, dy as i32);

    let mut out = bounds;
    if dx < 0 {
        out.max_x += -dx;
    } else if dx > 0 {
        out.min_x -= dx;
    }
    if dy < 0 {
        out.max_y += -dy;
    } else if dy > 0 {
        out.min_y -= dy;
    }
    debug!(avg_x, avg_y, dx, dy, "applied average calibration error");
    out
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, sync::Mutex};

    use super::*;
    use crate::graphics::{GraphicsContext, PixelFormat};

    const HOLD: Duration = Duration::from_millis(3500);

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn down(x: i32, y: i32) -> TouchSample {
        TouchSample::new(x, y, true)
    }

    fn up() -> TouchSample {
        TouchSample::default()
    }

    #[test]
    fn hold_captures_exactly_at_threshold() {
        let start = Instant::now();
        let mut t = HoldTracker::new(HOLD);
        assert_eq!(t.update(down(10, 20), start), HoldStatus::Holding(Duration::ZERO));
        assert_eq!(t.update(down(11, 21), start + ms(3499)), HoldStatus::Holding(ms(3499)));
        assert_eq!(t.update(down(12, 22), start + HOLD), HoldStatus::WaitingForRelease);
        // Still held: the captured point does not move.
        assert_eq!(t.update(down(99, 99), start + ms(5000)), HoldStatus::WaitingForRelease);
        assert_eq!(t.update(up(), start + ms(5010)), HoldStatus::Complete(down(12, 22)));
        assert_eq!(t.update(up(), start + ms(5020)), HoldStatus::Idle);
    }

    #[test]
    fn early_release_resets_progress() {
        let start = Instant::now();
        let mut t = HoldTracker::new(HOLD);
        t.update(down(10, 20), start);
        assert_eq!(t.update(down(10, 20), start + ms(3499)), HoldStatus::Holding(ms(3499)));
        assert_eq!(t.update(up(), start + ms(3499)), HoldStatus::Idle);

        let again = start + ms(4000);
        assert_eq!(t.update(down(10, 20), again), HoldStatus::Holding(Duration::ZERO));
        assert_eq!(t.update(down(10, 20), again + ms(100)), HoldStatus::Holding(ms(100)));
    }

    #[test]
    fn tap_reports_touch_down_position_on_release() {
        let mut t = TapTracker::default();
        assert_eq!(t.update(up()), None);
        assert_eq!(t.update(down(5, 6)), None);
        assert_eq!(t.update(down(50, 60)), None);
        assert_eq!(t.update(up()), Some(down(5, 6)));
        assert_eq!(t.update(up()), None);
    }

    #[test]
    fn targets_follow_screen_size() {
        let targets = calibration_targets(Size::new(380, 360), 50);
        assert_eq!(
            targets,
            [
                Point::new(50, 50),
                Point::new(330, 50),
                Point::new(190, 180),
                Point::new(50, 310),
                Point::new(330, 310),
            ]
        );
    }

    #[test]
    fn adjustment_direction_follows_error_sign() {
        let bounds = CalibrationBounds::new(100, 200, 3900, 3800);
        let id = TouchTransform::default();
        assert_eq!(
            adjust_bounds(bounds, &[(-2, 3), (-2, 3)], id),
            CalibrationBounds::new(100, 197, 3902, 3800)
        );
        assert_eq!(
            adjust_bounds(bounds, &[(4, -1), (4, -1)], id),
            CalibrationBounds::new(96, 200, 3900, 3801)
        );
        assert_eq!(adjust_bounds(bounds, &[(1, 0), (-1, 0)], id), bounds);

        let swapped = TouchTransform {
            swap_xy: true,
            ..TouchTransform::default()
        };
        assert_eq!(
            adjust_bounds(bounds, &[(-2, 3)], swapped),
            CalibrationBounds::new(97, 200, 3900, 3802)
        );
    }

    /// Replays a fixed list of samples, one per poll, then reports a fault.
    struct Script {
        samples: Mutex<VecDeque<TouchSample>>,
        exhausted: AtomicBool,
    }

    impl Script {
        fn new(samples: impl IntoIterator<Item = TouchSample>) -> Self {
            Self {
                samples: Mutex::new(samples.into_iter().collect()),
                exhausted: AtomicBool::new(false),
            }
        }

        fn remaining(&self) -> usize {
            self.samples.lock().unwrap().len()
        }
    }

    impl TouchSource for Script {
        fn abs_touch_state(&self) -> TouchSample {
            self.samples.lock().unwrap().pop_front().unwrap_or_else(|| {
                self.exhausted.store(true, Ordering::Release);
                up()
            })
        }

        fn is_faulted(&self) -> bool {
            self.exhausted.load(Ordering::Acquire)
        }
    }

    struct CountingTarget {
        context: GraphicsContext,
        frames: usize,
    }

    impl RenderTarget for CountingTarget {
        fn graphics_context(&self) -> GraphicsContext {
            self.context
        }

        fn swap_buffer(&mut self, buffer: &[u8]) -> Result<()> {
            crate::render_target::check_frame_len(&self.context, buffer)?;
            self.frames += 1;
            Ok(())
        }
    }

    fn instant_settings() -> CalibrationSettings {
        CalibrationSettings {
            hold: Duration::ZERO,
            poll_interval: Duration::ZERO,
            ..CalibrationSettings::default()
        }
    }

    fn corners(tl: TouchSample, br: TouchSample) -> Vec<TouchSample> {
        vec![tl, up(), br, up()]
    }

    /// Taps at the raw positions of the five targets, offset by a bias.
    /// Provisional bounds 100..3900 × 200..3800 on 380×360 are 10 raw units
    /// per pixel.
    fn taps(bias_x: i32, bias_y: i32) -> Vec<TouchSample> {
        [(600, 700), (3400, 700), (2000, 2000), (600, 3300), (3400, 3300)]
            .into_iter()
            .flat_map(|(x, y)| [down(x + bias_x, y + bias_y), up()])
            .collect()
    }

    fn run_script(script: &Script, cancel: &AtomicBool) -> (Result<CalibrationBounds>, usize) {
        let context = GraphicsContext::new(380, 360, PixelFormat::Bgra8888);
        let mut buffer = DrawBuffer::new(context);
        let mut target = CountingTarget { context, frames: 0 };
        let result = TouchCalibrator::new(instant_settings(), &mut buffer, &mut target, cancel).run(script);
        (result, target.frames)
    }

    #[test]
    fn unbiased_taps_keep_provisional_bounds() {
        let mut samples = corners(down(100, 200), down(3900, 3800));
        samples.extend(taps(0, 0));
        let script = Script::new(samples);

        let (result, frames) = run_script(&script, &AtomicBool::new(false));
        assert_eq!(result.unwrap(), CalibrationBounds::new(100, 200, 3900, 3800));
        assert_eq!(script.remaining(), 0);
        assert!(frames >= 5);
    }

    #[test]
    fn biased_taps_shift_bounds() {
        // Corners tapped along the other diagonal.
        let mut samples = corners(down(3900, 200), down(100, 3800));
        samples.extend(taps(20, -30));
        let script = Script::new(samples);

        let (result, _) = run_script(&script, &AtomicBool::new(false));
        assert_eq!(result.unwrap(), CalibrationBounds::new(100, 197, 3902, 3800));
    }

    #[test]
    fn close_corners_restart_the_bounding_box() {
        let mut samples = corners(down(100, 200), down(108, 3800));
        samples.extend(corners(down(100, 200), down(3900, 3800)));
        samples.extend(taps(0, 0));
        let script = Script::new(samples);

        let (result, _) = run_script(&script, &AtomicBool::new(false));
        assert_eq!(result.unwrap(), CalibrationBounds::new(100, 200, 3900, 3800));
    }

    #[test]
    fn long_idle_wait_keeps_dirty_list_small() {
        let script = Script::new(std::iter::repeat_n(up(), 1000));
        let context = GraphicsContext::new(380, 360, PixelFormat::Bgra8888);
        let mut buffer = DrawBuffer::new(context);
        let mut target = CountingTarget { context, frames: 0 };
        let cancel = AtomicBool::new(false);

        let result = TouchCalibrator::new(instant_settings(), &mut buffer, &mut target, &cancel).run(&script);
        assert!(matches!(result, Err(Error::CalibrationIncomplete)));
        assert_eq!(script.remaining(), 0);
        assert!(target.frames >= 1000);
        // One screen's worth of shapes, not one per poll.
        assert!(buffer.dirty_regions().len() <= 8, "{} dirty regions", buffer.dirty_regions().len());
    }

    #[test]
    fn interruption_fails_incomplete() {
        let script = Script::new(corners(down(100, 200), down(3900, 3800)));
        let (result, _) = run_script(&script, &AtomicBool::new(true));
        assert!(matches!(result, Err(Error::CalibrationIncomplete)));

        // Source runs dry halfway through refinement.
        let mut samples = corners(down(100, 200), down(3900, 3800));
        samples.extend(taps(0, 0).into_iter().take(4));
        let script = Script::new(samples);
        let (result, _) = run_script(&script, &AtomicBool::new(false));
        assert!(matches!(result, Err(Error::CalibrationIncomplete)));
    }
}
