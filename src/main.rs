//! `touchfb` drives a framebuffer or window with a small demo scene and
//! handles touch calibration and device discovery.
//!
//! ```bash
//! # Run the demo loop until Ctrl-C
//! touchfb --config touchfb.toml run
//!
//! # Force a new touch calibration
//! touchfb --config touchfb.toml calibrate
//!
//! # List input devices and framebuffer geometry
//! touchfb devices
//! touchfb fbinfo /dev/fb0
//! ```

use std::{
    path::PathBuf,
    sync::{
        Arc, OnceLock,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{Level, info, warn};

use touchfb::{
    Engine,
    config::{EngineOptions, RenderMode},
    input::{self, enumerate::INPUT_DIR},
    primitives::{Color, Rectangle},
    render_target::FbInfo,
};

#[derive(Parser)]
#[command(name = "touchfb")]
#[command(version)]
#[command(about = "Framebuffer display and touch input pipeline")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Engine options file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// More logging: -v info, -vv debug, -vvv trace
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(flatten)]
    overrides: Overrides,
}

/// Command line values that take precedence over the options file.
#[derive(Args)]
struct Overrides {
    /// Output surface
    #[arg(long, global = true, value_enum)]
    render_mode: Option<Mode>,

    /// Framebuffer device, e.g. /dev/fb1
    #[arg(long, global = true)]
    fb_device: Option<PathBuf>,

    /// Touch device path, or "auto" to search /dev/input
    #[arg(long, global = true)]
    touch_device: Option<String>,

    /// Persisted calibration file
    #[arg(long, global = true)]
    runtime_config: Option<PathBuf>,

    /// Do not calibrate at startup even if no bounds are stored
    #[arg(long, global = true)]
    skip_calibration: bool,

    /// Draw the frame timing overlay
    #[arg(long, global = true)]
    show_metrics: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Framebuffer,
    Window,
}

impl Overrides {
    fn apply(self, options: &mut EngineOptions) {
        if let Some(mode) = self.render_mode {
            options.render_mode = match mode {
                Mode::Framebuffer => RenderMode::Framebuffer,
                Mode::Window => RenderMode::Window,
            };
        }
        if let Some(device) = self.fb_device {
            options.framebuffer_device = device;
        }
        if let Some(device) = self.touch_device {
            options.touch_device = Some(device);
        }
        if let Some(path) = self.runtime_config {
            options.runtime_config_path = path;
        }
        options.skip_touch_calibration |= self.skip_calibration;
        options.show_metrics |= self.show_metrics;
    }
}

fn log_level(verbose: u8) -> Level {
    match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the demo frame loop until interrupted or the window closes
    Run,

    /// Run touch calibration and save the result
    Calibrate,

    /// List input devices and their touch capability
    Devices,

    /// Show framebuffer geometry and the negotiated pixel format
    Fbinfo {
        /// Framebuffer device (defaults to the configured one)
        device: Option<PathBuf>,
    },
}

static STOP_FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();

extern "C" fn on_sigint(_: libc::c_int) {
    if let Some(flag) = STOP_FLAG.get() {
        flag.store(true, Ordering::Release);
    }
}

fn install_sigint(flag: Arc<AtomicBool>) {
    if STOP_FLAG.set(flag).is_err() {
        return;
    }
    // SAFETY: the handler only performs an atomic load and store.
    let previous = unsafe { libc::signal(libc::SIGINT, on_sigint as libc::sighandler_t) };
    if previous == libc::SIG_ERR {
        warn!("could not install SIGINT handler");
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(log_level(cli.verbose))
        .init();

    let mut options = match &cli.config {
        Some(path) => EngineOptions::load(path)
            .with_context(|| format!("loading options from {}", path.display()))?,
        None => EngineOptions::default(),
    };
    cli.overrides.apply(&mut options);

    match cli.command {
        Commands::Run => run(options),
        Commands::Calibrate => calibrate(options),
        Commands::Devices => {
            list_devices();
            Ok(())
        }
        Commands::Fbinfo { device } => fbinfo(device.unwrap_or(options.framebuffer_device)),
    }
}

fn run(options: EngineOptions) -> Result<()> {
    let mut engine = Engine::new(options).context("starting engine")?;
    install_sigint(engine.stop_flag());
    engine.initialize().context("initializing engine")?;

    let foreground = engine.options().foreground_color;
    let mut frames: u64 = 0;
    while engine.is_running() {
        engine.begin_frame();
        draw_demo(&mut engine, foreground, frames);
        engine.present().context("presenting frame")?;
        frames += 1;
        thread::sleep(Duration::from_millis(16));
    }

    info!(frames, "stopping");
    engine.shutdown();
    Ok(())
}

fn draw_demo(engine: &mut Engine, foreground: Color, frame: u64) {
    let size = engine.screen_size();
    let touch = engine.input().touch_state();
    let buffer = engine.buffer_mut();

    let label = format!("touchfb {}x{}  frame {frame}", size.width, size.height);
    let text = buffer.measure_text(&label, 20.0);
    buffer.draw_text(
        (size.width - text.width) / 2,
        size.height - text.height - 20,
        &label,
        20.0,
        foreground,
    );

    if touch.pressed {
        let x = (touch.x * size.width as f32) as i32;
        let y = (touch.y * size.height as f32) as i32;
        buffer.fill_rect(Rectangle::new(x - 30, y - 30, 60, 60), Color::DODGER_BLUE, 12);
        buffer.draw_line(x - 40, y, x + 40, y, foreground);
        buffer.draw_line(x, y - 40, x, y + 40, foreground);
    }
}

fn calibrate(mut options: EngineOptions) -> Result<()> {
    // `initialize` must not start a second calibration of its own.
    options.skip_touch_calibration = true;
    let mut engine = Engine::new(options).context("starting engine")?;
    install_sigint(engine.stop_flag());
    engine.initialize().context("initializing engine")?;

    let bounds = engine.calibrate().context("calibrating touch")?;
    println!(
        "calibrated: x {}..{}  y {}..{}",
        bounds.min_x, bounds.max_x, bounds.min_y, bounds.max_y
    );
    engine.shutdown();
    Ok(())
}

fn list_devices() {
    let devices = input::enumerate_devices(INPUT_DIR);
    if devices.is_empty() {
        println!("no readable input devices under {INPUT_DIR}");
        return;
    }
    for device in devices {
        println!(
            "{:<24} {:<5} {}",
            device.path.display(),
            if device.is_touch { "touch" } else { "" },
            device.name.as_deref().unwrap_or("?")
        );
    }
}

fn fbinfo(device: PathBuf) -> Result<()> {
    let info = FbInfo::query(&device).with_context(|| format!("querying {}", device.display()))?;
    println!("device:   {}", device.display());
    if let Some(mode) = &info.mode {
        println!("mode:     {mode}");
    }
    println!("visible:  {}x{}", info.width, info.height);
    println!("virtual:  {}x{}", info.virtual_width, info.virtual_height);
    println!("depth:    {} bpp, stride {} bytes", info.depth, info.stride());
    if let Some(rgba) = info.rgba {
        println!(
            "rgba:     {}/{},{}/{},{}/{},{}/{}",
            rgba.red.length,
            rgba.red.offset,
            rgba.green.length,
            rgba.green.offset,
            rgba.blue.length,
            rgba.blue.offset,
            rgba.alpha.length,
            rgba.alpha.offset
        );
    }
    match info.pixel_format() {
        Ok(format) => println!("format:   {format}"),
        Err(e) => println!("format:   {e}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn verbosity_starts_at_warn() {
        assert_eq!(log_level(0), Level::WARN);
        assert_eq!(log_level(1), Level::INFO);
        assert_eq!(log_level(2), Level::DEBUG);
        assert_eq!(log_level(5), Level::TRACE);
    }

    #[test]
    fn flags_override_file_values() {
        let mut options = EngineOptions::from_toml(
            r#"
            render_mode = "framebuffer"
            framebuffer_device = "/dev/fb0"
            touch_device = "/dev/input/event1"
            show_metrics = false
            "#,
        )
        .unwrap();

        let cli = Cli::parse_from([
            "touchfb",
            "run",
            "--render-mode",
            "window",
            "--fb-device",
            "/dev/fb1",
            "--touch-device",
            "auto",
            "--skip-calibration",
        ]);
        cli.overrides.apply(&mut options);

        assert_eq!(options.render_mode, RenderMode::Window);
        assert_eq!(options.framebuffer_device, PathBuf::from("/dev/fb1"));
        assert_eq!(options.touch_device.as_deref(), Some("auto"));
        assert!(options.skip_touch_calibration);
        assert!(!options.show_metrics);
    }

    #[test]
    fn absent_flags_keep_file_values() {
        let mut options = EngineOptions::from_toml("touch_device = \"/dev/input/event3\"\n").unwrap();
        let before = options.clone();
        Cli::parse_from(["touchfb", "-vv", "devices"])
            .overrides
            .apply(&mut options);
        assert_eq!(options, before);
    }
}
