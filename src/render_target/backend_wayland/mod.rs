use std::{
    fs::File,
    os::{fd::AsFd, unix::fs::FileExt},
};

use tracing::{debug, info, warn};
use wayland_client::{
    Connection, Dispatch, EventQueue, QueueHandle, WEnum, delegate_noop,
    protocol::{wl_buffer, wl_compositor, wl_registry, wl_shm, wl_shm_pool, wl_surface},
};
use wayland_protocols::xdg::shell::client::{xdg_surface, xdg_toplevel, xdg_wm_base};

use super::{RenderTarget, check_frame_len};
use crate::{
    error::{Error, Result},
    graphics::{GraphicsContext, PixelFormat},
    primitives::Size,
};

/// `wl_shm::Format::Argb8888` is little-endian, i.e. B, G, R, A in memory.
const WINDOW_FORMAT: PixelFormat = PixelFormat::Bgra8888;

pub struct WindowTarget {
    conn: Connection,
    event_queue: EventQueue<State>,
    state: State,
    context: GraphicsContext,
}

impl WindowTarget {
    /// Connects to `$WAYLAND_DISPLAY` and maps a `width × height` toplevel.
    pub fn open(title: &str, width: i32, height: i32) -> Result<Self> {
        let conn = Connection::connect_to_env().map_err(window_error)?;
        let mut event_queue = conn.new_event_queue();
        let qhandle = event_queue.handle();

        conn.display().get_registry(&qhandle, ());
        let mut state = State::default();
        event_queue.roundtrip(&mut state).map_err(window_error)?;

        let (Some(compositor), Some(wm_base)) = (&state.compositor, &state.wm_base) else {
            return Err(Error::Window(
                "compositor lacks wl_compositor or xdg_wm_base".into(),
            ));
        };
        if state.shm.is_none() {
            return Err(Error::Window("compositor lacks wl_shm".into()));
        }

        let surface = compositor.create_surface(&qhandle, ());
        let xdg_surface = wm_base.get_xdg_surface(&surface, &qhandle, ());
        let toplevel = xdg_surface.get_toplevel(&qhandle, ());
        toplevel.set_title(title.to_owned());
        toplevel.set_app_id("touchfb".to_owned());
        toplevel.set_min_size(1, 1);
        surface.commit();

        state.surface = Some(surface);
        state.xdg_surface = Some(xdg_surface);
        state.toplevel = Some(toplevel);

        while !state.configured {
            event_queue
                .blocking_dispatch(&mut state)
                .map_err(window_error)?;
        }
        // Only sizes the compositor suggests after the first frame count as
        // a resize.
        state.pending_size = None;

        let context = GraphicsContext::new(width, height, WINDOW_FORMAT);
        state.allocate_buffer(width, height, &qhandle)?;
        info!(width, height, "opened wayland window");

        Ok(Self {
            conn,
            event_queue,
            state,
            context,
        })
    }

    /// Reads and dispatches whatever the compositor sent without blocking.
    fn dispatch_pending(&mut self) -> Result<()> {
        self.conn.flush().map_err(window_error)?;
        if let Some(guard) = self.event_queue.prepare_read() {
            if let Err(e) = guard.read() {
                match e {
                    wayland_client::backend::WaylandError::Io(io)
                        if io.kind() == std::io::ErrorKind::WouldBlock => {}
                    e => return Err(window_error(e)),
                }
            }
        }
        self.event_queue
            .dispatch_pending(&mut self.state)
            .map_err(window_error)?;
        Ok(())
    }
}

impl RenderTarget for WindowTarget {
    fn graphics_context(&self) -> GraphicsContext {
        self.context
    }

    fn swap_buffer(&mut self, buffer: &[u8]) -> Result<()> {
        check_frame_len(&self.context, buffer)?;
        self.dispatch_pending()?;
        if self.state.close_if_requested() {
            self.conn.flush().map_err(window_error)?;
            return Ok(());
        }

        let (Some(file), Some(wl_buffer), Some(surface)) = (
            &self.state.shm_file,
            &self.state.buffer,
            &self.state.surface,
        ) else {
            return Err(Error::Window("window surface is gone".into()));
        };
        file.write_all_at(buffer, 0)?;
        surface.attach(Some(wl_buffer), 0, 0);
        surface.damage_buffer(0, 0, self.context.width, self.context.height);
        surface.commit();
        self.conn.flush().map_err(window_error)?;
        Ok(())
    }

    fn poll_resize(&mut self) -> Option<Size> {
        if let Err(e) = self.dispatch_pending() {
            warn!(error = %e, "wayland dispatch failed");
            return None;
        }
        let (width, height) = self.state.pending_size.take()?;
        if self.state.close_requested {
            return None;
        }
        if (width, height) == (self.context.width, self.context.height) {
            return None;
        }

        let qhandle = self.event_queue.handle();
        if let Err(e) = self.state.allocate_buffer(width, height, &qhandle) {
            warn!(error = %e, width, height, "could not resize window buffer");
            return None;
        }
        debug!(width, height, "window resized");
        self.context = GraphicsContext::new(width, height, WINDOW_FORMAT);
        Some(Size::new(width, height))
    }

    fn should_close(&self) -> bool {
        self.state.close_requested
    }
}

impl Drop for WindowTarget {
    fn drop(&mut self) {
        self.state.destroy();
        let _ = self.conn.flush();
    }
}

#[derive(Default)]
struct State {
    compositor: Option<wl_compositor::WlCompositor>,
    shm: Option<wl_shm::WlShm>,
    wm_base: Option<xdg_wm_base::XdgWmBase>,

    surface: Option<wl_surface::WlSurface>,
    xdg_surface: Option<xdg_surface::XdgSurface>,
    toplevel: Option<xdg_toplevel::XdgToplevel>,

    shm_file: Option<File>,
    pool: Option<wl_shm_pool::WlShmPool>,
    buffer: Option<wl_buffer::WlBuffer>,

    configured: bool,
    close_requested: bool,
    pending_size: Option<(i32, i32)>,
}

impl State {
    fn allocate_buffer(&mut self, width: i32, height: i32, qhandle: &QueueHandle<Self>) -> Result<()> {
        let Some(shm) = &self.shm else {
            return Err(Error::Window("wl_shm is not bound".into()));
        };
        let stride = width * 4;
        let len = stride * height;

        let file = tempfile::tempfile()?;
        file.set_len(len as u64)?;
        let pool = shm.create_pool(file.as_fd(), len, qhandle, ());
        let buffer = pool.create_buffer(
            0,
            width,
            height,
            stride,
            wl_shm::Format::Argb8888,
            qhandle,
            (),
        );

        self.release_buffer();
        self.shm_file = Some(file);
        self.pool = Some(pool);
        self.buffer = Some(buffer);
        Ok(())
    }

    fn release_buffer(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            buffer.destroy();
        }
        if let Some(pool) = self.pool.take() {
            pool.destroy();
        }
        self.shm_file = None;
    }

    /// Tears the window down the first time it is called after the
    /// compositor sent `close`. Returns whether the window is closed.
    fn close_if_requested(&mut self) -> bool {
        if !self.close_requested {
            return false;
        }
        if self.surface.is_some() {
            info!("closing window");
            self.destroy();
        }
        true
    }

    fn destroy(&mut self) {
        self.release_buffer();
        if let Some(toplevel) = self.toplevel.take() {
            toplevel.destroy();
        }
        if let Some(xdg_surface) = self.xdg_surface.take() {
            xdg_surface.destroy();
        }
        if let Some(surface) = self.surface.take() {
            surface.destroy();
        }
    }
}

impl Dispatch<wl_registry::WlRegistry, ()> for State {
    fn event(
        state: &mut Self,
        registry: &wl_registry::WlRegistry,
        event: wl_registry::Event,
        _: &(),
        _: &Connection,
        qhandle: &QueueHandle<Self>,
    ) {
        if let wl_registry::Event::Global {
            name,
            interface,
            version,
        } = event
        {
            match &interface[..] {
                "wl_compositor" => {
                    // damage_buffer needs v4
                    let compositor = registry.bind::<wl_compositor::WlCompositor, _, _>(
                        name,
                        version.min(4),
                        qhandle,
                        (),
                    );
                    state.compositor = Some(compositor);
                }
                "wl_shm" => {
                    let shm = registry.bind::<wl_shm::WlShm, _, _>(name, 1, qhandle, ());
                    state.shm = Some(shm);
                }
                "xdg_wm_base" => {
                    let wm_base =
                        registry.bind::<xdg_wm_base::XdgWmBase, _, _>(name, 1, qhandle, ());
                    state.wm_base = Some(wm_base);
                }
                _ => {}
            }
        }
    }
}

impl Dispatch<xdg_wm_base::XdgWmBase, ()> for State {
    fn event(
        _: &mut Self,
        wm_base: &xdg_wm_base::XdgWmBase,
        event: xdg_wm_base::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let xdg_wm_base::Event::Ping { serial } = event {
            wm_base.pong(serial);
        }
    }
}

impl Dispatch<xdg_surface::XdgSurface, ()> for State {
    fn event(
        state: &mut Self,
        xdg_surface: &xdg_surface::XdgSurface,
        event: xdg_surface::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let xdg_surface::Event::Configure { serial } = event {
            xdg_surface.ack_configure(serial);
            state.configured = true;
        }
    }
}

impl Dispatch<xdg_toplevel::XdgToplevel, ()> for State {
    fn event(
        state: &mut Self,
        _: &xdg_toplevel::XdgToplevel,
        event: xdg_toplevel::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        // https://wayland.app/protocols/xdg-shell#xdg_toplevel:event:configure
        match event {
            // 0 means "pick your own size"
            xdg_toplevel::Event::Configure { width, height, .. } if width > 0 && height > 0 => {
                state.pending_size = Some((width, height));
            }
            xdg_toplevel::Event::Close => {
                info!("window close requested");
                state.close_requested = true;
            }
            _ => {}
        }
    }
}

impl Dispatch<wl_shm::WlShm, ()> for State {
    fn event(
        _: &mut Self,
        _: &wl_shm::WlShm,
        event: wl_shm::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let wl_shm::Event::Format {
            format: WEnum::Value(format),
        } = event
        {
            debug!(?format, "wl_shm format");
        }
    }
}

delegate_noop!(State: ignore wl_compositor::WlCompositor);
delegate_noop!(State: ignore wl_surface::WlSurface);
delegate_noop!(State: ignore wl_shm_pool::WlShmPool);
delegate_noop!(State: ignore wl_buffer::WlBuffer);

fn window_error(e: impl std::fmt::Display) -> Error {
    Error::Window(e.to_string())
}
