use std::{
    fs::File,
    io::{self, Read},
    os::{fd::AsRawFd, unix::fs::OpenOptionsExt},
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
};

use tracing::{debug, info, warn};

use super::raw_event::RawEvent;
use crate::error::{Error, Result};

/// `_IOW('E', 0x90, int)`
const EVIOCGRAB: libc::c_ulong = 0x4004_4590;

/// How long one `poll(2)` waits before re-checking the stop flag.
const POLL_TIMEOUT_MS: libc::c_int = 100;

/// Records read per `read(2)` call at most.
const READ_BATCH: usize = 64;

/// Decoded device state, mutated by the reader thread one record at a time.
pub trait InputEventHandler: Default + Send + 'static {
    fn on_input_event(&mut self, event: &RawEvent);
}

struct Shared<H> {
    state: Mutex<H>,
    running: AtomicBool,
    faulted: AtomicBool,
}

impl<H> Shared<H> {
    fn lock(&self) -> MutexGuard<'_, H> {
        // The state is plain data; a panic in a handler leaves it usable.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Reads fixed-size kernel input records from a character device on a
/// background thread and feeds them to `H`.
///
/// One writer (the reader thread), any number of readers. The mutex is held
/// only while a batch of records is applied, never across the blocking read.
pub struct RawInputReader<H: InputEventHandler> {
    path: PathBuf,
    exclusive: bool,
    file: Option<File>,
    shared: Arc<Shared<H>>,
    worker: Option<JoinHandle<()>>,
}

impl<H: InputEventHandler> RawInputReader<H> {
    /// Opens the device node. With `exclusive`, other readers (including the
    /// console) stop receiving its events while it is open.
    pub fn open(path: impl AsRef<Path>, exclusive: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = open_device(&path, exclusive)?;
        debug!(path = %path.display(), exclusive, "opened input device");
        Ok(Self {
            path,
            exclusive,
            file: Some(file),
            shared: Arc::new(Shared {
                state: Mutex::new(H::default()),
                running: AtomicBool::new(false),
                faulted: AtomicBool::new(false),
            }),
            worker: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Spawns the reader thread. Calling it while already running is a no-op.
    pub fn start_event_loop(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }
        let file = match self.file.take() {
            Some(file) => file,
            None => open_device(&self.path, self.exclusive)?,
        };

        self.shared.faulted.store(false, Ordering::Release);
        self.shared.running.store(true, Ordering::Release);

        let shared = Arc::clone(&self.shared);
        let path = self.path.clone();
        let worker = thread::Builder::new()
            .name("input-reader".into())
            .spawn(move || read_loop(file, &shared, &path));

        match worker {
            Ok(handle) => {
                info!(path = %self.path.display(), "input reader started");
                self.worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.shared.running.store(false, Ordering::Release);
                Err(e.into())
            }
        }
    }

    /// Signals the reader thread to exit and joins it. The device handle is
    /// closed by the time this returns.
    pub fn stop_event_loop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        self.file = None;
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                warn!(path = %self.path.display(), "input reader thread panicked");
            }
            info!(path = %self.path.display(), "input reader stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// True once a read error ended the loop. Queries keep answering with
    /// the last decoded state.
    pub fn is_faulted(&self) -> bool {
        self.shared.faulted.load(Ordering::Acquire)
    }

    /// Runs `f` against the decoded state under the lock.
    pub fn with_state<R>(&self, f: impl FnOnce(&H) -> R) -> R {
        f(&self.shared.lock())
    }

    /// Runs `f` against the decoded state mutably, for decoders that reset
    /// accumulated values on read.
    pub fn with_state_mut<R>(&self, f: impl FnOnce(&mut H) -> R) -> R {
        f(&mut self.shared.lock())
    }
}

impl<H: InputEventHandler> Drop for RawInputReader<H> {
    fn drop(&mut self) {
        self.stop_event_loop();
    }
}

fn open_device(path: &Path, exclusive: bool) -> Result<File> {
    let file = std::fs::OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
        .map_err(|e| Error::from_open(path, e))?;

    if exclusive {
        // SAFETY: `file` owns a valid descriptor for the duration of the call.
        let rc = unsafe { libc::ioctl(file.as_raw_fd(), EVIOCGRAB as _, 1 as libc::c_int) };
        if rc != 0 {
            let err = io::Error::last_os_error();
            warn!(path = %path.display(), error = %err, "could not grab input device exclusively");
        }
    }
    Ok(file)
}

/// Waits until `file` is readable. `Ok(false)` means the timeout elapsed.
fn wait_readable(file: &File, timeout_ms: libc::c_int) -> io::Result<bool> {
    let mut fds = libc::pollfd {
        fd: file.as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    };
    // SAFETY: `fds` is a single valid pollfd living across the call.
    let rc = unsafe { libc::poll(&mut fds, 1, timeout_ms) };
    match rc {
        -1 => {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                Ok(false)
            } else {
                Err(err)
            }
        }
        0 => Ok(false),
        _ if fds.revents & (libc::POLLERR | libc::POLLNVAL) != 0 => {
            Err(io::Error::other("device reported an error condition"))
        }
        _ => Ok(true),
    }
}

fn read_loop<H: InputEventHandler>(mut file: File, shared: &Shared<H>, path: &Path) {
    let mut buf = vec![0u8; RawEvent::SIZE * READ_BATCH];
    let mut pending = 0;

    while shared.running.load(Ordering::Acquire) {
        match wait_readable(&file, POLL_TIMEOUT_MS) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "input device poll failed");
                shared.faulted.store(true, Ordering::Release);
                break;
            }
        }

        match file.read(&mut buf[pending..]) {
            Ok(0) => {
                info!(path = %path.display(), "input device closed");
                break;
            }
            Ok(n) => {
                pending += n;
                let whole = pending - pending % RawEvent::SIZE;
                {
                    let mut state = shared.lock();
                    for record in buf[..whole].chunks_exact(RawEvent::SIZE) {
                        if let Some(event) = RawEvent::from_bytes(record) {
                            state.on_input_event(&event);
                        }
                    }
                }
                buf.copy_within(whole..pending, 0);
                pending -= whole;
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {}
            Err(e) => {
                warn!(path = %path.display(), error = %e, "input device read failed");
                shared.faulted.store(true, Ordering::Release);
                break;
            }
        }
    }

    shared.running.store(false, Ordering::Release);
}
