//! Unix signal delivery as a `Stream` (`spec.md §4.12` "SignalStream").
//!
//! The classic self-pipe trick: a process-wide pipe, an `extern "C"` handler
//! that can only touch an `AtomicI32` fd and `libc::write` (signal handlers
//! may not allocate or lock), and the reactor-side read end fanning each
//! byte out to whichever `SignalStream`s subscribed to that signal number.

use crate::error::CancelReason;
use crate::future::Stream;
use crate::poll::Poll;
use crate::reactor::{FdWatcher, Interest, ReactorHandle};
use std::collections::HashSet;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};

use super::token::StreamToken;

static PIPE_WRITE_FD: AtomicI32 = AtomicI32::new(-1);

struct Listener {
    filter: HashSet<i32>,
    token: StreamToken<i32>,
}

struct Registry {
    listeners: Mutex<Vec<Weak<Listener>>>,
}

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| Registry {
        listeners: Mutex::new(Vec::new()),
    })
}

extern "C" fn on_signal(signum: libc::c_int) {
    let fd = PIPE_WRITE_FD.load(Ordering::Relaxed);
    if fd >= 0 {
        let byte = signum as u8;
        unsafe {
            libc::write(fd, &byte as *const u8 as *const libc::c_void, 1);
        }
    }
}

struct PipeWatcher {
    read_fd: RawFd,
}

impl FdWatcher for PipeWatcher {
    fn raw_fd(&self) -> RawFd {
        self.read_fd
    }

    fn interest(&self) -> Interest {
        Interest::Read
    }

    fn on_readable(&self) {
        let mut buf = [0u8; 64];
        loop {
            let n = unsafe {
                libc::read(self.read_fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len())
            };
            if n <= 0 {
                break;
            }
            let listeners = registry().listeners.lock().unwrap();
            for signum in &buf[..n as usize] {
                let signum = *signum as i32;
                for weak in listeners.iter() {
                    if let Some(listener) = weak.upgrade() {
                        if listener.filter.contains(&signum) {
                            listener.token.push(signum);
                        }
                    }
                }
            }
        }
    }

    fn on_writable(&self) {}

    fn on_cancel(&self, _reason: CancelReason) {}
}

fn ensure_pipe_and_watcher(reactor: &ReactorHandle) -> std::io::Result<()> {
    if PIPE_WRITE_FD.load(Ordering::Relaxed) >= 0 {
        return Ok(());
    }
    let mut fds = [0 as RawFd; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    crate::reactor::set_nonblocking(fds[0]);
    crate::reactor::set_nonblocking(fds[1]);
    if PIPE_WRITE_FD
        .compare_exchange(-1, fds[1], Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        unsafe {
            libc::close(fds[0]);
            libc::close(fds[1]);
        }
        return Ok(());
    }
    let watcher: Arc<dyn FdWatcher> = Arc::new(PipeWatcher { read_fd: fds[0] });
    reactor.register_watcher(Arc::downgrade(&watcher));
    std::mem::forget(watcher); // the reactor's Weak is the only handle; keep the Arc alive for the process lifetime.
    Ok(())
}

/// A stream of the signal numbers in `signals` as they're delivered to this
/// process.
pub struct SignalStream {
    listener: Arc<Listener>,
}

impl SignalStream {
    pub fn new(signals: &[i32], reactor: &ReactorHandle) -> std::io::Result<Self> {
        ensure_pipe_and_watcher(reactor)?;
        for &signum in signals {
            unsafe {
                let mut action: libc::sigaction = std::mem::zeroed();
                action.sa_sigaction = on_signal as usize;
                libc::sigemptyset(&mut action.sa_mask);
                action.sa_flags = libc::SA_RESTART;
                libc::sigaction(signum, &action, std::ptr::null_mut());
            }
        }
        let listener = Arc::new(Listener {
            filter: signals.iter().copied().collect(),
            token: StreamToken::new(),
        });
        registry()
            .listeners
            .lock()
            .unwrap()
            .push(Arc::downgrade(&listener));
        Ok(SignalStream { listener })
    }

    /// Stops delivery (`spec.md §9` Open Question: dropping the stream
    /// unsubscribes it — the process-wide `sigaction` registration for a
    /// signal number is intentionally left in place, since another
    /// `SignalStream` may still want it).
    pub fn cancel(&self, reason: CancelReason) {
        self.listener.token.cancel(reason);
    }
}

impl Stream for SignalStream {
    type Item = i32;

    fn poll_stream(&mut self) -> Poll<Option<i32>> {
        match self.listener.token.poll_stream() {
            Poll::Ready(v) => Poll::Ready(v),
            Poll::NotReady => Poll::NotReady,
            Poll::Err(e) => Poll::Err(e),
        }
    }
}
