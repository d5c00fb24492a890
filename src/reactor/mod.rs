//! The single-threaded reactor and executor (`spec.md §4.5`).
//!
//! One `Reactor` is pinned to one OS thread; `ReactorHandle` is the
//! cross-thread-safe `Executor` capability (`spec.md §2` component G).
//! Grounded directly in the teacher's `posts/async_playground/client_server.rs`,
//! which keeps a process-global `POLL_FDS: Mutex<Vec<(RawFd, Waker)>>` plus a
//! `BTreeMap` of timer wakers and drives everything with a single
//! `libc::poll` call per iteration. `evrt` generalizes that into a
//! per-`Reactor` instance with a real watcher-lifetime/cancellation model
//! (`spec.md §4.6`) instead of a flat list of `(fd, Waker)` pairs.

mod pool;
mod spawn;
mod unpark_mutex;

pub use pool::ReactorPool;
pub use spawn::spawn;
pub(crate) use spawn::FutureSpawnRun;
pub use unpark_mutex::UnparkMutex;

use crate::error::CancelReason;
use crate::future::Future;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

/// A unit of work the reactor may execute on its owning thread
/// (`spec.md` GLOSSARY "Runnable").
pub trait Runnable: Send + Sync {
    fn run(self: Arc<Self>);
}

/// Which direction(s) of readiness a watcher wants to hear about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Read,
    Write,
    ReadWrite,
}

impl Interest {
    fn poll_events(self) -> libc::c_short {
        match self {
            Interest::Read => libc::POLLIN,
            Interest::Write => libc::POLLOUT,
            Interest::ReadWrite => libc::POLLIN | libc::POLLOUT,
        }
    }
}

/// A reactor-registered object notified on fd readiness or cancellation
/// (`spec.md` GLOSSARY "Watcher"). Concrete I/O objects (sockets, pipes,
/// server sockets, the DNS resolver's UDP socket) implement this.
pub trait FdWatcher: Send + Sync {
    fn raw_fd(&self) -> RawFd;
    fn interest(&self) -> Interest;
    fn on_readable(&self);
    fn on_writable(&self);
    fn on_cancel(&self, reason: CancelReason);
}

/// Anything with a deadline-ordered FIFO the reactor should drain when time
/// has passed (`spec.md §4.11`). Implemented by `TimerKeeper`.
pub trait TimerSource: Send + Sync {
    /// Earliest pending deadline, if any.
    fn next_deadline(&self) -> Option<Instant>;
    /// Fire every token whose deadline is `<= now`.
    fn fire_due(&self, now: Instant);
    fn on_cancel(&self, reason: CancelReason);
}

struct Shared {
    id: u64,
    foreign_runnables: Mutex<VecDeque<Arc<dyn Runnable>>>,
    wait_stop: AtomicBool,
    wakeup_write_fd: RawFd,
    config: crate::config::ReactorConfig,
}

unsafe impl Send for Shared {}
unsafe impl Sync for Shared {}

impl Drop for Shared {
    fn drop(&mut self) {
        unsafe { libc::close(self.wakeup_write_fd) };
    }
}

static NEXT_REACTOR_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT_REACTOR: RefCell<Option<(u64, *const Reactor)>> = RefCell::new(None);
}

/// The thread-confined run loop: local runnable queue, pending watcher list,
/// a foreign (cross-thread) runnable queue drained each iteration, and the
/// self-pipe used to interrupt a blocking `libc::poll` (`spec.md §3`
/// "Reactor state").
pub struct Reactor {
    shared: Arc<Shared>,
    local_runnables: RefCell<VecDeque<Arc<dyn Runnable>>>,
    watchers: RefCell<Vec<Weak<dyn FdWatcher>>>,
    timers: RefCell<Vec<Weak<dyn TimerSource>>>,
    wakeup_read_fd: RawFd,
}

/// A cheaply-cloneable, `Send + Sync` handle to a `Reactor`: the `Executor`
/// capability of `spec.md §4.5`. I/O objects, timers, and `spawn()` all take
/// this rather than a `&Reactor`, since a `Reactor` itself never leaves its
/// owning thread.
#[derive(Clone)]
pub struct ReactorHandle {
    shared: Arc<Shared>,
}

impl Reactor {
    pub fn new() -> std::io::Result<Self> {
        Self::with_config(crate::config::ReactorConfig::default())
    }

    pub fn with_config(config: crate::config::ReactorConfig) -> std::io::Result<Self> {
        let mut fds = [0 as RawFd; 2];
        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            return Err(std::io::Error::last_os_error());
        }
        let (read_fd, write_fd) = (fds[0], fds[1]);
        set_nonblocking(read_fd);
        set_nonblocking(write_fd);
        let shared = Arc::new(Shared {
            id: NEXT_REACTOR_ID.fetch_add(1, Ordering::Relaxed),
            foreign_runnables: Mutex::new(VecDeque::new()),
            wait_stop: AtomicBool::new(false),
            wakeup_write_fd: write_fd,
            config,
        });
        Ok(Reactor {
            shared,
            local_runnables: RefCell::new(VecDeque::new()),
            watchers: RefCell::new(Vec::new()),
            timers: RefCell::new(Vec::new()),
            wakeup_read_fd: read_fd,
        })
    }

    pub fn handle(&self) -> ReactorHandle {
        ReactorHandle {
            shared: self.shared.clone(),
        }
    }

    pub fn config(&self) -> crate::config::ReactorConfig {
        self.shared.config
    }

    pub fn spawn<F>(&self, future: F)
    where
        F: Future + Send + 'static,
    {
        spawn(&self.handle(), future);
    }

    /// Registers a watcher; called by an I/O object the first time it has a
    /// pending operation (`spec.md §4.6` "attach ... registers the object
    /// with the reactor's watcher list if not already registered").
    pub fn register_watcher(&self, watcher: Weak<dyn FdWatcher>) {
        if let Some(w) = watcher.upgrade() {
            tracing::debug!(reactor_id = self.shared.id, fd = w.raw_fd(), "watcher registered");
        }
        self.watchers.borrow_mut().push(watcher);
    }

    pub fn register_timer_source(&self, source: Weak<dyn TimerSource>) {
        tracing::debug!(reactor_id = self.shared.id, "timer source registered");
        self.timers.borrow_mut().push(source);
    }

    /// Any registered `TimerSource` with an actual pending deadline. A
    /// `TimerKeeper` that's alive but currently idle (no `Timer`s taken from
    /// it) must not count here — otherwise it would keep `run()` from
    /// exiting while also not being worth blocking on, a busy-spin
    /// (`spec.md §4.11`).
    fn any_pending_timer_deadline(&self) -> bool {
        self.timers
            .borrow()
            .iter()
            .filter_map(Weak::upgrade)
            .any(|t| t.next_deadline().is_some())
    }

    /// Runs until there is no more work: no pending runnables, no
    /// registered watchers, and no timer with an actual pending deadline
    /// (`spec.md §4.5`).
    pub fn run(&self) {
        let guard = CurrentReactorGuard::set(self.shared.id, self as *const Reactor);
        loop {
            tracing::trace!(reactor_id = self.shared.id, "run loop iteration");
            self.drain_foreign();
            self.run_local();
            self.prune_dead_watchers();
            self.prune_dead_timers();
            let watchers_empty = self.watchers.borrow().is_empty();
            let local_empty = self.local_runnables.borrow().is_empty();
            if watchers_empty && local_empty && !self.any_pending_timer_deadline() {
                break;
            }
            if self.shared.wait_stop.load(Ordering::Acquire) {
                for watcher in self.watchers.borrow_mut().drain(..) {
                    if let Some(w) = watcher.upgrade() {
                        tracing::debug!(reactor_id = self.shared.id, fd = w.raw_fd(), "watcher cancelled");
                        w.on_cancel(CancelReason::ExecutorShutdown);
                    }
                }
                for timer in self.timers.borrow_mut().drain(..) {
                    if let Some(t) = timer.upgrade() {
                        tracing::debug!(reactor_id = self.shared.id, "timer source cancelled");
                        t.on_cancel(CancelReason::ExecutorShutdown);
                    }
                }
                break;
            }
            self.poll_once();
        }
        drop(guard);
    }

    fn drain_foreign(&self) {
        let mut foreign = self.shared.foreign_runnables.lock().unwrap();
        if foreign.is_empty() {
            return;
        }
        let mut local = self.local_runnables.borrow_mut();
        local.append(&mut foreign);
    }

    fn run_local(&self) {
        loop {
            let next = self.local_runnables.borrow_mut().pop_front();
            match next {
                Some(runnable) => runnable.run(),
                None => break,
            }
        }
    }

    fn prune_dead_watchers(&self) {
        self.watchers.borrow_mut().retain(|w| w.strong_count() > 0);
    }

    fn prune_dead_timers(&self) {
        self.timers.borrow_mut().retain(|t| t.strong_count() > 0);
    }

    fn poll_once(&self) {
        let watchers: Vec<Arc<dyn FdWatcher>> = self
            .watchers
            .borrow()
            .iter()
            .filter_map(Weak::upgrade)
            .collect();
        let mut pollfds: Vec<libc::pollfd> = Vec::with_capacity(watchers.len() + 1);
        pollfds.push(libc::pollfd {
            fd: self.wakeup_read_fd,
            events: libc::POLLIN,
            revents: 0,
        });
        for w in &watchers {
            pollfds.push(libc::pollfd {
                fd: w.raw_fd(),
                events: w.interest().poll_events(),
                revents: 0,
            });
        }

        let next_deadline = self
            .timers
            .borrow()
            .iter()
            .filter_map(Weak::upgrade)
            .filter_map(|t| t.next_deadline())
            .min();
        let timeout_ms: libc::c_int = match next_deadline {
            Some(deadline) => deadline
                .saturating_duration_since(Instant::now())
                .as_millis()
                .min(libc::c_int::MAX as u128) as libc::c_int,
            None if watchers.is_empty() => 0,
            None => -1,
        };

        let rc = unsafe {
            libc::poll(
                pollfds.as_mut_ptr(),
                pollfds.len() as libc::nfds_t,
                timeout_ms,
            )
        };
        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() != std::io::ErrorKind::Interrupted {
                tracing::warn!(error = %err, "libc::poll failed");
            }
        } else if rc > 0 {
            if pollfds[0].revents != 0 {
                drain_wakeup_pipe(self.wakeup_read_fd);
            }
            for (pollfd, watcher) in pollfds[1..].iter().zip(watchers.iter()) {
                if pollfd.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0 {
                    watcher.on_readable();
                }
                if pollfd.revents & libc::POLLOUT != 0 {
                    watcher.on_writable();
                }
            }
        }

        let now = Instant::now();
        for timer in self.timers.borrow().iter().filter_map(Weak::upgrade) {
            timer.fire_due(now);
        }
    }
}

struct CurrentReactorGuard {
    previous: Option<(u64, *const Reactor)>,
}

impl CurrentReactorGuard {
    fn set(id: u64, reactor: *const Reactor) -> Self {
        let previous = CURRENT_REACTOR.with(|cell| cell.borrow_mut().replace((id, reactor)));
        CurrentReactorGuard { previous }
    }
}

impl Drop for CurrentReactorGuard {
    fn drop(&mut self) {
        CURRENT_REACTOR.with(|cell| *cell.borrow_mut() = self.previous.take());
    }
}

impl ReactorHandle {
    /// The owning reactor's configuration. Cheap: `ReactorConfig` is `Copy`
    /// and lives on the cross-thread-safe `Shared`, so no thread hop is
    /// needed the way `register_watcher`/`register_timer_source` require.
    pub fn config(&self) -> crate::config::ReactorConfig {
        self.shared.config
    }

    /// `spec.md §4.5` `execute`: local fast path if called from the thread
    /// that owns this reactor's current `run()`, otherwise the foreign
    /// queue plus a wakeup write.
    pub fn execute(&self, runnable: Arc<dyn Runnable>) {
        let same_thread_reactor = CURRENT_REACTOR.with(|cell| {
            cell.borrow()
                .and_then(|(id, ptr)| (id == self.shared.id).then_some(ptr))
        });
        if let Some(ptr) = same_thread_reactor {
            // Safe: `ptr` is only ever set for the duration of `Reactor::run()`
            // executing on this exact thread, and we are on that thread now.
            let reactor = unsafe { &*ptr };
            reactor.local_runnables.borrow_mut().push_back(runnable);
            return;
        }
        self.shared.foreign_runnables.lock().unwrap().push_back(runnable);
        self.wake();
    }

    pub fn spawn<F>(&self, future: F)
    where
        F: Future + Send + 'static,
    {
        spawn(self, future);
    }

    /// Registers a watcher on the owning reactor, hopping threads via
    /// `execute` if called from elsewhere. I/O objects keep only a
    /// `ReactorHandle`, never a `&Reactor`, so attaching always goes through
    /// here (`spec.md §4.6`).
    pub fn register_watcher(&self, watcher: Weak<dyn FdWatcher>) {
        self.run_on_reactor(move |r| r.register_watcher(watcher));
    }

    pub fn register_timer_source(&self, source: Weak<dyn TimerSource>) {
        self.run_on_reactor(move |r| r.register_timer_source(source));
    }

    fn run_on_reactor<F>(&self, f: F)
    where
        F: FnOnce(&Reactor) + Send + 'static,
    {
        let same_thread_reactor = CURRENT_REACTOR.with(|cell| {
            cell.borrow()
                .and_then(|(id, ptr)| (id == self.shared.id).then_some(ptr))
        });
        if let Some(ptr) = same_thread_reactor {
            let reactor = unsafe { &*ptr };
            f(reactor);
            return;
        }
        self.execute(Arc::new(DeferredJob(Mutex::new(Some(f)))));
    }

    pub fn stop(&self) {
        self.shared.wait_stop.store(true, Ordering::Release);
        self.wake();
    }

    /// Interrupts a blocked `libc::poll` on the owning thread. Used by I/O
    /// objects and timers that mutate reactor-visible state (a new
    /// deadline, a newly-writable buffer) from another thread without going
    /// through `execute`.
    pub fn wake_external(&self) {
        self.wake();
    }

    fn wake(&self) {
        let byte = 1u8;
        unsafe {
            libc::write(
                self.shared.wakeup_write_fd,
                &byte as *const u8 as *const libc::c_void,
                1,
            );
        }
    }
}

/// A one-shot closure run against the owning reactor once it's reached on
/// its own thread (used by `ReactorHandle::run_on_reactor` for the
/// cross-thread case — the local case just calls the closure directly).
struct DeferredJob<F>(Mutex<Option<F>>);

impl<F> Runnable for DeferredJob<F>
where
    F: FnOnce(&Reactor) + Send,
{
    fn run(self: Arc<Self>) {
        if let Some(f) = self.0.lock().unwrap().take() {
            with_current_reactor(f);
        }
    }
}

/// Accesses the reactor owning the calling thread's in-progress `run()`.
/// Panics outside of that context — only called from `Runnable::run`.
pub(crate) fn with_current_reactor<R>(f: impl FnOnce(&Reactor) -> R) -> R {
    let ptr = CURRENT_REACTOR
        .with(|cell| cell.borrow().map(|(_, ptr)| ptr))
        .expect("with_current_reactor called off the reactor thread");
    let reactor = unsafe { &*ptr };
    f(reactor)
}

fn drain_wakeup_pipe(fd: RawFd) {
    let mut buf = [0u8; 64];
    loop {
        let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        if n <= 0 {
            break;
        }
    }
}

pub(crate) fn set_nonblocking(fd: RawFd) {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL, 0);
        libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
    }
}

/// Poll-duration helper used by call sites that need an explicit quantum
/// (e.g. tests asserting a `timeout` resolved within "d plus one reactor
/// quantum", `spec.md §8`).
pub const REACTOR_QUANTUM: Duration = Duration::from_millis(50);
