//! One-shot delay futures (`spec.md §4.11` "Timer").
//!
//! Grounded in the teacher's `BTreeMap<Instant, Vec<Waker>>` timer wheel in
//! `posts/async_playground/client_server.rs`; here it's a flat
//! deadline-tagged `Vec` behind a `TimerSource` registered with the owning
//! reactor, since a `Reactor` only ever asks for the single earliest
//! deadline per poll iteration.

use crate::error::CancelReason;
use crate::future::Future;
use crate::io::token::CompletionToken;
use crate::poll::Poll;
use crate::reactor::{ReactorHandle, TimerSource};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

struct Entry {
    deadline: Instant,
    token: CompletionToken<()>,
}

struct Inner {
    duration: Duration,
    pending: Mutex<Vec<Entry>>,
}

impl TimerSource for Inner {
    fn next_deadline(&self) -> Option<Instant> {
        self.pending.lock().unwrap().iter().map(|e| e.deadline).min()
    }

    fn fire_due(&self, now: Instant) {
        let mut guard = self.pending.lock().unwrap();
        let (due, rest): (Vec<Entry>, Vec<Entry>) =
            guard.drain(..).partition(|e| e.deadline <= now);
        *guard = rest;
        drop(guard);
        for entry in due {
            entry.token.notify_done(Ok(()));
        }
    }

    fn on_cancel(&self, reason: CancelReason) {
        for entry in self.pending.lock().unwrap().drain(..) {
            entry.token.cleanup(reason);
        }
    }
}

/// Issues `Timer`s of a single fixed duration against one reactor
/// (`spec.md §4.11`). `Timeout` below owns one per wrapped future.
#[derive(Clone)]
pub struct TimerKeeper {
    inner: Arc<Inner>,
    handle: ReactorHandle,
}

impl TimerKeeper {
    pub fn new(handle: &ReactorHandle, duration: Duration) -> Self {
        let inner = Arc::new(Inner {
            duration,
            pending: Mutex::new(Vec::new()),
        });
        let weak: Weak<dyn TimerSource> = Arc::downgrade(&inner) as Weak<dyn TimerSource>;
        handle.register_timer_source(weak);
        TimerKeeper {
            inner,
            handle: handle.clone(),
        }
    }

    /// Starts a new delay of this keeper's duration, counted from now.
    pub fn delay(&self) -> Timer {
        let token = CompletionToken::new();
        let deadline = Instant::now() + self.inner.duration;
        self.inner.pending.lock().unwrap().push(Entry {
            deadline,
            token: token.clone(),
        });
        self.handle.wake_external();
        Timer { token }
    }
}

/// A future that resolves once, when its deadline passes.
pub struct Timer {
    token: CompletionToken<()>,
}

impl Future for Timer {
    type Item = ();

    fn poll(&mut self) -> Poll<()> {
        self.token.poll()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.token.cleanup(CancelReason::UserCancel);
    }
}
