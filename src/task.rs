//! Task identity and the `Unpark` capability.
//!
//! Grounded in the teacher's waker patterns (`posts/async_playground/tasks_spawn.rs`,
//! `client_server.rs`): a park operation clones a handle out of a thread-local
//! slot, and that handle is later invoked from wherever progress happened —
//! a reactor watcher, a channel's peer, another thread entirely. `evrt` keeps
//! its own `Task`/`Unpark` vocabulary instead of reusing `std::task::Waker`
//! because the rest of the runtime (completion tokens, the unpark-mutex) is
//! built directly against it (`spec.md §3/§4.2`).

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Anything that can be asked to re-poll a parked computation. Safe to call
/// from any thread; calling it more than once before the next poll collapses
/// to a single repoll.
pub trait UnparkHandle: Send + Sync {
    fn unpark(&self);
}

/// A reference-counted, type-erased `Unpark` capability.
#[derive(Clone)]
pub struct Unpark(Arc<dyn UnparkHandle>);

impl Unpark {
    pub fn new(inner: Arc<dyn UnparkHandle>) -> Self {
        Unpark(inner)
    }

    pub fn unpark(&self) {
        self.0.unpark();
    }
}

impl std::fmt::Debug for Unpark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unpark").finish_non_exhaustive()
    }
}

/// An identity-bearing handle a suspended computation holds onto so it can
/// ask to be polled again.
#[derive(Clone, Debug)]
pub struct Task {
    pub id: u64,
    pub unpark: Unpark,
}

impl Task {
    pub fn unpark(&self) {
        self.unpark.unpark();
    }
}

thread_local! {
    static CURRENT_TASK: RefCell<Option<Task>> = RefCell::new(None);
}

/// Binds `task` as the thread's current task for the duration of `body`,
/// restoring the previous value (if any) on every exit path, including
/// unwinding.
pub fn with_task<R>(task: Task, body: impl FnOnce() -> R) -> R {
    struct Guard(Option<Task>);
    impl Drop for Guard {
        fn drop(&mut self) {
            CURRENT_TASK.with(|cell| *cell.borrow_mut() = self.0.take());
        }
    }
    let previous = CURRENT_TASK.with(|cell| cell.borrow_mut().replace(task));
    let _guard = Guard(previous);
    body()
}

/// Reads the task bound by the innermost enclosing `with_task`. Leaf futures
/// call this while being polled to obtain a handle they can stash and
/// `unpark()` later.
pub fn current_task() -> Task {
    CURRENT_TASK
        .with(|cell| cell.borrow().clone())
        .expect("current_task() called outside of a poll")
}

/// Condvar-backed `Unpark`, used by the synchronous `wait()` driver to block
/// the calling OS thread until something unparks it.
pub struct ThreadUnpark {
    mutex: Mutex<bool>,
    condvar: Condvar,
}

impl ThreadUnpark {
    pub fn new() -> Arc<Self> {
        Arc::new(ThreadUnpark {
            mutex: Mutex::new(false),
            condvar: Condvar::new(),
        })
    }

    pub fn park(&self) {
        let mut ready = self.mutex.lock().unwrap();
        while !*ready {
            ready = self.condvar.wait(ready).unwrap();
        }
        *ready = false;
    }
}

impl UnparkHandle for ThreadUnpark {
    fn unpark(&self) {
        let mut ready = self.mutex.lock().unwrap();
        *ready = true;
        self.condvar.notify_one();
    }
}

/// Synchronously drives `future` to completion on the calling thread,
/// parking the OS thread between polls. Intended for tests and simple
/// top-level callers that aren't already inside a reactor.
pub fn wait<F>(mut future: F) -> crate::poll::Try<F::Item>
where
    F: crate::future::Future,
{
    let thread_unpark = ThreadUnpark::new();
    let task = Task {
        id: NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed),
        unpark: Unpark::new(thread_unpark.clone()),
    };
    loop {
        let step = with_task(task.clone(), || future.poll());
        match step {
            crate::poll::Poll::Ready(v) => return Ok(v),
            crate::poll::Poll::Err(e) => return Err(e),
            crate::poll::Poll::NotReady => thread_unpark.park(),
        }
    }
}

pub(crate) fn allocate_task_id() -> u64 {
    NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed)
}
