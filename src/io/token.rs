//! Completion tokens (`spec.md §3` "CompletionToken", `§4.6`).
//!
//! A token is a reference-counted record of one pending operation. The I/O
//! object's pending list holds one clone (the "attached" reference); the
//! leaf future a caller is awaiting holds another (the "handle" reference).
//! Dropping the *handle* while the operation is still `Started` is what
//! cancels it (`UserCancel`) — leaf future wrapper types below (e.g. a
//! socket's `ConnectFuture`) do that explicitly in their `Drop` impl, since
//! `Arc` refcounts alone can't distinguish "the object's own list entry"
//! from "the caller's handle".

use crate::error::CancelReason;
use crate::poll::{Poll, Try};
use crate::task::Task;
use crate::Error;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

static NEXT_TOKEN_ID: AtomicU64 = AtomicU64::new(1);

enum State<T> {
    Started(Option<Task>),
    Done(Try<T>),
    Cancelled(CancelReason),
    /// The terminal result has already been handed back from `poll` once;
    /// a further poll is `InvalidPoll` (`spec.md §4.1`).
    Consumed,
}

pub struct CompletionToken<T> {
    inner: Arc<Mutex<State<T>>>,
    id: u64,
}

impl<T> Clone for CompletionToken<T> {
    fn clone(&self) -> Self {
        CompletionToken {
            inner: self.inner.clone(),
            id: self.id,
        }
    }
}

impl<T> Default for CompletionToken<T> {
    fn default() -> Self {
        CompletionToken {
            inner: Arc::new(Mutex::new(State::Started(None))),
            id: NEXT_TOKEN_ID.fetch_add(1, Ordering::Relaxed),
        }
    }
}

impl<T> CompletionToken<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_started(&self) -> bool {
        matches!(&*self.inner.lock().unwrap(), State::Started(_))
    }

    /// Transitions `Started -> Done`, unparking the waiter exactly once.
    /// A no-op if the token already reached a terminal state — the
    /// invariant is "exactly one of `notify_done` or `cleanup` fires"
    /// (`spec.md §8`), so whichever happens first wins.
    pub fn notify_done(&self, result: Try<T>) {
        let waiter = {
            let mut guard = self.inner.lock().unwrap();
            match &mut *guard {
                State::Started(waiter) => {
                    let waiter = waiter.take();
                    *guard = State::Done(result);
                    waiter
                }
                _ => return,
            }
        };
        tracing::trace!(token_id = self.id, "completion token notify_done");
        if let Some(w) = waiter {
            w.unpark();
        }
    }

    /// Transitions `Started -> Cancelled`, unparking the waiter exactly
    /// once.
    pub fn cleanup(&self, reason: CancelReason) {
        let waiter = {
            let mut guard = self.inner.lock().unwrap();
            match &mut *guard {
                State::Started(waiter) => {
                    let waiter = waiter.take();
                    *guard = State::Cancelled(reason);
                    waiter
                }
                _ => return,
            }
        };
        tracing::trace!(token_id = self.id, ?reason, "completion token cleanup");
        if let Some(w) = waiter {
            w.unpark();
        }
    }

    /// Registers the current task as waiter if still pending, otherwise
    /// consumes and returns the terminal result.
    pub fn poll(&self) -> Poll<T> {
        let mut guard = self.inner.lock().unwrap();
        match &mut *guard {
            State::Started(waiter) => {
                tracing::trace!(token_id = self.id, "completion token attach");
                *waiter = Some(crate::task::current_task());
                Poll::NotReady
            }
            State::Done(_) | State::Cancelled(_) => {
                match std::mem::replace(&mut *guard, State::Consumed) {
                    State::Done(Ok(v)) => Poll::Ready(v),
                    State::Done(Err(e)) => Poll::Err(e),
                    State::Cancelled(reason) => Poll::Err(Error::Cancelled(reason)),
                    _ => unreachable!(),
                }
            }
            State::Consumed => Poll::Err(Error::InvalidPoll),
        }
    }
}

impl<T> crate::future::Future for CompletionToken<T> {
    type Item = T;

    fn poll(&mut self) -> Poll<T> {
        CompletionToken::poll(self)
    }
}

/// A growing chain of items fed by a watcher callback and drained by a
/// stream future (`spec.md §4.6` "data_ready(n) which only unparks",
/// `§4.7` "stream token ... poll_stream returns Ready(Some(buf)) while
/// buffer non-empty, Ready(None) on clean EOF").
pub struct StreamToken<T> {
    inner: Arc<Mutex<StreamState<T>>>,
    id: u64,
}

struct StreamState<T> {
    queue: std::collections::VecDeque<T>,
    eof: bool,
    error: Option<Error>,
    waiter: Option<Task>,
}

impl<T> Clone for StreamToken<T> {
    fn clone(&self) -> Self {
        StreamToken {
            inner: self.inner.clone(),
            id: self.id,
        }
    }
}

impl<T> Default for StreamToken<T> {
    fn default() -> Self {
        StreamToken {
            inner: Arc::new(Mutex::new(StreamState {
                queue: std::collections::VecDeque::new(),
                eof: false,
                error: None,
                waiter: None,
            })),
            id: NEXT_TOKEN_ID.fetch_add(1, Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{with_task, Task, Unpark, UnparkHandle};

    struct NoopUnpark;
    impl UnparkHandle for NoopUnpark {
        fn unpark(&self) {}
    }

    fn test_task() -> Task {
        Task {
            id: 1,
            unpark: Unpark::new(Arc::new(NoopUnpark)),
        }
    }

    #[test]
    fn poll_before_notify_is_not_ready_then_delivers_result() {
        let token: CompletionToken<i32> = CompletionToken::new();
        with_task(test_task(), || {
            assert!(matches!(token.poll(), Poll::NotReady));
        });
        token.notify_done(Ok(7));
        with_task(test_task(), || {
            assert!(matches!(token.poll(), Poll::Ready(7)));
        });
    }

    #[test]
    fn notify_done_after_cleanup_is_ignored() {
        let token: CompletionToken<i32> = CompletionToken::new();
        token.cleanup(CancelReason::UserCancel);
        token.notify_done(Ok(1));
        with_task(test_task(), || {
            assert!(matches!(
                token.poll(),
                Poll::Err(Error::Cancelled(CancelReason::UserCancel))
            ));
        });
    }

    #[test]
    fn second_poll_after_consumption_is_invalid_poll() {
        let token: CompletionToken<i32> = CompletionToken::new();
        token.notify_done(Ok(1));
        with_task(test_task(), || {
            assert!(matches!(token.poll(), Poll::Ready(1)));
            assert!(matches!(token.poll(), Poll::Err(Error::InvalidPoll)));
        });
    }

    #[test]
    fn stream_token_drains_queued_items_before_eof() {
        let stream = StreamToken::new();
        stream.push(1);
        stream.push(2);
        stream.close_eof();
        assert!(matches!(stream.poll_stream(), Poll::Ready(Some(1))));
        assert!(matches!(stream.poll_stream(), Poll::Ready(Some(2))));
        assert!(matches!(stream.poll_stream(), Poll::Ready(None)));
    }
}

impl<T> StreamToken<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push one item and unpark the waiter (`data_ready`).
    pub fn push(&self, item: T) {
        let waiter = {
            let mut guard = self.inner.lock().unwrap();
            guard.queue.push_back(item);
            guard.waiter.take()
        };
        tracing::trace!(token_id = self.id, "stream token notify_done (item)");
        if let Some(w) = waiter {
            w.unpark();
        }
    }

    pub fn close_eof(&self) {
        let waiter = {
            let mut guard = self.inner.lock().unwrap();
            guard.eof = true;
            guard.waiter.take()
        };
        tracing::trace!(token_id = self.id, "stream token cleanup (eof)");
        if let Some(w) = waiter {
            w.unpark();
        }
    }

    pub fn fail(&self, error: Error) {
        let waiter = {
            let mut guard = self.inner.lock().unwrap();
            if guard.error.is_none() {
                guard.error = Some(error);
            }
            guard.waiter.take()
        };
        tracing::trace!(token_id = self.id, "stream token cleanup (error)");
        if let Some(w) = waiter {
            w.unpark();
        }
    }

    pub fn cancel(&self, reason: CancelReason) {
        self.fail(Error::Cancelled(reason));
    }

    pub fn poll_stream(&self) -> Poll<Option<T>> {
        let mut guard = self.inner.lock().unwrap();
        if let Some(item) = guard.queue.pop_front() {
            return Poll::Ready(Some(item));
        }
        if let Some(e) = guard.error.take() {
            return Poll::Err(e);
        }
        if guard.eof {
            return Poll::Ready(None);
        }
        tracing::trace!(token_id = self.id, "stream token attach");
        guard.waiter = Some(crate::task::current_task());
        Poll::NotReady
    }
}
