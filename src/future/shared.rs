use super::Future;
use crate::poll::Poll;
use crate::task::Task;
use crate::Error;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

static NEXT_CLONE_ID: AtomicU64 = AtomicU64::new(1);

enum State<F: Future> {
    Active {
        future: F,
        /// id of the clone currently driving the poll, if any.
        poller: Option<u64>,
        waiters: Vec<Task>,
    },
    Done(Result<F::Item, Arc<Error>>),
}

/// A cloneable handle over a single underlying future (`spec.md §4.3`
/// `shared()`). The first clone to poll drives the inner future; other
/// clones park on a waiter list and are woken once a result exists.
///
/// Resolution of the `spec.md §9` open question ("behavior of `shared()`
/// when a clone is dropped while polling but before completion"): dropping
/// the polling clone clears the poller slot and wakes exactly one waiting
/// clone so it can take over on its next poll (see `DESIGN.md`).
pub struct Shared<F: Future> {
    inner: Arc<Mutex<State<F>>>,
    id: u64,
}

/// Wraps the `Arc`-shared error so every clone can observe it without
/// requiring `crate::Error` itself to be `Clone`.
#[derive(Debug)]
pub struct SharedError(Arc<Error>);

impl std::fmt::Display for SharedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for SharedError {}

/// The clone-propagated success value; just `T`, named for documentation
/// purposes at the combinator-algebra level (`spec.md §4.3`).
pub type SharedItem<T> = T;

impl<F: Future> Shared<F> {
    pub(crate) fn new(future: F) -> Self {
        Shared {
            inner: Arc::new(Mutex::new(State::Active {
                future,
                poller: None,
                waiters: Vec::new(),
            })),
            id: NEXT_CLONE_ID.fetch_add(1, Ordering::Relaxed),
        }
    }
}

impl<F: Future> Clone for Shared<F>
where
    F::Item: Clone,
{
    fn clone(&self) -> Self {
        Shared {
            inner: self.inner.clone(),
            id: NEXT_CLONE_ID.fetch_add(1, Ordering::Relaxed),
        }
    }
}

impl<F: Future> Future for Shared<F>
where
    F::Item: Clone,
{
    type Item = F::Item;

    fn poll(&mut self) -> Poll<F::Item> {
        let mut guard = self.inner.lock().unwrap();
        if let State::Done(result) = &*guard {
            return match result {
                Ok(v) => Poll::Ready(v.clone()),
                Err(e) => Poll::Err(Error::Custom(Box::new(SharedError(e.clone())))),
            };
        }

        let may_poll = match &mut *guard {
            State::Active { poller, .. } => {
                if poller.is_none() || *poller == Some(self.id) {
                    *poller = Some(self.id);
                    true
                } else {
                    false
                }
            }
            State::Done(_) => unreachable!(),
        };
        if !may_poll {
            if let State::Active { waiters, .. } = &mut *guard {
                waiters.push(crate::task::current_task());
            }
            return Poll::NotReady;
        }

        let step = match &mut *guard {
            State::Active { future, .. } => future.poll(),
            State::Done(_) => unreachable!(),
        };
        match step {
            Poll::NotReady => Poll::NotReady,
            Poll::Ready(v) => {
                let waiters = match &mut *guard {
                    State::Active { waiters, .. } => std::mem::take(waiters),
                    State::Done(_) => unreachable!(),
                };
                *guard = State::Done(Ok(v.clone()));
                drop(guard);
                waiters.into_iter().for_each(|w| w.unpark());
                Poll::Ready(v)
            }
            Poll::Err(e) => {
                let waiters = match &mut *guard {
                    State::Active { waiters, .. } => std::mem::take(waiters),
                    State::Done(_) => unreachable!(),
                };
                let arc_e = Arc::new(e);
                *guard = State::Done(Err(arc_e.clone()));
                drop(guard);
                waiters.into_iter().for_each(|w| w.unpark());
                Poll::Err(Error::Custom(Box::new(SharedError(arc_e))))
            }
        }
    }
}

impl<F: Future> Drop for Shared<F> {
    fn drop(&mut self) {
        let mut guard = match self.inner.lock() {
            Ok(g) => g,
            Err(_) => return,
        };
        if let State::Active { poller, waiters, .. } = &mut *guard {
            if *poller == Some(self.id) {
                *poller = None;
                let next = waiters.pop();
                drop(guard);
                if let Some(w) = next {
                    w.unpark();
                }
            }
        }
    }
}
