//! A single-value, single-use channel (`spec.md §4.14` "Promise/oneshot").

use crate::future::Future;
use crate::poll::Poll;
use crate::task::{current_task, Task};
use crate::Error;
use std::sync::{Arc, Mutex};

enum Slot<T> {
    Empty(Option<Task>),
    Value(T),
    Closed,
}

pub fn oneshot<T>() -> (Sender<T>, Receiver<T>) {
    let inner = Arc::new(Mutex::new(Slot::Empty(None)));
    (
        Sender {
            inner: inner.clone(),
        },
        Receiver { inner },
    )
}

pub struct Sender<T> {
    inner: Arc<Mutex<Slot<T>>>,
}

impl<T> Sender<T> {
    /// Delivers `value`, or hands it back if the receiver already dropped.
    pub fn send(self, value: T) -> Result<(), T> {
        let mut guard = self.inner.lock().unwrap();
        if matches!(&*guard, Slot::Closed) {
            return Err(value);
        }
        let previous = std::mem::replace(&mut *guard, Slot::Value(value));
        drop(guard);
        if let Slot::Empty(Some(task)) = previous {
            task.unpark();
        }
        Ok(())
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        let mut guard = self.inner.lock().unwrap();
        if let Slot::Empty(waiter) = &mut *guard {
            let waiter = waiter.take();
            *guard = Slot::Closed;
            drop(guard);
            if let Some(w) = waiter {
                w.unpark();
            }
        }
    }
}

pub struct Receiver<T> {
    inner: Arc<Mutex<Slot<T>>>,
}

impl<T> Future for Receiver<T> {
    type Item = T;

    fn poll(&mut self) -> Poll<T> {
        let mut guard = self.inner.lock().unwrap();
        match &mut *guard {
            Slot::Empty(waiter) => {
                *waiter = Some(current_task());
                Poll::NotReady
            }
            Slot::Closed => Poll::Err(Error::ChannelClosed),
            Slot::Value(_) => match std::mem::replace(&mut *guard, Slot::Closed) {
                Slot::Value(v) => Poll::Ready(v),
                _ => unreachable!(),
            },
        }
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        let mut guard = self.inner.lock().unwrap();
        if let Slot::Empty(_) = &*guard {
            *guard = Slot::Closed;
        }
    }
}
