//! An unbounded multi-producer, single-consumer queue (`spec.md §4.14`).

use crate::future::Stream;
use crate::poll::Poll;
use crate::task::{current_task, Task};
use crate::Error;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

struct Inner<T> {
    queue: VecDeque<T>,
    waiter: Option<Task>,
    sender_count: usize,
    receiver_dropped: bool,
}

pub fn unbounded<T>() -> (UnboundedSender<T>, UnboundedReceiver<T>) {
    let inner = Arc::new(Mutex::new(Inner {
        queue: VecDeque::new(),
        waiter: None,
        sender_count: 1,
        receiver_dropped: false,
    }));
    (
        UnboundedSender {
            inner: inner.clone(),
        },
        UnboundedReceiver { inner },
    )
}

pub struct UnboundedSender<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> UnboundedSender<T> {
    /// Queues `value` for the receiver. Fails only once the receiver has
    /// been dropped — there's no capacity limit to hit (`spec.md §9`
    /// Non-goals: bounded backpressure is `BoundedChannel`'s job, not this
    /// one's).
    pub fn send(&self, value: T) -> Result<(), Error> {
        let mut guard = self.inner.lock().unwrap();
        if guard.receiver_dropped {
            return Err(Error::ChannelClosed);
        }
        guard.queue.push_back(value);
        let waiter = guard.waiter.take();
        drop(guard);
        if let Some(w) = waiter {
            w.unpark();
        }
        Ok(())
    }
}

impl<T> Clone for UnboundedSender<T> {
    fn clone(&self) -> Self {
        self.inner.lock().unwrap().sender_count += 1;
        UnboundedSender {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Drop for UnboundedSender<T> {
    fn drop(&mut self) {
        let mut guard = self.inner.lock().unwrap();
        guard.sender_count -= 1;
        if guard.sender_count == 0 {
            let waiter = guard.waiter.take();
            drop(guard);
            if let Some(w) = waiter {
                w.unpark();
            }
        }
    }
}

pub struct UnboundedReceiver<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Stream for UnboundedReceiver<T> {
    type Item = T;

    fn poll_stream(&mut self) -> Poll<Option<T>> {
        let mut guard = self.inner.lock().unwrap();
        if let Some(value) = guard.queue.pop_front() {
            return Poll::Ready(Some(value));
        }
        if guard.sender_count == 0 {
            return Poll::Ready(None);
        }
        guard.waiter = Some(current_task());
        Poll::NotReady
    }
}

impl<T> Drop for UnboundedReceiver<T> {
    fn drop(&mut self) {
        self.inner.lock().unwrap().receiver_dropped = true;
    }
}
