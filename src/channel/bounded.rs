//! A fixed-capacity, multi-producer multi-consumer buffered channel
//! (`spec.md §4.14` "BoundedChannel" — the one with real backpressure).

use crate::future::{Future, Stream};
use crate::poll::Poll;
use crate::task::{current_task, Task};
use crate::Error;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

struct Inner<T> {
    queue: VecDeque<T>,
    capacity: usize,
    sender_count: usize,
    receiver_count: usize,
    /// Producers blocked on a full queue, woken when a consumer makes room.
    space_waiters: VecDeque<Task>,
    /// Consumers blocked on an empty queue, woken when a producer pushes.
    data_waiters: VecDeque<Task>,
}

pub fn bounded<T>(capacity: usize) -> (BoundedSender<T>, BoundedReceiver<T>) {
    assert!(capacity > 0, "bounded channel capacity must be non-zero");
    let inner = Arc::new(Mutex::new(Inner {
        queue: VecDeque::with_capacity(capacity),
        capacity,
        sender_count: 1,
        receiver_count: 1,
        space_waiters: VecDeque::new(),
        data_waiters: VecDeque::new(),
    }));
    (
        BoundedSender {
            inner: inner.clone(),
        },
        BoundedReceiver { inner },
    )
}

pub struct BoundedSender<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> BoundedSender<T> {
    /// Returns a future that resolves once `value` has been queued — it
    /// parks against `capacity` until a consumer makes room
    /// (`spec.md §4.14` "bounded ... exerts real backpressure").
    pub fn send(&self, value: T) -> SendFuture<T> {
        SendFuture {
            inner: self.inner.clone(),
            value: Some(value),
        }
    }
}

impl<T> Clone for BoundedSender<T> {
    fn clone(&self) -> Self {
        self.inner.lock().unwrap().sender_count += 1;
        BoundedSender {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Drop for BoundedSender<T> {
    fn drop(&mut self) {
        let mut guard = self.inner.lock().unwrap();
        guard.sender_count -= 1;
        if guard.sender_count == 0 {
            let waiters: Vec<Task> = guard.data_waiters.drain(..).collect();
            drop(guard);
            for w in waiters {
                w.unpark();
            }
        }
    }
}

pub struct SendFuture<T> {
    inner: Arc<Mutex<Inner<T>>>,
    value: Option<T>,
}

impl<T> Future for SendFuture<T> {
    type Item = ();

    fn poll(&mut self) -> Poll<()> {
        let mut guard = self.inner.lock().unwrap();
        if guard.receiver_count == 0 {
            return Poll::Err(Error::ChannelClosed);
        }
        if guard.queue.len() < guard.capacity {
            let value = self
                .value
                .take()
                .expect("SendFuture polled again after completion");
            guard.queue.push_back(value);
            let waiter = guard.data_waiters.pop_front();
            drop(guard);
            if let Some(w) = waiter {
                w.unpark();
            }
            return Poll::Ready(());
        }
        guard.space_waiters.push_back(current_task());
        Poll::NotReady
    }
}

pub struct BoundedReceiver<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for BoundedReceiver<T> {
    fn clone(&self) -> Self {
        self.inner.lock().unwrap().receiver_count += 1;
        BoundedReceiver {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Stream for BoundedReceiver<T> {
    type Item = T;

    fn poll_stream(&mut self) -> Poll<Option<T>> {
        let mut guard = self.inner.lock().unwrap();
        if let Some(value) = guard.queue.pop_front() {
            let waiter = guard.space_waiters.pop_front();
            drop(guard);
            if let Some(w) = waiter {
                w.unpark();
            }
            return Poll::Ready(Some(value));
        }
        if guard.sender_count == 0 {
            return Poll::Ready(None);
        }
        guard.data_waiters.push_back(current_task());
        Poll::NotReady
    }
}

impl<T> Drop for BoundedReceiver<T> {
    fn drop(&mut self) {
        let mut guard = self.inner.lock().unwrap();
        guard.receiver_count -= 1;
        if guard.receiver_count == 0 {
            let waiters: Vec<Task> = guard.space_waiters.drain(..).collect();
            drop(guard);
            for w in waiters {
                w.unpark();
            }
        }
    }
}
