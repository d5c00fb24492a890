//! A promise: a handle for fulfilling a future from outside its own poll
//! loop (`spec.md §2` component P). Thin sugar over `channel::oneshot` for
//! callers who want a single future they can resolve once, without writing
//! out the sender/receiver pair themselves.

use crate::channel::oneshot::{self, Receiver, Sender};
use crate::future::Future;
use crate::poll::Poll;

pub struct Promise<T> {
    sender: Option<Sender<T>>,
}

impl<T> Promise<T> {
    pub fn new() -> (Promise<T>, PromiseFuture<T>) {
        let (sender, receiver) = oneshot::oneshot();
        (
            Promise {
                sender: Some(sender),
            },
            PromiseFuture { receiver },
        )
    }

    /// Resolves the paired future with `value`. Returns `value` back if the
    /// future side was already dropped, or if this promise already
    /// fulfilled once.
    pub fn fulfill(&mut self, value: T) -> Result<(), T> {
        match self.sender.take() {
            Some(sender) => sender.send(value),
            None => Err(value),
        }
    }
}

pub struct PromiseFuture<T> {
    receiver: Receiver<T>,
}

impl<T> Future for PromiseFuture<T> {
    type Item = T;

    fn poll(&mut self) -> Poll<T> {
        self.receiver.poll()
    }
}
