use super::Future;
use crate::io::timer::{Timer, TimerKeeper};
use crate::poll::Poll;
use crate::Error;

/// Races `fut` against a timer; on timer expiry the inner future is dropped
/// (cancelling its leaf operations) and `Error::Timeout` is returned; on
/// inner completion before expiry, the timer token is dropped, which
/// removes it from the keeper's FIFO (`spec.md §4.3`, `§5` "Timeouts").
pub struct Timeout<F> {
    inner: F,
    timer: Timer,
    /// Keeps the keeper's `Arc<Inner>` alive for as long as `timer` needs it.
    /// The reactor only ever holds a `Weak<dyn TimerSource>`, so if nothing
    /// else holds a strong reference the keeper's pending-entry list is
    /// deallocated out from under `timer` and it never fires. `None` for the
    /// method-form constructor, whose caller already owns a `TimerKeeper`
    /// that outlives this `Timeout`.
    _keeper: Option<TimerKeeper>,
}

impl<F: Future> Timeout<F> {
    pub(crate) fn new(inner: F, keeper: &TimerKeeper) -> Self {
        Timeout {
            inner,
            timer: keeper.delay(),
            _keeper: None,
        }
    }
}

impl<F: Future> Future for Timeout<F> {
    type Item = F::Item;

    fn poll(&mut self) -> Poll<F::Item> {
        match self.inner.poll() {
            Poll::Ready(v) => Poll::Ready(v),
            Poll::Err(e) => Poll::Err(e),
            Poll::NotReady => match self.timer.poll() {
                Poll::Ready(()) => Poll::Err(Error::Timeout),
                Poll::Err(e) => Poll::Err(e),
                Poll::NotReady => Poll::NotReady,
            },
        }
    }
}

/// Free-function form taking an ad hoc duration directly against a reactor,
/// for the common one-shot case (`spec.md §4.3` `timeout(fut, duration)`).
pub fn timeout<F: Future>(
    reactor: &crate::reactor::Reactor,
    fut: F,
    duration: std::time::Duration,
) -> Timeout<F> {
    let keeper = TimerKeeper::new(&reactor.handle(), duration);
    let timer = keeper.delay();
    Timeout {
        inner: fut,
        timer,
        _keeper: Some(keeper),
    }
}
