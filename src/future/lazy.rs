use super::Future;
use crate::poll::Poll;

enum State<F, Fut> {
    Unstarted(F),
    Started(Fut),
    Done,
}

/// Defers constructing the inner future until the first `poll`, rather than
/// when `lazy()` is called (`spec.md §3` `lazy`).
pub struct Lazy<F, Fut> {
    state: State<F, Fut>,
}

pub fn lazy<F, Fut>(f: F) -> Lazy<F, Fut>
where
    F: FnOnce() -> Fut,
    Fut: Future,
{
    Lazy {
        state: State::Unstarted(f),
    }
}

impl<F, Fut> Future for Lazy<F, Fut>
where
    F: FnOnce() -> Fut,
    Fut: Future,
{
    type Item = Fut::Item;

    fn poll(&mut self) -> Poll<Fut::Item> {
        loop {
            match std::mem::replace(&mut self.state, State::Done) {
                State::Unstarted(f) => {
                    self.state = State::Started(f());
                }
                State::Started(mut fut) => {
                    let step = fut.poll();
                    if step.is_not_ready() {
                        self.state = State::Started(fut);
                    }
                    return step;
                }
                State::Done => return Poll::Err(crate::Error::InvalidPoll),
            }
        }
    }
}
