use super::Future;
use crate::poll::Poll;

/// Result of one `loop_fn` body invocation: either the loop is done
/// (`Break`) or it should continue with new state (`Continue`)
/// (`spec.md §4.3`, grounded in `original_source/include/futures/core/Either.h`
/// and `original_source/include/futures/detail/LoopFn.h`).
pub enum Either<B, C> {
    Break(B),
    Continue(C),
}

enum State<S, Fut> {
    Stepping(Fut),
    Seed(Option<S>),
    Done,
}

/// Repeatedly calls `body(state)`, replacing `state` on `Continue` and
/// yielding the value on `Break`. Never allocates per iteration beyond the
/// current body future (`spec.md §4.3`).
pub struct LoopFn<S, Body, Fut> {
    body: Body,
    state: State<S, Fut>,
}

pub fn loop_fn<S, Body, Fut, B>(seed: S, body: Body) -> LoopFn<S, Body, Fut>
where
    Body: FnMut(S) -> Fut,
    Fut: Future<Item = Either<B, S>>,
{
    LoopFn {
        body,
        state: State::Seed(Some(seed)),
    }
}

impl<S, Body, Fut, B> Future for LoopFn<S, Body, Fut>
where
    Body: FnMut(S) -> Fut,
    Fut: Future<Item = Either<B, S>>,
{
    type Item = B;

    fn poll(&mut self) -> Poll<B> {
        loop {
            match &mut self.state {
                State::Seed(seed) => {
                    let seed = seed.take().expect("LoopFn seed consumed twice");
                    self.state = State::Stepping((self.body)(seed));
                }
                State::Stepping(fut) => match fut.poll() {
                    Poll::Ready(Either::Break(value)) => {
                        self.state = State::Done;
                        return Poll::Ready(value);
                    }
                    Poll::Ready(Either::Continue(next)) => {
                        self.state = State::Seed(Some(next));
                    }
                    Poll::NotReady => return Poll::NotReady,
                    Poll::Err(e) => {
                        self.state = State::Done;
                        return Poll::Err(e);
                    }
                },
                State::Done => return Poll::Err(crate::Error::InvalidPoll),
            }
        }
    }
}
