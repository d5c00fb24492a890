use super::Future;
use crate::poll::{Poll, Try};

/// Static two-future race. Polls `a` then `b` on every step (lowest index —
/// here, `a` — wins ties), per the `spec.md §4.3` tie-break rule. Grounded in
/// the teacher's `posts/select_playground/select.rs`, generalized to observe
/// errors uniformly via `Try` rather than only `Ready`.
pub struct Select<A: Future, B: Future> {
    inner: Option<(A, B)>,
}

pub fn select<A: Future, B: Future>(a: A, b: B) -> Select<A, B> {
    Select { inner: Some((a, b)) }
}

/// Output of a static `select`: which side finished, and the other side so
/// the caller can keep driving it if desired.
pub enum SelectOutput<A: Future, B: Future> {
    Left(Try<A::Item>, B),
    Right(A, Try<B::Item>),
}

impl<A: Future, B: Future> Future for Select<A, B> {
    type Item = SelectOutput<A, B>;

    fn poll(&mut self) -> Poll<Self::Item> {
        let (mut a, mut b) = self.inner.take().expect("Select polled after completion");
        match a.poll() {
            Poll::Ready(v) => return Poll::Ready(SelectOutput::Left(Ok(v), b)),
            Poll::Err(e) => return Poll::Ready(SelectOutput::Left(Err(e), b)),
            Poll::NotReady => {}
        }
        match b.poll() {
            Poll::Ready(v) => return Poll::Ready(SelectOutput::Right(a, Ok(v))),
            Poll::Err(e) => return Poll::Ready(SelectOutput::Right(a, Err(e))),
            Poll::NotReady => {}
        }
        self.inner = Some((a, b));
        Poll::NotReady
    }
}
