use super::Future;
use crate::poll::Poll;

/// An already-evaluated future: the first `poll` yields the stored result
/// immediately (`spec.md §3` `result_future`).
pub struct ResultFuture<T>(Option<crate::poll::Try<T>>);

impl<T> Future for ResultFuture<T> {
    type Item = T;

    fn poll(&mut self) -> Poll<T> {
        match self.0.take() {
            Some(Ok(v)) => Poll::Ready(v),
            Some(Err(e)) => Poll::Err(e),
            None => Poll::Err(crate::Error::InvalidPoll),
        }
    }
}

pub fn result<T>(r: crate::poll::Try<T>) -> ResultFuture<T> {
    ResultFuture(Some(r))
}

pub fn ok<T>(value: T) -> ResultFuture<T> {
    ResultFuture(Some(Ok(value)))
}

pub fn err<T>(error: crate::Error) -> ResultFuture<T> {
    ResultFuture(Some(Err(error)))
}

/// A future that never completes. Useful as the inner future in a
/// `timeout` test, or as a sentinel in `when_any`/`select` scenarios.
pub struct Empty<T>(std::marker::PhantomData<T>);

pub fn empty<T>() -> Empty<T> {
    Empty(std::marker::PhantomData)
}

impl<T> Future for Empty<T> {
    type Item = T;

    fn poll(&mut self) -> Poll<T> {
        Poll::NotReady
    }
}
