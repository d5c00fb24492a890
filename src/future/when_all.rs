use super::Future;
use crate::poll::{Poll, Try};

/// Dynamic N-ary join: ready only once every future in the set is ready,
/// short-circuiting (and discarding the rest) on the first error
/// (`spec.md §4.3` "when_all: as join but N-ary").
pub struct WhenAll<F: Future> {
    slots: Vec<Option<F>>,
    results: Vec<Option<F::Item>>,
}

pub fn when_all<F: Future>(futures: Vec<F>) -> WhenAll<F> {
    let len = futures.len();
    WhenAll {
        slots: futures.into_iter().map(Some).collect(),
        results: (0..len).map(|_| None).collect(),
    }
}

impl<F: Future> Future for WhenAll<F> {
    type Item = Vec<F::Item>;

    fn poll(&mut self) -> Poll<Vec<F::Item>> {
        for (slot, result) in self.slots.iter_mut().zip(self.results.iter_mut()) {
            if result.is_some() {
                continue;
            }
            if let Some(fut) = slot {
                match fut.poll() {
                    Poll::Ready(v) => {
                        *result = Some(v);
                        *slot = None;
                    }
                    Poll::NotReady => {}
                    Poll::Err(e) => return Poll::Err(e),
                }
            }
        }
        if self.results.iter().all(Option::is_some) {
            let values = self.results.iter_mut().map(|r| r.take().unwrap()).collect();
            Poll::Ready(values)
        } else {
            Poll::NotReady
        }
    }
}

/// Dynamic select: polls the set in index order, and on the first future
/// that's ready (value or error) returns it alongside the remaining
/// futures, preserving their relative order (`spec.md §8` seed scenario 7).
pub struct WhenAny<F: Future> {
    futures: Vec<F>,
}

pub fn when_any<F: Future>(futures: Vec<F>) -> WhenAny<F> {
    WhenAny { futures }
}

impl<F: Future> Future for WhenAny<F> {
    type Item = (Try<F::Item>, Vec<F>);

    fn poll(&mut self) -> Poll<Self::Item> {
        if self.futures.is_empty() {
            return Poll::Err(crate::Error::EmptyFutureSet);
        }
        for i in 0..self.futures.len() {
            let step = self.futures[i].poll();
            match step {
                Poll::Ready(v) => {
                    let mut remaining = std::mem::take(&mut self.futures);
                    remaining.remove(i);
                    return Poll::Ready((Ok(v), remaining));
                }
                Poll::Err(e) => {
                    let mut remaining = std::mem::take(&mut self.futures);
                    remaining.remove(i);
                    return Poll::Ready((Err(e), remaining));
                }
                Poll::NotReady => continue,
            }
        }
        Poll::NotReady
    }
}
