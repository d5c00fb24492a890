//! The future/stream protocol (`spec.md §4.1`, `§4.3`) and its combinator
//! algebra.
//!
//! `Future::poll` returns our three-state [`Poll`](crate::poll::Poll) rather
//! than `std::task::Poll`; `Stream` is future-of-optional-item, exactly as
//! `spec.md §3` defines it. Combinators are themselves `Future`/`Stream`
//! implementors, built the way the teacher builds ad hoc future types
//! (`posts/async_playground/tasks_spawn.rs`'s `JoinHandle`,
//! `posts/select_playground/select.rs`'s `Select`): a small struct holding
//! sub-state, with `poll` doing the state transition by hand.

mod and_then;
mod boxed;
mod join;
mod lazy;
mod loop_fn;
mod map;
mod or_else;
mod result_future;
mod select;
mod shared;
mod then;
mod timeout;
mod when_all;

pub use and_then::AndThen;
pub use boxed::BoxFuture;
pub use join::{Join, Join3, Join4, Join5};
pub use lazy::{lazy, Lazy};
pub use loop_fn::{loop_fn, Either, LoopFn};
pub use map::Map;
pub use or_else::OrElse;
pub use result_future::{empty, err, ok, result, Empty, ResultFuture};
pub use select::{select, Select, SelectOutput};
pub use shared::{Shared, SharedError, SharedItem};
pub use then::Then;
pub use timeout::{timeout, Timeout};
pub use when_all::{when_all, when_any, WhenAll, WhenAny};

use crate::poll::{Poll, Try};

/// A single-poll computation that eventually produces `Item` or fails with
/// a [`crate::Error`].
///
/// Implementors must uphold the contract of `spec.md §4.1`: once `poll`
/// returns `Ready` or `Err`, it must not be polled again (doing so may
/// panic or return `Error::InvalidPoll`, at the implementor's choice — the
/// combinators in this module always choose the latter). Returning
/// `NotReady` means the implementation has arranged, before returning, for
/// `crate::task::current_task()` to be unparked once progress is possible.
pub trait Future {
    type Item;

    fn poll(&mut self) -> Poll<Self::Item>;

    fn and_then<F, Fut>(self, f: F) -> AndThen<Self, Fut, F>
    where
        Self: Sized,
        F: FnOnce(Self::Item) -> Fut,
        Fut: Future,
    {
        AndThen::new(self, f)
    }

    fn then<F, Fut>(self, f: F) -> Then<Self, Fut, F>
    where
        Self: Sized,
        F: FnOnce(Try<Self::Item>) -> Fut,
        Fut: Future,
    {
        Then::new(self, f)
    }

    fn or_else<F, Fut>(self, f: F) -> OrElse<Self, Fut, F>
    where
        Self: Sized,
        F: FnOnce(crate::Error) -> Fut,
        Fut: Future<Item = Self::Item>,
    {
        OrElse::new(self, f)
    }

    fn map<F, U>(self, f: F) -> Map<Self, F>
    where
        Self: Sized,
        F: FnOnce(Self::Item) -> U,
    {
        Map::new(self, f)
    }

    fn join<B: Future>(self, other: B) -> Join<Self, B>
    where
        Self: Sized,
    {
        Join::new(self, other)
    }

    fn timeout(self, keeper: &crate::io::timer::TimerKeeper) -> Timeout<Self>
    where
        Self: Sized,
    {
        Timeout::new(self, keeper)
    }

    fn boxed(self) -> BoxFuture<Self::Item>
    where
        Self: Sized + Send + 'static,
    {
        BoxFuture::new(self)
    }

    fn shared(self) -> Shared<Self>
    where
        Self: Sized,
        Self::Item: Clone,
    {
        Shared::new(self)
    }
}

/// Future-of-optional-item: `None` marks end-of-stream (`spec.md §3`).
pub trait Stream {
    type Item;

    fn poll_stream(&mut self) -> Poll<Option<Self::Item>>;
}
