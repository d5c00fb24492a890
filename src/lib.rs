//! `evrt` — a single-threaded, readiness-based async I/O runtime.
//!
//! Polled futures and streams (`future`), a reactor/executor pinned to one
//! OS thread plus an optional pool of them (`reactor`), raw-`libc`
//! readiness-driven I/O objects (`io`), in-process channels (`channel`), a
//! one-shot `Promise` (`promise`), a framed-transport codec layer (`codec`),
//! and request/response dispatch over it (`dispatch`, `service`).
//!
//! There is no implicit global runtime: construct a [`reactor::Reactor`],
//! build I/O objects and futures against its [`reactor::ReactorHandle`], and
//! call [`reactor::Reactor::run`] (or [`task::wait`] for a single top-level
//! future on the calling thread).

pub mod channel;
pub mod codec;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod future;
pub mod io;
pub mod poll;
pub mod promise;
pub mod reactor;
pub mod service;
pub mod task;

pub use error::{CancelReason, Error, Result};
pub use future::{Future, Stream};
pub use poll::{Async, Poll, Try};
pub use promise::{Promise, PromiseFuture};
pub use reactor::{Reactor, ReactorHandle};
