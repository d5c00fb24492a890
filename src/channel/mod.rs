//! Inter-task channels (`spec.md §2` component O).
//!
//! All three share the same idea: a mutex-guarded inbox plus one
//! `Task`-carrying waiter slot per side, exactly like `io::token`'s
//! primitives but without an fd or a reactor in the loop — these are purely
//! in-process handoffs, woken by `Task::unpark` alone.

pub mod bounded;
pub mod mpsc;
pub mod oneshot;

pub use bounded::{bounded, BoundedReceiver, BoundedSender};
pub use mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
pub use oneshot::{oneshot, Receiver as OneshotReceiver, Sender as OneshotSender};
