//! Framed-transport RPC dispatch (`spec.md §4.15`).
//!
//! Two server-side drivers and two client-side constructors, sharing the
//! same `Service`/codec plumbing but differing in ordering guarantees:
//! [`pipeline`] serializes one request at a time per connection;
//! [`multiplex`] tags frames with a request ID so many calls can overlap.

pub mod multiplex;
pub mod pipeline;

pub use multiplex::{multiplex_client, MultiplexClient, MultiplexServerDispatch};
pub use pipeline::{pipeline_client, PipelineClient, PipelineServerDispatch};
