/// Tunables for a [`Reactor`](crate::reactor::Reactor) and the I/O objects
/// bound to it.
///
/// There is no environment-variable or file-based configuration layer here
/// (the core has no such surface); callers construct or modify this struct
/// directly before creating a reactor.
#[derive(Debug, Clone, Copy)]
pub struct ReactorConfig {
    /// Max runnables drained from the foreign (cross-thread) queue per loop
    /// iteration before the local queue is serviced.
    pub poll_batch: usize,
    /// Bound on consecutive reads a socket will perform on a single
    /// readiness event before yielding back to the reactor (`spec.md §4.7`).
    pub max_read_iterations: usize,
    /// Writes below this size are coalesced on a TLS socket rather than
    /// flushed immediately, to avoid tiny TLS records (`spec.md §4.8`).
    pub tls_coalesce_bytes: usize,
    /// Default capacity used by `bounded::channel()` when none is given
    /// explicitly.
    pub default_channel_capacity: usize,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        ReactorConfig {
            poll_batch: 256,
            max_read_iterations: 12,
            tls_coalesce_bytes: 1500,
            default_channel_capacity: 16,
        }
    }
}

impl ReactorConfig {
    pub fn with_max_read_iterations(mut self, n: usize) -> Self {
        self.max_read_iterations = n;
        self
    }

    pub fn with_tls_coalesce_bytes(mut self, n: usize) -> Self {
        self.tls_coalesce_bytes = n;
        self
    }
}
