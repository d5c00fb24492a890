//! The request/response abstraction the dispatcher drives
//! (`spec.md §4.15` "Service").

use crate::future::Future;

/// One request in, one future response out. A multiplexed dispatcher may
/// call this concurrently for several in-flight requests; a pipelined one
/// calls it once per connection slot at a time.
pub trait Service {
    type Request;
    type Response;
    type Future: Future<Item = Self::Response>;

    fn call(&self, request: Self::Request) -> Self::Future;

    /// Backpressure hint: `false` means "don't send more requests right
    /// now" (`spec.md §9` Open Question — resolved as an advisory signal
    /// only: a dispatcher may still call a service that reports `false`,
    /// it's not a hard precondition of `call`, since nothing in the
    /// pending-request model lets a caller retract a request already in
    /// flight).
    fn is_available(&self) -> bool {
        true
    }
}

/// Middleware: wraps an inner `Service`, producing another one
/// (`spec.md` GLOSSARY "ServiceFilter").
pub trait ServiceFilter<S: Service> {
    type Service: Service<Request = S::Request>;

    fn wrap(&self, inner: S) -> Self::Service;
}

/// Logs every call at `tracing::Level::DEBUG`, grounded in the ambient
/// `tracing` instrumentation used throughout the reactor.
pub struct LoggingFilter {
    pub target: &'static str,
}

impl<S: Service> ServiceFilter<S> for LoggingFilter {
    type Service = Logged<S>;

    fn wrap(&self, inner: S) -> Logged<S> {
        Logged {
            inner,
            target: self.target,
        }
    }
}

pub struct Logged<S> {
    inner: S,
    target: &'static str,
}

impl<S: Service> Service for Logged<S> {
    type Request = S::Request;
    type Response = S::Response;
    type Future = S::Future;

    fn call(&self, request: Self::Request) -> Self::Future {
        tracing::debug!(target: "evrt::service", service = self.target, "call");
        self.inner.call(request)
    }

    fn is_available(&self) -> bool {
        self.inner.is_available()
    }
}
