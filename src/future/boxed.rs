use super::Future;
use crate::poll::Poll;

/// Type-erased, owning future handle (`spec.md §3` `boxed`).
pub struct BoxFuture<T> {
    inner: Box<dyn Future<Item = T> + Send>,
}

impl<T> BoxFuture<T> {
    pub(crate) fn new<F>(inner: F) -> Self
    where
        F: Future<Item = T> + Send + 'static,
    {
        BoxFuture {
            inner: Box::new(inner),
        }
    }
}

impl<T> Future for BoxFuture<T> {
    type Item = T;

    fn poll(&mut self) -> Poll<T> {
        self.inner.poll()
    }
}
