//! The listening-socket I/O object (`spec.md §4.8` "ServerSocket").

use crate::error::CancelReason;
use crate::future::Stream;
use crate::io::token::StreamToken;
use crate::poll::Poll;
use crate::reactor::{FdWatcher, Interest, ReactorHandle};
use crate::Error;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

struct Shared {
    listener: TcpListener,
    reactor: ReactorHandle,
    registered: AtomicBool,
    incoming: StreamToken<TcpStream>,
    max_read_iterations: usize,
}

/// A bound, listening TCP socket. `incoming()` produces the `AcceptStream`
/// of connections as they arrive.
#[derive(Clone)]
pub struct ServerSocket {
    shared: Arc<Shared>,
}

impl ServerSocket {
    pub fn bind(addr: SocketAddr, reactor: ReactorHandle) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let max_read_iterations = reactor.config().max_read_iterations;
        let shared = Arc::new(Shared {
            listener,
            reactor,
            registered: AtomicBool::new(false),
            incoming: StreamToken::new(),
            max_read_iterations,
        });
        shared.ensure_registered();
        Ok(ServerSocket { shared })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.shared.listener.local_addr()
    }

    pub fn incoming(&self) -> AcceptStream {
        AcceptStream {
            server: self.clone(),
        }
    }
}

impl Shared {
    fn ensure_registered(self: &Arc<Self>) {
        if !self.registered.swap(true, Ordering::AcqRel) {
            let weak: Weak<dyn FdWatcher> = Arc::downgrade(self) as Weak<dyn FdWatcher>;
            self.reactor.register_watcher(weak);
        }
    }
}

impl FdWatcher for Shared {
    fn raw_fd(&self) -> RawFd {
        self.listener.as_raw_fd()
    }

    fn interest(&self) -> Interest {
        Interest::Read
    }

    fn on_readable(&self) {
        for _ in 0..self.max_read_iterations {
            match self.listener.accept() {
                Ok((stream, _addr)) => self.incoming.push(stream),
                Err(e) if crate::io::is_retriable(&e) => break,
                Err(e) => {
                    self.incoming.fail(Error::Io(e));
                    break;
                }
            }
        }
    }

    fn on_writable(&self) {}

    fn on_cancel(&self, reason: CancelReason) {
        self.incoming.cancel(reason);
    }
}

/// The stream of accepted connections (`spec.md` GLOSSARY "AcceptStream").
pub struct AcceptStream {
    server: ServerSocket,
}

impl Stream for AcceptStream {
    type Item = crate::io::SocketChannel;

    fn poll_stream(&mut self) -> Poll<Option<Self::Item>> {
        match self.server.shared.incoming.poll_stream() {
            Poll::Ready(Some(raw)) => {
                match crate::io::SocketChannel::from_stream(raw, self.server.shared.reactor.clone())
                {
                    Ok(channel) => Poll::Ready(Some(channel)),
                    Err(e) => Poll::Err(Error::Io(e)),
                }
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::NotReady => Poll::NotReady,
            Poll::Err(e) => Poll::Err(e),
        }
    }
}
