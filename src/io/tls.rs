//! TLS over a non-blocking socket (`spec.md §4.10` "TlsSocketChannel").
//!
//! `native_tls`'s handshake and I/O calls are synchronous but report
//! `WouldBlock` against a non-blocking underlying stream exactly like a raw
//! socket would — the handshake is just driven as its own state, retried on
//! every readiness event until it resolves, the same shape `SocketChannel`
//! uses for connect.

use crate::error::CancelReason;
use crate::future::Future;
use crate::io::token::CompletionToken;
use crate::poll::Poll;
use crate::reactor::{FdWatcher, Interest, ReactorHandle};
use crate::Error;
use native_tls::{HandshakeError, MidHandshakeTlsStream, TlsAcceptor, TlsConnector, TlsStream};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

struct PendingRead {
    buf: Vec<u8>,
    token: CompletionToken<(Vec<u8>, usize)>,
}

struct PendingWrite {
    buf: Vec<u8>,
    offset: usize,
    token: CompletionToken<(Vec<u8>, usize)>,
}

enum Phase {
    TcpConnecting {
        stream: TcpStream,
        role: Role,
    },
    Handshaking {
        mid: MidHandshakeTlsStream<TcpStream>,
    },
    Ready {
        tls: TlsStream<TcpStream>,
        read_op: Option<PendingRead>,
        write_op: Option<PendingWrite>,
        /// Staged bytes from writes smaller than `tls_coalesce_bytes`,
        /// flushed in bulk instead of one `tls.write` per small write
        /// (`spec.md §4.10`, `ReactorConfig::tls_coalesce_bytes`).
        write_coalesce: Vec<u8>,
    },
    Failed,
}

enum Role {
    Client(TlsConnector, String),
    Server(TlsAcceptor),
}

struct Shared {
    fd: RawFd,
    reactor: ReactorHandle,
    registered: AtomicBool,
    phase: Mutex<Phase>,
    handshake_token: CompletionToken<()>,
    tls_coalesce_bytes: usize,
}

/// A TLS-wrapped non-blocking TCP socket, reachable only once its handshake
/// future resolves.
#[derive(Clone)]
pub struct TlsSocketChannel {
    shared: Arc<Shared>,
}

impl TlsSocketChannel {
    /// Connects a raw TCP socket then performs a client TLS handshake.
    pub fn connect(
        domain: &str,
        addr: SocketAddr,
        connector: TlsConnector,
        reactor: ReactorHandle,
    ) -> std::io::Result<TlsHandshakeFuture> {
        let af = if addr.is_ipv4() {
            libc::AF_INET
        } else {
            libc::AF_INET6
        };
        let raw = unsafe { libc::socket(af, libc::SOCK_STREAM, 0) };
        if raw < 0 {
            return Err(std::io::Error::last_os_error());
        }
        crate::reactor::set_nonblocking(raw);
        let stream = unsafe { TcpStream::from_raw_fd(raw) };
        let (sockaddr, len) = super::socket_addr_storage(addr);
        let rc = unsafe { libc::connect(raw, &sockaddr as *const _ as *const libc::sockaddr, len) };
        let connected_now = if rc == 0 {
            true
        } else {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::EINPROGRESS) {
                return Err(err);
            }
            false
        };

        let tls_coalesce_bytes = reactor.config().tls_coalesce_bytes;
        let shared = Arc::new(Shared {
            fd: raw,
            reactor,
            registered: AtomicBool::new(false),
            phase: Mutex::new(Phase::TcpConnecting {
                stream,
                role: Role::Client(connector, domain.to_string()),
            }),
            handshake_token: CompletionToken::new(),
            tls_coalesce_bytes,
        });
        if connected_now {
            shared.start_handshake_if_tcp_ready();
        }
        shared.ensure_registered();
        Ok(TlsHandshakeFuture {
            channel: TlsSocketChannel { shared },
        })
    }

    /// Wraps an already-accepted plain TCP stream and performs a server
    /// handshake.
    pub fn accept(
        stream: TcpStream,
        acceptor: TlsAcceptor,
        reactor: ReactorHandle,
    ) -> std::io::Result<TlsHandshakeFuture> {
        stream.set_nonblocking(true)?;
        let fd = stream.as_raw_fd();
        let tls_coalesce_bytes = reactor.config().tls_coalesce_bytes;
        let shared = Arc::new(Shared {
            fd,
            reactor,
            registered: AtomicBool::new(false),
            phase: Mutex::new(Phase::TcpConnecting {
                stream,
                role: Role::Server(acceptor),
            }),
            handshake_token: CompletionToken::new(),
            tls_coalesce_bytes,
        });
        shared.start_handshake_if_tcp_ready();
        shared.ensure_registered();
        Ok(TlsHandshakeFuture {
            channel: TlsSocketChannel { shared },
        })
    }

    pub fn read(&self, buf: Vec<u8>) -> TlsReadFuture {
        let token = CompletionToken::new();
        if let Phase::Ready { read_op, .. } = &mut *self.shared.phase.lock().unwrap() {
            *read_op = Some(PendingRead {
                buf,
                token: token.clone(),
            });
        } else {
            token.notify_done(Err(Error::NotSupported("read before handshake completed")));
        }
        self.shared.ensure_registered();
        self.shared.try_read();
        TlsReadFuture {
            _channel: self.clone(),
            token,
        }
    }

    pub fn write(&self, buf: Vec<u8>) -> TlsWriteFuture {
        let token = CompletionToken::new();
        if let Phase::Ready { write_op, .. } = &mut *self.shared.phase.lock().unwrap() {
            *write_op = Some(PendingWrite {
                buf,
                offset: 0,
                token: token.clone(),
            });
        } else {
            token.notify_done(Err(Error::NotSupported("write before handshake completed")));
        }
        self.shared.ensure_registered();
        self.shared.try_write();
        TlsWriteFuture {
            _channel: self.clone(),
            token,
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

    /// Checked after a non-blocking connect's `SO_ERROR` comes back clean,
    /// or immediately if the connect (or the accepted stream) was already
    /// usable: starts the handshake, which is itself retried by readiness.
    fn start_handshake_if_tcp_ready(&self) {
        let mut guard = self.phase.lock().unwrap();
        let Phase::TcpConnecting { .. } = &*guard else {
            return;
        };
        let Phase::TcpConnecting { stream, role } =
            std::mem::replace(&mut *guard, Phase::Failed)
        else {
            unreachable!()
        };
        let outcome = match role {
            Role::Client(connector, domain) => connector.connect(&domain, stream),
            Role::Server(acceptor) => acceptor.accept(stream),
        };
        self.apply_handshake_outcome(&mut guard, outcome);
    }

    fn apply_handshake_outcome(
        &self,
        guard: &mut Phase,
        outcome: Result<TlsStream<TcpStream>, HandshakeError<TcpStream>>,
    ) {
        match outcome {
            Ok(tls) => {
                *guard = Phase::Ready {
                    tls,
                    read_op: None,
                    write_op: None,
                    write_coalesce: Vec::new(),
                };
                self.handshake_token.notify_done(Ok(()));
            }
            Err(HandshakeError::WouldBlock(mid)) => {
                *guard = Phase::Handshaking { mid };
            }
            Err(HandshakeError::Failure(e)) => {
                *guard = Phase::Failed;
                self.handshake_token.notify_done(Err(Error::custom(e)));
            }
        }
    }

    fn try_advance_handshake(&self) {
        let mut guard = self.phase.lock().unwrap();
        match &*guard {
            Phase::TcpConnecting { .. } => {
                drop(guard);
                self.check_connect_error();
            }
            Phase::Handshaking { .. } => {
                let Phase::Handshaking { mid } = std::mem::replace(&mut *guard, Phase::Failed)
                else {
                    unreachable!()
                };
                let outcome = mid.handshake();
                self.apply_handshake_outcome(&mut guard, outcome);
            }
            _ => {}
        }
    }

    fn check_connect_error(&self) {
        let mut errno: libc::c_int = 0;
        let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
        let rc = unsafe {
            libc::getsockopt(
                self.fd,
                libc::SOL_SOCKET,
                libc::SO_ERROR,
                &mut errno as *mut _ as *mut libc::c_void,
                &mut len,
            )
        };
        if rc != 0 || errno != 0 {
            let err = if rc != 0 {
                std::io::Error::last_os_error()
            } else {
                std::io::Error::from_raw_os_error(errno)
            };
            *self.phase.lock().unwrap() = Phase::Failed;
            self.handshake_token.notify_done(Err(Error::Io(err)));
            return;
        }
        self.start_handshake_if_tcp_ready();
    }

    fn try_read(&self) {
        let mut guard = self.phase.lock().unwrap();
        let Phase::Ready { tls, read_op, .. } = &mut *guard else {
            return;
        };
        let Some(mut op) = read_op.take() else {
            return;
        };
        match tls.read(&mut op.buf) {
            Ok(n) => {
                drop(guard);
                op.token.notify_done(Ok((op.buf, n)));
            }
            Err(e) if crate::io::is_retriable(&e) => {
                *read_op = Some(op);
            }
            Err(e) => {
                drop(guard);
                op.token.notify_done(Err(Error::Io(e)));
            }
        }
    }

    /// Stages writes smaller than `tls_coalesce_bytes` into `write_coalesce`
    /// instead of issuing one `tls.write` per small write, flushing the
    /// staged bytes in bulk here or on the next writable readiness event
    /// (`spec.md §4.10`).
    fn try_write(&self) {
        let mut guard = self.phase.lock().unwrap();
        let Phase::Ready {
            tls,
            write_op,
            write_coalesce,
            ..
        } = &mut *guard
        else {
            return;
        };

        if !write_coalesce.is_empty() {
            match tls.write(write_coalesce) {
                Ok(n) => {
                    write_coalesce.drain(..n);
                }
                Err(e) if crate::io::is_retriable(&e) => {}
                Err(e) => {
                    write_coalesce.clear();
                    if let Some(op) = write_op.take() {
                        drop(guard);
                        op.token.notify_done(Err(Error::Io(e)));
                    }
                    return;
                }
            }
        }

        let Some(mut op) = write_op.take() else {
            return;
        };
        let remaining = op.buf.len() - op.offset;
        if remaining < self.tls_coalesce_bytes {
            write_coalesce.extend_from_slice(&op.buf[op.offset..]);
            op.offset = op.buf.len();
            drop(guard);
            op.token.notify_done(Ok((op.buf, op.offset)));
            return;
        }

        match tls.write(&op.buf[op.offset..]) {
            Ok(n) => {
                op.offset += n;
                drop(guard);
                op.token.notify_done(Ok((op.buf, op.offset)));
            }
            Err(e) if crate::io::is_retriable(&e) => {
                *write_op = Some(op);
            }
            Err(e) => {
                drop(guard);
                op.token.notify_done(Err(Error::Io(e)));
            }
        }
    }
}

impl FdWatcher for Shared {
    fn raw_fd(&self) -> RawFd {
        self.fd
    }

    fn interest(&self) -> Interest {
        match &*self.phase.lock().unwrap() {
            Phase::TcpConnecting { .. } => Interest::Write,
            Phase::Handshaking { .. } => Interest::ReadWrite,
            Phase::Ready {
                read_op,
                write_op,
                write_coalesce,
                ..
            } => {
                let wants_write = write_op.is_some() || !write_coalesce.is_empty();
                match (read_op.is_some(), wants_write) {
                    (true, true) => Interest::ReadWrite,
                    (true, false) => Interest::Read,
                    (false, true) => Interest::Write,
                    (false, false) => Interest::Read,
                }
            }
            Phase::Failed => Interest::Read,
        }
    }

    fn on_readable(&self) {
        self.try_advance_handshake();
        self.try_read();
    }

    fn on_writable(&self) {
        self.try_advance_handshake();
        self.try_write();
    }

    fn on_cancel(&self, reason: CancelReason) {
        self.handshake_token.cleanup(reason);
        if let Phase::Ready {
            read_op, write_op, ..
        } = &mut *self.phase.lock().unwrap()
        {
            if let Some(op) = read_op.take() {
                op.token.cleanup(reason);
            }
            if let Some(op) = write_op.take() {
                op.token.cleanup(reason);
            }
        }
    }
}

impl crate::io::AsyncRead for TlsSocketChannel {
    type ReadFuture = TlsReadFuture;
    fn async_read(&self, buf: Vec<u8>) -> TlsReadFuture {
        self.read(buf)
    }
}

impl crate::io::AsyncWrite for TlsSocketChannel {
    type WriteFuture = TlsWriteFuture;
    fn async_write(&self, buf: Vec<u8>) -> TlsWriteFuture {
        self.write(buf)
    }
}

pub struct TlsHandshakeFuture {
    channel: TlsSocketChannel,
}

impl Future for TlsHandshakeFuture {
    type Item = TlsSocketChannel;

    fn poll(&mut self) -> Poll<TlsSocketChannel> {
        match self.channel.shared.handshake_token.poll() {
            Poll::Ready(()) => Poll::Ready(self.channel.clone()),
            Poll::NotReady => Poll::NotReady,
            Poll::Err(e) => Poll::Err(e),
        }
    }
}

impl Drop for TlsHandshakeFuture {
    fn drop(&mut self) {
        self.channel.shared.handshake_token.cleanup(CancelReason::UserCancel);
    }
}

pub struct TlsReadFuture {
    _channel: TlsSocketChannel,
    token: CompletionToken<(Vec<u8>, usize)>,
}

impl Future for TlsReadFuture {
    type Item = (Vec<u8>, usize);

    fn poll(&mut self) -> Poll<(Vec<u8>, usize)> {
        self.token.poll()
    }
}

impl Drop for TlsReadFuture {
    fn drop(&mut self) {
        self.token.cleanup(CancelReason::UserCancel);
    }
}

pub struct TlsWriteFuture {
    _channel: TlsSocketChannel,
    token: CompletionToken<(Vec<u8>, usize)>,
}

impl Future for TlsWriteFuture {
    type Item = (Vec<u8>, usize);

    fn poll(&mut self) -> Poll<(Vec<u8>, usize)> {
        self.token.poll()
    }
}

impl Drop for TlsWriteFuture {
    fn drop(&mut self) {
        self.token.cleanup(CancelReason::UserCancel);
    }
}
