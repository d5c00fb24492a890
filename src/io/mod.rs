//! Non-blocking I/O objects (`spec.md §2` components I–N).
//!
//! Every object here follows the same shape: a `libc` raw fd, a small set of
//! `CompletionToken`/`StreamToken` primitives (`io::token`) for whichever
//! operations are currently pending, and an `FdWatcher` impl so the owning
//! reactor can drive it. None of them block; `std::io::ErrorKind::WouldBlock`
//! is the normal "not yet" signal, converted into `Poll::NotReady` rather
//! than bubbled up as an error.

pub mod dns;
pub mod pipe;
pub mod server;
pub mod signal;
pub mod socket;
pub mod timer;
pub mod tls;
pub mod token;

pub use socket::SocketChannel;
pub use server::{AcceptStream, ServerSocket};
pub use pipe::PipeChannel;
pub use tls::TlsSocketChannel;
pub use dns::DnsResolver;
pub use signal::SignalStream;
pub use timer::{Timer, TimerKeeper};

/// A common shape over `SocketChannel`, `PipeChannel`, and
/// `TlsSocketChannel`'s owned-buffer read/write so `codec::FramedStream` can
/// be generic over any of them (`spec.md §4.15` "the framed transport is
/// generic over the underlying I/O object").
pub trait AsyncRead {
    type ReadFuture: crate::future::Future<Item = (Vec<u8>, usize)>;
    fn async_read(&self, buf: Vec<u8>) -> Self::ReadFuture;
}

pub trait AsyncWrite {
    type WriteFuture: crate::future::Future<Item = (Vec<u8>, usize)>;
    fn async_write(&self, buf: Vec<u8>) -> Self::WriteFuture;
}

/// Which kind of pending leaf operation a token represents; carried only for
/// `tracing` spans and error context, never branched on (`spec.md §4.6`
/// "Connect, Read, Write").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Connect,
    Read,
    Write,
    Accept,
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OpKind::Connect => "connect",
            OpKind::Read => "read",
            OpKind::Write => "write",
            OpKind::Accept => "accept",
        };
        f.write_str(s)
    }
}

/// True for the handful of `errno`s that mean "try again later" rather than
/// a real failure, on both blocking-mode-mistake and genuine retry paths.
pub(crate) fn is_retriable(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::Interrupted
    )
}

/// Packs a `SocketAddr` into a raw `sockaddr_storage` for a direct
/// `libc::connect` call, shared by `socket::SocketChannel::connect` and
/// `tls::TlsSocketChannel::connect` (both need a non-blocking connect
/// before anything readiness-driven can start).
pub(crate) fn socket_addr_storage(
    addr: std::net::SocketAddr,
) -> (libc::sockaddr_storage, libc::socklen_t) {
    let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
    let len = match addr {
        std::net::SocketAddr::V4(v4) => {
            let sin = libc::sockaddr_in {
                sin_family: libc::AF_INET as libc::sa_family_t,
                sin_port: v4.port().to_be(),
                sin_addr: libc::in_addr {
                    s_addr: u32::from_ne_bytes(v4.ip().octets()),
                },
                sin_zero: [0; 8],
            };
            unsafe {
                std::ptr::write(&mut storage as *mut _ as *mut libc::sockaddr_in, sin);
            }
            std::mem::size_of::<libc::sockaddr_in>()
        }
        std::net::SocketAddr::V6(v6) => {
            let sin6 = libc::sockaddr_in6 {
                sin6_family: libc::AF_INET6 as libc::sa_family_t,
                sin6_port: v6.port().to_be(),
                sin6_flowinfo: v6.flowinfo(),
                sin6_addr: libc::in6_addr {
                    s6_addr: v6.ip().octets(),
                },
                sin6_scope_id: v6.scope_id(),
            };
            unsafe {
                std::ptr::write(&mut storage as *mut _ as *mut libc::sockaddr_in6, sin6);
            }
            std::mem::size_of::<libc::sockaddr_in6>()
        }
    };
    (storage, len as libc::socklen_t)
}
