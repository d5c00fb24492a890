//! An anonymous pipe I/O object (`spec.md §4.9` "PipeChannel").
//!
//! Built directly on `libc::pipe2` rather than `std::net`, since there's no
//! `std` pipe type; the read/write token machinery mirrors `SocketChannel`'s.

use crate::error::CancelReason;
use crate::future::Future;
use crate::io::token::CompletionToken;
use crate::poll::Poll;
use crate::reactor::{FdWatcher, Interest, ReactorHandle};
use crate::Error;
use std::os::unix::io::RawFd;
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

struct End {
    fd: RawFd,
    reactor: ReactorHandle,
    registered: AtomicBool,
    read_op: Mutex<Option<PendingRead>>,
    write_op: Mutex<Option<PendingWrite>>,
    /// Set by `shutdown_write` (`spec.md §4.10` half-close), which closes
    /// the fd immediately. Guards `Drop` against double-closing it.
    closed: AtomicBool,
    write_shutdown: AtomicBool,
    max_read_iterations: usize,
}

impl Drop for End {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            unsafe { libc::close(self.fd) };
        }
    }
}

unsafe impl Send for End {}
unsafe impl Sync for End {}

/// One end of an anonymous pipe. `PipeChannel::pair` returns a
/// `(reader, writer)` tuple; each end is independently pollable.
#[derive(Clone)]
pub struct PipeChannel {
    end: Arc<End>,
}

impl PipeChannel {
    /// Creates a connected pair: `.0` can only be read, `.1` can only be
    /// written.
    pub fn pair(reactor: ReactorHandle) -> std::io::Result<(PipeChannel, PipeChannel)> {
        let mut fds = [0 as RawFd; 2];
        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            return Err(std::io::Error::last_os_error());
        }
        crate::reactor::set_nonblocking(fds[0]);
        crate::reactor::set_nonblocking(fds[1]);
        let max_read_iterations = reactor.config().max_read_iterations;
        let read_end = PipeChannel {
            end: Arc::new(End {
                fd: fds[0],
                reactor: reactor.clone(),
                registered: AtomicBool::new(false),
                read_op: Mutex::new(None),
                write_op: Mutex::new(None),
                closed: AtomicBool::new(false),
                write_shutdown: AtomicBool::new(false),
                max_read_iterations,
            }),
        };
        let write_end = PipeChannel {
            end: Arc::new(End {
                fd: fds[1],
                reactor,
                registered: AtomicBool::new(false),
                read_op: Mutex::new(None),
                write_op: Mutex::new(None),
                closed: AtomicBool::new(false),
                write_shutdown: AtomicBool::new(false),
                max_read_iterations,
            }),
        };
        Ok((read_end, write_end))
    }

    pub fn read(&self, buf: Vec<u8>) -> PipeReadFuture {
        let token = CompletionToken::new();
        *self.end.read_op.lock().unwrap() = Some(PendingRead {
            buf,
            token: token.clone(),
        });
        self.end.ensure_registered();
        self.end.try_read();
        PipeReadFuture {
            _channel: self.clone(),
            token,
        }
    }

    pub fn write(&self, buf: Vec<u8>) -> PipeWriteFuture {
        let token = CompletionToken::new();
        if self.end.write_shutdown.load(Ordering::Acquire) {
            token.notify_done(Err(Error::Io(std::io::Error::from(
                std::io::ErrorKind::BrokenPipe,
            ))));
            return PipeWriteFuture {
                _channel: self.clone(),
                token,
            };
        }
        *self.end.write_op.lock().unwrap() = Some(PendingWrite {
            buf,
            offset: 0,
            token: token.clone(),
        });
        self.end.ensure_registered();
        self.end.try_write();
        PipeWriteFuture {
            _channel: self.clone(),
            token,
        }
    }

    /// Half-closes the write direction: closes the write fd immediately and
    /// fails any still-queued write with `BrokenPipe` (`spec.md §4.10`).
    /// Meant to be called on the write end of a pair.
    pub fn shutdown_write(&self) {
        self.end.shutdown_write();
    }
}

impl End {
    fn ensure_registered(self: &Arc<Self>) {
        if !self.registered.swap(true, Ordering::AcqRel) {
            let weak: Weak<dyn FdWatcher> = Arc::downgrade(self) as Weak<dyn FdWatcher>;
            self.reactor.register_watcher(weak);
        }
    }

    /// Reads repeatedly into `op.buf`, up to `max_read_iterations` syscalls
    /// per readiness event (`spec.md §4.9`, mirrors `SocketChannel::try_read`).
    fn try_read(&self) {
        let mut guard = self.read_op.lock().unwrap();
        let Some(mut op) = guard.take() else {
            return;
        };
        let mut total = 0usize;
        let mut eof = false;
        let mut error = None;
        for _ in 0..self.max_read_iterations {
            if total >= op.buf.len() {
                break;
            }
            let rc = unsafe {
                libc::read(
                    self.fd,
                    op.buf[total..].as_mut_ptr() as *mut libc::c_void,
                    op.buf.len() - total,
                )
            };
            if rc > 0 {
                total += rc as usize;
            } else if rc == 0 {
                eof = true;
                break;
            } else {
                let err = std::io::Error::last_os_error();
                if crate::io::is_retriable(&err) {
                    break;
                }
                error = Some(err);
                break;
            }
        }
        if let Some(err) = error {
            drop(guard);
            op.token.notify_done(Err(Error::Io(err)));
        } else if total > 0 || eof {
            drop(guard);
            op.token.notify_done(Ok((op.buf, total)));
        } else {
            *guard = Some(op);
        }
    }

    fn shutdown_write(&self) {
        if self.write_shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        let pending = self.write_op.lock().unwrap().take();
        if !self.closed.swap(true, Ordering::AcqRel) {
            unsafe { libc::close(self.fd) };
        }
        if let Some(op) = pending {
            op.token.notify_done(Err(Error::Io(std::io::Error::from(
                std::io::ErrorKind::BrokenPipe,
            ))));
        }
    }

    fn try_write(&self) {
        let mut guard = self.write_op.lock().unwrap();
        let Some(mut op) = guard.take() else {
            return;
        };
        let rc = unsafe {
            libc::write(
                self.fd,
                op.buf[op.offset..].as_ptr() as *const libc::c_void,
                op.buf.len() - op.offset,
            )
        };
        if rc >= 0 {
            op.offset += rc as usize;
            drop(guard);
            op.token.notify_done(Ok((op.buf, op.offset)));
        } else {
            let err = std::io::Error::last_os_error();
            if crate::io::is_retriable(&err) {
                *guard = Some(op);
            } else {
                drop(guard);
                op.token.notify_done(Err(Error::Io(err)));
            }
        }
    }
}

impl FdWatcher for End {
    fn raw_fd(&self) -> RawFd {
        self.fd
    }

    fn interest(&self) -> Interest {
        match (
            self.read_op.lock().unwrap().is_some(),
            self.write_op.lock().unwrap().is_some(),
        ) {
            (true, true) => Interest::ReadWrite,
            (true, false) => Interest::Read,
            (false, true) => Interest::Write,
            (false, false) => Interest::Read,
        }
    }

    fn on_readable(&self) {
        self.try_read();
    }

    fn on_writable(&self) {
        self.try_write();
    }

    fn on_cancel(&self, reason: CancelReason) {
        if let Some(op) = self.read_op.lock().unwrap().take() {
            op.token.cleanup(reason);
        }
        if let Some(op) = self.write_op.lock().unwrap().take() {
            op.token.cleanup(reason);
        }
    }
}

impl crate::io::AsyncRead for PipeChannel {
    type ReadFuture = PipeReadFuture;
    fn async_read(&self, buf: Vec<u8>) -> PipeReadFuture {
        self.read(buf)
    }
}

impl crate::io::AsyncWrite for PipeChannel {
    type WriteFuture = PipeWriteFuture;
    fn async_write(&self, buf: Vec<u8>) -> PipeWriteFuture {
        self.write(buf)
    }
}

pub struct PipeReadFuture {
    _channel: PipeChannel,
    token: CompletionToken<(Vec<u8>, usize)>,
}

impl Future for PipeReadFuture {
    type Item = (Vec<u8>, usize);

    fn poll(&mut self) -> Poll<(Vec<u8>, usize)> {
        self.token.poll()
    }
}

impl Drop for PipeReadFuture {
    fn drop(&mut self) {
        self.token.cleanup(CancelReason::UserCancel);
    }
}

pub struct PipeWriteFuture {
    _channel: PipeChannel,
    token: CompletionToken<(Vec<u8>, usize)>,
}

impl Future for PipeWriteFuture {
    type Item = (Vec<u8>, usize);

    fn poll(&mut self) -> Poll<(Vec<u8>, usize)> {
        self.token.poll()
    }
}

impl Drop for PipeWriteFuture {
    fn drop(&mut self) {
        self.token.cleanup(CancelReason::UserCancel);
    }
}
