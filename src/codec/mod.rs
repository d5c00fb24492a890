//! Framed transport over an `AsyncRead`/`AsyncWrite` I/O object
//! (`spec.md §4.15` "FramedStream/FramedSink").
//!
//! `Decoder`/`Encoder` are the `tokio-util::codec` contract verbatim: a
//! decoder mutates a growing byte buffer in place and reports back whatever
//! complete frames it can find; an encoder appends one item's wire bytes to
//! an outgoing buffer. `FramedStream`/`FramedSink` drive the buffer against
//! the underlying object's owned-buffer read/write futures.

pub mod line;

use crate::future::Future;
use crate::io::{AsyncRead, AsyncWrite};
use crate::poll::{Poll, Try};
use crate::Error;

/// Default scratch-buffer size per underlying read (`spec.md §5`
/// `tls_coalesce_bytes` is the analogous constant on the TLS write path;
/// this is the same idea for reads here).
const READ_CHUNK: usize = 4096;

pub trait Decoder {
    type Item;

    /// Attempts to pull one complete frame out of the front of `buf`,
    /// draining whatever bytes it consumed. `Ok(None)` means "need more
    /// data", not an error.
    fn decode(&mut self, buf: &mut Vec<u8>) -> Try<Option<Self::Item>>;

    /// Called once after the underlying stream hits EOF, to flush a final
    /// frame that a length/delimiter was never going to close off otherwise.
    /// Default just retries `decode` once.
    fn decode_eof(&mut self, buf: &mut Vec<u8>) -> Try<Option<Self::Item>> {
        self.decode(buf)
    }
}

pub trait Encoder<Item> {
    fn encode(&mut self, item: Item, buf: &mut Vec<u8>) -> Try<()>;
}

/// Decodes a stream of frames off `io` (`spec.md §4.15`).
pub struct FramedStream<IO: AsyncRead, D> {
    io: IO,
    decoder: D,
    buffer: Vec<u8>,
    pending_read: Option<IO::ReadFuture>,
    eof: bool,
}

impl<IO, D> FramedStream<IO, D>
where
    IO: AsyncRead + Clone,
    D: Decoder,
{
    pub fn new(io: IO, decoder: D) -> Self {
        FramedStream {
            io,
            decoder,
            buffer: Vec::new(),
            pending_read: None,
            eof: false,
        }
    }

    /// Hands back the underlying I/O object and any unconsumed bytes —
    /// used when a protocol switches framing mid-connection.
    pub fn into_parts(self) -> (IO, Vec<u8>) {
        (self.io, self.buffer)
    }
}

impl<IO, D> crate::future::Stream for FramedStream<IO, D>
where
    IO: AsyncRead + Clone,
    D: Decoder,
{
    type Item = D::Item;

    fn poll_stream(&mut self) -> Poll<Option<D::Item>> {
        loop {
            if !self.eof {
                match self.decoder.decode(&mut self.buffer) {
                    Ok(Some(item)) => return Poll::Ready(Some(item)),
                    Ok(None) => {}
                    Err(e) => return Poll::Err(e),
                }
            } else {
                return match self.decoder.decode_eof(&mut self.buffer) {
                    Ok(Some(item)) => Poll::Ready(Some(item)),
                    Ok(None) => Poll::Ready(None),
                    Err(e) => Poll::Err(e),
                };
            }

            match &mut self.pending_read {
                None => {
                    let scratch = vec![0u8; READ_CHUNK];
                    self.pending_read = Some(self.io.async_read(scratch));
                }
                Some(fut) => match fut.poll() {
                    Poll::Ready((buf, n)) => {
                        self.pending_read = None;
                        if n == 0 {
                            self.eof = true;
                        } else {
                            self.buffer.extend_from_slice(&buf[..n]);
                        }
                    }
                    Poll::NotReady => return Poll::NotReady,
                    Poll::Err(e) => return Poll::Err(e),
                },
            }
        }
    }
}

/// Encodes and flushes one frame at a time onto `io` (`spec.md §4.15`).
pub struct FramedSink<IO, E> {
    io: IO,
    encoder: E,
}

impl<IO, E> FramedSink<IO, E>
where
    IO: AsyncWrite + Clone,
{
    pub fn new(io: IO, encoder: E) -> Self {
        FramedSink { io, encoder }
    }

    /// Encodes `item` and returns a future that resolves once every byte has
    /// been written (looping through short writes itself).
    pub fn send<Item>(&mut self, item: Item) -> SendFrame<IO>
    where
        E: Encoder<Item>,
    {
        let mut buf = Vec::new();
        match self.encoder.encode(item, &mut buf) {
            Ok(()) => SendFrame {
                io: self.io.clone(),
                state: SendState::Writing {
                    buf,
                    offset: 0,
                    pending: None,
                },
            },
            Err(e) => SendFrame {
                io: self.io.clone(),
                state: SendState::Failed(Some(e)),
            },
        }
    }
}

enum SendState<IO: AsyncWrite> {
    Writing {
        buf: Vec<u8>,
        offset: usize,
        pending: Option<IO::WriteFuture>,
    },
    Failed(Option<Error>),
    Done,
}

pub struct SendFrame<IO: AsyncWrite> {
    io: IO,
    state: SendState<IO>,
}

impl<IO> Future for SendFrame<IO>
where
    IO: AsyncWrite + Clone,
{
    type Item = ();

    fn poll(&mut self) -> Poll<()> {
        loop {
            match &mut self.state {
                SendState::Done => return Poll::Err(Error::InvalidPoll),
                SendState::Failed(e) => {
                    let e = e.take().unwrap_or(Error::InvalidPoll);
                    self.state = SendState::Done;
                    return Poll::Err(e);
                }
                SendState::Writing {
                    buf,
                    offset,
                    pending,
                } => {
                    if *offset >= buf.len() {
                        self.state = SendState::Done;
                        return Poll::Ready(());
                    }
                    if pending.is_none() {
                        let remaining = buf[*offset..].to_vec();
                        *pending = Some(self.io.async_write(remaining));
                    }
                    match pending.as_mut().unwrap().poll() {
                        Poll::Ready((_buf, n)) => {
                            *offset += n;
                            *pending = None;
                        }
                        Poll::NotReady => return Poll::NotReady,
                        Poll::Err(e) => {
                            self.state = SendState::Done;
                            return Poll::Err(e);
                        }
                    }
                }
            }
        }
    }
}
