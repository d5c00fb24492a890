//! Strict-order request/response dispatch: at most one request is
//! outstanding per connection at a time, responses come back in the order
//! requests were sent (`spec.md §4.15` "pipelined dispatcher").

use crate::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use crate::codec::{Decoder, Encoder, FramedSink, FramedStream, SendFrame};
use crate::future::{Future, Stream};
use crate::io::token::CompletionToken;
use crate::io::{AsyncRead, AsyncWrite};
use crate::poll::Poll;
use crate::reactor::ReactorHandle;
use crate::service::Service;
use crate::Error;
use std::collections::VecDeque;

/// Drives one server-side connection against a `Service`, serially: read a
/// request, call the service, write its response, repeat.
pub struct PipelineServerDispatch<IO, D, E, S>
where
    IO: AsyncRead + AsyncWrite + Clone,
    D: Decoder,
    S: Service<Request = D::Item>,
    E: Encoder<S::Response>,
{
    reader: FramedStream<IO, D>,
    writer: FramedSink<IO, E>,
    service: S,
    state: State<S::Future, IO>,
}

enum State<F, IO: AsyncWrite> {
    AwaitRequest,
    Calling(F),
    Sending(SendFrame<IO>),
}

impl<IO, D, E, S> PipelineServerDispatch<IO, D, E, S>
where
    IO: AsyncRead + AsyncWrite + Clone,
    D: Decoder,
    S: Service<Request = D::Item>,
    E: Encoder<S::Response>,
{
    pub fn new(io: IO, decoder: D, encoder: E, service: S) -> Self {
        PipelineServerDispatch {
            reader: FramedStream::new(io.clone(), decoder),
            writer: FramedSink::new(io, encoder),
            service,
            state: State::AwaitRequest,
        }
    }
}

impl<IO, D, E, S> Future for PipelineServerDispatch<IO, D, E, S>
where
    IO: AsyncRead + AsyncWrite + Clone,
    D: Decoder,
    S: Service<Request = D::Item>,
    E: Encoder<S::Response>,
{
    type Item = ();

    fn poll(&mut self) -> Poll<()> {
        loop {
            match &mut self.state {
                State::AwaitRequest => match self.reader.poll_stream() {
                    Poll::Ready(Some(request)) => {
                        self.state = State::Calling(self.service.call(request));
                    }
                    Poll::Ready(None) => return Poll::Ready(()),
                    Poll::NotReady => return Poll::NotReady,
                    Poll::Err(e) => return Poll::Err(e),
                },
                State::Calling(fut) => match fut.poll() {
                    Poll::Ready(response) => {
                        self.state = State::Sending(self.writer.send(response));
                    }
                    Poll::NotReady => return Poll::NotReady,
                    Poll::Err(e) => return Poll::Err(e),
                },
                State::Sending(send) => match send.poll() {
                    Poll::Ready(()) => self.state = State::AwaitRequest,
                    Poll::NotReady => return Poll::NotReady,
                    Poll::Err(e) => return Poll::Err(e),
                },
            }
        }
    }
}

struct Call<Req, Resp> {
    request: Req,
    token: CompletionToken<Resp>,
}

/// The client side of a pipelined connection: a cheaply-cloneable `Service`
/// handle backed by one spawned driver future per connection
/// (`spec.md §4.15`).
pub struct PipelineClient<Req, Resp> {
    outgoing: UnboundedSender<Call<Req, Resp>>,
}

impl<Req, Resp> Clone for PipelineClient<Req, Resp> {
    fn clone(&self) -> Self {
        PipelineClient {
            outgoing: self.outgoing.clone(),
        }
    }
}

impl<Req, Resp> Service for PipelineClient<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    type Request = Req;
    type Response = Resp;
    type Future = CompletionToken<Resp>;

    fn call(&self, request: Req) -> CompletionToken<Resp> {
        let token = CompletionToken::new();
        let outcome = self.outgoing.send(Call {
            request,
            token: token.clone(),
        });
        if outcome.is_err() {
            token.notify_done(Err(Error::ChannelClosed));
        }
        token
    }
}

/// Spawns the driver future for a pipelined client connection and returns a
/// handle that can be cloned freely to issue concurrent-looking calls —
/// they're still serialized onto the wire in submission order.
pub fn pipeline_client<IO, D, E, Req>(
    io: IO,
    decoder: D,
    encoder: E,
    reactor: &ReactorHandle,
) -> PipelineClient<Req, D::Item>
where
    IO: AsyncRead + AsyncWrite + Clone + Send + 'static,
    D: Decoder + Send + 'static,
    D::Item: Send + 'static,
    E: Encoder<Req> + Send + 'static,
    Req: Send + 'static,
    IO::ReadFuture: Send,
    IO::WriteFuture: Send,
{
    let (outgoing, incoming) = mpsc::unbounded();
    let driver = ClientDriver {
        reader: FramedStream::new(io.clone(), decoder),
        writer: FramedSink::new(io, encoder),
        incoming,
        pending: VecDeque::new(),
        write_state: WriteState::Idle,
    };
    reactor.spawn(driver);
    PipelineClient { outgoing }
}

struct ClientDriver<IO, D, E, Req>
where
    IO: AsyncRead + AsyncWrite,
    D: Decoder,
{
    reader: FramedStream<IO, D>,
    writer: FramedSink<IO, E>,
    incoming: UnboundedReceiver<Call<Req, D::Item>>,
    pending: VecDeque<CompletionToken<D::Item>>,
    write_state: WriteState<IO>,
}

enum WriteState<IO: AsyncWrite> {
    Idle,
    Sending(SendFrame<IO>),
}

impl<IO, D, E, Req> Future for ClientDriver<IO, D, E, Req>
where
    IO: AsyncRead + AsyncWrite + Clone,
    D: Decoder,
    E: Encoder<Req>,
{
    type Item = ();

    fn poll(&mut self) -> Poll<()> {
        loop {
            match &mut self.write_state {
                WriteState::Sending(send) => match send.poll() {
                    Poll::Ready(()) => self.write_state = WriteState::Idle,
                    Poll::NotReady => break,
                    Poll::Err(e) => return Poll::Err(e),
                },
                WriteState::Idle => match self.incoming.poll_stream() {
                    Poll::Ready(Some(call)) => {
                        tracing::debug!(pending = self.pending.len() + 1, "pipeline dispatch: request sent");
                        self.pending.push_back(call.token);
                        self.write_state = WriteState::Sending(self.writer.send(call.request));
                    }
                    Poll::Ready(None) => break,
                    Poll::NotReady => break,
                    Poll::Err(e) => return Poll::Err(e),
                },
            }
        }

        loop {
            match self.reader.poll_stream() {
                Poll::Ready(Some(response)) => match self.pending.pop_front() {
                    Some(token) => {
                        tracing::debug!("pipeline dispatch: response received");
                        token.notify_done(Ok(response));
                    }
                    None => {
                        tracing::warn!("pipeline dispatch: response with no pending request");
                        return Poll::Err(Error::Dispatch(
                            "received a response with no matching pending request".to_string(),
                        ));
                    }
                },
                Poll::Ready(None) => return Poll::Ready(()),
                Poll::NotReady => return Poll::NotReady,
                Poll::Err(e) => {
                    for token in self.pending.drain(..) {
                        token.cleanup(crate::error::CancelReason::Unknown);
                    }
                    return Poll::Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::line::LineCodec;
    use std::sync::Mutex;

    /// An `AsyncRead + AsyncWrite` double that hands out one canned read
    /// once, then reports EOF; writes are swallowed and reported as fully
    /// written. Backed by `ResultFuture` so driving it needs no `Task` or
    /// registered reactor.
    #[derive(Clone)]
    struct FakeIo {
        script: std::sync::Arc<Mutex<Option<Vec<u8>>>>,
    }

    impl FakeIo {
        fn once(bytes: &[u8]) -> Self {
            FakeIo {
                script: std::sync::Arc::new(Mutex::new(Some(bytes.to_vec()))),
            }
        }
    }

    impl AsyncRead for FakeIo {
        type ReadFuture = crate::future::ResultFuture<(Vec<u8>, usize)>;

        fn async_read(&self, mut buf: Vec<u8>) -> Self::ReadFuture {
            match self.script.lock().unwrap().take() {
                Some(bytes) => {
                    let n = bytes.len();
                    buf[..n].copy_from_slice(&bytes);
                    crate::future::ok((buf, n))
                }
                None => crate::future::ok((buf, 0)),
            }
        }
    }

    impl AsyncWrite for FakeIo {
        type WriteFuture = crate::future::ResultFuture<(Vec<u8>, usize)>;

        fn async_write(&self, buf: Vec<u8>) -> Self::WriteFuture {
            let n = buf.len();
            crate::future::ok((buf, n))
        }
    }

    #[test]
    fn unmatched_response_is_a_dispatch_protocol_error() {
        let io = FakeIo::once(b"hello\n");
        let (outgoing, incoming) = mpsc::unbounded::<Call<String, String>>();
        drop(outgoing); // incoming.poll_stream() resolves Ready(None) without a Task.
        let mut driver = ClientDriver {
            reader: FramedStream::new(io.clone(), LineCodec::new()),
            writer: FramedSink::new(io, LineCodec::new()),
            incoming,
            pending: VecDeque::new(),
            write_state: WriteState::Idle,
        };
        match driver.poll() {
            Poll::Err(Error::Dispatch(_)) => {}
            other => panic!("expected a dispatch protocol error, got {other:?}"),
        }
    }
}
