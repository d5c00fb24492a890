//! Framed-transport dispatch end to end over real TCP sockets
//! (`spec.md §8` seed scenario 3, plus pipelined/multiplexed ordering).

use evrt::codec::line::LineCodec;
use evrt::codec::{Decoder, Encoder};
use evrt::dispatch::{
    multiplex_client, pipeline_client, MultiplexServerDispatch, PipelineServerDispatch,
};
use evrt::io::{ServerSocket, SocketChannel};
use evrt::poll::{Poll, Try};
use evrt::reactor::{Reactor, ReactorHandle};
use evrt::service::Service;
use evrt::{future, Future, Stream};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Decodes lines with `LineCodec`, encodes replies with a trailing `\r\n`
/// — the seed scenario's client/server framing asymmetry.
#[derive(Default)]
struct CrlfCodec {
    inner: LineCodec,
}

impl Decoder for CrlfCodec {
    type Item = String;

    fn decode(&mut self, buf: &mut Vec<u8>) -> Try<Option<String>> {
        self.inner.decode(buf)
    }
}

impl Encoder<String> for CrlfCodec {
    fn encode(&mut self, item: String, buf: &mut Vec<u8>) -> Try<()> {
        buf.extend_from_slice(item.as_bytes());
        buf.extend_from_slice(b"\r\n");
        Ok(())
    }
}

struct EchoService;

impl Service for EchoService {
    type Request = String;
    type Response = String;
    type Future = future::ResultFuture<String>;

    fn call(&self, request: String) -> Self::Future {
        future::ok(request)
    }
}

struct AcceptOnce {
    incoming: evrt::io::AcceptStream,
    handle: ReactorHandle,
}

impl Future for AcceptOnce {
    type Item = ();

    fn poll(&mut self) -> Poll<()> {
        match self.incoming.poll_stream() {
            Poll::Ready(Some(channel)) => {
                self.handle.spawn(
                    PipelineServerDispatch::new(channel, LineCodec::new(), CrlfCodec::default(), EchoService)
                        .or_else(|_| future::ok(())),
                );
                Poll::Ready(())
            }
            Poll::Ready(None) => Poll::Ready(()),
            Poll::NotReady => Poll::NotReady,
            Poll::Err(e) => Poll::Err(e),
        }
    }
}

#[test]
fn client_receives_the_line_echoed_back_with_a_crlf() {
    let reactor = Reactor::new().unwrap();
    let handle = reactor.handle();

    let server = ServerSocket::bind("127.0.0.1:0".parse().unwrap(), handle.clone()).unwrap();
    let addr = server.local_addr().unwrap();
    reactor.spawn(AcceptOnce {
        incoming: server.incoming(),
        handle: handle.clone(),
    });

    let reply: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    {
        let reply = reply.clone();
        reactor.spawn(
            SocketChannel::connect(addr, handle.clone())
                .unwrap()
                .and_then(move |channel| {
                    channel.write(b"HELLO\n".to_vec()).and_then(move |(_, _)| {
                        channel.read(vec![0u8; 64]).map(move |(buf, n)| {
                            *reply.lock().unwrap() =
                                Some(String::from_utf8_lossy(&buf[..n]).into_owned());
                        })
                    })
                })
                .or_else(|_| future::ok(())),
        );
    }

    reactor.run();
    assert_eq!(reply.lock().unwrap().as_deref(), Some("HELLO\r\n"));
}

#[test]
fn pipelined_client_responses_arrive_in_request_order() {
    let reactor = Reactor::new().unwrap();
    let handle = reactor.handle();
    let (server_read, client_write) = evrt::io::PipeChannel::pair(handle.clone()).unwrap();
    let (client_read, server_write) = evrt::io::PipeChannel::pair(handle.clone()).unwrap();

    reactor.spawn(
        PipelineServerDispatch::new(
            PipeDuplex(server_read, server_write),
            LineCodec::new(),
            LineCodec::new(),
            EchoService,
        )
        .or_else(|_| future::ok(())),
    );

    let client = pipeline_client(
        PipeDuplex(client_read, client_write),
        LineCodec::new(),
        LineCodec::new(),
        &handle,
    );

    let order: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    for line in ["one", "two", "three"] {
        let client = client.clone();
        let order = order.clone();
        reactor.spawn(client.call(line.to_string()).map(move |reply| {
            order.lock().unwrap().push(reply);
        }));
    }

    reactor.run();
    assert_eq!(*order.lock().unwrap(), vec!["one", "two", "three"]);
}

#[derive(Clone)]
struct PipeDuplex(evrt::io::PipeChannel, evrt::io::PipeChannel);

impl evrt::io::AsyncRead for PipeDuplex {
    type ReadFuture = evrt::io::pipe::PipeReadFuture;
    fn async_read(&self, buf: Vec<u8>) -> Self::ReadFuture {
        self.0.read(buf)
    }
}

impl evrt::io::AsyncWrite for PipeDuplex {
    type WriteFuture = evrt::io::pipe::PipeWriteFuture;
    fn async_write(&self, buf: Vec<u8>) -> Self::WriteFuture {
        self.1.write(buf)
    }
}

#[test]
fn multiplexed_responses_are_matched_by_call_id_not_completion_order() {
    let reactor = Reactor::new().unwrap();
    let handle = reactor.handle();
    let (server_read, client_write) = evrt::io::PipeChannel::pair(handle.clone()).unwrap();
    let (client_read, server_write) = evrt::io::PipeChannel::pair(handle.clone()).unwrap();

    reactor.spawn(
        MultiplexServerDispatch::new(
            PipeDuplex(server_read, server_write),
            TaggedLineCodec,
            TaggedLineCodec,
            EchoService,
        )
        .or_else(|_| future::ok(())),
    );

    let client = multiplex_client(
        PipeDuplex(client_read, client_write),
        TaggedLineCodec,
        TaggedLineCodec,
        &handle,
    );

    let replies: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    for line in ["alpha", "beta", "gamma"] {
        let client = client.clone();
        let replies = replies.clone();
        reactor.spawn(client.call(line.to_string()).map(move |reply| {
            replies.lock().unwrap().push(reply);
        }));
    }

    reactor.run();
    let mut got = replies.lock().unwrap().clone();
    got.sort();
    assert_eq!(got, vec!["alpha", "beta", "gamma"]);
}

/// `id\tpayload\n` framing — the simplest possible tagged line codec, good
/// enough to exercise the multiplexed dispatcher's request-id matching.
struct TaggedLineCodec;

impl Decoder for TaggedLineCodec {
    type Item = (u64, String);

    fn decode(&mut self, buf: &mut Vec<u8>) -> Try<Option<(u64, String)>> {
        let mut inner = LineCodec::new();
        match inner.decode(buf)? {
            Some(line) => {
                let (id, payload) = line.split_once('\t').expect("tagged frame missing id");
                Ok(Some((id.parse().unwrap(), payload.to_string())))
            }
            None => Ok(None),
        }
    }
}

impl Encoder<(u64, String)> for TaggedLineCodec {
    fn encode(&mut self, (id, payload): (u64, String), buf: &mut Vec<u8>) -> Try<()> {
        buf.extend_from_slice(format!("{id}\t{payload}").as_bytes());
        buf.push(b'\n');
        Ok(())
    }
}

#[test]
fn reactor_does_not_hang_waiting_past_a_few_quanta() {
    // Sanity bound so a regression that deadlocks the dispatch layer fails
    // fast instead of hanging the test suite.
    let started = std::time::Instant::now();
    let reactor = Reactor::new().unwrap();
    reactor.spawn(future::ok::<()>(()));
    reactor.run();
    assert!(started.elapsed() < Duration::from_secs(1));
}
