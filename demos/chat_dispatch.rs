//! A line-oriented echo service driven through the pipelined RPC dispatcher,
//! client and server both on one reactor over a pipe. Run with
//! `cargo run --example chat_dispatch`.

use evrt::codec::line::LineCodec;
use evrt::dispatch::{pipeline_client, PipelineServerDispatch};
use evrt::io::PipeChannel;
use evrt::reactor::Reactor;
use evrt::service::Service;
use evrt::{future, Future};

/// Upcases every line it's handed.
struct UpperCaseService;

impl Service for UpperCaseService {
    type Request = String;
    type Response = String;
    type Future = future::ResultFuture<String>;

    fn call(&self, request: String) -> Self::Future {
        future::ok(request.to_uppercase())
    }
}

fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt::init();
    let reactor = Reactor::new()?;
    let handle = reactor.handle();

    let (server_read, client_write) = PipeChannel::pair(handle.clone())?;
    let (client_read, server_write) = PipeChannel::pair(handle.clone())?;

    reactor.spawn(
        PipelineServerDispatch::new(
            PipedDuplex::new(server_read, server_write),
            LineCodec::new(),
            LineCodec::new(),
            UpperCaseService,
        )
        .or_else(|e| {
            tracing::warn!(error = %e, "server dispatch ended");
            future::ok(())
        }),
    );

    let client = pipeline_client(
        PipedDuplex::new(client_read, client_write),
        LineCodec::new(),
        LineCodec::new(),
        &handle,
    );

    for line in ["hello", "world", "evrt"] {
        let client = client.clone();
        reactor.spawn(client.call(line.to_string()).map(move |reply| {
            tracing::info!(%reply, "got reply");
        }));
    }

    reactor.run();
    Ok(())
}

/// Glues one pipe's read end and another's write end into a single
/// `AsyncRead + AsyncWrite` object, since a pipe (unlike a socket) is
/// one-directional per fd.
#[derive(Clone)]
struct PipedDuplex {
    read: PipeChannel,
    write: PipeChannel,
}

impl PipedDuplex {
    fn new(read: PipeChannel, write: PipeChannel) -> Self {
        PipedDuplex { read, write }
    }
}

impl evrt::io::AsyncRead for PipedDuplex {
    type ReadFuture = evrt::io::pipe::PipeReadFuture;
    fn async_read(&self, buf: Vec<u8>) -> Self::ReadFuture {
        self.read.read(buf)
    }
}

impl evrt::io::AsyncWrite for PipedDuplex {
    type WriteFuture = evrt::io::pipe::PipeWriteFuture;
    fn async_write(&self, buf: Vec<u8>) -> Self::WriteFuture {
        self.write.write(buf)
    }
}
