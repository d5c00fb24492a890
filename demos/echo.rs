//! A TCP echo server plus a handful of concurrent clients, all on one
//! reactor. Run with `cargo run --example echo`.

use evrt::io::{ServerSocket, SocketChannel};
use evrt::reactor::{Reactor, ReactorHandle};
use evrt::{Future, Poll, Stream};

/// Drives an `AcceptStream`, spawning `serve_one` for every connection until
/// the listener's stream ends or fails.
struct AcceptLoop {
    incoming: evrt::io::AcceptStream,
    handle: ReactorHandle,
}

impl Future for AcceptLoop {
    type Item = ();

    fn poll(&mut self) -> Poll<()> {
        loop {
            match self.incoming.poll_stream() {
                Poll::Ready(Some(channel)) => {
                    self.handle.spawn(serve_one(channel));
                }
                Poll::Ready(None) => return Poll::Ready(()),
                Poll::NotReady => return Poll::NotReady,
                Poll::Err(e) => return Poll::Err(e),
            }
        }
    }
}

fn serve_one(channel: SocketChannel) -> impl evrt::Future<Item = ()> {
    evrt::future::loop_fn(channel, |channel| {
        let buf = vec![0u8; 4096];
        channel.read(buf).and_then(move |(buf, n)| {
            if n == 0 {
                evrt::future::ok(evrt::future::Either::Break(())).boxed()
            } else {
                let echoed = channel.clone();
                channel
                    .write(buf[..n].to_vec())
                    .map(move |_| evrt::future::Either::Continue(echoed))
                    .boxed()
            }
        })
    })
}

fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt::init();
    let reactor = Reactor::new()?;
    let handle = reactor.handle();

    let addr = "127.0.0.1:0".parse().unwrap();
    let server = ServerSocket::bind(addr, handle.clone())?;
    let local_addr = server.local_addr()?;
    tracing::info!(%local_addr, "echo server listening");

    reactor.spawn(AcceptLoop {
        incoming: server.incoming(),
        handle: handle.clone(),
    });

    for i in 0..3 {
        let client_reactor = handle.clone();
        reactor.spawn(
            SocketChannel::connect(local_addr, client_reactor)
                .unwrap()
                .and_then(move |channel| {
                    let message = format!("hello from client {i}\n").into_bytes();
                    channel.write(message).and_then(move |(_, _)| {
                        channel.read(vec![0u8; 4096]).map(move |(buf, n)| {
                            let reply = String::from_utf8_lossy(&buf[..n]);
                            tracing::info!(client = i, %reply, "echoed back");
                        })
                    })
                })
                .or_else(|e| {
                    tracing::warn!(error = %e, "client failed");
                    evrt::future::ok(())
                }),
        );
    }

    reactor.run();
    Ok(())
}
