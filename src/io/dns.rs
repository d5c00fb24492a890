//! Non-blocking-looking DNS resolution (`spec.md §4.13` "DnsResolver").
//!
//! There's no portable non-blocking `getaddrinfo`, so this is the one I/O
//! object that isn't readiness-driven: each lookup runs
//! `std::net::ToSocketAddrs` on a throwaway background thread and reports
//! back through a `CompletionToken`, whose `notify_done` already knows how
//! to unpark whatever task is awaiting it regardless of which thread calls
//! it (`spec.md §4.13` "resolution happens off the reactor thread; the
//! result is delivered back through the normal unpark path").

use crate::future::Future;
use crate::io::token::CompletionToken;
use crate::poll::Poll;
use crate::Error;
use std::net::{SocketAddr, ToSocketAddrs};

pub struct DnsResolver;

impl DnsResolver {
    /// Spawns a background thread to resolve `host:port`, returning a future
    /// that completes once it finishes.
    pub fn resolve(host: impl Into<String>, port: u16) -> DnsFuture {
        let host = host.into();
        let token = CompletionToken::new();
        let worker_token = token.clone();
        std::thread::Builder::new()
            .name("evrt-dns".to_string())
            .spawn(move || {
                let result = (host.as_str(), port)
                    .to_socket_addrs()
                    .map(|it| it.collect::<Vec<SocketAddr>>())
                    .map_err(Error::Io);
                worker_token.notify_done(result);
            })
            .expect("failed to spawn dns resolver thread");
        DnsFuture { token }
    }
}

pub struct DnsFuture {
    token: CompletionToken<Vec<SocketAddr>>,
}

impl Future for DnsFuture {
    type Item = Vec<SocketAddr>;

    fn poll(&mut self) -> Poll<Vec<SocketAddr>> {
        self.token.poll()
    }
}

impl Drop for DnsFuture {
    fn drop(&mut self) {
        // The background thread runs to completion regardless (there's no
        // way to interrupt a blocking `getaddrinfo`); dropping just stops
        // caring about the answer.
        self.token.cleanup(crate::error::CancelReason::UserCancel);
    }
}
