//! Timers, `timeout`, and `when_all`/`when_any` over a handful of delays.
//! Run with `cargo run --example timers`.

use evrt::io::TimerKeeper;
use evrt::reactor::Reactor;
use evrt::{future, Future};
use std::time::Duration;

fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt::init();
    let reactor = Reactor::new()?;
    let handle = reactor.handle();

    let short = TimerKeeper::new(&handle, Duration::from_millis(20));
    let long = TimerKeeper::new(&handle, Duration::from_millis(200));

    reactor.spawn(
        future::when_all(vec![short.delay().boxed(), short.delay().boxed()]).map(|_| {
            tracing::info!("both short delays elapsed");
        }),
    );

    reactor.spawn(
        future::when_any(vec![short.delay().boxed(), long.delay().boxed()]).map(|(result, rest)| {
            tracing::info!(ok = result.is_ok(), remaining = rest.len(), "first delay won");
        }),
    );

    // A timeout racing a delay that's too slow to win.
    reactor.spawn(
        long.delay()
            .timeout(&short)
            .then(|result| {
                tracing::info!(timed_out = result.is_err(), "timeout raced against a slow delay");
                future::ok::<()>(())
            }),
    );

    reactor.run();
    Ok(())
}
