//! Timer sequencing and `timeout` against a real reactor
//! (`spec.md §8` seed scenarios 2 and 5).

use evrt::io::TimerKeeper;
use evrt::reactor::Reactor;
use evrt::{future, Future};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[test]
fn chained_delays_run_serially_but_independent_delays_run_in_parallel() {
    let reactor = Reactor::new().unwrap();
    let handle = reactor.handle();
    let keeper = TimerKeeper::new(&handle, Duration::from_millis(30));

    let serial_elapsed = Arc::new(Mutex::new(None));
    {
        let serial_elapsed = serial_elapsed.clone();
        let started = Instant::now();
        let chained_keeper = keeper.clone();
        reactor.spawn(
            keeper
                .delay()
                .and_then(move |_| chained_keeper.delay())
                .map(move |_| {
                    *serial_elapsed.lock().unwrap() = Some(started.elapsed());
                }),
        );
    }

    // Three independent delays spawned at once should all land around one
    // delay's worth of wall time, not three times that.
    let finished_count = Arc::new(Mutex::new(0usize));
    let parallel_started = Instant::now();
    for _ in 0..3 {
        let finished_count = finished_count.clone();
        reactor.spawn(keeper.delay().map(move |_| {
            *finished_count.lock().unwrap() += 1;
        }));
    }

    reactor.run();

    let serial = serial_elapsed.lock().unwrap().expect("serial chain never finished");
    assert!(serial >= Duration::from_millis(60), "two chained delays should take roughly 2x as long: {serial:?}");
    assert_eq!(*finished_count.lock().unwrap(), 3);
    assert!(
        parallel_started.elapsed() < Duration::from_millis(200),
        "three independent delays of the same duration shouldn't serialize"
    );
}

#[test]
fn timeout_fires_against_a_future_that_never_resolves() {
    let reactor = Reactor::new().unwrap();
    let handle = reactor.handle();
    let keeper = TimerKeeper::new(&handle, Duration::from_millis(20));

    let outcome: Arc<Mutex<Option<bool>>> = Arc::new(Mutex::new(None));
    {
        let outcome = outcome.clone();
        reactor.spawn(
            future::empty::<i32>()
                .timeout(&keeper)
                .then(move |result| {
                    let timed_out = matches!(&result, Err(e) if e.is_timeout());
                    *outcome.lock().unwrap() = Some(timed_out);
                    future::ok::<()>(())
                }),
        );
    }

    reactor.run();
    assert_eq!(*outcome.lock().unwrap(), Some(true));
}
