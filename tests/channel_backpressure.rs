//! Bounded-channel backpressure under a real reactor
//! (`spec.md §8` seed scenario 8).

use evrt::channel::bounded::{bounded, BoundedReceiver};
use evrt::poll::Poll;
use evrt::reactor::Reactor;
use evrt::{Future, Stream};
use std::sync::{Arc, Mutex};

/// Drains a `BoundedReceiver` into a shared `Vec` until the stream ends.
struct Drain {
    receiver: BoundedReceiver<i32>,
    out: Arc<Mutex<Vec<i32>>>,
}

impl Future for Drain {
    type Item = ();

    fn poll(&mut self) -> Poll<()> {
        loop {
            match self.receiver.poll_stream() {
                Poll::Ready(Some(v)) => self.out.lock().unwrap().push(v),
                Poll::Ready(None) => return Poll::Ready(()),
                Poll::NotReady => return Poll::NotReady,
                Poll::Err(e) => return Poll::Err(e),
            }
        }
    }
}

#[test]
fn third_writer_unparks_once_the_reader_drains_space() {
    let reactor = Reactor::new().unwrap();
    let (sender, receiver) = bounded::<i32>(2);

    let received: Arc<Mutex<Vec<i32>>> = Arc::new(Mutex::new(Vec::new()));
    let sent_sum: i32 = [1, 2, 3].iter().sum();

    for value in [1, 2, 3] {
        let sender = sender.clone();
        reactor.spawn(sender.send(value));
    }
    drop(sender);

    reactor.spawn(Drain {
        receiver,
        out: received.clone(),
    });

    reactor.run();

    let mut got = received.lock().unwrap().clone();
    got.sort();
    assert_eq!(got, vec![1, 2, 3]);
    assert_eq!(got.iter().sum::<i32>(), sent_sum);
}
