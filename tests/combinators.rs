//! End-to-end checks for the pure, reactor-free combinators — no I/O, so
//! `evrt::task::wait` drives each future straight to its first terminal poll.

use evrt::poll::Poll;
use evrt::task::wait;
use evrt::{future, Error, Future};

#[test]
fn ok_value_propagates_through_a_chain_of_and_thens() {
    let chained = future::ok(5)
        .and_then(|v| future::ok::<i32>(v * 2))
        .and_then(|v| future::ok::<i32>(v + 1));
    assert_eq!(wait(chained).unwrap(), 11);
}

#[test]
fn join_with_one_side_erroring_discards_the_other_sides_value() {
    let joined = future::ok::<i32>(1).join(future::err::<i32>(Error::custom(
        std::io::Error::new(std::io::ErrorKind::Other, "boom"),
    )));
    let result = wait(joined);
    assert!(result.is_err());
}

#[test]
fn loop_fn_accumulates_to_ten_then_breaks() {
    let looped = future::loop_fn(0, |state| {
        if state < 10 {
            future::ok(future::Either::Continue(state + 1))
        } else {
            future::ok(future::Either::Break("XX"))
        }
    });
    assert_eq!(wait(looped).unwrap(), "XX");
}

#[test]
fn dynamic_select_yields_the_first_ready_future_and_the_rest_in_order() {
    let mut when_any = future::when_any(vec![future::ok(1), future::ok(2)]);
    match when_any.poll() {
        Poll::Ready((result, rest)) => {
            assert_eq!(result.unwrap(), 1);
            assert_eq!(rest.len(), 1);
            let mut remaining = rest.into_iter().next().unwrap();
            assert!(matches!(remaining.poll(), Poll::Ready(2)));
        }
        Poll::NotReady => panic!("when_any over two already-ready futures should resolve immediately"),
        Poll::Err(e) => panic!("unexpected error: {e}"),
    }
}

#[test]
fn when_all_waits_for_every_future_and_preserves_construction_order() {
    let all = future::when_all(vec![future::ok(1), future::ok(2), future::ok(3)]);
    assert_eq!(wait(all).unwrap(), vec![1, 2, 3]);
}
