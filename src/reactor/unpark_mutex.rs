use std::sync::Mutex;

/// Four-state coordination between a top-level future's poll and concurrent
/// unparks (`spec.md §3/§4.4`). The original suggests a single atomic with
/// `compare_exchange_strong`; this keeps the same four states and
/// transition table but behind a `Mutex<State<T>>`, which is simpler to get
/// right when `Waiting` must also carry the parked runnable. See
/// `DESIGN.md` for the rationale.
enum State<T> {
    Polling,
    Repoll,
    Waiting(T),
    Complete,
}

pub struct UnparkMutex<T> {
    state: Mutex<State<T>>,
}

impl<T> UnparkMutex<T> {
    pub fn new() -> Self {
        UnparkMutex {
            state: Mutex::new(State::Polling),
        }
    }

    /// Step 1 of `FutureSpawnRun::run`: unconditionally enter `Polling`.
    pub fn start_poll(&self) {
        *self.state.lock().unwrap() = State::Polling;
    }

    /// Called after a poll returns `NotReady`, carrying the runnable data
    /// that would need to be re-enqueued on a later unpark. Returns
    /// `Some(data)` if an unpark already arrived during this poll (so the
    /// caller should immediately loop and poll again); returns `None` once
    /// the data has been parked in `Waiting`.
    pub fn wait(&self, data: T) -> Option<T> {
        let mut guard = self.state.lock().unwrap();
        match std::mem::replace(&mut *guard, State::Complete) {
            State::Polling => {
                *guard = State::Waiting(data);
                None
            }
            State::Repoll => {
                *guard = State::Polling;
                Some(data)
            }
            other @ (State::Waiting(_) | State::Complete) => {
                *guard = other;
                None
            }
        }
    }

    /// Called by `unpark()`. Returns `Some(data)` when the caller must
    /// re-enqueue the runnable (transitioning `Waiting -> Polling`); `None`
    /// when the unpark was absorbed as a pending repoll or was a no-op
    /// against a completed future.
    pub fn notify(&self) -> Option<T> {
        let mut guard = self.state.lock().unwrap();
        match std::mem::replace(&mut *guard, State::Complete) {
            State::Waiting(data) => {
                *guard = State::Polling;
                Some(data)
            }
            State::Polling => {
                *guard = State::Repoll;
                None
            }
            State::Repoll => {
                *guard = State::Repoll;
                None
            }
            State::Complete => {
                *guard = State::Complete;
                None
            }
        }
    }

    pub fn complete(&self) {
        *self.state.lock().unwrap() = State::Complete;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waiting_then_notify_returns_data() {
        let mutex = UnparkMutex::new();
        mutex.start_poll();
        assert!(mutex.wait(42).is_none());
        assert_eq!(mutex.notify(), Some(42));
    }

    #[test]
    fn unpark_during_poll_causes_single_repoll() {
        let mutex: UnparkMutex<u32> = UnparkMutex::new();
        mutex.start_poll();
        // Two unparks arrive while "Polling".
        assert_eq!(mutex.notify(), None);
        assert_eq!(mutex.notify(), None);
        // The poll sees NotReady and calls wait(); it should get its data
        // back immediately because a repoll is owed.
        assert_eq!(mutex.wait(7), Some(7));
    }

    #[test]
    fn notify_after_complete_is_noop() {
        let mutex: UnparkMutex<u32> = UnparkMutex::new();
        mutex.start_poll();
        mutex.complete();
        assert_eq!(mutex.notify(), None);
    }
}
