use super::{ReactorHandle, Runnable, UnparkMutex};
use crate::future::Future;
use crate::poll::Poll;
use crate::task::{self, Task, Unpark, UnparkHandle};
use std::sync::{Arc, Mutex};

/// The top-level poll-driver: owns a boxed future plus the `UnparkMutex`
/// that guarantees at most one outstanding run of it at a time
/// (`spec.md §2` component H, `§4.4`).
pub(crate) struct FutureSpawnRun<F: Future> {
    id: u64,
    future: Mutex<Option<F>>,
    mutex: UnparkMutex<Arc<FutureSpawnRun<F>>>,
    reactor: ReactorHandle,
}

impl<F> FutureSpawnRun<F>
where
    F: Future + Send + 'static,
{
    fn new(reactor: ReactorHandle, future: F) -> Arc<Self> {
        Arc::new(FutureSpawnRun {
            id: task::allocate_task_id(),
            future: Mutex::new(Some(future)),
            mutex: UnparkMutex::new(),
            reactor,
        })
    }
}

impl<F> Runnable for FutureSpawnRun<F>
where
    F: Future + Send + 'static,
{
    fn run(self: Arc<Self>) {
        self.mutex.start_poll();
        loop {
            let unpark = Unpark::new(Arc::new(SpawnUnpark {
                run: self.clone(),
            }) as Arc<dyn UnparkHandle>);
            let task = Task {
                id: self.id,
                unpark,
            };
            let step = {
                let mut guard = self.future.lock().unwrap();
                match guard.as_mut() {
                    Some(fut) => {
                        let polled = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                            task::with_task(task, || fut.poll())
                        }));
                        match polled {
                            Ok(step) => step,
                            Err(payload) => {
                                let msg = panic_message(&payload);
                                Poll::Err(crate::Error::Dispatch(msg))
                            }
                        }
                    }
                    None => return,
                }
            };
            match step {
                Poll::Ready(_) => {
                    *self.future.lock().unwrap() = None;
                    self.mutex.complete();
                    return;
                }
                Poll::Err(e) => {
                    tracing::warn!(error = %e, "spawned top-level future failed");
                    *self.future.lock().unwrap() = None;
                    self.mutex.complete();
                    return;
                }
                Poll::NotReady => match self.mutex.wait(self.clone()) {
                    Some(_) => continue,
                    None => return,
                },
            }
        }
    }
}

struct SpawnUnpark<F: Future> {
    run: Arc<FutureSpawnRun<F>>,
}

impl<F> UnparkHandle for SpawnUnpark<F>
where
    F: Future + Send + 'static,
{
    fn unpark(&self) {
        if let Some(runnable) = self.run.mutex.notify() {
            self.run.reactor.execute(runnable);
        }
    }
}

/// Extracts a printable message from a `catch_unwind` payload. A panicking
/// poll is converted to an `Err` here only — combinators never see panics,
/// only `Poll::Err` (`spec.md §9`: "exceptions thrown by user closures
/// become `Err` poll results").
fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "future panicked".to_string()
    }
}

/// Spawns `future` as a new top-level task on `reactor`.
pub fn spawn<F>(reactor: &ReactorHandle, future: F)
where
    F: Future + Send + 'static,
{
    let run = FutureSpawnRun::new(reactor.clone(), future);
    reactor.execute(run);
}
