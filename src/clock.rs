use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Owned handle to one repeating schedule
///
/// The schedule runs as a local task invoking the callback once per period.
/// Cancelling (or dropping) the handle guarantees the callback is never
/// invoked again: the flag is checked on the same thread right before every
/// invocation, and the task is aborted.
///
/// Must be created from within a `LocalSet`.
pub struct ClockHandle {
    cancelled: Rc<Cell<bool>>,
    task: JoinHandle<()>,
}

impl ClockHandle {
    pub fn spawn<F>(period: Duration, mut callback: F) -> Self
    where
        F: FnMut() + 'static,
    {
        let cancelled = Rc::new(Cell::new(false));
        let flag = cancelled.clone();

        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let task = tokio::task::spawn_local(async move {
            loop {
                ticker.tick().await;
                if flag.get() {
                    break;
                }
                callback();
            }
        });

        Self { cancelled, task }
    }

    pub fn cancel(&self) {
        self.cancelled.set(true);
        self.task.abort();
    }
}

impl Drop for ClockHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// A repeating timer slot holding at most one active schedule
#[derive(Default)]
pub struct SampleClock {
    active: Option<ClockHandle>,
}

impl SampleClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `callback` every `period`, replacing any running schedule.
    /// The first invocation happens one period after this call.
    pub fn start<F>(&mut self, period: Duration, callback: F)
    where
        F: FnMut() + 'static,
    {
        self.cancel();
        self.active = Some(ClockHandle::spawn(period, callback));
    }

    /// Stop the schedule. No-op if nothing is running.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.active.take() {
            handle.cancel();
        }
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }
}
