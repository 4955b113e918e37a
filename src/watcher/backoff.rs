use std::time::{Duration, Instant};

use super::source::CancelToken;

const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Exponential backoff: `next = min(current * factor, max)`.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    factor: f64,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, factor: f64, max: Duration) -> Self {
        Self {
            initial,
            factor,
            max,
            current: initial,
        }
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }

    pub fn escalate(&mut self) {
        let next = self.current.as_secs_f64() * self.factor;
        self.current = Duration::try_from_secs_f64(next)
            .map(|next| next.min(self.max))
            .unwrap_or(self.max);
    }
}

/// Where the watcher waits between reconnect attempts.
pub trait Sleeper: Send {
    /// Waits for `duration`. Implementations may return early once `cancel`
    /// is set.
    fn sleep(&mut self, duration: Duration, cancel: &CancelToken);
}

/// Sleeps on the current thread in short slices, checking for cancellation
/// in between.
#[derive(Debug, Clone, Copy)]
pub struct ThreadSleeper {
    slice: Duration,
}

impl Default for ThreadSleeper {
    fn default() -> Self {
        Self { slice: SLEEP_SLICE }
    }
}

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration, cancel: &CancelToken) {
        // A deadline past what `Instant` can hold only ends on cancellation.
        let deadline = Instant::now().checked_add(duration);
        loop {
            if cancel.is_cancelled() {
                return;
            }
            let remaining = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return;
                    }
                    deadline - now
                }
                None => self.slice,
            };
            std::thread::sleep(self.slice.min(remaining));
        }
    }
}
