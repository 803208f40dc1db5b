//! Cooperative cancellation shared by every blocking wait in the runtime.
//!
//! A `StopSignal` is a latched flag plus a condition variable. Timers,
//! buffer reads, event waits and connect backoff all sleep through it, so
//! setting the flag wakes them immediately instead of after their timeout.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Default)]
struct StopInner {
    flag: AtomicBool,
    lock: Mutex<()>,
    cond: Condvar,
}

/// Cloneable, latched stop flag with interruptible sleeps.
#[derive(Clone, Default)]
pub struct StopSignal {
    inner: Arc<StopInner>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.inner.flag.load(Ordering::Acquire)
    }

    /// Latch the flag and wake every waiter.
    pub fn stop(&self) {
        self.inner.flag.store(true, Ordering::Release);
        let _guard = self.inner.lock.lock();
        self.inner.cond.notify_all();
    }

    /// Clear the flag so the signal can be reused for another run.
    pub fn reset(&self) {
        self.inner.flag.store(false, Ordering::Release);
    }

    /// Sleep for up to `timeout`. Returns `true` if the signal was (or
    /// became) stopped, `false` if the full timeout elapsed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_stopped() {
            return true;
        }
        let deadline = Instant::now() + timeout;
        let mut guard = self.inner.lock.lock();
        while !self.is_stopped() {
            if self.inner.cond.wait_until(&mut guard, deadline).timed_out() {
                break;
            }
        }
        self.is_stopped()
    }

    /// Block until the signal is stopped.
    pub fn wait(&self) {
        let mut guard = self.inner.lock.lock();
        while !self.is_stopped() {
            self.inner.cond.wait(&mut guard);
        }
    }
}

impl std::fmt::Debug for StopSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopSignal")
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_wait_timeout_elapses() {
        let signal = StopSignal::new();
        let start = Instant::now();
        assert!(!signal.wait_timeout(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_stop_wakes_waiter() {
        let signal = StopSignal::new();
        let waiter = signal.clone();
        let handle = thread::spawn(move || {
            let start = Instant::now();
            let stopped = waiter.wait_timeout(Duration::from_secs(5));
            (stopped, start.elapsed())
        });
        thread::sleep(Duration::from_millis(20));
        signal.stop();
        let (stopped, elapsed) = handle.join().unwrap();
        assert!(stopped);
        assert!(elapsed < Duration::from_secs(1));
    }

    #[test]
    fn test_reset_clears_flag() {
        let signal = StopSignal::new();
        signal.stop();
        assert!(signal.is_stopped());
        signal.reset();
        assert!(!signal.is_stopped());
    }
}
