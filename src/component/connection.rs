//! Sensor connection state shared with channels, and connect backoff.

use crate::config::SensorSettings;
use crate::stop::StopSignal;
use crate::types::ConnectionStatus;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

const WAIT_SLICE: Duration = Duration::from_millis(50);

/// Connection status of one sensor, observable by its channels
#[derive(Clone, Default)]
pub struct SensorLink {
    inner: Arc<(Mutex<ConnectionStatus>, Condvar)>,
}

impl SensorLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.inner.0.lock()
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    pub fn set(&self, status: ConnectionStatus) {
        let (lock, cond) = &*self.inner;
        *lock.lock() = status;
        cond.notify_all();
    }

    /// Wait until connected. Gives up on timeout, on `stop`, or when the
    /// sensor entered `Error`.
    pub fn wait_connected(&self, timeout: Duration, stop: &StopSignal) -> bool {
        let deadline = Instant::now() + timeout;
        let (lock, cond) = &*self.inner;
        let mut status = lock.lock();
        loop {
            match *status {
                ConnectionStatus::Connected => return true,
                ConnectionStatus::Error => return false,
                _ => {}
            }
            let now = Instant::now();
            if stop.is_stopped() || now >= deadline {
                return false;
            }
            let _ = cond.wait_for(&mut status, WAIT_SLICE.min(deadline - now));
        }
    }
}

impl std::fmt::Debug for SensorLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorLink")
            .field("status", &self.status())
            .finish()
    }
}

/// Exponential connect-retry delay
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    factor: f64,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, factor: f64) -> Self {
        Self {
            initial,
            max: max.max(initial),
            factor: factor.max(1.0),
            current: initial,
        }
    }

    pub fn from_settings(settings: &SensorSettings) -> Self {
        Self::new(
            Duration::from_millis(settings.retry_initial_ms),
            Duration::from_millis(settings.retry_max_ms),
            settings.retry_factor,
        )
    }

    /// Delay to wait now; grows the next one
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.mul_f64(self.factor).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_backoff_grows_to_max() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(350), 2.0);
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
        assert_eq!(backoff.next_delay(), Duration::from_millis(350));
        assert_eq!(backoff.next_delay(), Duration::from_millis(350));
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_wait_connected() {
        let link = SensorLink::new();
        let stop = StopSignal::new();
        assert!(!link.wait_connected(Duration::from_millis(10), &stop));

        let setter = link.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            setter.set(ConnectionStatus::Connected);
        });
        assert!(link.wait_connected(Duration::from_secs(2), &stop));
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_connected_gives_up_on_error() {
        let link = SensorLink::new();
        link.set(ConnectionStatus::Error);
        let start = Instant::now();
        assert!(!link.wait_connected(Duration::from_secs(5), &StopSignal::new()));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
