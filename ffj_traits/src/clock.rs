use std::thread;
use std::time::{Duration, Instant};

/// Monotonic time source for pulse cadence, poll intervals and timers.
///
/// - now(): monotonic Instant
/// - sleep(): block for `d` (test clocks advance virtual time instead)
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, d: Duration);

    /// Time elapsed since `epoch`, zero if `epoch` lies in the future.
    fn elapsed_since(&self, epoch: Instant) -> Duration {
        self.now().saturating_duration_since(epoch)
    }
}

/// Real-time clock backed by std::time::Instant.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn sleep(&self, d: Duration) {
        if d.is_zero() {
            return;
        }
        thread::sleep(d);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_is_never_negative() {
        let clock = MonotonicClock::new();
        let future = clock.now() + Duration::from_secs(60);
        assert_eq!(clock.elapsed_since(future), Duration::ZERO);
    }

    #[test]
    fn zero_sleep_returns_immediately() {
        let clock = MonotonicClock::new();
        let t0 = Instant::now();
        clock.sleep(Duration::ZERO);
        assert!(t0.elapsed() < Duration::from_millis(50));
    }
}
