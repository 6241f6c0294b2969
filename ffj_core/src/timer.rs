//! One-shot software timer polled from the control loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ffj_traits::Clock;

struct Armed<E> {
    started: Instant,
    duration: Duration,
    event: E,
}

/// Fires its event exactly once, on the first poll at or after expiry.
pub struct ExpiringTimer<E> {
    clock: Arc<dyn Clock + Send + Sync>,
    armed: Option<Armed<E>>,
}

impl<E> ExpiringTimer<E> {
    pub fn new(clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self { clock, armed: None }
    }

    /// Arm (or re-arm) the timer. A zero duration is ignored and returns false.
    pub fn arm(&mut self, duration: Duration, event: E) -> bool {
        if duration.is_zero() {
            tracing::warn!("ignoring zero-length timer");
            return false;
        }
        self.armed = Some(Armed {
            started: self.clock.now(),
            duration,
            event,
        });
        true
    }

    /// Returns the event once when expired, disarming the timer.
    pub fn poll(&mut self) -> Option<E> {
        let due = self
            .armed
            .as_ref()
            .is_some_and(|a| self.clock.elapsed_since(a.started) >= a.duration);
        if due {
            self.armed.take().map(|a| a.event)
        } else {
            None
        }
    }

    /// Disarm without firing. Returns whether the timer was active.
    pub fn cancel(&mut self) -> bool {
        self.armed.take().is_some()
    }

    pub fn is_active(&self) -> bool {
        self.armed.is_some()
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.armed
            .as_ref()
            .map(|a| a.duration.saturating_sub(self.clock.elapsed_since(a.started)))
    }
}
