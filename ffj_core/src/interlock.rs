//! Cooperative cancellation for motions and doses.
//!
//! A [`CancelToken`] is tripped from outside the control thread (Ctrl-C handler).
//! The [`Interlock`] combines it with an optional emergency-stop input and
//! latches once either fires; only [`Interlock::release`] clears it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ffj_traits::BinarySensor;

#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

pub struct Interlock {
    token: CancelToken,
    estop: Option<Box<dyn BinarySensor>>,
    debounce_n: u8,
    count: u8,
    latched: bool,
}

impl std::fmt::Debug for Interlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interlock")
            .field("estop", &self.estop.is_some())
            .field("debounce_n", &self.debounce_n)
            .field("latched", &self.latched)
            .finish_non_exhaustive()
    }
}

impl Interlock {
    pub fn new(token: CancelToken) -> Self {
        Self {
            token,
            estop: None,
            debounce_n: 0,
            count: 0,
            latched: false,
        }
    }

    /// Attach an e-stop input. It must read active for `debounce_n`
    /// consecutive polls (minimum 1) before the interlock latches.
    pub fn with_estop(mut self, estop: Box<dyn BinarySensor>, debounce_n: u8) -> Self {
        self.estop = Some(estop);
        self.debounce_n = debounce_n.max(1);
        self
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    /// Poll the inputs. Returns true while latched.
    pub fn tripped(&mut self) -> bool {
        if self.latched {
            return true;
        }
        if self.token.is_cancelled() {
            tracing::warn!("cancel requested");
            self.latched = true;
            return true;
        }
        if let Some(estop) = self.estop.as_mut() {
            if estop.is_triggered() {
                self.count = self.count.saturating_add(1);
                if self.count >= self.debounce_n {
                    tracing::error!(polls = self.count, "emergency stop active");
                    self.latched = true;
                    return true;
                }
            } else {
                self.count = 0;
            }
        }
        false
    }

    pub fn is_latched(&self) -> bool {
        self.latched
    }

    /// Clear the latch and the cancel request.
    pub fn release(&mut self) {
        if self.latched {
            tracing::info!("interlock released");
        }
        self.latched = false;
        self.count = 0;
        self.token.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct Level(Rc<Cell<bool>>);
    impl BinarySensor for Level {
        fn is_triggered(&mut self) -> bool {
            self.0.get()
        }
    }

    #[test]
    fn token_trips_and_latches() {
        let token = CancelToken::new();
        let mut il = Interlock::new(token.clone());
        assert!(!il.tripped());
        token.cancel();
        assert!(il.tripped());
        assert!(il.tripped());
        il.release();
        assert!(!il.tripped());
        assert!(!token.is_cancelled());
    }

    #[test]
    fn estop_needs_consecutive_polls() {
        let level = Rc::new(Cell::new(false));
        let mut il =
            Interlock::new(CancelToken::new()).with_estop(Box::new(Level(level.clone())), 3);
        level.set(true);
        assert!(!il.tripped());
        assert!(!il.tripped());
        level.set(false);
        assert!(!il.tripped());
        level.set(true);
        assert!(!il.tripped());
        assert!(!il.tripped());
        assert!(il.tripped());
        // stays latched after the input clears
        level.set(false);
        assert!(il.tripped());
        assert!(il.is_latched());
    }
}
