//! Simulated rig used when GPIO is unavailable.
//!
//! Outputs log their transitions at trace level, limit switches close after a
//! fixed number of polls, and the scale ramps up on every read so dosing
//! finishes. Travel and ramp can be shortened through the environment:
//!
//! - `FFJ_TEST_SIM_TRAVEL`: polls before a simulated limit switch closes
//! - `FFJ_TEST_SIM_INC`: grams added per simulated scale read

use std::time::Duration;

use ffj_traits::{AudibleSignal, BinarySensor, BoxError, DigitalOutput, PwmOutput, Scale, TextDisplay};

use crate::util::center_line;

const DEFAULT_TRAVEL: u32 = 200;
const DEFAULT_INC_G: f32 = 2.0;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

#[derive(Debug)]
pub struct SimOutput {
    name: &'static str,
    level: bool,
}

impl SimOutput {
    pub fn new(name: &'static str) -> Self {
        Self { name, level: false }
    }
}

impl DigitalOutput for SimOutput {
    fn set_state(&mut self, high: bool) -> Result<(), BoxError> {
        if high != self.level {
            tracing::trace!(line = self.name, high, "sim output");
        }
        self.level = high;
        Ok(())
    }
}

#[derive(Debug)]
pub struct SimPwm {
    name: &'static str,
}

impl SimPwm {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

impl PwmOutput for SimPwm {
    fn set_duty(&mut self, duty: u8) -> Result<(), BoxError> {
        tracing::debug!(line = self.name, duty, "sim pwm");
        Ok(())
    }
}

/// Limit switch that closes on every `travel + 1`-th poll.
#[derive(Debug)]
pub struct SimSwitch {
    name: &'static str,
    travel: u32,
    left: u32,
}

impl SimSwitch {
    pub fn new(name: &'static str) -> Self {
        Self::with_travel(name, env_or("FFJ_TEST_SIM_TRAVEL", DEFAULT_TRAVEL))
    }

    pub fn with_travel(name: &'static str, travel: u32) -> Self {
        Self {
            name,
            travel,
            left: travel,
        }
    }
}

impl BinarySensor for SimSwitch {
    fn is_triggered(&mut self) -> bool {
        if self.left == 0 {
            self.left = self.travel;
            tracing::debug!(switch = self.name, "sim switch closed");
            true
        } else {
            self.left -= 1;
            false
        }
    }
}

/// Operator button. Released unless built with [`SimButton::held_for`].
#[derive(Debug, Default)]
pub struct SimButton {
    held: u32,
}

impl SimButton {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads as pressed for the first `polls` polls, then released.
    pub fn held_for(polls: u32) -> Self {
        Self { held: polls }
    }
}

impl BinarySensor for SimButton {
    fn is_triggered(&mut self) -> bool {
        if self.held == 0 {
            return false;
        }
        self.held -= 1;
        true
    }
}

/// Scale whose load grows by a fixed amount on every read.
#[derive(Debug)]
pub struct SimulatedScale {
    grams: f32,
    inc_g: f32,
    counts_per_g: f32,
}

impl SimulatedScale {
    pub fn new(counts_per_g: f32) -> Self {
        Self {
            grams: 0.0,
            inc_g: env_or("FFJ_TEST_SIM_INC", DEFAULT_INC_G),
            counts_per_g,
        }
    }
}

impl Scale for SimulatedScale {
    fn read(&mut self, _timeout: Duration) -> Result<i32, BoxError> {
        self.grams += self.inc_g;
        let raw = (self.grams * self.counts_per_g) as i32;
        tracing::trace!(grams = self.grams, raw, "sim scale");
        Ok(raw)
    }
}

#[derive(Debug, Default)]
pub struct SimBuzzer;

impl AudibleSignal for SimBuzzer {
    fn pattern(&mut self, repeats: u8, on_ms: u16, off_ms: u16) {
        tracing::debug!(repeats, on_ms, off_ms, "beep");
    }
}

/// Renders the two display rows to the log, centered as on the 16x2 LCD.
#[derive(Debug, Default)]
pub struct LogDisplay;

impl TextDisplay for LogDisplay {
    fn show_two_lines(&mut self, line1: &str, line2: &str, auto_clear_after: Option<Duration>) {
        tracing::info!(
            target: "display",
            row1 = %center_line(line1),
            row2 = %center_line(line2),
            clear_ms = auto_clear_after.map(|d| d.as_millis() as u64),
            "display"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switch_closes_after_travel_and_rearms() {
        let mut sw = SimSwitch::with_travel("t", 2);
        let seq: Vec<bool> = (0..6).map(|_| sw.is_triggered()).collect();
        assert_eq!(seq, [false, false, true, false, false, true]);
    }

    #[test]
    fn held_button_releases() {
        let mut b = SimButton::held_for(2);
        let seq: Vec<bool> = (0..4).map(|_| b.is_triggered()).collect();
        assert_eq!(seq, [true, true, false, false]);
        assert!(!SimButton::new().is_triggered());
    }

    #[test]
    fn scale_ramps_monotonically() {
        let mut scale = SimulatedScale::new(13.4);
        let a = scale.read(Duration::from_millis(1)).unwrap();
        let b = scale.read(Duration::from_millis(1)).unwrap();
        assert!(b > a);
    }
}
