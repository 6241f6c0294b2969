//! Dose-by-weight: run an actuator until the scale reaches a threshold.
//!
//! [`DoseRun`] is a step machine: each `step` performs at most one weight
//! poll and never sleeps, reporting how long the caller should wait before the
//! next poll. [`run_dose`] drives it to completion for blocking callers.

use std::fmt;
use std::time::{Duration, Instant};

use ffj_traits::{Clock, Motor, TextDisplay, WeightSensor};

use crate::config::DoseCfg;
use crate::error::{FfjError, Result};
use crate::hw_error::{hw, map_hw_error};
use crate::interlock::Interlock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ingredient {
    Banana,
    Molasses,
}

impl Ingredient {
    pub fn label(self) -> &'static str {
        match self {
            Ingredient::Banana => "banana",
            Ingredient::Molasses => "molasses",
        }
    }
}

impl fmt::Display for Ingredient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DosingStatus {
    Running,
    /// Next poll is due after this long.
    Waiting(Duration),
    Complete { grams: f32, polls: u32 },
}

#[derive(Debug, Clone)]
pub struct DoseRun {
    ingredient: Ingredient,
    threshold_g: f32,
    speed_pct: u8,
    samples: u8,
    poll_interval: Duration,
    tared: bool,
    polls: u32,
    unavailable: u32,
    last_g: Option<f32>,
    next_poll: Option<Instant>,
}

impl DoseRun {
    pub fn new(ingredient: Ingredient, cfg: &DoseCfg) -> Self {
        let speed_pct = match ingredient {
            Ingredient::Banana => cfg.banana_speed_pct,
            Ingredient::Molasses => cfg.molasses_speed_pct,
        };
        Self {
            ingredient,
            threshold_g: cfg.threshold_g,
            speed_pct,
            samples: cfg.samples.max(1),
            poll_interval: cfg.poll_interval,
            tared: false,
            polls: 0,
            unavailable: 0,
            last_g: None,
            next_poll: None,
        }
    }

    pub fn ingredient(&self) -> Ingredient {
        self.ingredient
    }

    pub fn polls(&self) -> u32 {
        self.polls
    }

    pub fn last_grams(&self) -> Option<f32> {
        self.last_g
    }

    /// One control step: tare on first call, then (when due) run the
    /// actuator, take one reading and compare it to the threshold.
    ///
    /// An unavailable reading counts as below threshold and is retried on the
    /// next poll.
    pub fn step(
        &mut self,
        motor: &mut dyn Motor,
        weight: &mut dyn WeightSensor,
        display: &mut dyn TextDisplay,
        clock: &dyn Clock,
    ) -> Result<DosingStatus> {
        if !self.tared {
            hw(weight.tare(), "tare before dosing")?;
            self.tared = true;
            tracing::info!(
                ingredient = %self.ingredient,
                threshold_g = self.threshold_g,
                "dosing started"
            );
        }

        let now = clock.now();
        if let Some(due) = self.next_poll {
            if now < due {
                return Ok(DosingStatus::Waiting(due - now));
            }
        }

        hw(motor.set_speed(self.speed_pct), "set actuator speed")?;
        hw(motor.start(), "start actuator")?;

        self.polls += 1;
        match weight.sample(self.samples) {
            Ok(g) => {
                self.last_g = Some(g);
                display.show_two_lines(self.ingredient.label(), &format!("{g:.1} g"), None);
                tracing::debug!(ingredient = %self.ingredient, grams = g, poll = self.polls, "weight");
                if g >= self.threshold_g {
                    hw(motor.stop(), "stop actuator")?;
                    tracing::info!(
                        ingredient = %self.ingredient,
                        grams = g,
                        polls = self.polls,
                        "threshold reached"
                    );
                    return Ok(DosingStatus::Complete {
                        grams: g,
                        polls: self.polls,
                    });
                }
            }
            Err(e) => {
                let mapped = map_hw_error(&*e);
                if mapped != FfjError::SensorUnavailable {
                    return Err(eyre::Report::new(mapped).wrap_err("weight sample"));
                }
                self.unavailable += 1;
                display.show_two_lines(self.ingredient.label(), "scale not ready", None);
                tracing::warn!(
                    ingredient = %self.ingredient,
                    poll = self.polls,
                    misses = self.unavailable,
                    "weight unavailable; treating as below threshold"
                );
            }
        }

        self.next_poll = Some(now + self.poll_interval);
        Ok(DosingStatus::Running)
    }
}

/// Dose `ingredient` to completion. The actuator is stopped on every exit path.
pub fn run_dose(
    run: &mut DoseRun,
    motor: &mut dyn Motor,
    weight: &mut dyn WeightSensor,
    display: &mut dyn TextDisplay,
    clock: &dyn Clock,
    interlock: &mut Interlock,
) -> Result<(f32, u32)> {
    loop {
        if interlock.tripped() {
            let _ = motor.stop();
            tracing::warn!(ingredient = %run.ingredient(), "dose cancelled");
            return Err(FfjError::Cancelled.into());
        }
        match run.step(motor, weight, display, clock) {
            Ok(DosingStatus::Complete { grams, polls }) => return Ok((grams, polls)),
            Ok(DosingStatus::Waiting(d)) => clock.sleep(d),
            Ok(DosingStatus::Running) => {}
            Err(e) => {
                let _ = motor.stop();
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interlock::CancelToken;
    use crate::mocks::{ManualClock, NullDisplay, WeightScript};
    use ffj_traits::BoxError;

    #[derive(Default)]
    struct SpyMotor {
        running: bool,
        starts: u32,
        stops: u32,
        speed: u8,
    }

    impl Motor for SpyMotor {
        fn set_speed(&mut self, percent: u8) -> std::result::Result<(), BoxError> {
            self.speed = percent;
            Ok(())
        }
        fn start(&mut self) -> std::result::Result<(), BoxError> {
            if !self.running {
                self.starts += 1;
            }
            self.running = true;
            Ok(())
        }
        fn stop(&mut self) -> std::result::Result<(), BoxError> {
            self.running = false;
            self.stops += 1;
            Ok(())
        }
    }

    fn cfg() -> DoseCfg {
        DoseCfg {
            threshold_g: 500.0,
            poll_interval: Duration::from_millis(100),
            samples: 1,
            banana_speed_pct: 50,
            molasses_speed_pct: 100,
        }
    }

    #[test]
    fn stops_on_first_reading_at_threshold() {
        let clock = ManualClock::new();
        let script = WeightScript::readings(&[Some(0.0), Some(100.0), Some(300.0), Some(520.0)]);
        let mut weight = script.sensor();
        let mut motor = SpyMotor::default();
        let mut run = DoseRun::new(Ingredient::Banana, &cfg());
        let mut il = Interlock::new(CancelToken::new());
        let (g, polls) = run_dose(
            &mut run,
            &mut motor,
            &mut weight,
            &mut NullDisplay,
            &clock,
            &mut il,
        )
        .unwrap();
        assert_eq!(polls, 4);
        assert!((g - 520.0).abs() < f32::EPSILON);
        assert!(!motor.running);
        assert_eq!(motor.starts, 1);
        assert_eq!(motor.speed, 50);
        assert_eq!(script.tares(), 1);
        assert_eq!(clock.elapsed(), Duration::from_millis(300));
    }

    #[test]
    fn unavailable_readings_keep_actuator_running() {
        let clock = ManualClock::new();
        let script = WeightScript::readings(&[None, None, Some(600.0)]);
        let mut weight = script.sensor();
        let mut motor = SpyMotor::default();
        let mut run = DoseRun::new(Ingredient::Molasses, &cfg());
        let mut il = Interlock::new(CancelToken::new());
        let (_, polls) = run_dose(
            &mut run,
            &mut motor,
            &mut weight,
            &mut NullDisplay,
            &clock,
            &mut il,
        )
        .unwrap();
        assert_eq!(polls, 3);
        assert_eq!(motor.speed, 100);
        assert!(!motor.running);
    }

    #[test]
    fn step_waits_between_polls() {
        let clock = ManualClock::new();
        let script = WeightScript::readings(&[Some(1.0), Some(2.0)]);
        let mut weight = script.sensor();
        let mut motor = SpyMotor::default();
        let mut run = DoseRun::new(Ingredient::Banana, &cfg());
        let st = run
            .step(&mut motor, &mut weight, &mut NullDisplay, &clock)
            .unwrap();
        assert_eq!(st, DosingStatus::Running);
        clock.advance(Duration::from_millis(40));
        let st = run
            .step(&mut motor, &mut weight, &mut NullDisplay, &clock)
            .unwrap();
        assert_eq!(st, DosingStatus::Waiting(Duration::from_millis(60)));
        assert_eq!(run.polls(), 1);
    }

    #[test]
    fn cancel_stops_actuator() {
        let clock = ManualClock::new();
        let script = WeightScript::readings(&[Some(0.0)]);
        let mut weight = script.sensor();
        let mut motor = SpyMotor::default();
        let mut run = DoseRun::new(Ingredient::Banana, &cfg());
        run.step(&mut motor, &mut weight, &mut NullDisplay, &clock)
            .unwrap();
        assert!(motor.running);
        let token = CancelToken::new();
        let mut il = Interlock::new(token.clone());
        token.cancel();
        let err = run_dose(
            &mut run,
            &mut motor,
            &mut weight,
            &mut NullDisplay,
            &clock,
            &mut il,
        )
        .unwrap_err();
        assert_eq!(err.downcast_ref::<FfjError>(), Some(&FfjError::Cancelled));
        assert!(!motor.running);
    }
}
