//! Open-loop stepper axis driven by a pulse line and a direction line.
//!
//! Each step is one HIGH/LOW cycle on the pulse line, each level held for the
//! axis half-period. Position is counted in steps relative to the last homing.
//!
//! Motions are step generators: [`LinearAxis::step`] emits at most one pulse,
//! so a caller can interleave other work between pulses. The blocking helpers
//! (`move_relative`, `move_until_switch`, `home`, `move_to`) drive the same
//! generator to completion and poll the [`Interlock`] before every pulse.

use std::sync::Arc;
use std::time::Duration;

use ffj_traits::{BinarySensor, Clock, DigitalOutput};

use crate::config::AxisCfg;
use crate::error::{FfjError, Result};
use crate::hw_error::hw;
use crate::interlock::Interlock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Relative { total: u64 },
    UntilSwitch { bound: u64, zero_on_stop: bool },
}

/// An in-flight motion on one axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Motion {
    kind: Kind,
    forward: bool,
    pulses: u64,
    dir_set: bool,
    done: bool,
}

impl Motion {
    /// Move exactly `steps` pulses; the sign picks the direction.
    pub fn relative(steps: i64) -> Self {
        Self::with_kind(
            Kind::Relative {
                total: steps.unsigned_abs(),
            },
            steps,
        )
    }

    /// Pulse toward `steps`' direction until the limit switch reads triggered.
    /// `steps` bounds the travel; it does not stop the motion on its own.
    pub fn until_switch(steps: i64) -> Self {
        Self::with_kind(
            Kind::UntilSwitch {
                bound: steps.unsigned_abs(),
                zero_on_stop: false,
            },
            steps,
        )
    }

    /// Like `until_switch`, then define the stop point as position zero.
    pub fn homing(steps: i64) -> Self {
        Self::with_kind(
            Kind::UntilSwitch {
                bound: steps.unsigned_abs(),
                zero_on_stop: true,
            },
            steps,
        )
    }

    fn with_kind(kind: Kind, steps: i64) -> Self {
        Self {
            kind,
            forward: steps > 0,
            pulses: 0,
            dir_set: false,
            done: false,
        }
    }

    pub fn pulses(&self) -> u64 {
        self.pulses
    }

    pub fn needs_switch(&self) -> bool {
        matches!(self.kind, Kind::UntilSwitch { .. })
    }

    /// Travel bound for switch-terminated motions, `None` for relative ones.
    pub fn bound(&self) -> Option<u64> {
        match self.kind {
            Kind::UntilSwitch { bound, .. } => Some(bound),
            Kind::Relative { .. } => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    fn signed(&self) -> i64 {
        let n = i64::try_from(self.pulses).unwrap_or(i64::MAX);
        if self.forward { n } else { -n }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionStatus {
    Running,
    Complete { pulses: u64 },
}

pub struct LinearAxis {
    name: &'static str,
    pulse: Box<dyn DigitalOutput>,
    dir: Box<dyn DigitalOutput>,
    half_period: Duration,
    forward_high: bool,
    position: i64,
    homed: bool,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl std::fmt::Debug for LinearAxis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinearAxis")
            .field("name", &self.name)
            .field("half_period", &self.half_period)
            .field("forward_high", &self.forward_high)
            .field("position", &self.position)
            .field("homed", &self.homed)
            .finish_non_exhaustive()
    }
}

impl LinearAxis {
    pub fn new(
        name: &'static str,
        pulse: Box<dyn DigitalOutput>,
        dir: Box<dyn DigitalOutput>,
        cfg: AxisCfg,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        Self {
            name,
            pulse,
            dir,
            half_period: cfg.half_period,
            forward_high: cfg.forward_high,
            position: 0,
            homed: false,
            clock,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn is_homed(&self) -> bool {
        self.homed
    }

    pub fn half_period(&self) -> Duration {
        self.half_period
    }

    /// Configure both lines and park the pulse line LOW.
    pub fn init(&mut self) -> Result<()> {
        hw(self.pulse.init(), "init pulse line")?;
        hw(self.dir.init(), "init direction line")?;
        hw(self.pulse.set_state(false), "park pulse line")
    }

    /// Change the pulse half-period. Zero is ignored.
    pub fn set_pulse_interval(&mut self, half_period: Duration) {
        if half_period.is_zero() {
            tracing::warn!(axis = self.name, "ignoring zero pulse interval");
            return;
        }
        self.half_period = half_period;
    }

    /// Plan an absolute move. Only meaningful once the axis is homed.
    pub fn plan_move_to(&self, target: i64) -> Result<Motion> {
        if !self.homed {
            return Err(FfjError::NotHomed(self.name).into());
        }
        Ok(Motion::relative(target - self.position))
    }

    /// Advance `motion` by at most one pulse.
    ///
    /// Switch-terminated motions sample `limit` before each pulse, so a switch
    /// already closed at the start yields zero pulses. Position only changes
    /// when the motion completes.
    pub fn step(
        &mut self,
        motion: &mut Motion,
        limit: Option<&mut dyn BinarySensor>,
    ) -> Result<MotionStatus> {
        if motion.done {
            return Ok(MotionStatus::Complete {
                pulses: motion.pulses,
            });
        }
        match motion.kind {
            Kind::Relative { total } => {
                if total == 0 {
                    return Ok(self.finish(motion));
                }
                self.ensure_direction(motion)?;
                self.pulse_once()?;
                motion.pulses += 1;
                if motion.pulses >= total {
                    return Ok(self.finish(motion));
                }
                Ok(MotionStatus::Running)
            }
            Kind::UntilSwitch { .. } => {
                let Some(limit) = limit else {
                    return Err(FfjError::State(format!(
                        "{} motion needs a limit switch",
                        self.name
                    ))
                    .into());
                };
                if limit.is_triggered() {
                    return Ok(self.finish(motion));
                }
                self.ensure_direction(motion)?;
                self.pulse_once()?;
                motion.pulses += 1;
                Ok(MotionStatus::Running)
            }
        }
    }

    /// Abandon `motion` mid-way. Position is left untouched and the axis
    /// loses its reference.
    pub fn interrupt(&mut self, motion: &mut Motion) {
        if motion.done {
            return;
        }
        motion.done = true;
        if self.homed {
            tracing::warn!(
                axis = self.name,
                pulses = motion.pulses,
                "motion interrupted; axis must be re-homed"
            );
        }
        self.homed = false;
    }

    /// Drive `motion` to completion, polling `interlock` before every pulse.
    pub fn run(
        &mut self,
        mut motion: Motion,
        mut limit: Option<&mut dyn BinarySensor>,
        interlock: &mut Interlock,
    ) -> Result<u64> {
        loop {
            if interlock.tripped() {
                self.interrupt(&mut motion);
                return Err(FfjError::Cancelled.into());
            }
            let status = match limit {
                Some(ref mut l) => self.step(&mut motion, Some(&mut **l)),
                None => self.step(&mut motion, None),
            };
            match status {
                Ok(MotionStatus::Running) => {}
                Ok(MotionStatus::Complete { pulses }) => return Ok(pulses),
                Err(e) => {
                    self.interrupt(&mut motion);
                    return Err(e);
                }
            }
        }
    }

    pub fn move_relative(&mut self, steps: i64, interlock: &mut Interlock) -> Result<()> {
        self.run(Motion::relative(steps), None, interlock).map(|_| ())
    }

    /// Returns the number of pulses emitted before the switch closed.
    pub fn move_until_switch(
        &mut self,
        steps: i64,
        limit: &mut dyn BinarySensor,
        interlock: &mut Interlock,
    ) -> Result<u64> {
        self.run(Motion::until_switch(steps), Some(limit), interlock)
    }

    /// Seek the reference switch and define its position as zero.
    pub fn home(
        &mut self,
        steps: i64,
        limit: &mut dyn BinarySensor,
        interlock: &mut Interlock,
    ) -> Result<u64> {
        self.run(Motion::homing(steps), Some(limit), interlock)
    }

    pub fn move_to(&mut self, target: i64, interlock: &mut Interlock) -> Result<()> {
        let motion = self.plan_move_to(target)?;
        self.run(motion, None, interlock).map(|_| ())
    }

    fn ensure_direction(&mut self, motion: &mut Motion) -> Result<()> {
        if !motion.dir_set {
            let level = motion.forward == self.forward_high;
            hw(self.dir.set_state(level), "set direction")?;
            motion.dir_set = true;
        }
        Ok(())
    }

    fn pulse_once(&mut self) -> Result<()> {
        hw(self.pulse.set_state(true), "pulse high")?;
        self.clock.sleep(self.half_period);
        hw(self.pulse.set_state(false), "pulse low")?;
        self.clock.sleep(self.half_period);
        Ok(())
    }

    fn finish(&mut self, motion: &mut Motion) -> MotionStatus {
        motion.done = true;
        match motion.kind {
            Kind::UntilSwitch {
                zero_on_stop: true,
                bound,
            } => {
                if motion.pulses > bound {
                    tracing::warn!(
                        axis = self.name,
                        pulses = motion.pulses,
                        bound,
                        "homing overran its nominal travel"
                    );
                }
                self.position = 0;
                self.homed = true;
                tracing::info!(axis = self.name, pulses = motion.pulses, "homed");
            }
            _ => {
                self.position += motion.signed();
                tracing::debug!(
                    axis = self.name,
                    pulses = motion.pulses,
                    position = self.position,
                    "motion complete"
                );
            }
        }
        MotionStatus::Complete {
            pulses: motion.pulses,
        }
    }
}
