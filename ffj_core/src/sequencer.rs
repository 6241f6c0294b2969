//! Stage sequencing.
//!
//! Every pipeline stage has a fixed plan: a list of [`Op`]s executed in
//! order. The plan runs one tick at a time: a tick emits at most one stepper
//! pulse or one weight poll, so the controller keeps polling its buttons,
//! camera timer and interlock between pulses. A stage's flag is committed only
//! after its last op completes, so a power loss mid-stage replays the whole
//! stage on the next start.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::axis::{Motion, MotionStatus};
use crate::config::{MotionCfg, SequenceCfg};
use crate::dosing::{DoseRun, DosingStatus, Ingredient};
use crate::error::{FfjError, Result};
use crate::interlock::Interlock;
use crate::machine::{AxisId, LimitId, Machine};
use crate::signals::Tone;
use crate::state::{Stage, StageStore};

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Tone(Tone),
    Show(&'static str, &'static str),
    SetInterval(AxisId, Duration),
    /// Seek the limit switch and define it as position zero.
    Home {
        axis: AxisId,
        steps: i64,
        limit: LimitId,
    },
    UntilLimit {
        axis: AxisId,
        steps: i64,
        limit: LimitId,
    },
    MoveTo {
        axis: AxisId,
        position: i64,
    },
    Move {
        axis: AxisId,
        steps: i64,
    },
    Dose(Ingredient),
    Settle(Duration),
}

/// Raise the sealer and mixer out of the way, then home the slider.
pub fn reset_slider_plan(m: &MotionCfg) -> Vec<Op> {
    vec![
        Op::Tone(Tone::Start),
        Op::SetInterval(AxisId::Sealer, m.cover_lift_half_period),
        Op::Home {
            axis: AxisId::Sealer,
            steps: m.sealer_up_steps,
            limit: LimitId::SealerUp,
        },
        Op::Settle(m.settle),
        Op::Home {
            axis: AxisId::Mixer,
            steps: m.mixer_up_steps,
            limit: LimitId::MixerUp,
        },
        Op::Settle(m.settle),
        Op::Home {
            axis: AxisId::Slider,
            steps: m.slider_home_steps,
            limit: LimitId::SliderHome,
        },
        Op::Tone(Tone::End),
        Op::Settle(m.settle),
    ]
}

/// The ops that carry out `stage`. `Ready` has none.
pub fn stage_plan(stage: Stage, m: &MotionCfg) -> Vec<Op> {
    match stage {
        Stage::Ready => Vec::new(),
        Stage::BananaAdded => dose_plan(Ingredient::Banana),
        Stage::MolassesAdded => dose_plan(Ingredient::Molasses),
        Stage::Mixed => {
            let mut ops = vec![Op::Show("Mixing", "please wait")];
            ops.extend(reset_slider_plan(m));
            ops.extend([
                Op::MoveTo {
                    axis: AxisId::Slider,
                    position: m.mixer_station,
                },
                Op::Settle(m.settle),
                Op::Tone(Tone::Start),
                Op::UntilLimit {
                    axis: AxisId::Mixer,
                    steps: m.mixer_down_steps,
                    limit: LimitId::MixerDown,
                },
                Op::Tone(Tone::End),
                Op::Settle(m.settle),
                Op::Move {
                    axis: AxisId::MixingTool,
                    steps: m.stir_steps,
                },
                Op::Settle(m.settle),
                Op::Tone(Tone::Start),
                Op::Home {
                    axis: AxisId::Mixer,
                    steps: m.mixer_up_steps,
                    limit: LimitId::MixerUp,
                },
                Op::Tone(Tone::End),
            ]);
            ops
        }
        Stage::Sealed => {
            let mut ops = vec![Op::Show("Sealing", "please wait")];
            ops.extend(reset_slider_plan(m));
            ops.extend([
                Op::MoveTo {
                    axis: AxisId::Slider,
                    position: m.sealer_station,
                },
                Op::Settle(m.settle),
                Op::Tone(Tone::Start),
                Op::UntilLimit {
                    axis: AxisId::Sealer,
                    steps: m.sealer_down_steps,
                    limit: LimitId::SealerDown,
                },
                Op::Settle(m.settle),
                Op::Tone(Tone::End),
            ]);
            ops
        }
        Stage::Fermenting => vec![Op::Show("Fermenting", "batch sealed"), Op::Tone(Tone::End)],
    }
}

fn dose_plan(ingredient: Ingredient) -> Vec<Op> {
    let title = match ingredient {
        Ingredient::Banana => "Adding banana",
        Ingredient::Molasses => "Adding molasses",
    };
    vec![
        Op::Show(title, "please wait"),
        Op::Tone(Tone::Actuator),
        Op::Dose(ingredient),
        Op::Tone(Tone::Actuator),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    Started,
    Completed,
    AlreadyDone,
    Blocked { missing: Stage },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickStatus {
    Idle,
    Busy(Stage),
    /// Nothing to do until this much time has passed.
    Waiting(Stage, Duration),
    Committed(Stage),
}

#[derive(Debug)]
enum Running {
    Motion {
        axis: AxisId,
        limit: Option<LimitId>,
        motion: Motion,
    },
    Dose(DoseRun),
    Settle(Instant),
}

#[derive(Debug)]
struct Active {
    stage: Stage,
    ops: VecDeque<Op>,
    running: Option<Running>,
}

#[derive(Debug)]
pub struct Sequencer {
    store: StageStore,
    cfg: SequenceCfg,
    active: Option<Active>,
}

impl Sequencer {
    pub fn new(store: StageStore, cfg: SequenceCfg) -> Self {
        Self {
            store,
            cfg,
            active: None,
        }
    }

    pub fn store(&self) -> &StageStore {
        &self.store
    }

    pub fn cfg(&self) -> &SequenceCfg {
        &self.cfg
    }

    pub fn stage(&self) -> Stage {
        self.store.stage()
    }

    /// First stage whose flag is clear, `None` once fermenting.
    pub fn next_stage(&self) -> Option<Stage> {
        self.store.stage().next()
    }

    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_stage(&self) -> Option<Stage> {
        self.active.as_ref().map(|a| a.stage)
    }

    fn gate(&self, stage: Stage) -> Option<StageOutcome> {
        if stage == Stage::Ready || self.store.is_done(stage) {
            return Some(StageOutcome::AlreadyDone);
        }
        match stage.predecessor() {
            Some(p) if !self.store.is_done(p) => Some(StageOutcome::Blocked { missing: p }),
            _ => None,
        }
    }

    /// Queue `stage` for ticking. Returns without starting when the stage is
    /// already done or its predecessor is not.
    pub fn begin(&mut self, stage: Stage) -> Result<StageOutcome> {
        if let Some(active) = &self.active {
            return Err(FfjError::State(format!(
                "cannot start {stage} while {} is running",
                active.stage
            ))
            .into());
        }
        if let Some(outcome) = self.gate(stage) {
            match outcome {
                StageOutcome::AlreadyDone => tracing::info!(%stage, "already done; skipping"),
                StageOutcome::Blocked { missing } => {
                    tracing::warn!(%stage, %missing, "blocked by unfinished stage");
                }
                _ => {}
            }
            return Ok(outcome);
        }
        tracing::info!(%stage, "stage started");
        self.active = Some(Active {
            stage,
            ops: stage_plan(stage, &self.cfg.motion).into(),
            running: None,
        });
        Ok(StageOutcome::Started)
    }

    /// Advance the active stage by one small unit of work.
    ///
    /// On any error, including a tripped interlock, the stage is abandoned,
    /// actuators are stopped and nothing is committed.
    pub fn tick(&mut self, machine: &mut Machine, interlock: &mut Interlock) -> Result<TickStatus> {
        if self.active.is_none() {
            return Ok(TickStatus::Idle);
        }
        if interlock.tripped() {
            self.abort(machine);
            return Err(FfjError::Cancelled.into());
        }
        match self.tick_inner(machine) {
            Ok(status) => Ok(status),
            Err(e) => {
                self.abort(machine);
                Err(e)
            }
        }
    }

    fn tick_inner(&mut self, machine: &mut Machine) -> Result<TickStatus> {
        let cfg = self.cfg;
        let Some(active) = self.active.as_mut() else {
            return Ok(TickStatus::Idle);
        };
        let stage = active.stage;

        let Some(running) = active.running.as_mut() else {
            return match active.ops.pop_front() {
                Some(op) => {
                    active.running = start_op(op, machine, &cfg)?;
                    Ok(TickStatus::Busy(stage))
                }
                None => {
                    self.store.commit(stage)?;
                    self.active = None;
                    tracing::info!(%stage, "stage complete");
                    Ok(TickStatus::Committed(stage))
                }
            };
        };

        let finished = match running {
            Running::Motion {
                axis,
                limit,
                motion,
            } => {
                let (a, l) = machine.axis_and_limit(*axis, *limit);
                matches!(a.step(motion, l)?, MotionStatus::Complete { .. })
            }
            Running::Dose(run) => {
                let motor = match run.ingredient() {
                    Ingredient::Banana => &mut machine.chopper,
                    Ingredient::Molasses => &mut machine.pump,
                };
                match run.step(
                    motor,
                    machine.weight.as_mut(),
                    machine.display.as_mut(),
                    &*machine.clock,
                )? {
                    DosingStatus::Complete { .. } => true,
                    DosingStatus::Running => false,
                    DosingStatus::Waiting(d) => return Ok(TickStatus::Waiting(stage, d)),
                }
            }
            Running::Settle(until) => {
                let now = machine.clock.now();
                if now < *until {
                    return Ok(TickStatus::Waiting(stage, *until - now));
                }
                true
            }
        };
        if finished {
            active.running = None;
        }
        Ok(TickStatus::Busy(stage))
    }

    /// Abandon the active stage: stop actuators and invalidate any axis that
    /// was mid-motion. The stage flag stays clear.
    pub fn abort(&mut self, machine: &mut Machine) {
        let Some(mut active) = self.active.take() else {
            return;
        };
        if let Some(Running::Motion {
            axis, mut motion, ..
        }) = active.running.take()
        {
            machine.axes.get_mut(axis).interrupt(&mut motion);
        }
        machine.stop_actuators();
        tracing::warn!(stage = %active.stage, "stage aborted");
    }

    /// Run `stage` to completion, blocking.
    pub fn advance(
        &mut self,
        stage: Stage,
        machine: &mut Machine,
        interlock: &mut Interlock,
    ) -> Result<StageOutcome> {
        match self.begin(stage)? {
            StageOutcome::Started => {}
            other => return Ok(other),
        }
        loop {
            match self.tick(machine, interlock)? {
                TickStatus::Committed(_) => return Ok(StageOutcome::Completed),
                TickStatus::Waiting(_, d) => machine.clock.sleep(d),
                TickStatus::Busy(_) => {}
                TickStatus::Idle => {
                    return Err(FfjError::State(format!("{stage} vanished while running")).into());
                }
            }
        }
    }

    /// Run every remaining stage in order. Returns the stages executed.
    pub fn resume(&mut self, machine: &mut Machine, interlock: &mut Interlock) -> Result<Vec<Stage>> {
        let mut done = Vec::new();
        while let Some(stage) = self.next_stage() {
            match self.advance(stage, machine, interlock)? {
                StageOutcome::Completed => done.push(stage),
                other => {
                    return Err(FfjError::State(format!(
                        "resume stalled at {stage}: {other:?}"
                    ))
                    .into());
                }
            }
        }
        Ok(done)
    }

    /// Home the sealer, mixer and slider without touching progress.
    pub fn reset_slider(&mut self, machine: &mut Machine, interlock: &mut Interlock) -> Result<()> {
        if self.active.is_some() {
            return Err(FfjError::State("cannot home while a stage is running".into()).into());
        }
        for op in reset_slider_plan(&self.cfg.motion) {
            if interlock.tripped() {
                machine.stop_actuators();
                return Err(FfjError::Cancelled.into());
            }
            run_op_blocking(op, machine, &self.cfg, interlock)?;
        }
        Ok(())
    }

    /// Clear all progress. Refused while a stage is running.
    pub fn maintenance_reset(&mut self) -> Result<()> {
        if let Some(active) = &self.active {
            return Err(FfjError::State(format!(
                "cannot reset while {} is running",
                active.stage
            ))
            .into());
        }
        self.store.reset()
    }
}

/// Perform instant ops immediately; return the running state for the rest.
fn start_op(op: Op, machine: &mut Machine, cfg: &SequenceCfg) -> Result<Option<Running>> {
    tracing::debug!(?op, "op");
    Ok(match op {
        Op::Tone(t) => {
            machine.announce(t);
            None
        }
        Op::Show(a, b) => {
            machine.show(a, b);
            None
        }
        Op::SetInterval(axis, d) => {
            machine.axes.get_mut(axis).set_pulse_interval(d);
            None
        }
        Op::Home { axis, steps, limit } => Some(Running::Motion {
            axis,
            limit: Some(limit),
            motion: Motion::homing(steps),
        }),
        Op::UntilLimit { axis, steps, limit } => Some(Running::Motion {
            axis,
            limit: Some(limit),
            motion: Motion::until_switch(steps),
        }),
        Op::MoveTo { axis, position } => Some(Running::Motion {
            axis,
            limit: None,
            motion: machine.axes.get(axis).plan_move_to(position)?,
        }),
        Op::Move { axis, steps } => Some(Running::Motion {
            axis,
            limit: None,
            motion: Motion::relative(steps),
        }),
        Op::Dose(ingredient) => Some(Running::Dose(DoseRun::new(ingredient, &cfg.dose))),
        Op::Settle(d) if d.is_zero() => None,
        Op::Settle(d) => Some(Running::Settle(machine.clock.now() + d)),
    })
}

fn run_op_blocking(
    op: Op,
    machine: &mut Machine,
    cfg: &SequenceCfg,
    interlock: &mut Interlock,
) -> Result<()> {
    match start_op(op, machine, cfg)? {
        None => Ok(()),
        Some(Running::Motion {
            axis,
            limit,
            motion,
        }) => {
            let (a, l) = machine.axis_and_limit(axis, limit);
            a.run(motion, l, interlock).map(|_| ())
        }
        Some(Running::Dose(mut run)) => {
            let motor = match run.ingredient() {
                Ingredient::Banana => &mut machine.chopper,
                Ingredient::Molasses => &mut machine.pump,
            };
            crate::dosing::run_dose(
                &mut run,
                motor,
                machine.weight.as_mut(),
                machine.display.as_mut(),
                &*machine.clock,
                interlock,
            )
            .map(|_| ())
        }
        Some(Running::Settle(until)) => {
            let left = until.saturating_duration_since(machine.clock.now());
            machine.clock.sleep(left);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fermenting_plan_only_announces() {
        let ops = stage_plan(Stage::Fermenting, &MotionCfg::default());
        assert!(
            ops.iter()
                .all(|op| matches!(op, Op::Show(..) | Op::Tone(_)))
        );
    }

    #[test]
    fn mix_plan_homes_before_absolute_moves() {
        let ops = stage_plan(Stage::Mixed, &MotionCfg::default());
        let home = ops
            .iter()
            .position(|op| matches!(op, Op::Home { axis: AxisId::Slider, .. }))
            .unwrap();
        let station = ops
            .iter()
            .position(|op| matches!(op, Op::MoveTo { axis: AxisId::Slider, position: 18_000 }))
            .unwrap();
        assert!(home < station);
    }

    #[test]
    fn seal_plan_lowers_cover_toward_sealer_down() {
        let ops = stage_plan(Stage::Sealed, &MotionCfg::default());
        assert!(ops.contains(&Op::UntilLimit {
            axis: AxisId::Sealer,
            steps: -10_000,
            limit: LimitId::SealerDown,
        }));
        assert!(ops.contains(&Op::MoveTo {
            axis: AxisId::Slider,
            position: 57_000,
        }));
    }

    #[test]
    fn dose_plans_use_their_ingredient() {
        let m = MotionCfg::default();
        assert!(stage_plan(Stage::BananaAdded, &m).contains(&Op::Dose(Ingredient::Banana)));
        assert!(stage_plan(Stage::MolassesAdded, &m).contains(&Op::Dose(Ingredient::Molasses)));
        assert!(stage_plan(Stage::Ready, &m).is_empty());
    }
}
