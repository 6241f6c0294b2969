//! Top-level control loop.
//!
//! [`Controller::poll_once`] is one pass: camera button and timer, interlock,
//! reset button, then (if a batch is running) one sequencer tick. Buttons act
//! on their rising edge, so holding a button does not repeat its action.

use std::time::Duration;

use crate::config::{CameraCfg, ControllerCfg, PowerCfg};
use crate::error::Result;
use crate::interlock::Interlock;
use crate::machine::Machine;
use crate::sequencer::{Sequencer, StageOutcome, TickStatus};
use crate::signals::Tone;
use crate::state::{ProcessFlag, Stage};
use crate::timer::ExpiringTimer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineEvent {
    CameraTimeout,
}

/// Result of one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    /// Waiting for the start button.
    Idle,
    Running(Stage),
    /// Batch finished; nothing left to do until a maintenance reset.
    Fermenting,
    /// Interlock latched; press reset to acknowledge.
    Halted,
}

#[derive(Debug, Default)]
struct Edges {
    start: bool,
    reset: bool,
    camera: bool,
}

fn rising(prev: &mut bool, now: bool) -> bool {
    let edge = now && !*prev;
    *prev = now;
    edge
}

pub struct Controller {
    cfg: ControllerCfg,
    camera_cfg: CameraCfg,
    power: PowerCfg,
    timer: ExpiringTimer<MachineEvent>,
    edges: Edges,
    batch_running: bool,
    last: Option<ControlState>,
    wait: Duration,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("batch_running", &self.batch_running)
            .field("camera_timer", &self.timer.is_active())
            .field("last", &self.last)
            .finish_non_exhaustive()
    }
}

impl Controller {
    pub fn new(
        cfg: ControllerCfg,
        camera_cfg: CameraCfg,
        power: PowerCfg,
        machine: &Machine,
    ) -> Self {
        Self {
            cfg,
            camera_cfg,
            power,
            timer: ExpiringTimer::new(machine.clock.clone()),
            edges: Edges::default(),
            batch_running: false,
            last: None,
            wait: Duration::ZERO,
        }
    }

    pub fn camera_timer_active(&self) -> bool {
        self.timer.is_active()
    }

    pub fn batch_running(&self) -> bool {
        self.batch_running
    }

    /// Suggested sleep before the next poll.
    pub fn wait_hint(&self) -> Duration {
        self.wait
    }

    /// Turn the camera on and arm its window. No-op when already on.
    pub fn open_camera(&mut self, machine: &mut Machine) -> Result<()> {
        machine
            .display
            .show_two_lines("Camera webserver", "is now running.", Some(Duration::from_secs(2)));
        machine.camera_on(self.camera_cfg.relay_settle)?;
        self.timer.arm(self.camera_cfg.window, MachineEvent::CameraTimeout);
        tracing::info!(window_s = self.camera_cfg.window.as_secs(), "camera on");
        Ok(())
    }

    pub fn close_camera(&mut self, machine: &mut Machine) -> Result<()> {
        self.timer.cancel();
        machine
            .display
            .show_two_lines("Camera webserver", "is closed.", Some(Duration::from_secs(2)));
        machine.camera_off(self.camera_cfg.relay_settle)?;
        tracing::info!("camera off");
        Ok(())
    }

    pub fn poll_once(
        &mut self,
        machine: &mut Machine,
        seq: &mut Sequencer,
        interlock: &mut Interlock,
    ) -> Result<ControlState> {
        self.wait = self.cfg.idle_period;

        let camera_pressed = machine.buttons.camera.is_triggered();
        if rising(&mut self.edges.camera, camera_pressed) {
            if machine.camera.is_on() {
                self.close_camera(machine)?;
            } else {
                self.open_camera(machine)?;
            }
        }
        if let Some(MachineEvent::CameraTimeout) = self.timer.poll() {
            tracing::info!("camera window elapsed");
            machine.camera_off(self.camera_cfg.relay_settle)?;
        }

        let reset_pressed = rising(&mut self.edges.reset, machine.buttons.reset.is_triggered());
        let start_pressed = rising(&mut self.edges.start, machine.buttons.start.is_triggered());

        if interlock.tripped() {
            if seq.is_busy() {
                seq.abort(machine);
            }
            if self.batch_running {
                self.batch_running = false;
                if let Err(e) = machine.shutdown_motors(self.power.motor_settle) {
                    tracing::error!(error = %e, "failed to cut motor power");
                }
            }
            if reset_pressed {
                interlock.release();
                return Ok(self.report(ControlState::Idle));
            }
            return Ok(self.report(ControlState::Halted));
        }

        if !self.batch_running && reset_pressed {
            seq.maintenance_reset()?;
            machine.show("Progress", "reset");
            machine.announce(Tone::End);
        }

        if seq.store().flag(ProcessFlag::Fermenting) {
            return Ok(self.report(ControlState::Fermenting));
        }

        if !self.batch_running {
            if !start_pressed {
                return Ok(self.report(ControlState::Idle));
            }
            tracing::info!(from = %seq.stage(), "batch start requested");
            machine.power_up_motors(self.power.motor_settle)?;
            self.batch_running = true;
        }

        if !seq.is_busy() {
            let Some(next) = seq.next_stage() else {
                return self.finish_batch(machine);
            };
            if seq.begin(next)? != StageOutcome::Started {
                return self.finish_batch(machine);
            }
        }

        match seq.tick(machine, interlock) {
            Ok(TickStatus::Committed(Stage::Fermenting)) => self.finish_batch(machine),
            Ok(TickStatus::Committed(stage) | TickStatus::Busy(stage)) => {
                self.wait = Duration::ZERO;
                Ok(self.report(ControlState::Running(stage)))
            }
            Ok(TickStatus::Waiting(stage, d)) => {
                self.wait = d.min(self.cfg.idle_period);
                Ok(self.report(ControlState::Running(stage)))
            }
            Ok(TickStatus::Idle) => Ok(self.report(ControlState::Idle)),
            Err(e) => {
                self.batch_running = false;
                if let Err(e2) = machine.shutdown_motors(self.power.motor_settle) {
                    tracing::error!(error = %e2, "failed to cut motor power");
                }
                if interlock.is_latched() {
                    return Ok(self.report(ControlState::Halted));
                }
                Err(e)
            }
        }
    }

    /// Poll until the interlock's cancel token fires or `max_polls` passes.
    pub fn run(
        &mut self,
        machine: &mut Machine,
        seq: &mut Sequencer,
        interlock: &mut Interlock,
        max_polls: Option<u64>,
    ) -> Result<ControlState> {
        let mut polls = 0_u64;
        loop {
            let state = self.poll_once(machine, seq, interlock)?;
            polls += 1;
            if state == ControlState::Halted && interlock.token().is_cancelled() {
                return Ok(state);
            }
            if max_polls.is_some_and(|m| polls >= m) {
                return Ok(state);
            }
            machine.clock.sleep(self.wait);
        }
    }

    fn finish_batch(&mut self, machine: &mut Machine) -> Result<ControlState> {
        self.batch_running = false;
        machine.shutdown_motors(self.power.motor_settle)?;
        Ok(self.report(ControlState::Fermenting))
    }

    fn report(&mut self, state: ControlState) -> ControlState {
        if self.last != Some(state) {
            tracing::info!(?state, "controller state");
            self.last = Some(state);
        }
        state
    }
}
