//! Scripted collaborators for tests and dry runs.
//!
//! Every mock hands out cheap clones that share state, so a test keeps a
//! handle after moving the mock into the machine.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use ffj_traits::{
    AudibleSignal, BinarySensor, BoxError, Clock, DigitalOutput, NvStore, PwmOutput, TextDisplay,
    WeightSensor,
};

use crate::actuators::{DcMotor, Relay};
use crate::axis::LinearAxis;
use crate::config::AxesCfg;
use crate::error::FfjError;
use crate::machine::{Axes, Buttons, Limits, Machine};

/// Virtual clock: `sleep` advances time instantly.
#[derive(Debug, Clone)]
pub struct ManualClock {
    epoch: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    pub fn advance(&self, d: Duration) {
        let mut off = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *off += d;
    }

    /// Virtual time since construction.
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.epoch + self.elapsed()
    }

    fn sleep(&self, d: Duration) {
        self.advance(d);
    }
}

#[derive(Debug, Default)]
struct PinState {
    level: Cell<bool>,
    writes: Cell<u32>,
    rises: Cell<u64>,
    log: Option<(&'static str, RiseLog)>,
}

/// Names of pins in the order they rose, shared by every pin that logs to it.
#[derive(Debug, Clone, Default)]
pub struct RiseLog(Rc<RefCell<Vec<&'static str>>>);

impl RiseLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.0.borrow().clone()
    }

    /// Rise order with consecutive repeats collapsed.
    pub fn runs(&self) -> Vec<&'static str> {
        let mut out = self.names();
        out.dedup();
        out
    }
}

/// Output line that records its level, write count and rising edges.
#[derive(Debug, Clone, Default)]
pub struct SpyPin(Rc<PinState>);

impl SpyPin {
    pub fn new() -> Self {
        Self::default()
    }
    /// Pin that also appends `name` to `log` on every rising edge.
    pub fn logged(name: &'static str, log: &RiseLog) -> Self {
        Self(Rc::new(PinState {
            log: Some((name, log.clone())),
            ..PinState::default()
        }))
    }
    pub fn level(&self) -> bool {
        self.0.level.get()
    }
    pub fn writes(&self) -> u32 {
        self.0.writes.get()
    }
    /// LOW-to-HIGH transitions; one per stepper pulse.
    pub fn rises(&self) -> u64 {
        self.0.rises.get()
    }
}

impl DigitalOutput for SpyPin {
    fn set_state(&mut self, high: bool) -> Result<(), BoxError> {
        if high && !self.0.level.get() {
            self.0.rises.set(self.0.rises.get() + 1);
            if let Some((name, log)) = &self.0.log {
                log.0.borrow_mut().push(*name);
            }
        }
        self.0.level.set(high);
        self.0.writes.set(self.0.writes.get() + 1);
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SpyPwm {
    duty: Rc<Cell<u8>>,
    writes: Rc<Cell<u32>>,
}

impl SpyPwm {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn duty(&self) -> u8 {
        self.duty.get()
    }
    pub fn writes(&self) -> u32 {
        self.writes.get()
    }
}

impl PwmOutput for SpyPwm {
    fn set_duty(&mut self, duty: u8) -> Result<(), BoxError> {
        self.duty.set(duty);
        self.writes.set(self.writes.get() + 1);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SwitchMode {
    Open,
    Closed,
    /// HIGH for exactly one poll, then open.
    Tap,
    /// Open for `left` more polls, then closed for good.
    After { left: u32 },
    /// Closed on every `n`-th poll, open otherwise.
    Every { n: u32, left: u32 },
}

/// Shared script for a limit switch or button.
#[derive(Debug, Clone)]
pub struct SwitchHandle {
    mode: Rc<Cell<SwitchMode>>,
    polls: Rc<Cell<u64>>,
}

impl SwitchHandle {
    fn with(mode: SwitchMode) -> Self {
        Self {
            mode: Rc::new(Cell::new(mode)),
            polls: Rc::new(Cell::new(0)),
        }
    }
    pub fn open() -> Self {
        Self::with(SwitchMode::Open)
    }
    pub fn closed() -> Self {
        Self::with(SwitchMode::Closed)
    }
    /// Open for `n` polls, then closed.
    pub fn after(n: u32) -> Self {
        Self::with(SwitchMode::After { left: n })
    }
    /// Open for `n` polls, closed on the next, and again.
    pub fn every(n: u32) -> Self {
        Self::with(SwitchMode::Every { n, left: n })
    }
    pub fn set_closed(&self, closed: bool) {
        self.mode.set(if closed {
            SwitchMode::Closed
        } else {
            SwitchMode::Open
        });
    }
    /// Press and release within one poll.
    pub fn tap(&self) {
        self.mode.set(SwitchMode::Tap);
    }
    pub fn polls(&self) -> u64 {
        self.polls.get()
    }
    pub fn sensor(&self) -> ScriptedSwitch {
        ScriptedSwitch(self.clone())
    }
}

#[derive(Debug)]
pub struct ScriptedSwitch(SwitchHandle);

impl BinarySensor for ScriptedSwitch {
    fn is_triggered(&mut self) -> bool {
        let h = &self.0;
        h.polls.set(h.polls.get() + 1);
        match h.mode.get() {
            SwitchMode::Open => false,
            SwitchMode::Closed => true,
            SwitchMode::Tap => {
                h.mode.set(SwitchMode::Open);
                true
            }
            SwitchMode::After { left: 0 } => {
                h.mode.set(SwitchMode::Closed);
                true
            }
            SwitchMode::After { left } => {
                h.mode.set(SwitchMode::After { left: left - 1 });
                false
            }
            SwitchMode::Every { n, left: 0 } => {
                h.mode.set(SwitchMode::Every { n, left: n });
                true
            }
            SwitchMode::Every { n, left } => {
                h.mode.set(SwitchMode::Every { n, left: left - 1 });
                false
            }
        }
    }
}

#[derive(Debug, Default)]
struct WeightState {
    readings: Vec<Option<f32>>,
    idx: usize,
    ramp_g: Option<f32>,
    current: f32,
    tares: u32,
}

/// Scripted weight source: a fixed list of readings (`None` = not ready,
/// last entry repeats) or a ramp that grows per sample and restarts on tare.
#[derive(Debug, Clone, Default)]
pub struct WeightScript(Rc<RefCell<WeightState>>);

impl WeightScript {
    pub fn readings(readings: &[Option<f32>]) -> Self {
        Self(Rc::new(RefCell::new(WeightState {
            readings: readings.to_vec(),
            ..WeightState::default()
        })))
    }

    pub fn ramp(step_g: f32) -> Self {
        Self(Rc::new(RefCell::new(WeightState {
            ramp_g: Some(step_g),
            ..WeightState::default()
        })))
    }

    pub fn tares(&self) -> u32 {
        self.0.borrow().tares
    }

    pub fn sensor(&self) -> ScriptedWeight {
        ScriptedWeight(self.clone())
    }
}

#[derive(Debug)]
pub struct ScriptedWeight(WeightScript);

impl WeightSensor for ScriptedWeight {
    fn tare(&mut self) -> Result<(), BoxError> {
        let mut s = (self.0).0.borrow_mut();
        s.tares += 1;
        s.current = 0.0;
        Ok(())
    }

    fn sample(&mut self, _n: u8) -> Result<f32, BoxError> {
        let mut s = (self.0).0.borrow_mut();
        if let Some(step) = s.ramp_g {
            s.current += step;
            return Ok(s.current);
        }
        let i = s.idx.min(s.readings.len().saturating_sub(1));
        s.idx += 1;
        match s.readings.get(i).copied().flatten() {
            Some(g) => Ok(g),
            None => Err(Box::new(FfjError::SensorUnavailable)),
        }
    }
}

/// In-memory `NvStore` with switchable write failures.
#[derive(Debug, Clone, Default)]
pub struct MemStore {
    bytes: Rc<RefCell<Option<Vec<u8>>>>,
    fail: Rc<Cell<bool>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bytes(bytes: &[u8]) -> Self {
        let s = Self::default();
        *s.bytes.borrow_mut() = Some(bytes.to_vec());
        s
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail.set(fail);
    }

    pub fn bytes(&self) -> Option<Vec<u8>> {
        self.bytes.borrow().clone()
    }
}

impl NvStore for MemStore {
    fn load(&mut self) -> Result<Option<Vec<u8>>, BoxError> {
        Ok(self.bytes.borrow().clone())
    }

    fn store(&mut self, bytes: &[u8]) -> Result<(), BoxError> {
        if self.fail.get() {
            return Err("simulated write failure".into());
        }
        *self.bytes.borrow_mut() = Some(bytes.to_vec());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullDisplay;

impl TextDisplay for NullDisplay {
    fn show_two_lines(&mut self, _l1: &str, _l2: &str, _clear: Option<Duration>) {}
}

#[derive(Debug, Clone, Default)]
pub struct RecordingDisplay(Rc<RefCell<Vec<(String, String)>>>);

impl RecordingDisplay {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn lines(&self) -> Vec<(String, String)> {
        self.0.borrow().clone()
    }
}

impl TextDisplay for RecordingDisplay {
    fn show_two_lines(&mut self, l1: &str, l2: &str, _clear: Option<Duration>) {
        self.0.borrow_mut().push((l1.to_owned(), l2.to_owned()));
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordingBuzzer(Rc<RefCell<Vec<(u8, u16, u16)>>>);

impl RecordingBuzzer {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn patterns(&self) -> Vec<(u8, u16, u16)> {
        self.0.borrow().clone()
    }
}

impl AudibleSignal for RecordingBuzzer {
    fn pattern(&mut self, repeats: u8, on_ms: u16, off_ms: u16) {
        self.0.borrow_mut().push((repeats, on_ms, off_ms));
    }
}

/// Handles into a machine assembled by [`mock_machine`].
#[derive(Debug, Clone)]
pub struct RigHandles {
    pub clock: ManualClock,
    /// Stepper pulse rises across all axes, by axis name.
    pub pulse_log: RiseLog,
    pub slider_pulse: SpyPin,
    pub sealer_pulse: SpyPin,
    pub mixer_pulse: SpyPin,
    pub tool_pulse: SpyPin,
    pub slider_home: SwitchHandle,
    pub sealer_up: SwitchHandle,
    pub sealer_down: SwitchHandle,
    pub mixer_up: SwitchHandle,
    pub mixer_down: SwitchHandle,
    pub start: SwitchHandle,
    pub reset: SwitchHandle,
    pub camera: SwitchHandle,
    pub pump_enable: SpyPin,
    pub chopper_enable: SpyPin,
    pub camera_relay: SpyPin,
    pub motor_relay: SpyPin,
    pub weight: WeightScript,
    pub display: RecordingDisplay,
    pub buzzer: RecordingBuzzer,
}

impl RigHandles {
    /// Total stepper pulses across all four axes.
    pub fn total_pulses(&self) -> u64 {
        self.slider_pulse.rises()
            + self.sealer_pulse.rises()
            + self.mixer_pulse.rises()
            + self.tool_pulse.rises()
    }
}

/// Machine wired entirely to mocks. Limit switches close every `switch_every`
/// polls; the scale ramps by `ramp_g` per sample.
pub fn mock_machine(axes: AxesCfg, switch_every: u32, ramp_g: f32) -> (Machine, RigHandles) {
    let pulse_log = RiseLog::new();
    let h = RigHandles {
        clock: ManualClock::new(),
        slider_pulse: SpyPin::logged("slider", &pulse_log),
        sealer_pulse: SpyPin::logged("sealer", &pulse_log),
        mixer_pulse: SpyPin::logged("mixer", &pulse_log),
        tool_pulse: SpyPin::logged("mixing_tool", &pulse_log),
        pulse_log,
        slider_home: SwitchHandle::every(switch_every),
        sealer_up: SwitchHandle::every(switch_every),
        sealer_down: SwitchHandle::every(switch_every),
        mixer_up: SwitchHandle::every(switch_every),
        mixer_down: SwitchHandle::every(switch_every),
        start: SwitchHandle::open(),
        reset: SwitchHandle::open(),
        camera: SwitchHandle::open(),
        pump_enable: SpyPin::new(),
        chopper_enable: SpyPin::new(),
        camera_relay: SpyPin::new(),
        motor_relay: SpyPin::new(),
        weight: WeightScript::ramp(ramp_g),
        display: RecordingDisplay::new(),
        buzzer: RecordingBuzzer::new(),
    };
    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(h.clock.clone());
    let axis = |name, pulse: &SpyPin, cfg| {
        LinearAxis::new(
            name,
            Box::new(pulse.clone()),
            Box::new(SpyPin::new()),
            cfg,
            clock.clone(),
        )
    };
    let machine = Machine {
        axes: Axes {
            slider: axis("slider", &h.slider_pulse, axes.slider),
            sealer: axis("sealer", &h.sealer_pulse, axes.sealer),
            mixer: axis("mixer", &h.mixer_pulse, axes.mixer),
            mixing_tool: axis("mixing_tool", &h.tool_pulse, axes.mixing_tool),
        },
        limits: Limits {
            slider_home: Box::new(h.slider_home.sensor()),
            sealer_up: Box::new(h.sealer_up.sensor()),
            sealer_down: Box::new(h.sealer_down.sensor()),
            mixer_up: Box::new(h.mixer_up.sensor()),
            mixer_down: Box::new(h.mixer_down.sensor()),
        },
        buttons: Buttons {
            start: Box::new(h.start.sensor()),
            reset: Box::new(h.reset.sensor()),
            camera: Box::new(h.camera.sensor()),
        },
        pump: DcMotor::new(
            "pump",
            Box::new(h.pump_enable.clone()),
            Box::new(SpyPwm::new()),
            100,
        ),
        chopper: DcMotor::new(
            "chopper",
            Box::new(h.chopper_enable.clone()),
            Box::new(SpyPwm::new()),
            50,
        ),
        camera: Relay::active_low("camera", Box::new(h.camera_relay.clone())),
        motor_power: Relay::active_low("motor_power", Box::new(h.motor_relay.clone())),
        weight: Box::new(h.weight.sensor()),
        display: Box::new(h.display.clone()),
        buzzer: Box::new(h.buzzer.clone()),
        clock,
    };
    (machine, h)
}
