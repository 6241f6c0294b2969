use std::time::Duration;

use ffj_core::mocks::{MemStore, RigHandles, SwitchHandle, mock_machine};
use ffj_core::{
    AxesCfg, CameraCfg, CancelToken, ControlState, Controller, ControllerCfg, DoseCfg, Interlock,
    Machine, MotionCfg, PowerCfg, SequenceCfg, Sequencer, Stage, StageStore, Tone,
};

fn fast_cfg() -> SequenceCfg {
    SequenceCfg {
        motion: MotionCfg {
            slider_home_steps: -500,
            sealer_up_steps: 100,
            sealer_down_steps: -100,
            mixer_up_steps: -400,
            mixer_down_steps: 400,
            mixer_station: 18,
            sealer_station: 57,
            stir_steps: 10,
            cover_lift_half_period: Duration::from_micros(10),
            settle: Duration::from_millis(20),
        },
        dose: DoseCfg {
            poll_interval: Duration::from_millis(10),
            samples: 1,
            ..DoseCfg::default()
        },
        camera: CameraCfg::default(),
    }
}

struct Bench {
    machine: Machine,
    h: RigHandles,
    seq: Sequencer,
    ctrl: Controller,
}

fn bench(mem: &MemStore) -> Bench {
    let (mut machine, h) = mock_machine(AxesCfg::default(), 5, 100.0);
    machine.init().expect("init");
    let store = StageStore::open(Box::new(mem.clone())).expect("store");
    let cfg = fast_cfg();
    let seq = Sequencer::new(store, cfg);
    let ctrl = Controller::new(
        ControllerCfg::default(),
        cfg.camera,
        PowerCfg::default(),
        &machine,
    );
    Bench {
        machine,
        h,
        seq,
        ctrl,
    }
}

impl Bench {
    fn poll(&mut self, il: &mut Interlock) -> ControlState {
        let st = self
            .ctrl
            .poll_once(&mut self.machine, &mut self.seq, il)
            .expect("poll");
        self.h.clock.advance(self.ctrl.wait_hint());
        st
    }

    fn poll_until(&mut self, il: &mut Interlock, want: impl Fn(ControlState) -> bool) -> ControlState {
        for _ in 0..100_000 {
            let st = self.poll(il);
            if want(st) {
                return st;
            }
        }
        panic!("state never reached");
    }
}

#[test]
fn idle_until_start_pressed() {
    let mem = MemStore::new();
    let mut b = bench(&mem);
    let mut il = Interlock::new(CancelToken::new());
    for _ in 0..10 {
        assert_eq!(b.poll(&mut il), ControlState::Idle);
    }
    assert_eq!(b.h.total_pulses(), 0);
    assert!(!b.machine.motor_power.is_on());
}

#[test]
fn start_button_runs_batch_to_fermenting() {
    let mem = MemStore::new();
    let mut b = bench(&mem);
    let mut il = Interlock::new(CancelToken::new());

    b.h.start.tap();
    let st = b.poll(&mut il);
    assert_eq!(st, ControlState::Running(Stage::BananaAdded));
    assert!(b.machine.motor_power.is_on());

    b.poll_until(&mut il, |s| s == ControlState::Fermenting);
    assert_eq!(b.seq.stage(), Stage::Fermenting);
    assert!(!b.machine.motor_power.is_on());
    assert!(!b.ctrl.batch_running());

    // fermenting: the start button no longer does anything
    let pulses = b.h.total_pulses();
    b.h.start.tap();
    for _ in 0..5 {
        assert_eq!(b.poll(&mut il), ControlState::Fermenting);
    }
    assert_eq!(b.h.total_pulses(), pulses);
}

fn tone(t: Tone) -> Vec<(u8, u16, u16)> {
    t.beeps()
        .iter()
        .map(|b| (b.repeats, b.on_ms, b.off_ms))
        .collect()
}

#[test]
fn motor_power_switches_with_their_tones() {
    let mem = MemStore::new();
    let mut b = bench(&mem);
    let mut il = Interlock::new(CancelToken::new());

    b.h.start.tap();
    b.poll(&mut il);
    assert!(b.h.buzzer.patterns().starts_with(&tone(Tone::PowerOn)));

    b.poll_until(&mut il, |s| s == ControlState::Fermenting);
    let mut finish = tone(Tone::End);
    finish.extend(tone(Tone::PowerOff));
    assert!(b.h.buzzer.patterns().ends_with(&finish));
}

#[test]
fn held_button_starts_only_once() {
    let mem = MemStore::new();
    let mut b = bench(&mem);
    let mut il = Interlock::new(CancelToken::new());
    b.h.start.set_closed(true);
    b.poll_until(&mut il, |s| s == ControlState::Fermenting);
    b.h.start.set_closed(false);
    assert_eq!(b.seq.stage(), Stage::Fermenting);
}

#[test]
fn camera_button_toggles_and_window_expires() {
    let mem = MemStore::new();
    let mut b = bench(&mem);
    let mut il = Interlock::new(CancelToken::new());

    b.h.camera.tap();
    b.poll(&mut il);
    assert!(b.machine.camera.is_on());
    assert!(!b.h.camera_relay.level());
    assert!(b.ctrl.camera_timer_active());

    b.h.clock.advance(Duration::from_secs(290));
    b.poll(&mut il);
    assert!(b.machine.camera.is_on());

    b.h.clock.advance(Duration::from_secs(15));
    b.poll(&mut il);
    assert!(!b.machine.camera.is_on());
    assert!(b.h.camera_relay.level());
    assert!(!b.ctrl.camera_timer_active());
}

#[test]
fn second_camera_press_closes_early() {
    let mem = MemStore::new();
    let mut b = bench(&mem);
    let mut il = Interlock::new(CancelToken::new());

    b.h.camera.tap();
    b.poll(&mut il);
    b.poll(&mut il);
    b.h.camera.tap();
    b.poll(&mut il);
    assert!(!b.machine.camera.is_on());
    assert!(!b.ctrl.camera_timer_active());
    let lines = b.h.display.lines();
    assert_eq!(lines.last().map(|l| l.1.as_str()), Some("is closed."));
}

#[test]
fn estop_halts_then_reset_acknowledges() {
    let mem = MemStore::new();
    let mut b = bench(&mem);
    let estop = SwitchHandle::open();
    let mut il = Interlock::new(CancelToken::new()).with_estop(Box::new(estop.sensor()), 2);

    b.h.start.tap();
    b.poll_until(&mut il, |s| s == ControlState::Running(Stage::Mixed));
    let pulses = b.h.total_pulses();

    estop.set_closed(true);
    b.poll_until(&mut il, |s| s == ControlState::Halted);
    assert!(!b.machine.pump.is_on());
    assert!(!b.machine.chopper.is_on());
    assert!(!b.machine.motor_power.is_on());
    assert_eq!(b.seq.stage(), Stage::MolassesAdded);
    assert!(!b.seq.is_busy());

    // stays halted even after the input clears
    estop.set_closed(false);
    let frozen = b.h.total_pulses();
    assert!(frozen >= pulses);
    for _ in 0..3 {
        assert_eq!(b.poll(&mut il), ControlState::Halted);
    }
    assert_eq!(b.h.total_pulses(), frozen);

    b.h.reset.tap();
    assert_eq!(b.poll(&mut il), ControlState::Idle);
    assert!(!il.is_latched());
    // acknowledging does not clear progress
    assert_eq!(b.seq.stage(), Stage::MolassesAdded);

    b.h.start.tap();
    b.poll_until(&mut il, |s| s == ControlState::Fermenting);
}

#[test]
fn reset_button_clears_progress_when_idle() {
    let mem = MemStore::new();
    let mut b = bench(&mem);
    let mut il = Interlock::new(CancelToken::new());
    b.seq
        .advance(Stage::BananaAdded, &mut b.machine, &mut il)
        .unwrap();
    assert_eq!(b.seq.stage(), Stage::BananaAdded);

    b.h.reset.tap();
    assert_eq!(b.poll(&mut il), ControlState::Idle);
    assert_eq!(b.seq.stage(), Stage::Ready);
}

#[test]
fn run_returns_when_cancelled() {
    let mem = MemStore::new();
    let mut b = bench(&mem);
    let token = CancelToken::new();
    let mut il = Interlock::new(token.clone());
    token.cancel();
    let st = b
        .ctrl
        .run(&mut b.machine, &mut b.seq, &mut il, Some(1000))
        .unwrap();
    assert_eq!(st, ControlState::Halted);
}

#[test]
fn run_honours_poll_limit() {
    let mem = MemStore::new();
    let mut b = bench(&mem);
    let mut il = Interlock::new(CancelToken::new());
    let st = b
        .ctrl
        .run(&mut b.machine, &mut b.seq, &mut il, Some(3))
        .unwrap();
    assert_eq!(st, ControlState::Idle);
    assert_eq!(b.h.clock.elapsed(), Duration::from_millis(100));
}
