//! Subcommand bodies: assemble what each needs, run it, print the outcome.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use eyre::WrapErr;
use ffj_config::Config;
use ffj_core::{
    CameraCfg, CancelToken, ControlState, Controller, ControllerCfg, FfjError, Interlock, Machine,
    PowerCfg, ProcessFlag, SequenceCfg, Sequencer, Stage, StageOutcome, map_hw_error,
};
use serde_json::json;

use crate::rig::{self, SimOptions};

/// Everything a command that moves hardware needs.
struct Session {
    machine: Machine,
    interlock: Interlock,
    seq: Sequencer,
    camera: CameraCfg,
    power: PowerCfg,
}

impl Session {
    fn open(cfg: &Config, token: CancelToken, sim: SimOptions) -> eyre::Result<Self> {
        let store = rig::open_store(cfg)?;
        let (mut machine, interlock) = rig::build(cfg, token, sim)?;
        machine.init().wrap_err("initialise machine")?;
        Ok(Self {
            machine,
            interlock,
            seq: Sequencer::new(store, SequenceCfg::from(cfg)),
            camera: CameraCfg::from(&cfg.camera),
            power: PowerCfg::from(&cfg.relays),
        })
    }

    /// Power the motors for `f`, cutting power again whatever the outcome.
    fn powered<T>(
        &mut self,
        f: impl FnOnce(&mut Sequencer, &mut Machine, &mut Interlock) -> eyre::Result<T>,
    ) -> eyre::Result<T> {
        self.machine.power_up_motors(self.power.motor_settle)?;
        let out = f(&mut self.seq, &mut self.machine, &mut self.interlock);
        if let Err(e) = self.machine.shutdown_motors(self.power.motor_settle) {
            tracing::error!(error = %e, "failed to cut motor power");
        }
        out
    }
}

fn timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

fn duration_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn emit_json(command: &str, mut body: serde_json::Value) {
    if let Some(obj) = body.as_object_mut() {
        obj.insert("command".into(), json!(command));
        obj.insert("timestamp".into(), json!(timestamp()));
    }
    println!("{body}");
}

fn state_name(state: ControlState) -> String {
    match state {
        ControlState::Idle => "idle".into(),
        ControlState::Running(stage) => format!("running:{stage}"),
        ControlState::Fermenting => "fermenting".into(),
        ControlState::Halted => "halted".into(),
    }
}

fn flags_json(seq: &Sequencer) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for flag in ProcessFlag::ALL {
        map.insert(flag.name().into(), json!(seq.store().flag(flag)));
    }
    serde_json::Value::Object(map)
}

pub fn run(
    cfg: &Config,
    token: CancelToken,
    max_loops: Option<u64>,
    press_start: bool,
    json: bool,
) -> eyre::Result<()> {
    let mut s = Session::open(cfg, token, SimOptions { press_start })?;
    let mut ctrl = Controller::new(
        ControllerCfg::from(&cfg.controller),
        s.camera,
        s.power,
        &s.machine,
    );
    s.machine.announce(ffj_core::Tone::PowerOn);
    s.machine.show("AutoFFJ", "ready");
    tracing::info!(stage = %s.seq.stage(), backend = rig::backend_name(), "control loop started");

    let start = Instant::now();
    let result = ctrl.run(&mut s.machine, &mut s.seq, &mut s.interlock, max_loops);

    // leave the rig safe whichever way the loop ended
    if let Err(e) = s.machine.shutdown_motors(s.power.motor_settle) {
        tracing::error!(error = %e, "failed to cut motor power");
    }
    if s.machine.camera.is_on()
        && let Err(e) = ctrl.close_camera(&mut s.machine)
    {
        tracing::error!(error = %e, "failed to switch camera off");
    }
    let state = result?;

    if json {
        emit_json(
            "run",
            json!({
                "state": state_name(state),
                "stage": s.seq.stage().name(),
                "flags": flags_json(&s.seq),
                "duration_ms": duration_ms(start),
            }),
        );
    } else {
        println!(
            "Control loop stopped: state={} stage={}",
            state_name(state),
            s.seq.stage()
        );
    }
    Ok(())
}

pub fn resume(cfg: &Config, token: CancelToken, json: bool) -> eyre::Result<()> {
    let mut s = Session::open(cfg, token, SimOptions::default())?;
    let from = s.seq.stage();
    let start = Instant::now();
    let done = s
        .powered(|seq, m, il| seq.resume(m, il))
        .wrap_err_with(|| format!("resume from {from}"))?;

    if json {
        let names: Vec<&str> = done.iter().map(|st| st.name()).collect();
        emit_json(
            "resume",
            json!({
                "from": from.name(),
                "stages": names,
                "stage": s.seq.stage().name(),
                "duration_ms": duration_ms(start),
            }),
        );
    } else if done.is_empty() {
        println!("Nothing to do: batch is already at {}", s.seq.stage());
    } else {
        for st in &done {
            println!("Completed {st}");
        }
        println!("Batch complete: stage={}", s.seq.stage());
    }
    Ok(())
}

pub fn advance(cfg: &Config, token: CancelToken, stage: Stage, json: bool) -> eyre::Result<()> {
    let mut s = Session::open(cfg, token, SimOptions::default())?;
    let start = Instant::now();
    let outcome = s
        .powered(|seq, m, il| seq.advance(stage, m, il))
        .wrap_err_with(|| format!("advance {stage}"))?;

    let (name, text) = match outcome {
        StageOutcome::Completed | StageOutcome::Started => {
            ("completed", format!("Completed {stage}"))
        }
        StageOutcome::AlreadyDone => ("already_done", format!("{stage} is already done")),
        StageOutcome::Blocked { missing } => (
            "blocked",
            format!("{stage} not run: {missing} has not been completed"),
        ),
    };
    if json {
        let missing = match outcome {
            StageOutcome::Blocked { missing } => Some(missing.name()),
            _ => None,
        };
        emit_json(
            "advance",
            json!({
                "target": stage.name(),
                "outcome": name,
                "missing": missing,
                "stage": s.seq.stage().name(),
                "duration_ms": duration_ms(start),
            }),
        );
    } else {
        println!("{text}");
    }
    Ok(())
}

pub fn status(cfg: &Config, json: bool) -> eyre::Result<()> {
    let store = rig::open_store(cfg)?;
    let snap = store.snapshot();
    let seq = Sequencer::new(store, SequenceCfg::from(cfg));
    if json {
        emit_json(
            "status",
            json!({
                "stage": snap.stage.name(),
                "next": seq.next_stage().map(Stage::name),
                "seq": snap.seq,
                "flags": flags_json(&seq),
                "path": cfg.state.path,
            }),
        );
        return Ok(());
    }
    println!("Progress file: {}", cfg.state.path);
    println!("Stage: {} (commit #{})", snap.stage, snap.seq);
    match seq.next_stage() {
        Some(next) => println!("Next: {next}"),
        None => println!("Next: none (fermenting; reset to start a new batch)"),
    }
    for flag in ProcessFlag::ALL {
        let mark = if seq.store().flag(flag) { "x" } else { " " };
        println!("  [{mark}] {}", flag.name());
    }
    Ok(())
}

pub fn reset(cfg: &Config, yes: bool, json: bool) -> eyre::Result<()> {
    if !yes {
        return Err(FfjError::State(
            "maintenance reset clears all progress; pass --yes to confirm".into(),
        )
        .into());
    }
    let store = rig::open_store(cfg)?;
    let mut seq = Sequencer::new(store, SequenceCfg::from(cfg));
    let from = seq.stage();
    seq.maintenance_reset()?;
    if json {
        emit_json("reset", json!({ "from": from.name(), "stage": seq.stage().name() }));
    } else {
        println!("Progress reset (was {from})");
    }
    Ok(())
}

pub fn home(cfg: &Config, token: CancelToken, json: bool) -> eyre::Result<()> {
    let mut s = Session::open(cfg, token, SimOptions::default())?;
    let start = Instant::now();
    s.powered(|seq, m, il| seq.reset_slider(m, il))
        .wrap_err("home axes")?;
    let axes = &s.machine.axes;
    if json {
        emit_json(
            "home",
            json!({
                "slider": axes.slider.is_homed(),
                "sealer": axes.sealer.is_homed(),
                "mixer": axes.mixer.is_homed(),
                "duration_ms": duration_ms(start),
            }),
        );
    } else {
        println!("Slider, sealer and mixer homed");
    }
    Ok(())
}

pub fn camera(
    cfg: &Config,
    token: CancelToken,
    seconds: Option<u64>,
    json: bool,
) -> eyre::Result<()> {
    let mut s = Session::open(cfg, token, SimOptions::default())?;
    if let Some(secs) = seconds {
        s.camera.window = Duration::from_secs(secs);
    }
    let mut ctrl = Controller::new(
        ControllerCfg::from(&cfg.controller),
        s.camera,
        s.power,
        &s.machine,
    );
    let start = Instant::now();
    ctrl.open_camera(&mut s.machine)?;

    // the controller's own poll switches the camera off when the window ends
    let mut halted = false;
    while ctrl.camera_timer_active() {
        if ctrl.poll_once(&mut s.machine, &mut s.seq, &mut s.interlock)? == ControlState::Halted {
            halted = true;
            break;
        }
        s.machine.clock.sleep(ctrl.wait_hint());
    }
    if s.machine.camera.is_on() {
        ctrl.close_camera(&mut s.machine)?;
    }
    if halted {
        return Err(FfjError::Cancelled).wrap_err("camera window");
    }

    if json {
        emit_json(
            "camera",
            json!({
                "window_s": s.camera.window.as_secs(),
                "duration_ms": duration_ms(start),
            }),
        );
    } else {
        println!("Camera window closed after {}s", start.elapsed().as_secs());
    }
    Ok(())
}

pub fn switches(cfg: &Config, token: CancelToken, json: bool) -> eyre::Result<()> {
    let mut s = Session::open(cfg, token, SimOptions::default())?;
    let states = s.machine.limit_states();
    if json {
        let mut map = serde_json::Map::new();
        for (id, closed) in &states {
            map.insert(id.name().into(), json!(closed));
        }
        emit_json("switches", json!({ "switches": map }));
    } else {
        for (id, closed) in states {
            let text = if closed { "triggered" } else { "open" };
            println!("{:<12} {text}", id.name());
        }
    }
    Ok(())
}

pub fn self_check(cfg: &Config, token: CancelToken, json: bool) -> eyre::Result<()> {
    let mut s = Session::open(cfg, token, SimOptions::default())?;
    let grams = s
        .machine
        .weight
        .sample(1)
        .map_err(|e| map_hw_error(&*e))
        .wrap_err("read weight sensor")?;
    let stage = s.seq.stage();
    if json {
        emit_json(
            "self-check",
            json!({
                "ok": true,
                "backend": rig::backend_name(),
                "grams": grams,
                "stage": stage.name(),
            }),
        );
    } else {
        println!(
            "OK: backend={} weight={grams:.1}g stage={stage}",
            rig::backend_name()
        );
    }
    Ok(())
}
