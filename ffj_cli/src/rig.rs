//! Hardware assembly: turns a validated config into a [`Machine`], its
//! [`Interlock`] and the progress store.
//!
//! Without the `hardware` feature every line is simulated, so the whole CLI
//! can be exercised on a laptop or in CI.

use std::sync::Arc;

use eyre::WrapErr;
use ffj_config::Config;
use ffj_core::{
    Axes, AxesCfg, AxisCfg, Buttons, CancelToken, DcMotor, Interlock, Limits, LinearAxis, Machine,
    Relay, StageStore,
};
use ffj_hardware::FileStore;
use ffj_traits::{
    AudibleSignal, BinarySensor, Clock, DigitalOutput, MonotonicClock, PwmOutput, WeightSensor,
};

/// Source of the individual I/O lines.
trait Lines {
    fn output(&mut self, name: &'static str, bcm: u8) -> eyre::Result<Box<dyn DigitalOutput>>;
    fn pwm(&mut self, name: &'static str, bcm: u8) -> eyre::Result<Box<dyn PwmOutput>>;
    fn limit(&mut self, name: &'static str, bcm: u8) -> eyre::Result<Box<dyn BinarySensor>>;
    fn button(&mut self, name: &'static str, bcm: u8) -> eyre::Result<Box<dyn BinarySensor>>;
}

/// Options that only make sense for the simulated rig.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimOptions {
    /// Start button reads pressed on the first poll.
    pub press_start: bool,
}

pub fn open_store(cfg: &Config) -> eyre::Result<StageStore> {
    let file = FileStore::new(&cfg.state.path);
    StageStore::open(Box::new(file))
        .wrap_err_with(|| format!("open progress file {}", cfg.state.path))
}

pub fn backend_name() -> &'static str {
    if cfg!(all(feature = "hardware", target_os = "linux")) {
        "gpio"
    } else {
        "sim"
    }
}

/// Build the machine and its interlock. Lines are configured but not yet
/// driven; call [`Machine::init`] before use.
pub fn build(
    cfg: &Config,
    token: CancelToken,
    sim: SimOptions,
) -> eyre::Result<(Machine, Interlock)> {
    #[cfg(all(feature = "hardware", target_os = "linux"))]
    {
        let _ = sim;
        gpio_rig::build(cfg, token)
    }
    #[cfg(not(all(feature = "hardware", target_os = "linux")))]
    {
        sim_rig::build(cfg, token, sim)
    }
}

struct Peripherals {
    weight: Box<dyn WeightSensor>,
    buzzer: Box<dyn AudibleSignal>,
}

fn assemble(cfg: &Config, lines: &mut dyn Lines, extra: Peripherals) -> eyre::Result<Machine> {
    let p = &cfg.pins;
    let axes_cfg = AxesCfg::from(&cfg.axes);
    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(MonotonicClock::new());

    let mut axis = |name: &'static str, pul: u8, dir: u8, c: AxisCfg| -> eyre::Result<LinearAxis> {
        Ok(LinearAxis::new(
            name,
            lines.output(name, pul)?,
            lines.output(name, dir)?,
            c,
            clock.clone(),
        ))
    };
    let axes = Axes {
        slider: axis("slider", p.slider_pul, p.slider_dir, axes_cfg.slider)?,
        sealer: axis("sealer", p.sealer_pul, p.sealer_dir, axes_cfg.sealer)?,
        mixer: axis("mixer", p.mixer_pul, p.mixer_dir, axes_cfg.mixer)?,
        mixing_tool: axis("mixing_tool", p.mixing_pul, p.mixing_dir, axes_cfg.mixing_tool)?,
    };

    let limits = Limits {
        slider_home: lines.limit("slider_home", p.slider_home)?,
        sealer_up: lines.limit("sealer_up", p.sealer_up)?,
        sealer_down: lines.limit("sealer_down", p.sealer_down)?,
        mixer_up: lines.limit("mixer_up", p.mixer_up)?,
        mixer_down: lines.limit("mixer_down", p.mixer_down)?,
    };
    let buttons = Buttons {
        start: lines.button("start", p.start_button)?,
        reset: lines.button("reset", p.reset_button)?,
        camera: lines.button("camera", p.camera_button)?,
    };

    let relay = |name: &'static str, out: Box<dyn DigitalOutput>| {
        if cfg.relays.active_low {
            Relay::active_low(name, out)
        } else {
            Relay::active_high(name, out)
        }
    };

    Ok(Machine {
        axes,
        limits,
        buttons,
        pump: DcMotor::new(
            "pump",
            lines.output("pump_ena", p.pump_ena)?,
            lines.pwm("pump_pwm", p.pump_pwm)?,
            cfg.dosing.molasses_speed_pct,
        ),
        chopper: DcMotor::new(
            "chopper",
            lines.output("chopper_ena", p.chopper_ena)?,
            lines.pwm("chopper_pwm", p.chopper_pwm)?,
            cfg.dosing.banana_speed_pct,
        ),
        camera: relay("camera", lines.output("camera_relay", p.camera_relay)?),
        motor_power: relay("motor_power", lines.output("motor_relay", p.motor_relay)?),
        weight: extra.weight,
        display: Box::new(ffj_hardware::LogDisplay),
        buzzer: extra.buzzer,
        clock,
    })
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
mod sim_rig {
    use super::{Lines, Peripherals, SimOptions, assemble};
    use eyre::Result;
    use ffj_config::Config;
    use ffj_core::{CancelToken, Interlock, LoadCell, Machine, ScaleCfg};
    use ffj_hardware::{SimBuzzer, SimButton, SimOutput, SimPwm, SimSwitch, SimulatedScale};
    use ffj_traits::{BinarySensor, DigitalOutput, PwmOutput};

    struct SimLines {
        opts: SimOptions,
    }

    impl Lines for SimLines {
        fn output(&mut self, name: &'static str, _bcm: u8) -> Result<Box<dyn DigitalOutput>> {
            Ok(Box::new(SimOutput::new(name)))
        }

        fn pwm(&mut self, name: &'static str, _bcm: u8) -> Result<Box<dyn PwmOutput>> {
            Ok(Box::new(SimPwm::new(name)))
        }

        fn limit(&mut self, name: &'static str, _bcm: u8) -> Result<Box<dyn BinarySensor>> {
            Ok(Box::new(SimSwitch::new(name)))
        }

        fn button(&mut self, name: &'static str, _bcm: u8) -> Result<Box<dyn BinarySensor>> {
            if name == "start" && self.opts.press_start {
                return Ok(Box::new(SimButton::held_for(1)));
            }
            Ok(Box::new(SimButton::new()))
        }
    }

    pub fn build(cfg: &Config, token: CancelToken, opts: SimOptions) -> Result<(Machine, Interlock)> {
        let scale_cfg = ScaleCfg::from(&cfg.scale);
        let scale = SimulatedScale::new(cfg.scale.calibration_factor);
        let extra = Peripherals {
            weight: Box::new(LoadCell::new(scale, &scale_cfg)),
            buzzer: Box::new(SimBuzzer),
        };
        let machine = assemble(cfg, &mut SimLines { opts }, extra)?;
        tracing::info!(backend = "sim", "rig assembled");
        // the simulated rig has no e-stop input; Ctrl-C still trips the token
        Ok((machine, Interlock::new(token)))
    }
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
mod gpio_rig {
    use super::{Lines, Peripherals, assemble};
    use eyre::{Result, WrapErr};
    use ffj_config::Config;
    use ffj_core::{CancelToken, Interlock, LoadCell, Machine, ScaleCfg};
    use ffj_hardware::gpio::{self, GpioBuzzer, GpioInput, GpioOutput, GpioPwm};
    use ffj_hardware::hx711::Hx711;
    use ffj_traits::{BinarySensor, DigitalOutput, PwmOutput};

    struct GpioLines {
        gpio: gpio::Gpio,
    }

    impl Lines for GpioLines {
        fn output(&mut self, name: &'static str, bcm: u8) -> Result<Box<dyn DigitalOutput>> {
            let out = GpioOutput::new(&self.gpio, bcm)
                .wrap_err_with(|| format!("open output {name} (GPIO {bcm})"))?;
            Ok(Box::new(out))
        }

        fn pwm(&mut self, name: &'static str, bcm: u8) -> Result<Box<dyn PwmOutput>> {
            let out = GpioPwm::new(&self.gpio, bcm)
                .wrap_err_with(|| format!("open pwm {name} (GPIO {bcm})"))?;
            Ok(Box::new(out))
        }

        fn limit(&mut self, name: &'static str, bcm: u8) -> Result<Box<dyn BinarySensor>> {
            let input = GpioInput::pulled_down(&self.gpio, bcm)
                .wrap_err_with(|| format!("open limit switch {name} (GPIO {bcm})"))?;
            Ok(Box::new(input))
        }

        fn button(&mut self, name: &'static str, bcm: u8) -> Result<Box<dyn BinarySensor>> {
            let input = GpioInput::pulled_down(&self.gpio, bcm)
                .wrap_err_with(|| format!("open button {name} (GPIO {bcm})"))?;
            Ok(Box::new(input))
        }
    }

    pub fn build(cfg: &Config, token: CancelToken) -> Result<(Machine, Interlock)> {
        let gpio = gpio::open().wrap_err("open gpio")?;
        let scale_cfg = ScaleCfg::from(&cfg.scale);
        let hx = Hx711::open(&gpio, cfg.pins.hx711_dt, cfg.pins.hx711_sck)
            .wrap_err("open hx711")?;
        let buzzer = GpioBuzzer::new(&gpio, cfg.pins.buzzer).wrap_err("open buzzer")?;
        let estop = match cfg.pins.estop_in {
            Some(pin) => {
                let input = if cfg.estop.active_low {
                    GpioInput::pulled_up(&gpio, pin)
                } else {
                    GpioInput::pulled_down(&gpio, pin)
                };
                Some(input.wrap_err_with(|| format!("open e-stop (GPIO {pin})"))?)
            }
            None => None,
        };
        let extra = Peripherals {
            weight: Box::new(LoadCell::new(hx, &scale_cfg)),
            buzzer: Box::new(buzzer),
        };
        let machine = assemble(cfg, &mut GpioLines { gpio }, extra)?;

        let mut interlock = Interlock::new(token);
        if let Some(input) = estop {
            tracing::info!(
                pin = cfg.pins.estop_in,
                active_low = cfg.estop.active_low,
                debounce_n = cfg.estop.debounce_n,
                "E-stop enabled"
            );
            interlock = interlock.with_estop(Box::new(input), cfg.estop.debounce_n);
        }
        tracing::info!(backend = "gpio", "rig assembled");
        Ok((machine, interlock))
    }
}
