#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the AutoFFJ controller.
//!
//! Every section has defaults matching the reference machine, so an empty
//! file is a valid configuration. `Config::validate` enforces ranges and pin
//! uniqueness after parsing.
use serde::Deserialize;

/// Highest BCM GPIO number on the Raspberry Pi header.
pub const MAX_GPIO: u8 = 27;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Pins {
    pub slider_pul: u8,
    pub slider_dir: u8,
    pub sealer_pul: u8,
    pub sealer_dir: u8,
    pub mixer_pul: u8,
    pub mixer_dir: u8,
    pub mixing_pul: u8,
    pub mixing_dir: u8,
    pub slider_home: u8,
    pub sealer_down: u8,
    pub sealer_up: u8,
    pub mixer_down: u8,
    pub mixer_up: u8,
    pub start_button: u8,
    pub reset_button: u8,
    pub camera_button: u8,
    pub camera_relay: u8,
    pub motor_relay: u8,
    pub pump_ena: u8,
    pub pump_pwm: u8,
    pub chopper_ena: u8,
    pub chopper_pwm: u8,
    pub hx711_dt: u8,
    pub hx711_sck: u8,
    pub buzzer: u8,
    pub estop_in: Option<u8>,
}

impl Default for Pins {
    fn default() -> Self {
        Self {
            slider_pul: 4,
            slider_dir: 5,
            sealer_pul: 6,
            sealer_dir: 7,
            mixer_pul: 10,
            mixer_dir: 11,
            mixing_pul: 8,
            mixing_dir: 9,
            slider_home: 12,
            sealer_down: 13,
            sealer_up: 14,
            mixer_down: 15,
            mixer_up: 16,
            start_button: 17,
            reset_button: 18,
            camera_button: 19,
            camera_relay: 20,
            motor_relay: 21,
            pump_ena: 22,
            pump_pwm: 23,
            chopper_ena: 24,
            chopper_pwm: 25,
            hx711_dt: 2,
            hx711_sck: 3,
            buzzer: 26,
            estop_in: None,
        }
    }
}

impl Pins {
    /// Every assigned pin with its key, for validation and diagnostics.
    pub fn assignments(&self) -> Vec<(&'static str, u8)> {
        let mut v = vec![
            ("slider_pul", self.slider_pul),
            ("slider_dir", self.slider_dir),
            ("sealer_pul", self.sealer_pul),
            ("sealer_dir", self.sealer_dir),
            ("mixer_pul", self.mixer_pul),
            ("mixer_dir", self.mixer_dir),
            ("mixing_pul", self.mixing_pul),
            ("mixing_dir", self.mixing_dir),
            ("slider_home", self.slider_home),
            ("sealer_down", self.sealer_down),
            ("sealer_up", self.sealer_up),
            ("mixer_down", self.mixer_down),
            ("mixer_up", self.mixer_up),
            ("start_button", self.start_button),
            ("reset_button", self.reset_button),
            ("camera_button", self.camera_button),
            ("camera_relay", self.camera_relay),
            ("motor_relay", self.motor_relay),
            ("pump_ena", self.pump_ena),
            ("pump_pwm", self.pump_pwm),
            ("chopper_ena", self.chopper_ena),
            ("chopper_pwm", self.chopper_pwm),
            ("hx711_dt", self.hx711_dt),
            ("hx711_sck", self.hx711_sck),
            ("buzzer", self.buzzer),
        ];
        if let Some(p) = self.estop_in {
            v.push(("estop_in", p));
        }
        v
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct AxisCfg {
    /// Duration of each pulse level in microseconds.
    pub half_period_us: u64,
    /// Direction line level for positive step counts.
    pub forward_high: bool,
}

impl Default for AxisCfg {
    fn default() -> Self {
        Self {
            half_period_us: 1000,
            forward_high: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Axes {
    pub slider: AxisCfg,
    pub sealer: AxisCfg,
    pub mixer: AxisCfg,
    pub mixing_tool: AxisCfg,
}

impl Default for Axes {
    fn default() -> Self {
        Self {
            slider: AxisCfg {
                half_period_us: 1000,
                forward_high: false,
            },
            sealer: AxisCfg {
                half_period_us: 3000,
                forward_high: true,
            },
            mixer: AxisCfg::default(),
            mixing_tool: AxisCfg::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Motion {
    pub slider_home_steps: i64,
    pub sealer_up_steps: i64,
    pub sealer_down_steps: i64,
    pub mixer_up_steps: i64,
    pub mixer_down_steps: i64,
    pub mixer_station: i64,
    pub sealer_station: i64,
    pub stir_steps: i64,
    pub cover_lift_half_period_us: u64,
    pub settle_ms: u64,
}

impl Default for Motion {
    fn default() -> Self {
        Self {
            slider_home_steps: -58_000,
            sealer_up_steps: 10_000,
            sealer_down_steps: -10_000,
            mixer_up_steps: -40_000,
            mixer_down_steps: 40_000,
            mixer_station: 18_000,
            sealer_station: 57_000,
            stir_steps: 10_000,
            cover_lift_half_period_us: 1000,
            settle_ms: 2000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Dosing {
    pub threshold_g: f32,
    pub poll_ms: u64,
    pub samples: u8,
    pub banana_speed_pct: u8,
    pub molasses_speed_pct: u8,
}

impl Default for Dosing {
    fn default() -> Self {
        Self {
            threshold_g: 500.0,
            poll_ms: 250,
            samples: 20,
            banana_speed_pct: 50,
            molasses_speed_pct: 100,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct ScaleCfg {
    /// Raw counts per gram.
    pub calibration_factor: f32,
    pub tare_samples: u8,
    /// Max time to wait for HX711 data-ready (DT low) before failing.
    pub read_timeout_ms: u64,
}

impl Default for ScaleCfg {
    fn default() -> Self {
        Self {
            calibration_factor: 13.40,
            tare_samples: 20,
            read_timeout_ms: 150,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Camera {
    pub window_s: u64,
    pub relay_settle_ms: u64,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            window_s: 300,
            relay_settle_ms: 3000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct State {
    /// Progress snapshot file.
    pub path: String,
}

impl Default for State {
    fn default() -> Self {
        Self {
            path: "/var/lib/ffj/progress.toml".into(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Relays {
    /// Relay boards energize on a LOW input when true.
    pub active_low: bool,
    /// Pause after switching the motor power relay.
    pub motor_settle_ms: u64,
}

impl Default for Relays {
    fn default() -> Self {
        Self {
            active_low: true,
            motor_settle_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct EstopCfg {
    /// Treat low level as pressed when true
    pub active_low: bool,
    /// Number of consecutive polls required to latch E-stop
    pub debounce_n: u8,
}

impl Default for EstopCfg {
    fn default() -> Self {
        Self {
            active_low: true,
            debounce_n: 2,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Controller {
    /// Sleep between polls while idle.
    pub idle_ms: u64,
}

impl Default for Controller {
    fn default() -> Self {
        Self { idle_ms: 50 }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub pins: Pins,
    pub axes: Axes,
    pub motion: Motion,
    pub dosing: Dosing,
    pub scale: ScaleCfg,
    pub camera: Camera,
    pub state: State,
    pub relays: Relays,
    pub estop: EstopCfg,
    pub logging: Logging,
    pub controller: Controller,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Pins
        let pins = self.pins.assignments();
        for (i, (name, pin)) in pins.iter().enumerate() {
            if *pin > MAX_GPIO {
                eyre::bail!("pins.{name} = {pin} is not a valid GPIO (0..={MAX_GPIO})");
            }
            if let Some((other, _)) = pins[..i].iter().find(|(_, p)| p == pin) {
                eyre::bail!("pins.{name} and pins.{other} both use GPIO {pin}");
            }
        }

        // Axes
        for (name, axis) in [
            ("slider", self.axes.slider),
            ("sealer", self.axes.sealer),
            ("mixer", self.axes.mixer),
            ("mixing_tool", self.axes.mixing_tool),
        ] {
            if axis.half_period_us == 0 {
                eyre::bail!("axes.{name}.half_period_us must be >= 1");
            }
            if axis.half_period_us > 1_000_000 {
                eyre::bail!("axes.{name}.half_period_us is unreasonably large (>1s)");
            }
        }

        // Motion
        if self.motion.cover_lift_half_period_us == 0 {
            eyre::bail!("motion.cover_lift_half_period_us must be >= 1");
        }
        for (name, steps) in [
            ("slider_home_steps", self.motion.slider_home_steps),
            ("sealer_up_steps", self.motion.sealer_up_steps),
            ("sealer_down_steps", self.motion.sealer_down_steps),
            ("mixer_up_steps", self.motion.mixer_up_steps),
            ("mixer_down_steps", self.motion.mixer_down_steps),
        ] {
            if steps == 0 {
                eyre::bail!("motion.{name} must be non-zero (its sign sets the direction)");
            }
        }
        if self.motion.mixer_station < 0 || self.motion.sealer_station < 0 {
            eyre::bail!("motion stations must be >= 0 (measured from slider home)");
        }
        if self.motion.settle_ms > 60_000 {
            eyre::bail!("motion.settle_ms is unreasonably large (>60s)");
        }

        // Dosing
        if !(self.dosing.threshold_g.is_finite() && self.dosing.threshold_g > 0.0) {
            eyre::bail!("dosing.threshold_g must be > 0");
        }
        if self.dosing.poll_ms == 0 {
            eyre::bail!("dosing.poll_ms must be >= 1");
        }
        if self.dosing.samples == 0 {
            eyre::bail!("dosing.samples must be >= 1");
        }
        if self.dosing.banana_speed_pct > 100 || self.dosing.molasses_speed_pct > 100 {
            eyre::bail!("dosing speeds must be in 0..=100 percent");
        }

        // Scale
        if !self.scale.calibration_factor.is_finite() || self.scale.calibration_factor == 0.0 {
            eyre::bail!("scale.calibration_factor must be non-zero");
        }
        if self.scale.tare_samples == 0 {
            eyre::bail!("scale.tare_samples must be >= 1");
        }
        if self.scale.read_timeout_ms == 0 {
            eyre::bail!("scale.read_timeout_ms must be >= 1");
        }

        // Camera
        if self.camera.window_s == 0 {
            eyre::bail!("camera.window_s must be >= 1");
        }

        // State
        if self.state.path.trim().is_empty() {
            eyre::bail!("state.path must not be empty");
        }

        // E-stop
        if self.estop.debounce_n == 0 {
            eyre::bail!("estop.debounce_n must be >= 1");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never, daily, hourly");
        }

        // Controller
        if self.controller.idle_ms == 0 {
            eyre::bail!("controller.idle_ms must be >= 1");
        }

        Ok(())
    }
}
