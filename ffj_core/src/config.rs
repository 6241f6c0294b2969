//! Runtime configuration for the machine core.
//!
//! These are the structs the sequencer and controller consume. They are
//! separate from the TOML schema in `ffj_config`; see `conversions` for the bridge.

use std::time::Duration;

/// Pulse cadence and direction polarity of one stepper axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisCfg {
    /// HIGH and LOW each last this long, so one step takes twice this.
    pub half_period: Duration,
    /// Direction line level that moves the axis toward increasing positions.
    pub forward_high: bool,
}

impl AxisCfg {
    pub const fn new(half_period_ms: u64, forward_high: bool) -> Self {
        Self {
            half_period: Duration::from_millis(half_period_ms),
            forward_high,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxesCfg {
    pub slider: AxisCfg,
    pub sealer: AxisCfg,
    pub mixer: AxisCfg,
    pub mixing_tool: AxisCfg,
}

impl Default for AxesCfg {
    fn default() -> Self {
        Self {
            slider: AxisCfg::new(1, false),
            sealer: AxisCfg::new(3, true),
            mixer: AxisCfg::new(1, true),
            mixing_tool: AxisCfg::new(1, true),
        }
    }
}

/// Travel bounds and station positions, in steps. Signs give the direction
/// toward each limit switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionCfg {
    pub slider_home_steps: i64,
    pub sealer_up_steps: i64,
    pub sealer_down_steps: i64,
    pub mixer_up_steps: i64,
    pub mixer_down_steps: i64,
    /// Absolute slider position under the mixer.
    pub mixer_station: i64,
    /// Absolute slider position under the sealer.
    pub sealer_station: i64,
    /// Relative rotation of the mixing tool for one stir.
    pub stir_steps: i64,
    /// Sealer half-period applied before lifting the cover. Persists afterwards.
    pub cover_lift_half_period: Duration,
    /// Pause between consecutive mechanical actions.
    pub settle: Duration,
}

impl Default for MotionCfg {
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
            cover_lift_half_period: Duration::from_millis(1),
            settle: Duration::from_millis(2000),
        }
    }
}

/// Dose-by-weight parameters shared by both ingredients.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DoseCfg {
    /// Stop once the tared reading reaches this many grams.
    pub threshold_g: f32,
    pub poll_interval: Duration,
    /// Readings averaged per poll.
    pub samples: u8,
    pub banana_speed_pct: u8,
    pub molasses_speed_pct: u8,
}

impl Default for DoseCfg {
    fn default() -> Self {
        Self {
            threshold_g: 500.0,
            poll_interval: Duration::from_millis(250),
            samples: 20,
            banana_speed_pct: 50,
            molasses_speed_pct: 100,
        }
    }
}

/// Load-cell conversion: `grams = (raw - offset) / factor`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleCfg {
    pub calibration_factor: f32,
    pub tare_samples: u8,
    /// Upper bound on waiting for one conversion.
    pub read_timeout: Duration,
}

impl Default for ScaleCfg {
    fn default() -> Self {
        Self {
            calibration_factor: 13.40,
            tare_samples: 20,
            read_timeout: Duration::from_millis(150),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraCfg {
    /// Camera power window after a button press.
    pub window: Duration,
    /// Pause after switching the camera relay, before the tone.
    pub relay_settle: Duration,
}

impl Default for CameraCfg {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(300),
            relay_settle: Duration::from_millis(3000),
        }
    }
}

/// Motor power relay timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerCfg {
    /// Pause after switching the relay, before the tone.
    pub motor_settle: Duration,
}

impl Default for PowerCfg {
    fn default() -> Self {
        Self {
            motor_settle: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerCfg {
    /// Sleep between polls while nothing is moving.
    pub idle_period: Duration,
}

impl Default for ControllerCfg {
    fn default() -> Self {
        Self {
            idle_period: Duration::from_millis(50),
        }
    }
}

/// Everything the sequencer needs to plan and run stage actions.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SequenceCfg {
    pub motion: MotionCfg,
    pub dose: DoseCfg,
    pub camera: CameraCfg,
}
