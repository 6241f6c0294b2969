//! `From` implementations bridging `ffj_config` types to `ffj_core` types.

use std::time::Duration;

use crate::config::{
    AxesCfg, AxisCfg, CameraCfg, ControllerCfg, DoseCfg, MotionCfg, PowerCfg, ScaleCfg, SequenceCfg,
};

// ── Axes ─────────────────────────────────────────────────────────────────────

impl From<&ffj_config::AxisCfg> for AxisCfg {
    fn from(c: &ffj_config::AxisCfg) -> Self {
        Self {
            half_period: Duration::from_micros(c.half_period_us),
            forward_high: c.forward_high,
        }
    }
}

impl From<&ffj_config::Axes> for AxesCfg {
    fn from(c: &ffj_config::Axes) -> Self {
        Self {
            slider: (&c.slider).into(),
            sealer: (&c.sealer).into(),
            mixer: (&c.mixer).into(),
            mixing_tool: (&c.mixing_tool).into(),
        }
    }
}

// ── Motion ───────────────────────────────────────────────────────────────────

impl From<&ffj_config::Motion> for MotionCfg {
    fn from(c: &ffj_config::Motion) -> Self {
        Self {
            slider_home_steps: c.slider_home_steps,
            sealer_up_steps: c.sealer_up_steps,
            sealer_down_steps: c.sealer_down_steps,
            mixer_up_steps: c.mixer_up_steps,
            mixer_down_steps: c.mixer_down_steps,
            mixer_station: c.mixer_station,
            sealer_station: c.sealer_station,
            stir_steps: c.stir_steps,
            cover_lift_half_period: Duration::from_micros(c.cover_lift_half_period_us),
            settle: Duration::from_millis(c.settle_ms),
        }
    }
}

// ── Dosing / scale ───────────────────────────────────────────────────────────

impl From<&ffj_config::Dosing> for DoseCfg {
    fn from(c: &ffj_config::Dosing) -> Self {
        Self {
            threshold_g: c.threshold_g,
            poll_interval: Duration::from_millis(c.poll_ms),
            samples: c.samples,
            banana_speed_pct: c.banana_speed_pct,
            molasses_speed_pct: c.molasses_speed_pct,
        }
    }
}

impl From<&ffj_config::ScaleCfg> for ScaleCfg {
    fn from(c: &ffj_config::ScaleCfg) -> Self {
        Self {
            calibration_factor: c.calibration_factor,
            tare_samples: c.tare_samples,
            read_timeout: Duration::from_millis(c.read_timeout_ms),
        }
    }
}

// ── Camera / power / controller ──────────────────────────────────────────────────────

impl From<&ffj_config::Camera> for CameraCfg {
    fn from(c: &ffj_config::Camera) -> Self {
        Self {
            window: Duration::from_secs(c.window_s),
            relay_settle: Duration::from_millis(c.relay_settle_ms),
        }
    }
}

impl From<&ffj_config::Relays> for PowerCfg {
    fn from(c: &ffj_config::Relays) -> Self {
        Self {
            motor_settle: Duration::from_millis(c.motor_settle_ms),
        }
    }
}

impl From<&ffj_config::Controller> for ControllerCfg {
    fn from(c: &ffj_config::Controller) -> Self {
        Self {
            idle_period: Duration::from_millis(c.idle_ms),
        }
    }
}

impl From<&ffj_config::Config> for SequenceCfg {
    fn from(c: &ffj_config::Config) -> Self {
        Self {
            motion: (&c.motion).into(),
            dose: (&c.dosing).into(),
            camera: (&c.camera).into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_agree_across_layers() {
        let file = ffj_config::Config::default();
        let seq = SequenceCfg::from(&file);
        assert_eq!(seq, SequenceCfg::default());
        assert_eq!(AxesCfg::from(&file.axes), AxesCfg::default());
        assert_eq!(ScaleCfg::from(&file.scale), ScaleCfg::default());
        assert_eq!(PowerCfg::from(&file.relays), PowerCfg::default());
    }

    #[test]
    fn microsecond_half_periods_survive() {
        let c = ffj_config::AxisCfg {
            half_period_us: 7,
            forward_high: false,
        };
        let a = AxisCfg::from(&c);
        assert_eq!(a.half_period, Duration::from_micros(7));
        assert!(!a.forward_high);
    }
}
