//! The assembled machine: every actuator and sensor the sequencer drives.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use ffj_traits::{AudibleSignal, BinarySensor, Clock, TextDisplay, WeightSensor};

use crate::actuators::{DcMotor, Relay};
use crate::axis::LinearAxis;
use crate::error::Result;
use crate::signals::{play, Tone};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisId {
    Slider,
    Sealer,
    Mixer,
    MixingTool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitId {
    SliderHome,
    SealerUp,
    SealerDown,
    MixerUp,
    MixerDown,
}

impl LimitId {
    pub const ALL: [LimitId; 5] = [
        LimitId::SliderHome,
        LimitId::SealerUp,
        LimitId::SealerDown,
        LimitId::MixerUp,
        LimitId::MixerDown,
    ];

    pub fn name(self) -> &'static str {
        match self {
            LimitId::SliderHome => "slider_home",
            LimitId::SealerUp => "sealer_up",
            LimitId::SealerDown => "sealer_down",
            LimitId::MixerUp => "mixer_up",
            LimitId::MixerDown => "mixer_down",
        }
    }
}

#[derive(Debug)]
pub struct Axes {
    pub slider: LinearAxis,
    pub sealer: LinearAxis,
    pub mixer: LinearAxis,
    pub mixing_tool: LinearAxis,
}

impl Axes {
    pub fn get(&self, id: AxisId) -> &LinearAxis {
        match id {
            AxisId::Slider => &self.slider,
            AxisId::Sealer => &self.sealer,
            AxisId::Mixer => &self.mixer,
            AxisId::MixingTool => &self.mixing_tool,
        }
    }

    pub fn get_mut(&mut self, id: AxisId) -> &mut LinearAxis {
        match id {
            AxisId::Slider => &mut self.slider,
            AxisId::Sealer => &mut self.sealer,
            AxisId::Mixer => &mut self.mixer,
            AxisId::MixingTool => &mut self.mixing_tool,
        }
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut LinearAxis> {
        [
            &mut self.slider,
            &mut self.sealer,
            &mut self.mixer,
            &mut self.mixing_tool,
        ]
        .into_iter()
    }
}

pub struct Limits {
    pub slider_home: Box<dyn BinarySensor>,
    pub sealer_up: Box<dyn BinarySensor>,
    pub sealer_down: Box<dyn BinarySensor>,
    pub mixer_up: Box<dyn BinarySensor>,
    pub mixer_down: Box<dyn BinarySensor>,
}

impl Limits {
    pub fn get_mut(&mut self, id: LimitId) -> &mut dyn BinarySensor {
        match id {
            LimitId::SliderHome => self.slider_home.as_mut(),
            LimitId::SealerUp => self.sealer_up.as_mut(),
            LimitId::SealerDown => self.sealer_down.as_mut(),
            LimitId::MixerUp => self.mixer_up.as_mut(),
            LimitId::MixerDown => self.mixer_down.as_mut(),
        }
    }
}

pub struct Buttons {
    pub start: Box<dyn BinarySensor>,
    pub reset: Box<dyn BinarySensor>,
    pub camera: Box<dyn BinarySensor>,
}

pub struct Machine {
    pub axes: Axes,
    pub limits: Limits,
    pub buttons: Buttons,
    pub pump: DcMotor,
    pub chopper: DcMotor,
    pub camera: Relay,
    pub motor_power: Relay,
    pub weight: Box<dyn WeightSensor>,
    pub display: Box<dyn TextDisplay>,
    pub buzzer: Box<dyn AudibleSignal>,
    pub clock: Arc<dyn Clock + Send + Sync>,
}

impl fmt::Debug for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
            .field("axes", &self.axes)
            .field("pump", &self.pump)
            .field("chopper", &self.chopper)
            .field("camera", &self.camera)
            .field("motor_power", &self.motor_power)
            .finish_non_exhaustive()
    }
}

impl Machine {
    /// Configure every line and drive outputs to their safe idle levels.
    pub fn init(&mut self) -> Result<()> {
        for axis in self.axes.iter_mut() {
            axis.init()?;
        }
        for id in LimitId::ALL {
            self.limits.get_mut(id).init();
        }
        self.buttons.start.init();
        self.buttons.reset.init();
        self.buttons.camera.init();
        self.pump.init()?;
        self.chopper.init()?;
        self.camera.init()?;
        self.motor_power.init()?;
        tracing::info!("machine initialised");
        Ok(())
    }

    /// Split borrow of one axis and, optionally, one limit switch.
    pub fn axis_and_limit(
        &mut self,
        axis: AxisId,
        limit: Option<LimitId>,
    ) -> (&mut LinearAxis, Option<&mut dyn BinarySensor>) {
        let a = self.axes.get_mut(axis);
        let l = limit.map(|id| self.limits.get_mut(id));
        (a, l)
    }

    /// Sample every limit switch once.
    pub fn limit_states(&mut self) -> Vec<(LimitId, bool)> {
        LimitId::ALL
            .into_iter()
            .map(|id| (id, self.limits.get_mut(id).is_triggered()))
            .collect()
    }

    pub fn announce(&mut self, tone: Tone) {
        play(self.buzzer.as_mut(), tone);
    }

    pub fn show(&mut self, line1: &str, line2: &str) {
        self.display.show_two_lines(line1, line2, None);
    }

    pub fn camera_on(&mut self, settle: Duration) -> Result<()> {
        if self.camera.is_on() {
            return Ok(());
        }
        self.camera.turn_on()?;
        self.clock.sleep(settle);
        self.announce(Tone::Camera);
        Ok(())
    }

    pub fn camera_off(&mut self, settle: Duration) -> Result<()> {
        if !self.camera.is_on() {
            return Ok(());
        }
        self.camera.turn_off()?;
        self.clock.sleep(settle);
        self.announce(Tone::Camera);
        Ok(())
    }

    pub fn power_up_motors(&mut self, settle: Duration) -> Result<()> {
        if self.motor_power.is_on() {
            return Ok(());
        }
        self.motor_power.turn_on()?;
        self.clock.sleep(settle);
        self.announce(Tone::PowerOn);
        Ok(())
    }

    /// Stop both DC actuators, then cut motor power.
    pub fn shutdown_motors(&mut self, settle: Duration) -> Result<()> {
        self.pump.turn_off()?;
        self.chopper.turn_off()?;
        if self.motor_power.is_on() {
            self.motor_power.turn_off()?;
            self.clock.sleep(settle);
            self.announce(Tone::PowerOff);
        }
        Ok(())
    }

    /// Best-effort stop of everything that can keep moving on its own.
    pub fn stop_actuators(&mut self) {
        if let Err(e) = self.pump.turn_off() {
            tracing::error!(error = %e, "failed to stop pump");
        }
        if let Err(e) = self.chopper.turn_off() {
            tracing::error!(error = %e, "failed to stop chopper");
        }
    }
}
