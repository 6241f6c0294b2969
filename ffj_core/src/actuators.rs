//! On/off actuators: relays and PWM-driven DC motors.
//!
//! Both track their logical state and skip hardware writes when asked to
//! enter the state they are already in.

use ffj_traits::{BoxError, DigitalOutput, Motor, PwmOutput};

use crate::error::Result;
use crate::hw_error::hw;

pub struct Relay {
    name: &'static str,
    out: Box<dyn DigitalOutput>,
    active_low: bool,
    on: bool,
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("name", &self.name)
            .field("active_low", &self.active_low)
            .field("on", &self.on)
            .finish_non_exhaustive()
    }
}

impl Relay {
    /// Relay boards on this machine energize the coil on a LOW input.
    pub fn active_low(name: &'static str, out: Box<dyn DigitalOutput>) -> Self {
        Self {
            name,
            out,
            active_low: true,
            on: false,
        }
    }

    pub fn active_high(name: &'static str, out: Box<dyn DigitalOutput>) -> Self {
        Self {
            name,
            out,
            active_low: false,
            on: false,
        }
    }

    /// Configure the line and force the relay off.
    pub fn init(&mut self) -> Result<()> {
        hw(self.out.init(), "init relay")?;
        hw(self.out.set_state(self.active_low), "relay off")?;
        self.on = false;
        Ok(())
    }

    pub fn turn_on(&mut self) -> Result<()> {
        if self.on {
            return Ok(());
        }
        hw(self.out.set_state(!self.active_low), "relay on")?;
        self.on = true;
        tracing::info!(relay = self.name, "on");
        Ok(())
    }

    pub fn turn_off(&mut self) -> Result<()> {
        if !self.on {
            return Ok(());
        }
        hw(self.out.set_state(self.active_low), "relay off")?;
        self.on = false;
        tracing::info!(relay = self.name, "off");
        Ok(())
    }

    pub fn is_on(&self) -> bool {
        self.on
    }
}

/// Duty written for a speed percentage. The driver input is inverted:
/// 0 % maps to 255, 100 % maps to 0. Values above 100 clamp.
pub fn duty_for_percent(percent: u8) -> u8 {
    let p = u16::from(percent.min(100));
    let scaled = u8::try_from(p * 255 / 100).unwrap_or(u8::MAX);
    255 - scaled
}

/// DC motor behind an enable line and an inverted PWM speed line.
pub struct DcMotor {
    name: &'static str,
    enable: Box<dyn DigitalOutput>,
    pwm: Box<dyn PwmOutput>,
    speed_pct: u8,
    on: bool,
}

impl std::fmt::Debug for DcMotor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DcMotor")
            .field("name", &self.name)
            .field("speed_pct", &self.speed_pct)
            .field("on", &self.on)
            .finish_non_exhaustive()
    }
}

impl DcMotor {
    pub fn new(
        name: &'static str,
        enable: Box<dyn DigitalOutput>,
        pwm: Box<dyn PwmOutput>,
        speed_pct: u8,
    ) -> Self {
        Self {
            name,
            enable,
            pwm,
            speed_pct: speed_pct.min(100),
            on: false,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    pub fn speed_pct(&self) -> u8 {
        self.speed_pct
    }

    /// Configure both lines and leave the motor disabled with a zero duty.
    pub fn init(&mut self) -> Result<()> {
        hw(self.enable.init(), "init motor enable")?;
        hw(self.pwm.init(), "init motor pwm")?;
        hw(self.enable.set_state(false), "motor disable")?;
        hw(self.pwm.set_duty(0), "motor pwm zero")?;
        self.on = false;
        Ok(())
    }

    pub fn turn_on(&mut self, speed_pct: u8) -> Result<()> {
        if self.on {
            return Ok(());
        }
        self.speed_pct = speed_pct.min(100);
        hw(self.start(), "motor on")?;
        tracing::info!(motor = self.name, speed_pct = self.speed_pct, "on");
        Ok(())
    }

    pub fn turn_off(&mut self) -> Result<()> {
        if !self.on {
            return Ok(());
        }
        hw(self.stop(), "motor off")?;
        tracing::info!(motor = self.name, "off");
        Ok(())
    }
}

impl Motor for DcMotor {
    fn set_speed(&mut self, percent: u8) -> std::result::Result<(), BoxError> {
        self.speed_pct = percent.min(100);
        if self.on {
            self.pwm.set_duty(duty_for_percent(self.speed_pct))?;
        }
        Ok(())
    }

    fn start(&mut self) -> std::result::Result<(), BoxError> {
        if self.on {
            return Ok(());
        }
        self.pwm.set_duty(duty_for_percent(self.speed_pct))?;
        self.enable.set_state(true)?;
        self.on = true;
        Ok(())
    }

    fn stop(&mut self) -> std::result::Result<(), BoxError> {
        if !self.on {
            return Ok(());
        }
        self.enable.set_state(false)?;
        self.pwm.set_duty(0)?;
        self.on = false;
        Ok(())
    }
}
