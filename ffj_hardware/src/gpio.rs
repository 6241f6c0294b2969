//! Raspberry Pi GPIO drivers (rppal).

use std::time::Duration;

use ffj_traits::{AudibleSignal, BinarySensor, BoxError, DigitalOutput, PwmOutput};
use rppal::gpio::{InputPin, OutputPin};

pub use rppal::gpio::Gpio;

use crate::error::Result;

/// Software PWM carrier for the motor speed lines.
const PWM_HZ: f64 = 490.0;

pub fn open() -> Result<Gpio> {
    Ok(Gpio::new()?)
}

pub struct GpioOutput {
    pin: OutputPin,
}

impl GpioOutput {
    pub fn new(gpio: &Gpio, bcm: u8) -> Result<Self> {
        let mut pin = gpio.get(bcm)?.into_output();
        pin.set_reset_on_drop(false);
        Ok(Self { pin })
    }
}

impl DigitalOutput for GpioOutput {
    fn set_state(&mut self, high: bool) -> std::result::Result<(), BoxError> {
        if high {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
        Ok(())
    }
}

pub struct GpioPwm {
    pin: OutputPin,
}

impl GpioPwm {
    pub fn new(gpio: &Gpio, bcm: u8) -> Result<Self> {
        Ok(Self {
            pin: gpio.get(bcm)?.into_output_low(),
        })
    }
}

impl PwmOutput for GpioPwm {
    fn set_duty(&mut self, duty: u8) -> std::result::Result<(), BoxError> {
        match duty {
            0 => {
                self.pin.clear_pwm()?;
                self.pin.set_low();
            }
            255 => {
                self.pin.clear_pwm()?;
                self.pin.set_high();
            }
            d => self.pin.set_pwm_frequency(PWM_HZ, f64::from(d) / 255.0)?,
        }
        Ok(())
    }
}

/// Switch or button input. `active_low` inverts the electrical level.
pub struct GpioInput {
    pin: InputPin,
    active_low: bool,
}

impl GpioInput {
    pub fn pulled_down(gpio: &Gpio, bcm: u8) -> Result<Self> {
        Ok(Self {
            pin: gpio.get(bcm)?.into_input_pulldown(),
            active_low: false,
        })
    }

    pub fn pulled_up(gpio: &Gpio, bcm: u8) -> Result<Self> {
        Ok(Self {
            pin: gpio.get(bcm)?.into_input_pullup(),
            active_low: true,
        })
    }
}

impl BinarySensor for GpioInput {
    fn is_triggered(&mut self) -> bool {
        self.pin.is_high() != self.active_low
    }
}

pub struct GpioBuzzer {
    pin: OutputPin,
}

impl GpioBuzzer {
    pub fn new(gpio: &Gpio, bcm: u8) -> Result<Self> {
        Ok(Self {
            pin: gpio.get(bcm)?.into_output_low(),
        })
    }
}

impl AudibleSignal for GpioBuzzer {
    fn pattern(&mut self, repeats: u8, on_ms: u16, off_ms: u16) {
        for _ in 0..repeats {
            self.pin.set_high();
            std::thread::sleep(Duration::from_millis(u64::from(on_ms)));
            self.pin.set_low();
            std::thread::sleep(Duration::from_millis(u64::from(off_ms)));
        }
    }
}
