//! Collaborator traits for the AutoFFJ controller.
//!
//! Every piece of I/O the core touches sits behind one of these traits so the
//! same sequencing logic runs against GPIO on the Pi, the simulated rig, or the
//! scripted mocks used in tests.

pub mod clock;

pub use clock::{Clock, MonotonicClock};

use std::time::Duration;

/// Error type crossing the trait boundary. Mapped to typed errors in `ffj_core`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Single digital output line: relay coil, motor enable, stepper pulse or direction.
pub trait DigitalOutput {
    /// Configure the line; implementations drive their inactive level here.
    fn init(&mut self) -> Result<(), BoxError> {
        Ok(())
    }
    fn set_state(&mut self, high: bool) -> Result<(), BoxError>;
}

/// PWM speed line (8-bit duty).
pub trait PwmOutput {
    fn init(&mut self) -> Result<(), BoxError> {
        Ok(())
    }
    fn set_duty(&mut self, duty: u8) -> Result<(), BoxError>;
}

/// Limit switch or push-button. A single HIGH sample counts as triggered.
pub trait BinarySensor {
    fn init(&mut self) {}
    fn is_triggered(&mut self) -> bool;
}

/// Raw load-cell ADC (HX711 style): signed counts, may time out when not ready.
pub trait Scale {
    fn read(&mut self, timeout: Duration) -> Result<i32, BoxError>;
}

/// Calibrated weight source in grams.
pub trait WeightSensor {
    /// Zero the sensor against whatever currently rests on it.
    fn tare(&mut self) -> Result<(), BoxError>;
    /// Average of `n` samples in grams. Errors when the sensor is not ready.
    fn sample(&mut self, n: u8) -> Result<f32, BoxError>;
}

/// Speed-controlled actuator (pump, chopper).
pub trait Motor {
    fn set_speed(&mut self, percent: u8) -> Result<(), BoxError>;
    fn stop(&mut self) -> Result<(), BoxError>;
    fn start(&mut self) -> Result<(), BoxError>;
}

/// Durable blob that survives power loss. `store` must replace the previous
/// contents atomically: a reader sees either the old blob or the new one.
pub trait NvStore {
    /// `None` when nothing has been stored yet.
    fn load(&mut self) -> Result<Option<Vec<u8>>, BoxError>;
    fn store(&mut self, bytes: &[u8]) -> Result<(), BoxError>;
}

/// Two-line operator display.
pub trait TextDisplay {
    fn show_two_lines(&mut self, line1: &str, line2: &str, auto_clear_after: Option<Duration>);
}

/// Buzzer able to play `repeats` beeps of `on_ms`, separated by `off_ms`.
pub trait AudibleSignal {
    fn pattern(&mut self, repeats: u8, on_ms: u16, off_ms: u16);
}

impl<T: DigitalOutput + ?Sized> DigitalOutput for Box<T> {
    fn init(&mut self) -> Result<(), BoxError> {
        (**self).init()
    }
    fn set_state(&mut self, high: bool) -> Result<(), BoxError> {
        (**self).set_state(high)
    }
}

impl<T: PwmOutput + ?Sized> PwmOutput for Box<T> {
    fn init(&mut self) -> Result<(), BoxError> {
        (**self).init()
    }
    fn set_duty(&mut self, duty: u8) -> Result<(), BoxError> {
        (**self).set_duty(duty)
    }
}

impl<T: BinarySensor + ?Sized> BinarySensor for Box<T> {
    fn init(&mut self) {
        (**self).init();
    }
    fn is_triggered(&mut self) -> bool {
        (**self).is_triggered()
    }
}

impl<T: Scale + ?Sized> Scale for Box<T> {
    fn read(&mut self, timeout: Duration) -> Result<i32, BoxError> {
        (**self).read(timeout)
    }
}

impl<T: WeightSensor + ?Sized> WeightSensor for Box<T> {
    fn tare(&mut self) -> Result<(), BoxError> {
        (**self).tare()
    }
    fn sample(&mut self, n: u8) -> Result<f32, BoxError> {
        (**self).sample(n)
    }
}

impl<T: Motor + ?Sized> Motor for Box<T> {
    fn set_speed(&mut self, percent: u8) -> Result<(), BoxError> {
        (**self).set_speed(percent)
    }
    fn stop(&mut self) -> Result<(), BoxError> {
        (**self).stop()
    }
    fn start(&mut self) -> Result<(), BoxError> {
        (**self).start()
    }
}
