use std::time::Duration;

use rppal::gpio::{Gpio, InputPin, OutputPin};
use tracing::trace;

use crate::error::{HwError, Result};
use crate::util::wait_until_low_with_timeout;

/// Bit-banged HX711 24-bit load-cell ADC.
pub struct Hx711 {
    dt: InputPin,
    sck: OutputPin,
    gain_pulses: u8, // 1..=3 extra clocks after the 24 data bits
}

impl Hx711 {
    /// Channel A, gain 128 takes 25 clock pulses per conversion.
    pub const GAIN_128: u8 = 25;

    /// `total_pulses` is 25, 26 or 27 depending on gain/channel.
    pub fn new(dt: InputPin, mut sck: OutputPin, total_pulses: u8) -> Self {
        sck.set_low(); // clock idle low; held high > 60 us powers the chip down
        Self {
            dt,
            sck,
            gain_pulses: total_pulses.saturating_sub(24),
        }
    }

    /// Claim the DT/SCK lines and configure channel A, gain 128.
    pub fn open(gpio: &Gpio, dt_bcm: u8, sck_bcm: u8) -> Result<Self> {
        let dt = gpio.get(dt_bcm)?.into_input();
        let sck = gpio.get(sck_bcm)?.into_output_low();
        Ok(Self::new(dt, sck, Self::GAIN_128))
    }

    pub fn read_with_timeout(&mut self, timeout: Duration) -> Result<i32> {
        let dt = &self.dt;
        wait_until_low_with_timeout(|| dt.is_high(), timeout, Duration::from_micros(200))?;

        let mut value: i32 = 0;
        for _ in 0..24 {
            self.sck.set_high();
            std::hint::spin_loop();
            value = (value << 1) | i32::from(self.dt.is_high());
            self.sck.set_low();
            std::hint::spin_loop();
        }
        // extra pulses select gain/channel for the next conversion
        for _ in 0..self.gain_pulses {
            self.sck.set_high();
            std::hint::spin_loop();
            self.sck.set_low();
            std::hint::spin_loop();
        }

        if (value & 0x80_0000) != 0 {
            value |= !0xFF_FFFF;
        }
        trace!(raw = value, "hx711 raw read");
        Ok(value)
    }
}

impl ffj_traits::Scale for Hx711 {
    fn read(&mut self, timeout: Duration) -> std::result::Result<i32, ffj_traits::BoxError> {
        const RETRIES: u32 = 3;
        let mut attempts = 0;
        loop {
            match self.read_with_timeout(timeout) {
                Ok(raw) => return Ok(raw),
                Err(HwError::DataReadyTimeout) if attempts < RETRIES => {
                    attempts += 1;
                    tracing::warn!(retries = attempts, "scale not ready, retrying");
                }
                Err(e) => return Err(Box::new(e)),
            }
        }
    }
}
