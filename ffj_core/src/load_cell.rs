//! Calibrated weight from a raw load-cell ADC.

use std::time::Duration;

use ffj_traits::{BoxError, Scale, WeightSensor};

use crate::config::ScaleCfg;
use crate::error::FfjError;

/// Converts raw counts to grams as `(raw - offset) / factor`.
#[derive(Debug)]
pub struct LoadCell<S: Scale> {
    scale: S,
    factor: f32,
    offset: f64,
    tare_samples: u8,
    timeout: Duration,
}

impl<S: Scale> LoadCell<S> {
    pub fn new(scale: S, cfg: &ScaleCfg) -> Self {
        Self {
            scale,
            factor: cfg.calibration_factor,
            offset: 0.0,
            tare_samples: cfg.tare_samples.max(1),
            timeout: cfg.read_timeout,
        }
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    fn average(&mut self, n: u8) -> Result<f64, BoxError> {
        let n = n.max(1);
        let mut sum = 0.0_f64;
        for _ in 0..n {
            let raw = self.scale.read(self.timeout).map_err(|e| {
                tracing::debug!(error = %e, "load cell read failed");
                Box::new(FfjError::SensorUnavailable) as BoxError
            })?;
            sum += f64::from(raw);
        }
        Ok(sum / f64::from(n))
    }
}

impl<S: Scale> WeightSensor for LoadCell<S> {
    fn tare(&mut self) -> Result<(), BoxError> {
        self.offset = self.average(self.tare_samples)?;
        tracing::debug!(offset = self.offset, "tared");
        Ok(())
    }

    fn sample(&mut self, n: u8) -> Result<f32, BoxError> {
        let avg = self.average(n)?;
        let grams = (avg - self.offset) / f64::from(self.factor);
        Ok(grams as f32)
    }
}
