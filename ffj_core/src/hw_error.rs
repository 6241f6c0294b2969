//! Maps `Box<dyn Error>` from trait boundaries to typed `FfjError`.
//!
//! The traits in `ffj_traits` use `Box<dyn Error + Send + Sync>` so any driver
//! can plug in; this module converts those to our typed error enum, with an
//! optional feature-gated path for `ffj_hardware::HwError` downcasting.

use crate::error::{FfjError, Result};
use eyre::WrapErr;
use ffj_traits::BoxError;

/// Map a trait-boundary error to a typed `FfjError`.
///
/// Errors that already are `FfjError` pass through unchanged. Known hardware
/// error types are downcast next, then string heuristics apply.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> FfjError {
    if let Some(fe) = e.downcast_ref::<FfjError>() {
        return fe.clone();
    }

    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<ffj_hardware::error::HwError>() {
            return match hw {
                ffj_hardware::error::HwError::DataReadyTimeout => FfjError::SensorUnavailable,
                other => FfjError::HardwareFault(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    let lower = s.to_lowercase();
    if lower.contains("timeout") || lower.contains("not ready") {
        FfjError::SensorUnavailable
    } else {
        FfjError::Hardware(s)
    }
}

/// Lift a trait-boundary result into a typed report with `what` as context.
#[inline]
pub(crate) fn hw<T>(r: std::result::Result<T, BoxError>, what: &'static str) -> Result<T> {
    r.map_err(|e| eyre::Report::new(map_hw_error(&*e)))
        .wrap_err(what)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_errors_pass_through() {
        let boxed: BoxError = Box::new(FfjError::SensorUnavailable);
        assert_eq!(map_hw_error(&*boxed), FfjError::SensorUnavailable);
    }

    #[test]
    fn timeout_text_maps_to_sensor_unavailable() {
        let boxed: BoxError = Box::new(std::io::Error::other("hx711 data-ready timeout"));
        assert_eq!(map_hw_error(&*boxed), FfjError::SensorUnavailable);
    }

    #[test]
    fn other_errors_keep_their_message() {
        let boxed: BoxError = Box::new(std::io::Error::other("pin 12 busy"));
        assert_eq!(map_hw_error(&*boxed), FfjError::Hardware("pin 12 busy".into()));
    }

    #[test]
    fn context_keeps_typed_error_reachable() {
        let r: std::result::Result<(), BoxError> = Err(Box::new(FfjError::Cancelled));
        let report = hw(r, "pulse").unwrap_err();
        assert_eq!(report.downcast_ref::<FfjError>(), Some(&FfjError::Cancelled));
    }
}
