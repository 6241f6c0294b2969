//! Drivers for the AutoFFJ rig.
//!
//! - `sim`: simulated lines, switches and scale for dry runs and CI
//! - `store`: file-backed progress storage
//! - `gpio`, `hx711` (feature `hardware`): Raspberry Pi drivers via rppal

pub mod error;
pub mod sim;
pub mod store;
pub mod util;

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod gpio;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod hx711;

pub use sim::{LogDisplay, SimBuzzer, SimButton, SimOutput, SimPwm, SimSwitch, SimulatedScale};
pub use store::FileStore;
