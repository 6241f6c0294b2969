#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_possible_truncation
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Machine logic for the AutoFFJ fermented-fruit-juice controller
//! (hardware-agnostic).
//!
//! All I/O goes through the traits in `ffj_traits`; this crate owns motion,
//! dosing, persistent progress and sequencing.
//!
//! ## Architecture
//!
//! - **Axes**: open-loop steppers with homing and absolute moves (`axis`)
//! - **Actuators**: relays and PWM DC motors (`actuators`)
//! - **Dosing**: run an actuator until a weight threshold (`dosing`, `load_cell`)
//! - **Progress**: crash-safe stage snapshot (`state`)
//! - **Sequencing**: per-stage op plans executed one pulse at a time (`sequencer`)
//! - **Control loop**: buttons, camera window, interlock (`controller`)
//!
//! ## Stages
//!
//! `Ready → BananaAdded → MolassesAdded → Mixed → Sealed → Fermenting`.
//! A stage runs only when its predecessor is recorded, and is recorded only
//! after its action finishes.

pub mod actuators;
pub mod axis;
pub mod config;
pub mod controller;
pub mod conversions;
pub mod dosing;
pub mod error;
pub mod hw_error;
pub mod interlock;
pub mod load_cell;
pub mod machine;
pub mod mocks;
pub mod sequencer;
pub mod signals;
pub mod state;
pub mod timer;

pub use actuators::{DcMotor, Relay};
pub use axis::{LinearAxis, Motion, MotionStatus};
pub use config::{
    AxesCfg, AxisCfg, CameraCfg, ControllerCfg, DoseCfg, MotionCfg, PowerCfg, ScaleCfg,
    SequenceCfg,
};
pub use controller::{ControlState, Controller, MachineEvent};
pub use dosing::{DoseRun, DosingStatus, Ingredient};
pub use error::{FfjError, Report, Result};
pub use hw_error::map_hw_error;
pub use interlock::{CancelToken, Interlock};
pub use load_cell::LoadCell;
pub use machine::{AxisId, Axes, Buttons, LimitId, Limits, Machine};
pub use sequencer::{Sequencer, StageOutcome, TickStatus};
pub use signals::Tone;
pub use state::{ProcessFlag, Stage, StageSnapshot, StageStore};
pub use timer::ExpiringTimer;
