use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FfjError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("weight sensor unavailable")]
    SensorUnavailable,
    #[error("motion cancelled by interlock")]
    Cancelled,
    #[error("axis {0} is not homed")]
    NotHomed(&'static str),
    #[error("persisted state error: {0}")]
    Persist(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid state: {0}")]
    State(String),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
