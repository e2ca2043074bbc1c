use thiserror::Error;

/// An actuator state string that is neither ON nor OFF.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid actuator state {0:?}, expected ON or OFF")]
pub struct InvalidStateError(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid number {0:?}")]
    InvalidNumber(String),
    #[error("invalid time {0:?}, expected HH:MM")]
    InvalidTime(String),
    #[error("lighting on time and off time cannot both be {0}")]
    EmptyWindow(String),
}

impl ConfigError {
    /// Stable identifier so operator-facing layers can pick their own message.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidNumber(_) => "invalid_number",
            Self::InvalidTime(_) => "invalid_time",
            Self::EmptyWindow(_) => "empty_window",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SensorError {
    #[error("bus transaction failed: {0}")]
    Bus(String),
    #[error("sensor did not respond")]
    NoResponse,
    #[error("reading {0} outside plausible range")]
    OutOfRange(f32),
    #[error("no valid reading after {0} attempts")]
    RetriesExhausted(u32),
}
