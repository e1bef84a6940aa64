use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Interval must be a whole number of minutes, got '{0}'")]
    IntervalNotANumber(String),

    #[error("Interval must be positive, got {0}")]
    IntervalNotPositive(i64),

    #[error("Interval must be at least {min} minutes, got {minutes}")]
    IntervalTooShort { minutes: i64, min: i64 },

    #[error("Interval must be at most {max} minutes, got {minutes}")]
    IntervalTooLarge { minutes: String, max: u32 },
}
