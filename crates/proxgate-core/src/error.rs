use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid card key: {0}")]
    InvalidCardKey(String),

    #[error("Invalid time of day: {0}")]
    InvalidTimeOfDay(u16),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing configuration key: {0}")]
    MissingConfig(String),
}

impl Error {
    /// Create a new configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
