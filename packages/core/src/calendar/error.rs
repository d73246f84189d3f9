//! Error types for calendar operations

use thiserror::Error;

use crate::services::error::ApiError;

#[derive(Error, Debug)]
pub enum CalendarError {
    #[error(transparent)]
    Api(#[from] ApiError),

    /// A value from the network is missing, malformed or out of range.
    #[error("Invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("Invalid date '{0}', expected DD-MM-YYYY")]
    InvalidDateKey(String),

    #[error("Date {0} is outside the supported range")]
    OutOfRange(String),

    #[error("No strategy produced a result")]
    Unavailable,
}

impl CalendarError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Api(err) if err.is_rate_limited())
    }
}
