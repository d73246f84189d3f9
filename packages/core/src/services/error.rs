//! Errors from the remote calendar API.

use thiserror::Error;

/// Everything that can go wrong talking to the calendar API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Network error: {message}")]
    Network { message: String },

    #[error("HTTP error! status: {status}")]
    Http { status: u16 },

    #[error("Rate limit exceeded (429 Too Many Requests)")]
    RateLimited,

    /// The envelope arrived but reported `code != 200`.
    #[error("API error: {code} {status}")]
    Api { code: i64, status: String },

    #[error("Data format error: {message}")]
    Format { message: String },

    /// The request was removed from the queue before it ran.
    #[error("Request discarded before dispatch")]
    Discarded,
}

impl ApiError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn format(message: impl Into<String>) -> Self {
        Self::Format {
            message: message.into(),
        }
    }

    /// `true` when the upstream asked us to slow down.
    ///
    /// Besides the dedicated variant, any error whose message mentions
    /// `429` or `Too Many Requests` counts, since some transports only
    /// surface the status inside a message.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::RateLimited => true,
            Self::Http { status } => *status == 429,
            Self::Discarded => false,
            other => {
                let message = other.to_string();
                message.contains("429") || message.contains("Too Many Requests")
            }
        }
    }
}

/// Result type for calendar API calls.
pub type ApiResult<T> = Result<T, ApiError>;
