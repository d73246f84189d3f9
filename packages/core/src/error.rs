use std::error::Error;
use std::fmt;

use crate::calendar::error::CalendarError;
use crate::store::StoreError;
use crate::tracker::TrackerError;

/// Unified application error for the binary.
///
/// Library layers keep their own typed errors; this wraps them together
/// with configuration and startup failures so `main` can log one message
/// and exit non-zero.
#[derive(Debug)]
pub enum AppError {
    Config(String),
    Startup(String),
    Usage(String),
    Calendar(CalendarError),
    Tracker(TrackerError),
    Store(StoreError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(msg) => write!(f, "Config error: {}", msg),
            AppError::Startup(msg) => write!(f, "Startup error: {}", msg),
            AppError::Usage(msg) => write!(f, "Usage error: {}", msg),
            AppError::Calendar(err) => write!(f, "Calendar error: {}", err),
            AppError::Tracker(err) => write!(f, "Tracker error: {}", err),
            AppError::Store(err) => write!(f, "Storage error: {}", err),
        }
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AppError::Calendar(err) => Some(err),
            AppError::Tracker(err) => Some(err),
            AppError::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CalendarError> for AppError {
    fn from(err: CalendarError) -> Self {
        AppError::Calendar(err)
    }
}

impl From<TrackerError> for AppError {
    fn from(err: TrackerError) -> Self {
        AppError::Tracker(err)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Store(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_the_layer() {
        assert_eq!(
            AppError::Config("QUEUE_DELAY_MS must be a valid number".into()).to_string(),
            "Config error: QUEUE_DELAY_MS must be a valid number"
        );
        assert_eq!(
            AppError::from(TrackerError::NotAyyamulBidh(12)).to_string(),
            "Tracker error: Day 12 is not an Ayyamul Bidh day (13, 14 or 15)"
        );
    }

    #[test]
    fn wrapped_errors_expose_their_source() {
        let err = AppError::from(CalendarError::Unavailable);
        assert!(err.source().is_some());
        assert!(AppError::Usage("bad".into()).source().is_none());
    }
}
