//! Hijri calendar module
//!
//! Date conversion between the Gregorian and Hijri calendars, the local
//! fallback converter, and the Ayyamul Bidh window countdown.

pub mod chain;
pub mod error;
pub mod fallback;
pub mod service;
pub mod types;
pub mod validation;
pub mod window;

#[cfg(test)]
mod tests;

pub use chain::{DegradationChain, Resolution, StepOutcome, Strategy};
pub use error::CalendarError;
pub use fallback::{is_ayyamul_bidh, LocalHijriConverter, TabularIslamicCalendar};
pub use service::DateConversionService;
pub use types::*;
pub use window::{days_until_next_window, WindowCountdown, WindowStatus};
