//! Prayer times
//!
//! Daily timings from the calendar API with stale-cache fallback, plus
//! next/current prayer helpers.

pub mod schedule;
pub mod service;
pub mod types;

pub use schedule::{current_prayer, next_prayer, NextPrayer};
pub use service::PrayerTimesService;
pub use types::{CalculationMethod, Location, Prayer, PrayerTimes, Timings};
