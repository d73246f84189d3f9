//! Local Hijri conversion for when the calendar API is unreachable.
//!
//! Two strategies, tried in order:
//!
//! 1. A calendar-aware [`HijriFormatter`]. The shipped one is the tabular
//!    (civil) Islamic calendar, which tracks the observed calendar to within
//!    a day or two. Results carry [`Accuracy::High`].
//! 2. Mean-year arithmetic from the Hijra epoch with an alternating 30/29
//!    month table. Results carry [`Accuracy::Approximate`].
//!
//! Both are estimates; neither is a substitute for moon sighting.

use std::sync::Arc;

use chrono::{Datelike, NaiveDate};

use crate::calendar::error::CalendarError;
use crate::calendar::types::{hijri_month_name, Accuracy, HijriDate, AYYAMUL_BIDH_DAYS};

/// Maps a Gregorian date to `(day, month, year)` in some Hijri calendar.
pub trait HijriFormatter: Send + Sync {
    fn name(&self) -> &'static str;

    /// `None` when `date` is outside what the formatter supports.
    fn hijri_parts(&self, date: NaiveDate) -> Option<(u32, u32, i32)>;
}

/// Arithmetical Islamic calendar with a 30-year cycle of 11 leap years.
///
/// Days are counted as Rata Die (1 January 1 CE is day 1), which is what
/// `chrono`'s `num_days_from_ce` returns.
#[derive(Debug, Clone, Copy, Default)]
pub struct TabularIslamicCalendar;

impl TabularIslamicCalendar {
    /// Rata Die of 1 Muharram 1 AH (16 July 622, Julian).
    pub const EPOCH: i64 = 227_015;

    pub fn is_leap_year(year: i32) -> bool {
        (14 + 11 * i64::from(year)).rem_euclid(30) < 11
    }

    pub fn month_days(year: i32, month: u32) -> u32 {
        if month % 2 == 1 || (month == 12 && Self::is_leap_year(year)) {
            30
        } else {
            29
        }
    }

    /// Rata Die of the given Hijri date.
    pub fn to_fixed(year: i32, month: u32, day: u32) -> i64 {
        let year = i64::from(year);
        let month = i64::from(month);

        Self::EPOCH - 1
            + (year - 1) * 354
            + (3 + 11 * year).div_euclid(30)
            + 29 * (month - 1)
            + month / 2
            + i64::from(day)
    }

    /// Hijri `(year, month, day)` of a Rata Die.
    pub fn from_fixed(fixed: i64) -> (i32, u32, u32) {
        let year = (30 * (fixed - Self::EPOCH) + 10_646).div_euclid(10_631) as i32;
        let prior_days = fixed - Self::to_fixed(year, 1, 1);
        let month = (11 * prior_days + 330).div_euclid(325) as u32;
        let day = (fixed - Self::to_fixed(year, month, 1) + 1) as u32;

        (year, month, day)
    }
}

impl HijriFormatter for TabularIslamicCalendar {
    fn name(&self) -> &'static str {
        "tabular"
    }

    fn hijri_parts(&self, date: NaiveDate) -> Option<(u32, u32, i32)> {
        let fixed = i64::from(date.num_days_from_ce());
        if fixed < Self::EPOCH {
            return None;
        }

        let (year, month, day) = Self::from_fixed(fixed);
        Some((day, month, year))
    }
}

const MEAN_YEAR_DAYS: f64 = 354.366_67;
const MONTH_LENGTHS: [i64; 12] = [30, 29, 30, 29, 30, 29, 30, 29, 30, 29, 30, 29];

/// Local converter used as the last step of a Gregorian→Hijri lookup.
#[derive(Clone)]
pub struct LocalHijriConverter {
    formatter: Option<Arc<dyn HijriFormatter>>,
}

impl Default for LocalHijriConverter {
    fn default() -> Self {
        Self::new(Some(Arc::new(TabularIslamicCalendar)))
    }
}

impl LocalHijriConverter {
    pub fn new(formatter: Option<Arc<dyn HijriFormatter>>) -> Self {
        Self { formatter }
    }

    /// A converter that only has the arithmetic path.
    pub fn arithmetic_only() -> Self {
        Self::new(None)
    }

    pub fn convert(&self, date: NaiveDate) -> Result<HijriDate, CalendarError> {
        if let Some(formatter) = &self.formatter {
            match formatter.hijri_parts(date) {
                Some((day, month, year)) => {
                    return Ok(local_date(day, month, year, Accuracy::High));
                }
                None => tracing::debug!(
                    "{} formatter cannot convert {}, using arithmetic",
                    formatter.name(),
                    date
                ),
            }
        }

        Self::approximate(date)
    }

    /// Mean-year arithmetic from the Hijra epoch (16 July 622, proleptic
    /// Gregorian). Fails for dates before the epoch.
    pub fn approximate(date: NaiveDate) -> Result<HijriDate, CalendarError> {
        let epoch = NaiveDate::from_ymd_opt(622, 7, 16)
            .ok_or_else(|| CalendarError::OutOfRange("622-07-16".into()))?;

        let days = (date - epoch).num_days();
        if days < 0 {
            return Err(CalendarError::OutOfRange(date.to_string()));
        }

        let mut year = (days as f64 / MEAN_YEAR_DAYS).floor() as i64 + 1;
        let mut remaining = days - ((year - 1) as f64 * MEAN_YEAR_DAYS).floor() as i64;

        let mut month = 1usize;
        while month < 12 && remaining > MONTH_LENGTHS[month - 1] {
            remaining -= MONTH_LENGTHS[month - 1];
            month += 1;
        }

        if remaining <= 0 {
            if month == 1 {
                month = 12;
                year -= 1;
            } else {
                month -= 1;
            }
        }

        let day = remaining.clamp(1, 30) as u32;
        let year =
            i32::try_from(year).map_err(|_| CalendarError::OutOfRange(date.to_string()))?;

        Ok(local_date(day, month as u32, year, Accuracy::Approximate))
    }
}

fn local_date(day: u32, month: u32, year: i32, accuracy: Accuracy) -> HijriDate {
    let month_name = hijri_month_name(month).to_string();
    HijriDate {
        day,
        month,
        year,
        formatted: HijriDate::format(day, &month_name, year),
        month_name,
        month_name_ar: None,
        accuracy,
        is_fallback: true,
    }
}

/// `true` for the 13th, 14th and 15th.
pub fn is_ayyamul_bidh(day: u32) -> bool {
    AYYAMUL_BIDH_DAYS.contains(&day)
}
