//! Core calendar types.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::calendar::error::CalendarError;

/// The white days: 13th, 14th and 15th of every Hijri month.
pub const AYYAMUL_BIDH_DAYS: [u32; 3] = [13, 14, 15];

pub const HIJRI_MONTH_NAMES: [&str; 12] = [
    "Muharram",
    "Safar",
    "Rabi' al-Awwal",
    "Rabi' al-Thani",
    "Jumada al-Awwal",
    "Jumada al-Thani",
    "Rajab",
    "Sha'ban",
    "Ramadan",
    "Shawwal",
    "Dhu al-Qi'dah",
    "Dhu al-Hijjah",
];

pub const GREGORIAN_MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// English name of Hijri `month` (1-based), or `"Unknown"`.
pub fn hijri_month_name(month: u32) -> &'static str {
    month_name(&HIJRI_MONTH_NAMES, month)
}

/// English name of Gregorian `month` (1-based), or `"Unknown"`.
pub fn gregorian_month_name(month: u32) -> &'static str {
    month_name(&GREGORIAN_MONTH_NAMES, month)
}

fn month_name(names: &[&'static str; 12], month: u32) -> &'static str {
    month
        .checked_sub(1)
        .and_then(|index| names.get(index as usize))
        .copied()
        .unwrap_or("Unknown")
}

/// A `DD-MM-YYYY` date identifier, used for both calendars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DateKey {
    pub day: u32,
    pub month: u32,
    pub year: i32,
}

impl DateKey {
    pub fn new(day: u32, month: u32, year: i32) -> Self {
        Self { day, month, year }
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self::new(date.day(), date.month(), date.year())
    }

    /// The key read as a Gregorian calendar date, if it is one.
    pub fn to_gregorian(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}-{:02}-{:04}", self.day, self.month, self.year)
    }
}

impl FromStr for DateKey {
    type Err = CalendarError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = || CalendarError::InvalidDateKey(input.to_string());

        let parts: Vec<&str> = input.split('-').collect();
        let [day, month, year] = parts[..] else {
            return Err(invalid());
        };

        let digits = |part: &str, len: usize| {
            part.len() == len && part.bytes().all(|byte| byte.is_ascii_digit())
        };
        if !digits(day, 2) || !digits(month, 2) || !digits(year, 4) {
            return Err(invalid());
        }

        let day: u32 = day.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        let year: i32 = year.parse().map_err(|_| invalid())?;

        if !(1..=31).contains(&day) || !(1..=12).contains(&month) {
            return Err(invalid());
        }

        Ok(Self::new(day, month, year))
    }
}

/// How a Hijri date was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accuracy {
    /// Returned by the calendar API.
    Authoritative,
    /// Computed locally with a calendar-aware formatter.
    High,
    /// Computed locally with mean-year arithmetic.
    Approximate,
}

impl fmt::Display for Accuracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Accuracy::Authoritative => "authoritative",
            Accuracy::High => "high",
            Accuracy::Approximate => "approximate",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HijriDate {
    pub day: u32,
    pub month: u32,
    pub year: i32,
    pub month_name: String,
    pub formatted: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month_name_ar: Option<String>,
    pub accuracy: Accuracy,
    #[serde(default)]
    pub is_fallback: bool,
}

impl HijriDate {
    pub fn format(day: u32, month_name: &str, year: i32) -> String {
        format!("{} {} {} H", day, month_name, year)
    }

    pub fn is_ayyamul_bidh(&self) -> bool {
        AYYAMUL_BIDH_DAYS.contains(&self.day)
    }

    pub fn key(&self) -> DateKey {
        DateKey::new(self.day, self.month, self.year)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GregorianDate {
    pub day: u32,
    pub month: u32,
    pub year: i32,
    pub month_name: String,
    pub formatted: String,
}

impl GregorianDate {
    pub fn to_naive(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
    }
}

/// A Gregorian day that falls on one of the white days.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AyyamulBidhDate {
    pub hijri_day: u32,
    pub hijri_month: u32,
    pub hijri_year: i32,
    pub gregorian: GregorianDate,
}

/// White days of one Hijri month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpcomingMonth {
    pub hijri_month: u32,
    pub hijri_month_name: String,
    pub hijri_year: i32,
    pub dates: Vec<AyyamulBidhDate>,
}

/// One cell of a month view, pairing both calendars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarDay {
    pub hijri: DateKey,
    pub hijri_month_name: String,
    pub gregorian: DateKey,
    pub is_ayyamul_bidh: bool,
}
