//! Validation of calendar data received from the network.
//!
//! Nothing from the API is trusted: numeric fields may arrive as numbers or
//! numeric strings and are range-checked, string fields are stripped of
//! markup. Out-of-range values are rejected, never clamped.

use std::ops::RangeInclusive;

use chrono::NaiveDate;
use serde_json::Value;

use crate::calendar::error::CalendarError;
use crate::calendar::types::{Accuracy, DateKey, GregorianDate, HijriDate};
use crate::services::aladhan::{ApiGregorian, ApiHijri};

pub const HIJRI_DAY_RANGE: RangeInclusive<i64> = 1..=30;
pub const MONTH_RANGE: RangeInclusive<i64> = 1..=12;
pub const HIJRI_YEAR_RANGE: RangeInclusive<i64> = 1300..=1600;
pub const GREGORIAN_DAY_RANGE: RangeInclusive<i64> = 1..=31;
pub const GREGORIAN_YEAR_RANGE: RangeInclusive<i64> = 1..=9999;

/// Strip all markup from `input` and trim surrounding whitespace.
pub fn sanitize(input: &str) -> String {
    ammonia::Builder::empty()
        .clean(input)
        .to_string()
        .trim()
        .to_string()
}

fn integer(value: &Value, field: &'static str) -> Result<i64, CalendarError> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .ok_or_else(|| CalendarError::validation(field, format!("{} is not an integer", number))),
        Value::String(text) => text
            .trim()
            .parse::<i64>()
            .map_err(|_| CalendarError::validation(field, format!("'{}' is not a number", text))),
        Value::Null => Err(CalendarError::validation(field, "missing")),
        other => Err(CalendarError::validation(field, format!("unexpected value {}", other))),
    }
}

/// Integer in `range`, from a number or numeric string.
pub fn integer_in(
    value: &Value,
    field: &'static str,
    range: RangeInclusive<i64>,
) -> Result<i64, CalendarError> {
    let number = integer(value, field)?;
    if !range.contains(&number) {
        return Err(CalendarError::validation(
            field,
            format!("{} is outside {}..={}", number, range.start(), range.end()),
        ));
    }
    Ok(number)
}

/// Non-empty sanitized string.
pub fn text(value: &Value, field: &'static str) -> Result<String, CalendarError> {
    let Value::String(raw) = value else {
        return Err(CalendarError::validation(field, "missing or not a string"));
    };

    let cleaned = sanitize(raw);
    if cleaned.is_empty() {
        return Err(CalendarError::validation(field, "empty"));
    }
    Ok(cleaned)
}

pub fn optional_text(value: &Value) -> Option<String> {
    text(value, "optional").ok()
}

pub fn validate_hijri(raw: &ApiHijri) -> Result<HijriDate, CalendarError> {
    let day = integer_in(&raw.day, "hijri day", HIJRI_DAY_RANGE)? as u32;
    let month = integer_in(&raw.month.number, "hijri month", MONTH_RANGE)? as u32;
    let year = integer_in(&raw.year, "hijri year", HIJRI_YEAR_RANGE)? as i32;
    let month_name = text(&raw.month.en, "hijri month name")?;

    Ok(HijriDate {
        day,
        month,
        year,
        formatted: HijriDate::format(day, &month_name, year),
        month_name,
        month_name_ar: optional_text(&raw.month.ar),
        accuracy: Accuracy::Authoritative,
        is_fallback: false,
    })
}

pub fn validate_gregorian(raw: &ApiGregorian) -> Result<GregorianDate, CalendarError> {
    let day = integer_in(&raw.day, "gregorian day", GREGORIAN_DAY_RANGE)? as u32;
    let month = integer_in(&raw.month.number, "gregorian month", MONTH_RANGE)? as u32;
    let year = integer_in(&raw.year, "gregorian year", GREGORIAN_YEAR_RANGE)? as i32;

    if NaiveDate::from_ymd_opt(year, month, day).is_none() {
        return Err(CalendarError::validation(
            "gregorian date",
            format!("{} is not a calendar date", DateKey::new(day, month, year)),
        ));
    }

    let month_name = text(&raw.month.en, "gregorian month name")?;
    let formatted =
        optional_text(&raw.date).unwrap_or_else(|| DateKey::new(day, month, year).to_string());

    Ok(GregorianDate {
        day,
        month,
        year,
        month_name,
        formatted,
    })
}
