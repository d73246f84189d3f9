//! Fasting tracker.
//!
//! Records which white days the user fasted, keyed by Hijri month, and
//! derives statistics and streaks from that record. The record is persisted
//! under [`FASTING_DATA_KEY`] after every mutation.
//!
//! Invariants: every stored day is 13, 14 or 15, and months with no days are
//! removed rather than kept empty.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::calendar::types::{hijri_month_name, AYYAMUL_BIDH_DAYS};
use crate::store::{KeyValueStore, StoreError, FASTING_DATA_KEY};

/// Consecutive months counted by [`FastingTracker::current_streak`] at most.
pub const MAX_STREAK_MONTHS: u32 = 24;
pub const DAYS_PER_MONTH: u32 = 3;
pub const MAX_DAYS_PER_YEAR: u32 = DAYS_PER_MONTH * 12;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Day {0} is not an Ayyamul Bidh day (13, 14 or 15)")]
    NotAyyamulBidh(u32),

    #[error("Invalid Hijri month: {0}")]
    InvalidMonth(u32),

    #[error("Invalid month key '{0}', expected YYYY-MM")]
    InvalidMonthKey(String),

    #[error("Import error: {0}")]
    Import(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A Hijri month, written `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn new(month: u32, year: i32) -> Result<Self, TrackerError> {
        if !(1..=12).contains(&month) {
            return Err(TrackerError::InvalidMonth(month));
        }
        Ok(Self { year, month })
    }

    pub fn previous(&self) -> Self {
        match self.month {
            1 => Self {
                year: self.year - 1,
                month: 12,
            },
            month => Self {
                year: self.year,
                month: month - 1,
            },
        }
    }

    pub fn next(&self) -> Self {
        match self.month {
            12 => Self {
                year: self.year + 1,
                month: 1,
            },
            month => Self {
                year: self.year,
                month: month + 1,
            },
        }
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = TrackerError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = || TrackerError::InvalidMonthKey(input.to_string());

        let (year, month) = input.split_once('-').ok_or_else(invalid)?;
        let digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
        if year.len() != 4 || month.len() != 2 || !digits(year) || !digits(month) {
            return Err(invalid());
        }

        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        Self::new(month, year).map_err(|_| invalid())
    }
}

impl TryFrom<String> for MonthKey {
    type Error = TrackerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MonthKey> for String {
    fn from(key: MonthKey) -> Self {
        key.to_string()
    }
}

/// Completed white days per Hijri month.
pub type FastingRecord = BTreeMap<MonthKey, BTreeSet<u32>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonthStatus {
    Complete,
    Partial,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyStats {
    pub month_key: MonthKey,
    pub month: u32,
    pub month_name: String,
    pub year: i32,
    pub marked_days: Vec<u32>,
    pub total_days: u32,
    pub is_complete: bool,
    /// Share of the three white days, rounded.
    pub percentage: u32,
    pub status: MonthStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearlyStats {
    pub year: i32,
    pub total_days: u32,
    pub max_possible_days: u32,
    pub percentage: u32,
    pub complete_months: u32,
    pub partial_months: u32,
    pub empty_months: u32,
    pub monthly_details: Vec<MonthlyStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FastingExport {
    pub puasa_ayyamul_bidh: FastingRecord,
    pub exported_at: DateTime<Utc>,
    pub total_days: u32,
    pub longest_streak: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub months: usize,
    pub days: usize,
    /// Month keys that were not `YYYY-MM` or held no white days.
    pub skipped: usize,
}

fn percentage(part: u32, whole: u32) -> u32 {
    if whole == 0 {
        return 0;
    }
    (f64::from(part) * 100.0 / f64::from(whole)).round() as u32
}

/// Build a record from untrusted JSON, keeping only what satisfies the
/// record's invariants.
fn sanitize_record(value: &Value) -> (FastingRecord, usize) {
    let mut record = FastingRecord::new();
    let mut skipped = 0;

    let Some(months) = value.as_object() else {
        return (record, 0);
    };

    for (key, days) in months {
        let Ok(month_key) = key.parse::<MonthKey>() else {
            skipped += 1;
            continue;
        };

        let days: BTreeSet<u32> = days
            .as_array()
            .map(|days| {
                days.iter()
                    .filter_map(Value::as_u64)
                    .filter_map(|day| u32::try_from(day).ok())
                    .filter(|day| AYYAMUL_BIDH_DAYS.contains(day))
                    .collect()
            })
            .unwrap_or_default();

        if days.is_empty() {
            skipped += 1;
            continue;
        }
        record.insert(month_key, days);
    }

    (record, skipped)
}

pub struct FastingTracker {
    store: Arc<dyn KeyValueStore>,
    record: FastingRecord,
}

impl FastingTracker {
    /// Load the record from `store`. Unreadable data is discarded with a
    /// warning.
    pub async fn load(store: Arc<dyn KeyValueStore>) -> Result<Self, TrackerError> {
        let record = match store.get(FASTING_DATA_KEY).await? {
            Some(blob) => match serde_json::from_str::<Value>(&blob) {
                Ok(value) => {
                    let (record, skipped) = sanitize_record(&value);
                    if skipped > 0 {
                        tracing::warn!("Dropped {} invalid months from fasting record", skipped);
                    }
                    record
                }
                Err(err) => {
                    tracing::warn!("Discarding unreadable fasting record: {}", err);
                    FastingRecord::new()
                }
            },
            None => FastingRecord::new(),
        };

        Ok(Self { store, record })
    }

    pub fn record(&self) -> &FastingRecord {
        &self.record
    }

    async fn save(&self) -> Result<(), TrackerError> {
        let blob = serde_json::to_string(&self.record).map_err(StoreError::from)?;
        self.store.set(FASTING_DATA_KEY, &blob).await?;
        Ok(())
    }

    /// Mark `day` as fasted. Returns `false` when it already was.
    pub async fn mark(&mut self, day: u32, month: u32, year: i32) -> Result<bool, TrackerError> {
        if !AYYAMUL_BIDH_DAYS.contains(&day) {
            return Err(TrackerError::NotAyyamulBidh(day));
        }
        let key = MonthKey::new(month, year)?;

        if !self.record.entry(key).or_default().insert(day) {
            return Ok(false);
        }

        self.save().await?;
        tracing::info!("Marked {} day {}", key, day);
        Ok(true)
    }

    /// Unmark `day`. Returns `false` when it was not marked.
    pub async fn unmark(&mut self, day: u32, month: u32, year: i32) -> Result<bool, TrackerError> {
        let key = MonthKey::new(month, year)?;

        let Some(days) = self.record.get_mut(&key) else {
            return Ok(false);
        };
        if !days.remove(&day) {
            return Ok(false);
        }
        if days.is_empty() {
            self.record.remove(&key);
        }

        self.save().await?;
        tracing::info!("Unmarked {} day {}", key, day);
        Ok(true)
    }

    /// Flip `day`. Returns whether it is marked afterwards.
    pub async fn toggle(&mut self, day: u32, month: u32, year: i32) -> Result<bool, TrackerError> {
        if self.is_marked(day, month, year) {
            self.unmark(day, month, year).await?;
            Ok(false)
        } else {
            self.mark(day, month, year).await?;
            Ok(true)
        }
    }

    pub fn is_marked(&self, day: u32, month: u32, year: i32) -> bool {
        MonthKey::new(month, year)
            .ok()
            .and_then(|key| self.record.get(&key))
            .map_or(false, |days| days.contains(&day))
    }

    pub fn monthly_stats(&self, month: u32, year: i32) -> MonthlyStats {
        let key = MonthKey { year, month };
        let marked_days: Vec<u32> = self
            .record
            .get(&key)
            .map(|days| days.iter().copied().collect())
            .unwrap_or_default();
        let total_days = marked_days.len() as u32;

        let status = match total_days {
            0 => MonthStatus::None,
            DAYS_PER_MONTH => MonthStatus::Complete,
            _ => MonthStatus::Partial,
        };

        MonthlyStats {
            month_key: key,
            month,
            month_name: hijri_month_name(month).to_string(),
            year,
            marked_days,
            total_days,
            is_complete: status == MonthStatus::Complete,
            percentage: percentage(total_days, DAYS_PER_MONTH),
            status,
        }
    }

    pub fn yearly_stats(&self, year: i32) -> YearlyStats {
        let monthly_details: Vec<MonthlyStats> =
            (1..=12).map(|month| self.monthly_stats(month, year)).collect();

        let total_days = monthly_details.iter().map(|stats| stats.total_days).sum();
        let count = |status: MonthStatus| {
            monthly_details
                .iter()
                .filter(|stats| stats.status == status)
                .count() as u32
        };
        let complete_months = count(MonthStatus::Complete);
        let partial_months = count(MonthStatus::Partial);

        YearlyStats {
            year,
            total_days,
            max_possible_days: MAX_DAYS_PER_YEAR,
            percentage: percentage(total_days, MAX_DAYS_PER_YEAR),
            complete_months,
            partial_months,
            empty_months: 12 - complete_months - partial_months,
            monthly_details,
        }
    }

    pub fn total_fasting_days(&self) -> u32 {
        self.record.values().map(|days| days.len() as u32).sum()
    }

    /// Complete months immediately before `month`/`year`, newest first,
    /// capped at [`MAX_STREAK_MONTHS`]. The given month itself is not
    /// counted since it may still be in progress.
    pub fn current_streak(&self, month: u32, year: i32) -> u32 {
        let mut key = MonthKey { year, month }.previous();
        let mut streak = 0;

        while streak < MAX_STREAK_MONTHS && self.is_complete(&key) {
            streak += 1;
            key = key.previous();
        }

        streak
    }

    /// Longest run of consecutive complete months anywhere in the record.
    pub fn longest_streak(&self) -> u32 {
        let mut longest = 0;
        let mut run = 0;
        let mut previous: Option<MonthKey> = None;

        for key in self.record.keys().filter(|key| self.is_complete(key)) {
            run = match previous {
                Some(prev) if prev.next() == *key => run + 1,
                _ => 1,
            };
            longest = longest.max(run);
            previous = Some(*key);
        }

        longest
    }

    fn is_complete(&self, key: &MonthKey) -> bool {
        self.record
            .get(key)
            .map_or(false, |days| days.len() as u32 == DAYS_PER_MONTH)
    }

    /// Stats for every recorded month, newest first.
    pub fn history(&self) -> Vec<MonthlyStats> {
        self.record
            .keys()
            .rev()
            .map(|key| self.monthly_stats(key.month, key.year))
            .collect()
    }

    pub fn export(&self) -> FastingExport {
        FastingExport {
            puasa_ayyamul_bidh: self.record.clone(),
            exported_at: Utc::now(),
            total_days: self.total_fasting_days(),
            longest_streak: self.longest_streak(),
        }
    }

    /// Replace the record with the one in an export document.
    ///
    /// Import is lenient: bad month keys are skipped, days other than the
    /// white days are filtered out and months left empty are dropped. A
    /// document without a record is an error and changes nothing.
    pub async fn import(&mut self, data: &Value) -> Result<ImportSummary, TrackerError> {
        let Some(months) = data.get(FASTING_DATA_KEY) else {
            return Err(TrackerError::Import(format!("missing '{}'", FASTING_DATA_KEY)));
        };
        if !months.is_object() {
            return Err(TrackerError::Import(format!("'{}' is not an object", FASTING_DATA_KEY)));
        }

        let (record, skipped) = sanitize_record(months);
        let summary = ImportSummary {
            months: record.len(),
            days: record.values().map(BTreeSet::len).sum(),
            skipped,
        };

        self.record = record;
        self.save().await?;
        tracing::info!(
            "Imported {} months ({} days), skipped {}",
            summary.months,
            summary.days,
            summary.skipped
        );

        Ok(summary)
    }

    pub async fn reset(&mut self) -> Result<(), TrackerError> {
        self.record.clear();
        self.save().await
    }
}
