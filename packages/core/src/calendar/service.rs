//! Date conversion with graceful degradation.
//!
//! Gregorian→Hijri lookups try the cache, then the calendar API through the
//! request queue, then the local converter. Whatever answers is cached, so
//! a date converted once never needs the network again. Hijri→Gregorian
//! lookups have no local fallback: cache, then network, then error.

use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use futures::future::join_all;
use serde::Serialize;

use crate::cache::CacheLayer;
use crate::calendar::chain::{DegradationChain, Resolution, StepOutcome, Strategy};
use crate::calendar::error::CalendarError;
use crate::calendar::fallback::LocalHijriConverter;
use crate::calendar::types::{
    hijri_month_name, AyyamulBidhDate, CalendarDay, DateKey, GregorianDate, HijriDate,
    UpcomingMonth, AYYAMUL_BIDH_DAYS,
};
use crate::calendar::validation::{validate_gregorian, validate_hijri};
use crate::metrics::CoreMetrics;
use crate::queue::RequestQueue;
use crate::services::provider::CalendarApi;

/// Queue priority for today's date, which the dashboard waits on.
pub const CURRENT_DATE_PRIORITY: i32 = 10;
/// Queue priority for everything else.
pub const DEFAULT_PRIORITY: i32 = 0;
/// How far ahead `upcoming_ayyamul_bidh` looks, in Hijri months.
pub const MAX_UPCOMING_MONTHS: u32 = 24;

pub fn hijri_cache_key(gregorian: &DateKey) -> String {
    format!("hijri_{}", gregorian)
}

pub fn gregorian_cache_key(hijri: &DateKey) -> String {
    format!("gregorian_{}", hijri)
}

pub struct DateConversionService {
    api: Arc<dyn CalendarApi>,
    queue: RequestQueue,
    cache: CacheLayer,
    converter: LocalHijriConverter,
    metrics: Option<Arc<CoreMetrics>>,
}

impl DateConversionService {
    pub fn new(api: Arc<dyn CalendarApi>, queue: RequestQueue, cache: CacheLayer) -> Self {
        Self {
            api,
            queue,
            cache,
            converter: LocalHijriConverter::default(),
            metrics: None,
        }
    }

    pub fn with_converter(mut self, converter: LocalHijriConverter) -> Self {
        self.converter = converter;
        self
    }

    pub fn with_metrics(mut self, metrics: Option<Arc<CoreMetrics>>) -> Self {
        self.metrics = metrics;
        self
    }

    pub async fn gregorian_to_hijri(
        &self,
        date: &DateKey,
    ) -> Result<Resolution<HijriDate>, CalendarError> {
        self.resolve_hijri(*date, DEFAULT_PRIORITY).await
    }

    /// Today's Hijri date, queued ahead of bulk lookups.
    pub async fn current_hijri_date(
        &self,
        today: NaiveDate,
    ) -> Result<Resolution<HijriDate>, CalendarError> {
        self.resolve_hijri(DateKey::from_date(today), CURRENT_DATE_PRIORITY)
            .await
    }

    async fn resolve_hijri(
        &self,
        date: DateKey,
        priority: i32,
    ) -> Result<Resolution<HijriDate>, CalendarError> {
        let cache_key = hijri_cache_key(&date);
        let key = cache_key.as_str();

        DegradationChain::new("gregorian_to_hijri")
            .with_metrics(self.metrics.clone())
            .step(Strategy::Cache, move || async move {
                match self.cache.get_as::<HijriDate>(key) {
                    Some(hijri) => StepOutcome::Hit(hijri),
                    None => StepOutcome::Miss,
                }
            })
            .step(Strategy::Network, move || async move {
                match self.fetch_hijri(date, priority).await {
                    Ok(hijri) => {
                        self.remember(key, &hijri);
                        StepOutcome::Hit(hijri)
                    }
                    Err(err) => StepOutcome::Failed(err),
                }
            })
            .step(Strategy::LocalApproximation, move || async move {
                match self.local_hijri(date) {
                    Ok(hijri) => {
                        tracing::warn!(
                            "Using local {} Hijri date for {}",
                            hijri.accuracy,
                            date
                        );
                        self.remember(key, &hijri);
                        StepOutcome::Hit(hijri)
                    }
                    Err(err) => StepOutcome::Failed(err),
                }
            })
            .resolve()
            .await
    }

    pub async fn hijri_to_gregorian(
        &self,
        date: &DateKey,
    ) -> Result<Resolution<GregorianDate>, CalendarError> {
        let date = *date;
        let cache_key = gregorian_cache_key(&date);
        let key = cache_key.as_str();

        DegradationChain::new("hijri_to_gregorian")
            .with_metrics(self.metrics.clone())
            .step(Strategy::Cache, move || async move {
                match self.cache.get_as::<GregorianDate>(key) {
                    Some(gregorian) => StepOutcome::Hit(gregorian),
                    None => StepOutcome::Miss,
                }
            })
            .step(Strategy::Network, move || async move {
                match self.fetch_gregorian(date).await {
                    Ok(gregorian) => {
                        self.remember(key, &gregorian);
                        StepOutcome::Hit(gregorian)
                    }
                    Err(err) => StepOutcome::Failed(err),
                }
            })
            .resolve()
            .await
    }

    /// Gregorian dates of the 13th, 14th and 15th of a Hijri month. Days
    /// that cannot be converted are left out.
    pub async fn ayyamul_bidh_dates(&self, month: u32, year: i32) -> Vec<AyyamulBidhDate> {
        let lookups = AYYAMUL_BIDH_DAYS.iter().map(|&day| async move {
            let key = DateKey::new(day, month, year);
            (key, self.hijri_to_gregorian(&key).await)
        });

        join_all(lookups)
            .await
            .into_iter()
            .filter_map(|(key, result)| match result {
                Ok(resolution) => Some(AyyamulBidhDate {
                    hijri_day: key.day,
                    hijri_month: key.month,
                    hijri_year: key.year,
                    gregorian: resolution.value,
                }),
                Err(err) => {
                    tracing::warn!("Skipping Ayyamul Bidh day {}: {}", key, err);
                    None
                }
            })
            .collect()
    }

    /// White days for the current Hijri month and the `months - 1` after it,
    /// looking at most [`MAX_UPCOMING_MONTHS`] ahead.
    pub async fn upcoming_ayyamul_bidh(
        &self,
        today: NaiveDate,
        months: u32,
    ) -> Result<Vec<UpcomingMonth>, CalendarError> {
        let months = months.min(MAX_UPCOMING_MONTHS);
        let current = self.current_hijri_date(today).await?.value;

        let mut upcoming = Vec::with_capacity(months as usize);
        for offset in 0..months {
            let (month, year) = advance_month(current.month, current.year, offset);
            let dates = self.ayyamul_bidh_dates(month, year).await;
            upcoming.push(UpcomingMonth {
                hijri_month: month,
                hijri_month_name: hijri_month_name(month).to_string(),
                hijri_year: year,
                dates,
            });
        }

        Ok(upcoming)
    }

    /// Every day of a Hijri month paired with its Gregorian date.
    ///
    /// Days are converted in order and the walk stops at the first day that
    /// fails, which is how a 29-day month ends. A failure on day 1 is
    /// returned as an error.
    pub async fn hijri_month_calendar(
        &self,
        month: u32,
        year: i32,
    ) -> Result<Vec<CalendarDay>, CalendarError> {
        let mut days = Vec::with_capacity(30);

        for day in 1..=30 {
            let key = DateKey::new(day, month, year);
            match self.hijri_to_gregorian(&key).await {
                Ok(resolution) => days.push(CalendarDay {
                    hijri: key,
                    hijri_month_name: hijri_month_name(month).to_string(),
                    gregorian: DateKey::new(
                        resolution.value.day,
                        resolution.value.month,
                        resolution.value.year,
                    ),
                    is_ayyamul_bidh: AYYAMUL_BIDH_DAYS.contains(&day),
                }),
                Err(err) if day == 1 => return Err(err),
                Err(err) => {
                    tracing::debug!(
                        "Hijri month {}-{} ends before day {}: {}",
                        month,
                        year,
                        day,
                        err
                    );
                    break;
                }
            }
        }

        Ok(days)
    }

    /// Every day of a Gregorian month paired with its Hijri date.
    pub async fn gregorian_month_calendar(
        &self,
        month: u32,
        year: i32,
    ) -> Result<Vec<CalendarDay>, CalendarError> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| CalendarError::InvalidDateKey(format!("01-{:02}-{:04}", month, year)))?;

        let lookups = first
            .iter_days()
            .take_while(|date| date.month() == month)
            .map(|date| async move {
                let key = DateKey::from_date(date);
                (key, self.resolve_hijri(key, DEFAULT_PRIORITY).await)
            });

        let days = join_all(lookups)
            .await
            .into_iter()
            .filter_map(|(gregorian, result)| match result {
                Ok(resolution) => Some(CalendarDay {
                    hijri: resolution.value.key(),
                    is_ayyamul_bidh: resolution.value.is_ayyamul_bidh(),
                    hijri_month_name: resolution.value.month_name,
                    gregorian,
                }),
                Err(err) => {
                    tracing::warn!("Skipping {}: {}", gregorian, err);
                    None
                }
            })
            .collect();

        Ok(days)
    }

    async fn fetch_hijri(&self, date: DateKey, priority: i32) -> Result<HijriDate, CalendarError> {
        let api = self.api.clone();
        let raw = self
            .queue
            .enqueue(
                move || {
                    let api = api.clone();
                    async move { api.gregorian_to_hijri(&date).await }
                },
                priority,
            )
            .await?;

        validate_hijri(&raw)
    }

    async fn fetch_gregorian(&self, date: DateKey) -> Result<GregorianDate, CalendarError> {
        let api = self.api.clone();
        let raw = self
            .queue
            .enqueue(
                move || {
                    let api = api.clone();
                    async move { api.hijri_to_gregorian(&date).await }
                },
                DEFAULT_PRIORITY,
            )
            .await?;

        validate_gregorian(&raw)
    }

    fn local_hijri(&self, date: DateKey) -> Result<HijriDate, CalendarError> {
        let gregorian = date
            .to_gregorian()
            .ok_or_else(|| CalendarError::InvalidDateKey(date.to_string()))?;

        self.converter.convert(gregorian)
    }

    fn remember<T: Serialize>(&self, key: &str, value: &T) {
        if let Err(err) = self.cache.put_as(key, value) {
            tracing::warn!("Could not cache {}: {}", key, err);
        }
    }
}

/// Hijri `(month, year)` that is `offset` months after `month`/`year`.
pub fn advance_month(month: u32, year: i32, offset: u32) -> (u32, i32) {
    let total = i64::from(month.saturating_sub(1)) + i64::from(offset);
    let year = i64::from(year) + total / 12;
    ((total % 12) as u32 + 1, year.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32)
}
