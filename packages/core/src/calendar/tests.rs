//! Date conversion service tests
//!
//! The service runs against the scripted calendar API, an in-memory store and
//! a queue with no dispatch delay, so every test exercises the real chain,
//! cache and queue together.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, NaiveDate};
use proptest::prelude::*;

use crate::cache::CacheLayer;
use crate::calendar::chain::Strategy;
use crate::calendar::error::CalendarError;
use crate::calendar::fallback::{LocalHijriConverter, TabularIslamicCalendar};
use crate::calendar::service::{
    advance_month, hijri_cache_key, DateConversionService, MAX_UPCOMING_MONTHS,
};
use crate::calendar::types::{Accuracy, DateKey, HijriDate};
use crate::calendar::window::{window_for_day, WindowStatus};
use crate::metrics::CoreMetrics;
use crate::queue::{QueueConfig, RequestQueue};
use crate::services::aladhan::ApiGregorian;
use crate::services::error::ApiError;
use crate::services::mock_aladhan::{gregorian_fixture, hijri_fixture, MockCalendarApi};
use crate::services::provider::CalendarApi;
use crate::store::MemoryStore;

fn quick_queue() -> RequestQueue {
    RequestQueue::new(QueueConfig {
        max_concurrent: 3,
        delay_between_dispatches: Duration::ZERO,
        retry_attempts: 2,
        retry_base_delay: Duration::from_millis(10),
        retry_jitter: Duration::ZERO,
    })
}

async fn service_with(mock: &Arc<MockCalendarApi>) -> (DateConversionService, CacheLayer) {
    let cache = CacheLayer::load(Arc::new(MemoryStore::new())).await.unwrap();
    let api: Arc<dyn CalendarApi> = mock.clone();
    let service = DateConversionService::new(api, quick_queue(), cache.clone())
        .with_converter(LocalHijriConverter::arithmetic_only());
    (service, cache)
}

fn march_24() -> DateKey {
    DateKey::new(24, 3, 2024)
}

/// Gregorian answer for Hijri day `key.day` of a month that starts on
/// 11 March 2024.
fn ramadan_1445(key: &DateKey) -> Result<ApiGregorian, ApiError> {
    let start = NaiveDate::from_ymd_opt(2024, 3, 11).unwrap();
    let date = start + chrono::Duration::days(i64::from(key.day) - 1);
    Ok(gregorian_fixture(date.day(), date.month(), date.year()))
}

// ---- gregorian → hijri ----

#[tokio::test]
async fn network_result_is_cached_and_reused() {
    let mock = Arc::new(MockCalendarApi::new().with_hijri(hijri_fixture(14, 9, 1445)));
    let (service, cache) = service_with(&mock).await;

    let first = service.gregorian_to_hijri(&march_24()).await.unwrap();
    assert_eq!(first.strategy, Strategy::Network);
    assert_eq!(first.value.formatted, "14 Ramadan 1445 H");
    assert_eq!(first.value.accuracy, Accuracy::Authoritative);
    assert!(!first.value.is_fallback);

    let cached: HijriDate = cache.get_as(&hijri_cache_key(&march_24())).unwrap();
    assert_eq!(cached, first.value);

    let second = service.gregorian_to_hijri(&march_24()).await.unwrap();
    assert_eq!(second.strategy, Strategy::Cache);
    assert_eq!(second.value, first.value);
    assert_eq!(mock.hijri_calls(), 1);
}

#[tokio::test]
async fn cache_hit_skips_the_api() {
    let mock = Arc::new(MockCalendarApi::new());
    let (service, cache) = service_with(&mock).await;

    let stored = LocalHijriConverter::default()
        .convert(NaiveDate::from_ymd_opt(2024, 3, 24).unwrap())
        .unwrap();
    cache.put_as(&hijri_cache_key(&march_24()), &stored).unwrap();

    let resolution = service.gregorian_to_hijri(&march_24()).await.unwrap();
    assert_eq!(resolution.strategy, Strategy::Cache);
    assert_eq!(resolution.value, stored);
    assert_eq!(mock.hijri_calls(), 0);
}

#[tokio::test]
async fn invalid_api_data_falls_back_locally_and_is_cached() {
    // Year 1200 is outside the accepted range.
    let mock = Arc::new(MockCalendarApi::new().push_hijri(Ok(hijri_fixture(14, 9, 1200))));
    let (service, _cache) = service_with(&mock).await;

    let first = service.gregorian_to_hijri(&march_24()).await.unwrap();
    assert_eq!(first.strategy, Strategy::LocalApproximation);
    assert!(first.value.is_fallback);
    assert_eq!(first.value.accuracy, Accuracy::Approximate);
    assert_eq!(first.failures.len(), 1);
    assert_eq!(first.failures[0].strategy, Strategy::Network);
    assert!(first.is_degraded());

    let second = service.gregorian_to_hijri(&march_24()).await.unwrap();
    assert_eq!(second.strategy, Strategy::Cache);
    assert_eq!(second.value, first.value);
    assert_eq!(mock.hijri_calls(), 1);
}

#[tokio::test]
async fn network_failure_uses_tabular_converter_by_default() {
    let mock = Arc::new(MockCalendarApi::new().push_hijri(Err(ApiError::network("offline"))));
    let cache = CacheLayer::load(Arc::new(MemoryStore::new())).await.unwrap();
    let api: Arc<dyn CalendarApi> = mock.clone();
    let service = DateConversionService::new(api, quick_queue(), cache);

    let resolution = service.gregorian_to_hijri(&march_24()).await.unwrap();
    assert_eq!(resolution.strategy, Strategy::LocalApproximation);
    assert_eq!(resolution.value.accuracy, Accuracy::High);
    assert_eq!((resolution.value.day, resolution.value.month), (14, 9));
}

#[tokio::test]
async fn failed_fallback_returns_the_network_error() {
    let mock = Arc::new(MockCalendarApi::new().push_hijri(Err(ApiError::Http { status: 500 })));
    let (service, cache) = service_with(&mock).await;

    // Before the Hijra epoch, so the local converter cannot help.
    let err = service
        .gregorian_to_hijri(&DateKey::new(1, 1, 600))
        .await
        .unwrap_err();

    assert!(matches!(err, CalendarError::Api(ApiError::Http { status: 500 })));
    assert!(cache.is_empty());
}

#[tokio::test(start_paused = true)]
async fn rate_limited_conversion_is_retried() {
    let mock = Arc::new(
        MockCalendarApi::new()
            .push_hijri(Err(ApiError::RateLimited))
            .with_hijri(hijri_fixture(14, 9, 1445)),
    );
    let (service, _cache) = service_with(&mock).await;

    let resolution = service.gregorian_to_hijri(&march_24()).await.unwrap();
    assert_eq!(resolution.strategy, Strategy::Network);
    assert_eq!(mock.hijri_calls(), 2);
}

#[tokio::test]
async fn current_date_resolves_today() {
    let mock = Arc::new(MockCalendarApi::new().with_hijri(hijri_fixture(14, 9, 1445)));
    let (service, cache) = service_with(&mock).await;

    let today = NaiveDate::from_ymd_opt(2024, 3, 24).unwrap();
    let resolution = service.current_hijri_date(today).await.unwrap();

    assert!(resolution.value.is_ayyamul_bidh());
    assert!(cache.get(&hijri_cache_key(&march_24())).is_some());
}

#[tokio::test]
async fn resolutions_are_counted() {
    let metrics = Arc::new(CoreMetrics::new().unwrap());
    let mock = Arc::new(MockCalendarApi::new().with_hijri(hijri_fixture(14, 9, 1445)));
    let (service, _cache) = service_with(&mock).await;
    let service = service.with_metrics(Some(metrics.clone()));

    service.gregorian_to_hijri(&march_24()).await.unwrap();
    service.gregorian_to_hijri(&march_24()).await.unwrap();

    let counted = |strategy: &str| {
        metrics
            .resolutions_total
            .with_label_values(&["gregorian_to_hijri", strategy])
            .get()
    };
    assert!((counted("network") - 1.0).abs() < f64::EPSILON);
    assert!((counted("cache") - 1.0).abs() < f64::EPSILON);
}

// ---- hijri → gregorian ----

#[tokio::test]
async fn hijri_to_gregorian_has_no_local_fallback() {
    let mock = Arc::new(MockCalendarApi::new().push_gregorian(Err(ApiError::Http { status: 503 })));
    let (service, _cache) = service_with(&mock).await;

    let err = service
        .hijri_to_gregorian(&DateKey::new(14, 9, 1445))
        .await
        .unwrap_err();
    assert!(matches!(err, CalendarError::Api(ApiError::Http { status: 503 })));
}

#[tokio::test]
async fn hijri_to_gregorian_is_cached() {
    let mock = Arc::new(MockCalendarApi::new().with_gregorian_fn(ramadan_1445));
    let (service, _cache) = service_with(&mock).await;
    let key = DateKey::new(14, 9, 1445);

    let first = service.hijri_to_gregorian(&key).await.unwrap();
    assert_eq!(first.value.to_naive(), NaiveDate::from_ymd_opt(2024, 3, 24));

    let second = service.hijri_to_gregorian(&key).await.unwrap();
    assert_eq!(second.strategy, Strategy::Cache);
    assert_eq!(mock.gregorian_calls(), 1);
}

#[tokio::test]
async fn impossible_gregorian_date_is_rejected() {
    let mock = Arc::new(MockCalendarApi::new().push_gregorian(Ok(gregorian_fixture(30, 2, 2024))));
    let (service, _cache) = service_with(&mock).await;

    let err = service
        .hijri_to_gregorian(&DateKey::new(20, 8, 1445))
        .await
        .unwrap_err();
    assert!(matches!(err, CalendarError::Validation { .. }));
}

// ---- ayyamul bidh lookups ----

#[tokio::test]
async fn failed_white_day_is_skipped() {
    let mock = Arc::new(MockCalendarApi::new().with_gregorian_fn(|key| {
        if key.day == 14 {
            Err(ApiError::Http { status: 500 })
        } else {
            ramadan_1445(key)
        }
    }));
    let (service, _cache) = service_with(&mock).await;

    let dates = service.ayyamul_bidh_dates(9, 1445).await;

    let days: Vec<u32> = dates.iter().map(|date| date.hijri_day).collect();
    assert_eq!(days, vec![13, 15]);
    assert_eq!(dates[0].gregorian.to_naive(), NaiveDate::from_ymd_opt(2024, 3, 23));
}

#[tokio::test]
async fn upcoming_rolls_over_the_year() {
    let mock = Arc::new(
        MockCalendarApi::new()
            .with_hijri(hijri_fixture(20, 12, 1445))
            .with_gregorian_fn(ramadan_1445),
    );
    let (service, _cache) = service_with(&mock).await;

    let today = NaiveDate::from_ymd_opt(2024, 6, 26).unwrap();
    let upcoming = service.upcoming_ayyamul_bidh(today, 3).await.unwrap();

    let months: Vec<(u32, i32)> = upcoming
        .iter()
        .map(|month| (month.hijri_month, month.hijri_year))
        .collect();
    assert_eq!(months, vec![(12, 1445), (1, 1446), (2, 1446)]);
    assert_eq!(upcoming[1].hijri_month_name, "Muharram");
    assert!(upcoming.iter().all(|month| month.dates.len() == 3));
}

#[test]
fn advance_month_table() {
    assert_eq!(advance_month(9, 1445, 0), (9, 1445));
    assert_eq!(advance_month(12, 1445, 1), (1, 1446));
    assert_eq!(advance_month(11, 1445, 3), (2, 1446));
    assert_eq!(advance_month(1, 1445, 24), (1, 1447));
}

#[test]
fn advance_month_handles_huge_offsets() {
    assert_eq!(advance_month(12, 1445, u32::MAX), (3, 357_915_387));
    assert_eq!(advance_month(1, i32::MAX, 12), (1, i32::MAX));
}

#[tokio::test]
async fn upcoming_is_capped() {
    let mock = Arc::new(
        MockCalendarApi::new()
            .with_hijri(hijri_fixture(20, 12, 1445))
            .with_gregorian_fn(ramadan_1445),
    );
    let (service, _cache) = service_with(&mock).await;

    let today = NaiveDate::from_ymd_opt(2024, 6, 26).unwrap();
    let upcoming = service.upcoming_ayyamul_bidh(today, u32::MAX).await.unwrap();

    assert_eq!(upcoming.len(), MAX_UPCOMING_MONTHS as usize);
    let last = upcoming.last().unwrap();
    assert_eq!((last.hijri_month, last.hijri_year), (11, 1447));
}

// ---- month calendars ----

#[tokio::test]
async fn hijri_month_stops_at_first_missing_day() {
    let mock = Arc::new(MockCalendarApi::new().with_gregorian_fn(|key| {
        if key.day == 30 {
            Err(ApiError::Api {
                code: 400,
                status: "Invalid date".into(),
            })
        } else {
            ramadan_1445(key)
        }
    }));
    let (service, _cache) = service_with(&mock).await;

    let days = service.hijri_month_calendar(9, 1445).await.unwrap();

    assert_eq!(days.len(), 29);
    assert_eq!(days[0].gregorian, DateKey::new(11, 3, 2024));
    let white: Vec<u32> = days
        .iter()
        .filter(|day| day.is_ayyamul_bidh)
        .map(|day| day.hijri.day)
        .collect();
    assert_eq!(white, vec![13, 14, 15]);
}

#[tokio::test]
async fn hijri_month_fails_when_first_day_fails() {
    let mock = Arc::new(MockCalendarApi::new().push_gregorian(Err(ApiError::network("offline"))));
    let (service, _cache) = service_with(&mock).await;

    assert!(service.hijri_month_calendar(9, 1445).await.is_err());
}

#[tokio::test]
async fn gregorian_month_covers_every_day() {
    let mock = Arc::new(
        MockCalendarApi::new().with_hijri_fn(|key| Ok(hijri_fixture(key.day, 8, 1445))),
    );
    let (service, _cache) = service_with(&mock).await;

    let days = service.gregorian_month_calendar(2, 2024).await.unwrap();

    assert_eq!(days.len(), 29);
    assert_eq!(days[28].gregorian, DateKey::new(29, 2, 2024));
    assert_eq!(days.iter().filter(|day| day.is_ayyamul_bidh).count(), 3);
    assert!(days.iter().all(|day| day.hijri_month_name == "Sha'ban"));
}

#[tokio::test]
async fn gregorian_month_rejects_invalid_month() {
    let mock = Arc::new(MockCalendarApi::new());
    let (service, _cache) = service_with(&mock).await;

    let err = service.gregorian_month_calendar(13, 2024).await.unwrap_err();
    assert!(matches!(err, CalendarError::InvalidDateKey(_)));
}

// ---- properties ----

proptest! {
    #[test]
    fn tabular_calendar_round_trips(offset in 0i64..600_000) {
        let fixed = TabularIslamicCalendar::EPOCH + offset;
        let (year, month, day) = TabularIslamicCalendar::from_fixed(fixed);

        prop_assert!((1..=12).contains(&month));
        prop_assert!(day >= 1 && day <= TabularIslamicCalendar::month_days(year, month));
        prop_assert_eq!(TabularIslamicCalendar::to_fixed(year, month, day), fixed);
    }

    #[test]
    fn approximation_stays_in_range(offset in 0i64..600_000) {
        let epoch = NaiveDate::from_ymd_opt(622, 7, 16).unwrap();
        let date = epoch + chrono::Duration::days(offset);
        let hijri = LocalHijriConverter::approximate(date).unwrap();

        prop_assert!((1..=30).contains(&hijri.day));
        prop_assert!((1..=12).contains(&hijri.month));
        prop_assert!(hijri.year >= 0);
        prop_assert!(hijri.is_fallback);
    }

    #[test]
    fn window_countdown_is_consistent(day in 1u32..=30) {
        let countdown = window_for_day(day);
        match countdown.status {
            WindowStatus::Upcoming => prop_assert_eq!(day + countdown.days_until, 13),
            WindowStatus::Current => prop_assert_eq!(countdown.days_until, 0),
            WindowStatus::NextMonth => {
                prop_assert!(day > 15);
                prop_assert_eq!(day + countdown.days_until, 43);
            }
        }
    }
}
