//! Cached prayer times.
//!
//! A day of timings is served from the cache while it is younger than the
//! freshness threshold, fetched otherwise, and served from the cache again,
//! however old, when the fetch fails.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::CacheLayer;
use crate::calendar::chain::{DegradationChain, Resolution, StepOutcome, Strategy};
use crate::calendar::error::CalendarError;
use crate::calendar::service::DEFAULT_PRIORITY;
use crate::calendar::types::DateKey;
use crate::metrics::CoreMetrics;
use crate::prayer::types::{CalculationMethod, Location, PrayerTimes};
use crate::queue::RequestQueue;
use crate::services::provider::CalendarApi;

pub const DEFAULT_PRAYER_CACHE_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// One entry per location and method. The date is not part of the key, so
/// the entry is replaced as the days go by; a fresh entry only counts for
/// the day it was fetched for.
pub fn prayer_cache_key(location: &Location, method: &CalculationMethod) -> String {
    let location = serde_json::to_string(location).unwrap_or_else(|_| location.to_string());
    format!("prayer_times_{}_m{}", location, method.id())
}

pub struct PrayerTimesService {
    api: Arc<dyn CalendarApi>,
    queue: RequestQueue,
    cache: CacheLayer,
    max_age: Duration,
    metrics: Option<Arc<CoreMetrics>>,
}

impl PrayerTimesService {
    pub fn new(api: Arc<dyn CalendarApi>, queue: RequestQueue, cache: CacheLayer) -> Self {
        Self {
            api,
            queue,
            cache,
            max_age: DEFAULT_PRAYER_CACHE_MAX_AGE,
            metrics: None,
        }
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn with_metrics(mut self, metrics: Option<Arc<CoreMetrics>>) -> Self {
        self.metrics = metrics;
        self
    }

    pub async fn prayer_times(
        &self,
        location: &Location,
        method: &CalculationMethod,
        date: &DateKey,
    ) -> Result<Resolution<PrayerTimes>, CalendarError> {
        location.validate()?;

        let date = *date;
        let cache_key = prayer_cache_key(location, method);
        let key = cache_key.as_str();
        let max_age = self.max_age;

        DegradationChain::new("prayer_times")
            .with_metrics(self.metrics.clone())
            .step(Strategy::FreshCache, move || async move {
                if !self.cache.is_valid(key, max_age) {
                    return StepOutcome::Miss;
                }
                match self.cache.get_as::<PrayerTimes>(key) {
                    Some(times) if times.is_for(&date) => StepOutcome::Hit(times),
                    _ => StepOutcome::Miss,
                }
            })
            .step(Strategy::Network, move || async move {
                match self.fetch(location, method, date).await {
                    Ok(times) => {
                        if let Err(err) = self.cache.put_as(key, &times) {
                            tracing::warn!("Could not cache {}: {}", key, err);
                        }
                        StepOutcome::Hit(times)
                    }
                    Err(err) => StepOutcome::Failed(err),
                }
            })
            .step(Strategy::StaleCache, move || async move {
                match self.cache.get_as::<PrayerTimes>(key) {
                    Some(times) => {
                        tracing::warn!("Serving stale prayer times for {}", location);
                        StepOutcome::Hit(times)
                    }
                    None => StepOutcome::Miss,
                }
            })
            .resolve()
            .await
    }

    /// A month of timings for a city. Not cached; days that fail validation
    /// are left out.
    pub async fn monthly_calendar(
        &self,
        city: &str,
        country: &str,
        year: i32,
        month: u32,
        method: &CalculationMethod,
    ) -> Result<Vec<PrayerTimes>, CalendarError> {
        Location::city(city, country)?;
        if !(1..=12).contains(&month) {
            return Err(CalendarError::validation("month", format!("{} is not a month", month)));
        }

        let api = self.api.clone();
        let city = city.to_string();
        let country = country.to_string();
        let method = method.clone();

        let days = self
            .queue
            .enqueue(
                move || {
                    let api = api.clone();
                    let city = city.clone();
                    let country = country.clone();
                    let method = method.clone();
                    async move {
                        api.calendar_by_city(&city, &country, year, month, &method)
                            .await
                    }
                },
                DEFAULT_PRIORITY,
            )
            .await?;

        Ok(days
            .iter()
            .enumerate()
            .filter_map(|(index, day)| match PrayerTimes::from_api(day) {
                Ok(times) => Some(times),
                Err(err) => {
                    tracing::warn!("Skipping day {} of {}-{}: {}", index + 1, month, year, err);
                    None
                }
            })
            .collect())
    }

    async fn fetch(
        &self,
        location: &Location,
        method: &CalculationMethod,
        date: DateKey,
    ) -> Result<PrayerTimes, CalendarError> {
        let api = self.api.clone();
        let location = location.clone();
        let method = method.clone();

        let raw = self
            .queue
            .enqueue(
                move || {
                    let api = api.clone();
                    let location = location.clone();
                    let method = method.clone();
                    async move { api.timings(&location, &method, &date).await }
                },
                DEFAULT_PRIORITY,
            )
            .await?;

        PrayerTimes::from_api(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueConfig;
    use crate::services::error::ApiError;
    use crate::services::mock_aladhan::{timings_fixture, MockCalendarApi};
    use crate::store::MemoryStore;
    use crate::prayer::types::{MethodSettings, TuneOffsets};

    fn jakarta() -> Location {
        Location::city("Jakarta", "Indonesia").unwrap()
    }

    fn today() -> DateKey {
        DateKey::new(24, 3, 2024)
    }

    async fn service_with(mock: &Arc<MockCalendarApi>) -> (PrayerTimesService, CacheLayer) {
        let cache = CacheLayer::load(Arc::new(MemoryStore::new())).await.unwrap();
        let queue = RequestQueue::new(QueueConfig {
            delay_between_dispatches: Duration::ZERO,
            ..QueueConfig::default()
        });
        let api: Arc<dyn CalendarApi> = mock.clone();
        (PrayerTimesService::new(api, queue, cache.clone()), cache)
    }

    fn cached_times() -> PrayerTimes {
        PrayerTimes::from_api(&timings_fixture()).unwrap()
    }

    #[tokio::test]
    async fn fresh_cache_is_served_without_network() {
        let mock = Arc::new(MockCalendarApi::new());
        let (service, cache) = service_with(&mock).await;
        let method = CalculationMethod::default();
        cache
            .put_as(&prayer_cache_key(&jakarta(), &method), &cached_times())
            .unwrap();

        let resolution = service.prayer_times(&jakarta(), &method, &today()).await.unwrap();

        assert_eq!(resolution.strategy, Strategy::FreshCache);
        assert_eq!(mock.timings_calls(), 0);
    }

    #[tokio::test]
    async fn fresh_entry_for_another_day_is_refetched() {
        let mock = Arc::new(MockCalendarApi::new().with_timings(timings_fixture()));
        let (service, cache) = service_with(&mock).await;
        let method = CalculationMethod::default();
        cache
            .put_as(&prayer_cache_key(&jakarta(), &method), &cached_times())
            .unwrap();

        let resolution = service
            .prayer_times(&jakarta(), &method, &DateKey::new(25, 3, 2024))
            .await
            .unwrap();

        assert_eq!(resolution.strategy, Strategy::Network);
        assert_eq!(mock.timings_calls(), 1);
    }

    #[tokio::test]
    async fn network_result_is_validated_and_cached() {
        let mock = Arc::new(MockCalendarApi::new().with_timings(timings_fixture()));
        let (service, cache) = service_with(&mock).await;
        let method = CalculationMethod::default();

        let resolution = service.prayer_times(&jakarta(), &method, &today()).await.unwrap();

        assert_eq!(resolution.strategy, Strategy::Network);
        assert_eq!(resolution.value.timings.maghrib, "18:00");
        assert!(cache.is_valid(&prayer_cache_key(&jakarta(), &method), DEFAULT_PRAYER_CACHE_MAX_AGE));
    }

    #[tokio::test]
    async fn stale_cache_is_served_when_network_fails() {
        let mock = Arc::new(MockCalendarApi::new().push_timings(Err(ApiError::network("offline"))));
        let (service, cache) = service_with(&mock).await;
        // Everything is stale with a zero threshold.
        let service = service.with_max_age(Duration::ZERO);
        let method = CalculationMethod::default();
        cache
            .put_as(&prayer_cache_key(&jakarta(), &method), &cached_times())
            .unwrap();

        let resolution = service.prayer_times(&jakarta(), &method, &today()).await.unwrap();

        assert_eq!(resolution.strategy, Strategy::StaleCache);
        assert_eq!(resolution.value, cached_times());
        assert_eq!(resolution.failures.len(), 1);
        assert_eq!(mock.timings_calls(), 1);
    }

    #[tokio::test]
    async fn failure_without_cache_is_an_error() {
        let mock = Arc::new(MockCalendarApi::new().push_timings(Err(ApiError::Http { status: 502 })));
        let (service, _cache) = service_with(&mock).await;

        let err = service
            .prayer_times(&jakarta(), &CalculationMethod::default(), &today())
            .await
            .unwrap_err();

        assert!(matches!(err, CalendarError::Api(ApiError::Http { status: 502 })));
    }

    #[tokio::test]
    async fn invalid_location_never_reaches_the_api() {
        let mock = Arc::new(MockCalendarApi::new().with_timings(timings_fixture()));
        let (service, _cache) = service_with(&mock).await;
        let nowhere = Location::Coordinates {
            latitude: 120.0,
            longitude: 0.0,
        };

        let err = service
            .prayer_times(&nowhere, &CalculationMethod::default(), &today())
            .await
            .unwrap_err();

        assert!(matches!(err, CalendarError::Validation { field: "latitude", .. }));
        assert_eq!(mock.timings_calls(), 0);
    }

    #[test]
    fn cache_key_includes_location_and_method() {
        let custom = CalculationMethod::Custom {
            settings: MethodSettings::default(),
            tune: TuneOffsets::default(),
        };
        assert_eq!(
            prayer_cache_key(&jakarta(), &CalculationMethod::default()),
            r#"prayer_times_{"city":"Jakarta","country":"Indonesia"}_m20"#
        );
        assert!(prayer_cache_key(&jakarta(), &custom).ends_with("_m99"));
    }

    #[tokio::test]
    async fn monthly_calendar_skips_invalid_days() {
        let mut broken = timings_fixture();
        broken.timings.remove("Isha");
        let mock = Arc::new(MockCalendarApi::new().with_calendar(vec![timings_fixture(), broken]));
        let (service, _cache) = service_with(&mock).await;

        let days = service
            .monthly_calendar("Jakarta", "Indonesia", 2024, 3, &CalculationMethod::default())
            .await
            .unwrap();

        assert_eq!(days.len(), 1);
    }

    #[tokio::test]
    async fn monthly_calendar_rejects_bad_month() {
        let mock = Arc::new(MockCalendarApi::new());
        let (service, _cache) = service_with(&mock).await;

        let result = service
            .monthly_calendar("Jakarta", "Indonesia", 2024, 13, &CalculationMethod::default())
            .await;
        assert!(result.is_err());
    }
}
