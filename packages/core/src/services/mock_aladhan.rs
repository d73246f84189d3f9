//! Scripted [`CalendarApi`] for tests.
//!
//! Each endpoint answers from a queue of one-shot results first, then from a
//! responder closure. Call counters let tests assert whether the network was
//! touched at all.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::calendar::types::{gregorian_month_name, hijri_month_name, DateKey};
use crate::prayer::types::{CalculationMethod, Location};
use crate::services::aladhan::{ApiDateBlock, ApiGregorian, ApiHijri, ApiMonth, ApiTimingsDay};
use crate::services::error::{ApiError, ApiResult};
use crate::services::provider::CalendarApi;

type Responder<T> = Arc<dyn Fn(&DateKey) -> ApiResult<T> + Send + Sync>;

struct Endpoint<T> {
    queued: VecDeque<ApiResult<T>>,
    responder: Option<Responder<T>>,
    calls: usize,
}

impl<T> Default for Endpoint<T> {
    fn default() -> Self {
        Self {
            queued: VecDeque::new(),
            responder: None,
            calls: 0,
        }
    }
}

impl<T> Endpoint<T> {
    fn respond(&mut self, request: &DateKey) -> ApiResult<T> {
        self.calls += 1;
        if let Some(result) = self.queued.pop_front() {
            return result;
        }
        match &self.responder {
            Some(responder) => responder(request),
            None => Err(ApiError::network(format!(
                "no scripted response for {}",
                request
            ))),
        }
    }
}

#[derive(Default)]
pub struct MockCalendarApi {
    hijri: Mutex<Endpoint<ApiHijri>>,
    gregorian: Mutex<Endpoint<ApiGregorian>>,
    timings: Mutex<Endpoint<ApiTimingsDay>>,
    calendar: Mutex<Endpoint<Vec<ApiTimingsDay>>>,
}

impl MockCalendarApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer G→H with `hijri`.
    pub fn with_hijri(self, hijri: ApiHijri) -> Self {
        self.with_hijri_fn(move |_| Ok(hijri.clone()))
    }

    pub fn with_hijri_fn(
        self,
        responder: impl Fn(&DateKey) -> ApiResult<ApiHijri> + Send + Sync + 'static,
    ) -> Self {
        lock(&self.hijri).responder = Some(Arc::new(responder));
        self
    }

    /// Answer the next G→H call with `result`, ahead of any responder.
    pub fn push_hijri(self, result: ApiResult<ApiHijri>) -> Self {
        lock(&self.hijri).queued.push_back(result);
        self
    }

    pub fn with_gregorian_fn(
        self,
        responder: impl Fn(&DateKey) -> ApiResult<ApiGregorian> + Send + Sync + 'static,
    ) -> Self {
        lock(&self.gregorian).responder = Some(Arc::new(responder));
        self
    }

    pub fn push_gregorian(self, result: ApiResult<ApiGregorian>) -> Self {
        lock(&self.gregorian).queued.push_back(result);
        self
    }

    pub fn with_timings(self, day: ApiTimingsDay) -> Self {
        let responder = move |_: &DateKey| -> ApiResult<ApiTimingsDay> { Ok(day.clone()) };
        lock(&self.timings).responder = Some(Arc::new(responder));
        self
    }

    pub fn push_timings(self, result: ApiResult<ApiTimingsDay>) -> Self {
        lock(&self.timings).queued.push_back(result);
        self
    }

    pub fn with_calendar(self, days: Vec<ApiTimingsDay>) -> Self {
        let responder = move |_: &DateKey| -> ApiResult<Vec<ApiTimingsDay>> { Ok(days.clone()) };
        lock(&self.calendar).responder = Some(Arc::new(responder));
        self
    }

    pub fn hijri_calls(&self) -> usize {
        lock(&self.hijri).calls
    }

    pub fn gregorian_calls(&self) -> usize {
        lock(&self.gregorian).calls
    }

    pub fn timings_calls(&self) -> usize {
        lock(&self.timings).calls
    }
}

fn lock<T>(endpoint: &Mutex<Endpoint<T>>) -> std::sync::MutexGuard<'_, Endpoint<T>> {
    endpoint.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl CalendarApi for MockCalendarApi {
    async fn gregorian_to_hijri(&self, date: &DateKey) -> ApiResult<ApiHijri> {
        lock(&self.hijri).respond(date)
    }

    async fn hijri_to_gregorian(&self, date: &DateKey) -> ApiResult<ApiGregorian> {
        lock(&self.gregorian).respond(date)
    }

    async fn timings(
        &self,
        _location: &Location,
        _method: &CalculationMethod,
        date: &DateKey,
    ) -> ApiResult<ApiTimingsDay> {
        lock(&self.timings).respond(date)
    }

    async fn calendar_by_city(
        &self,
        _city: &str,
        _country: &str,
        year: i32,
        month: u32,
        _method: &CalculationMethod,
    ) -> ApiResult<Vec<ApiTimingsDay>> {
        lock(&self.calendar).respond(&DateKey::new(1, month, year))
    }

    fn provider_name(&self) -> &str {
        "Mock"
    }
}

// ---- fixtures ----

/// A well-formed Hijri block as the API would send it.
pub fn hijri_fixture(day: u32, month: u32, year: i32) -> ApiHijri {
    ApiHijri {
        date: json!(format!("{:02}-{:02}-{:04}", day, month, year)),
        day: json!(day.to_string()),
        month: ApiMonth {
            number: json!(month),
            en: json!(hijri_month_name(month)),
            ar: Value::Null,
        },
        year: json!(year.to_string()),
    }
}

/// A well-formed Gregorian block as the API would send it.
pub fn gregorian_fixture(day: u32, month: u32, year: i32) -> ApiGregorian {
    ApiGregorian {
        date: json!(format!("{:02}-{:02}-{:04}", day, month, year)),
        day: json!(format!("{:02}", day)),
        month: ApiMonth {
            number: json!(month),
            en: json!(gregorian_month_name(month)),
            ar: Value::Null,
        },
        year: json!(year.to_string()),
    }
}

/// A full day of timings for 24 March 2024 (14 Ramadan 1445).
pub fn timings_fixture() -> ApiTimingsDay {
    let mut timings = Map::new();
    for (name, time) in [
        ("Imsak", "04:22"),
        ("Fajr", "04:32"),
        ("Sunrise", "05:45"),
        ("Dhuhr", "11:56"),
        ("Asr", "15:01"),
        ("Sunset", "18:00"),
        ("Maghrib", "18:00"),
        ("Isha", "19:09"),
        ("Midnight", "23:53"),
    ] {
        timings.insert(name.to_string(), json!(time));
    }

    ApiTimingsDay {
        timings,
        date: ApiDateBlock {
            readable: json!("24 Mar 2024"),
            hijri: Some(hijri_fixture(14, 9, 1445)),
            gregorian: Some(gregorian_fixture(24, 3, 2024)),
        },
    }
}
