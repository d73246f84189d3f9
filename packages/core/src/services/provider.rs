//! Calendar API provider interface.
//!
//! Abstracts the remote calendar service so the conversion and prayer-time
//! services can run against the real Aladhan client or a scripted mock.

use async_trait::async_trait;

use crate::calendar::types::DateKey;
use crate::prayer::types::{CalculationMethod, Location};
use crate::services::aladhan::{ApiGregorian, ApiHijri, ApiTimingsDay};
use crate::services::error::ApiResult;

/// Source of date conversions and prayer timings.
#[async_trait]
pub trait CalendarApi: Send + Sync {
    /// Convert a Gregorian `DD-MM-YYYY` date to its Hijri block.
    async fn gregorian_to_hijri(&self, date: &DateKey) -> ApiResult<ApiHijri>;

    /// Convert a Hijri `DD-MM-YYYY` date to its Gregorian block.
    async fn hijri_to_gregorian(&self, date: &DateKey) -> ApiResult<ApiGregorian>;

    /// Prayer timings for one Gregorian day at `location`.
    async fn timings(
        &self,
        location: &Location,
        method: &CalculationMethod,
        date: &DateKey,
    ) -> ApiResult<ApiTimingsDay>;

    /// Prayer timings for every day of a Gregorian month.
    async fn calendar_by_city(
        &self,
        city: &str,
        country: &str,
        year: i32,
        month: u32,
        method: &CalculationMethod,
    ) -> ApiResult<Vec<ApiTimingsDay>>;

    /// Name of this provider for logging.
    fn provider_name(&self) -> &str;
}
