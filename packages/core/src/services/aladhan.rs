use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::calendar::types::DateKey;
use crate::prayer::types::{CalculationMethod, Location};
use crate::services::error::{ApiError, ApiResult};
use crate::services::provider::CalendarApi;

pub const DEFAULT_BASE_URL: &str = "https://api.aladhan.com/v1";

#[derive(Clone)]
pub struct AladhanClient {
    base_url: String,
    http: Client,
}

impl AladhanClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> ApiResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ApiError::network(err.to_string()))?;

        Ok(Self {
            base_url: base_url.into(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// The `{ code, status, data }` wrapper around every response.
#[derive(Debug, Deserialize)]
struct Envelope {
    code: i64,
    #[serde(default)]
    status: Value,
    #[serde(default)]
    data: Value,
}

// Numeric fields arrive as numbers or numeric strings depending on the
// endpoint, so the raw blocks keep them as `Value` and leave typing to the
// validators in `calendar::validation`.

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiMonth {
    #[serde(default)]
    pub number: Value,
    #[serde(default)]
    pub en: Value,
    #[serde(default)]
    pub ar: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiHijri {
    #[serde(default)]
    pub date: Value,
    #[serde(default)]
    pub day: Value,
    #[serde(default)]
    pub month: ApiMonth,
    #[serde(default)]
    pub year: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiGregorian {
    #[serde(default)]
    pub date: Value,
    #[serde(default)]
    pub day: Value,
    #[serde(default)]
    pub month: ApiMonth,
    #[serde(default)]
    pub year: Value,
}

#[derive(Debug, Deserialize)]
struct ConversionData {
    #[serde(default)]
    hijri: Option<ApiHijri>,
    #[serde(default)]
    gregorian: Option<ApiGregorian>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiDateBlock {
    #[serde(default)]
    pub readable: Value,
    #[serde(default)]
    pub hijri: Option<ApiHijri>,
    #[serde(default)]
    pub gregorian: Option<ApiGregorian>,
}

/// One day of prayer timings as returned by `timings*` and `calendarByCity`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiTimingsDay {
    #[serde(default)]
    pub timings: Map<String, Value>,
    #[serde(default)]
    pub date: ApiDateBlock,
}

impl AladhanClient {
    async fn get_data<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&'static str, String)],
    ) -> ApiResult<T> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);

        tracing::debug!("GET {}", url);

        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|err| ApiError::network(err.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ApiError::RateLimited);
        }
        if !status.is_success() {
            return Err(ApiError::Http {
                status: status.as_u16(),
            });
        }

        let envelope = response
            .json::<Envelope>()
            .await
            .map_err(|err| ApiError::format(err.to_string()))?;

        if envelope.code != 200 {
            let status = match envelope.status {
                Value::String(text) => text,
                Value::Null => String::new(),
                other => other.to_string(),
            };
            return Err(ApiError::Api {
                code: envelope.code,
                status,
            });
        }

        serde_json::from_value(envelope.data).map_err(|err| ApiError::format(err.to_string()))
    }
}

#[async_trait]
impl CalendarApi for AladhanClient {
    async fn gregorian_to_hijri(&self, date: &DateKey) -> ApiResult<ApiHijri> {
        let data: ConversionData = self.get_data(&format!("gToH/{}", date), &[]).await?;
        data.hijri
            .ok_or_else(|| ApiError::format("response is missing the hijri block"))
    }

    async fn hijri_to_gregorian(&self, date: &DateKey) -> ApiResult<ApiGregorian> {
        let data: ConversionData = self.get_data(&format!("hToG/{}", date), &[]).await?;
        data.gregorian
            .ok_or_else(|| ApiError::format("response is missing the gregorian block"))
    }

    async fn timings(
        &self,
        location: &Location,
        method: &CalculationMethod,
        date: &DateKey,
    ) -> ApiResult<ApiTimingsDay> {
        let (path, mut query) = match location {
            Location::City { city, country } => (
                format!("timingsByCity/{}", date),
                vec![("city", city.clone()), ("country", country.clone())],
            ),
            Location::Coordinates {
                latitude,
                longitude,
            } => (
                format!("timings/{}", date),
                vec![
                    ("latitude", latitude.to_string()),
                    ("longitude", longitude.to_string()),
                ],
            ),
        };
        query.extend(method.query_params());

        self.get_data(&path, &query).await
    }

    async fn calendar_by_city(
        &self,
        city: &str,
        country: &str,
        year: i32,
        month: u32,
        method: &CalculationMethod,
    ) -> ApiResult<Vec<ApiTimingsDay>> {
        let mut query = vec![("city", city.to_string()), ("country", country.to_string())];
        query.extend(method.query_params());

        self.get_data(&format!("calendarByCity/{}/{}", year, month), &query)
            .await
    }

    fn provider_name(&self) -> &str {
        "Aladhan"
    }
}
