//! Prayer-time types and their validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::calendar::error::CalendarError;
use crate::calendar::types::{DateKey, GregorianDate, HijriDate};
use crate::calendar::validation::{sanitize, text, validate_gregorian, validate_hijri};
use crate::services::aladhan::ApiTimingsDay;

/// Where prayer times are computed for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Location {
    City { city: String, country: String },
    Coordinates { latitude: f64, longitude: f64 },
}

impl Location {
    pub fn city(city: impl Into<String>, country: impl Into<String>) -> Result<Self, CalendarError> {
        let location = Self::City {
            city: city.into(),
            country: country.into(),
        };
        location.validate()?;
        Ok(location)
    }

    pub fn coordinates(latitude: f64, longitude: f64) -> Result<Self, CalendarError> {
        let location = Self::Coordinates {
            latitude,
            longitude,
        };
        location.validate()?;
        Ok(location)
    }

    pub fn validate(&self) -> Result<(), CalendarError> {
        match self {
            Location::City { city, country } => {
                if city.trim().is_empty() {
                    return Err(CalendarError::validation("city", "empty"));
                }
                if country.trim().is_empty() {
                    return Err(CalendarError::validation("country", "empty"));
                }
            }
            Location::Coordinates {
                latitude,
                longitude,
            } => {
                if !(-90.0..=90.0).contains(latitude) {
                    return Err(CalendarError::validation(
                        "latitude",
                        format!("{} is outside -90..=90", latitude),
                    ));
                }
                if !(-180.0..=180.0).contains(longitude) {
                    return Err(CalendarError::validation(
                        "longitude",
                        format!("{} is outside -180..=180", longitude),
                    ));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::City { city, country } => write!(f, "{}, {}", city, country),
            Location::Coordinates {
                latitude,
                longitude,
            } => write!(f, "{:.4}, {:.4}", latitude, longitude),
        }
    }
}

/// Fajr/Isha angle in degrees, or a minute offset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AngleOrMinutes {
    Angle(f64),
    Minutes(u32),
}

impl fmt::Display for AngleOrMinutes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AngleOrMinutes::Angle(degrees) => write!(f, "{}", degrees),
            AngleOrMinutes::Minutes(minutes) => write!(f, "{} min", minutes),
        }
    }
}

/// Per-prayer parameters of a custom calculation method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MethodSettings {
    pub fajr: Option<AngleOrMinutes>,
    /// Minutes after sunset, or an angle.
    pub maghrib: Option<AngleOrMinutes>,
    /// An angle, or minutes after Maghrib.
    pub isha: Option<AngleOrMinutes>,
}

impl MethodSettings {
    /// `fajr,maghrib,isha` with `null` for unset parts.
    pub fn to_query(&self) -> String {
        [self.fajr, self.maghrib, self.isha]
            .iter()
            .map(|part| match part {
                Some(value) => value.to_string(),
                None => "null".to_string(),
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Minute offsets applied to each computed time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TuneOffsets {
    pub imsak: i32,
    pub fajr: i32,
    pub sunrise: i32,
    pub dhuhr: i32,
    pub asr: i32,
    pub maghrib: i32,
    pub sunset: i32,
    pub isha: i32,
    pub midnight: i32,
}

impl TuneOffsets {
    pub fn to_query(&self) -> String {
        [
            self.imsak,
            self.fajr,
            self.sunrise,
            self.dhuhr,
            self.asr,
            self.maghrib,
            self.sunset,
            self.isha,
            self.midnight,
        ]
        .iter()
        .map(i32::to_string)
        .collect::<Vec<_>>()
        .join(",")
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum CalculationMethod {
    /// Kementerian Agama Republik Indonesia.
    #[default]
    Kemenag,
    MuslimWorldLeague,
    Isna,
    Egypt,
    UmmAlQura,
    Karachi,
    Tehran,
    Custom {
        settings: MethodSettings,
        #[serde(default)]
        tune: TuneOffsets,
    },
}

pub const CUSTOM_METHOD_ID: u32 = 99;

impl CalculationMethod {
    /// Every method with a fixed id, in display order.
    pub const PRESETS: [CalculationMethod; 7] = [
        CalculationMethod::Kemenag,
        CalculationMethod::MuslimWorldLeague,
        CalculationMethod::Isna,
        CalculationMethod::Egypt,
        CalculationMethod::UmmAlQura,
        CalculationMethod::Karachi,
        CalculationMethod::Tehran,
    ];

    /// Aladhan method id.
    pub fn id(&self) -> u32 {
        match self {
            CalculationMethod::Kemenag => 20,
            CalculationMethod::MuslimWorldLeague => 3,
            CalculationMethod::Isna => 2,
            CalculationMethod::Egypt => 5,
            CalculationMethod::UmmAlQura => 4,
            CalculationMethod::Karachi => 1,
            CalculationMethod::Tehran => 7,
            CalculationMethod::Custom { .. } => CUSTOM_METHOD_ID,
        }
    }

    /// Preset with the given id. Custom methods need their settings and are
    /// never returned here.
    pub fn from_id(id: u32) -> Option<Self> {
        Self::PRESETS.into_iter().find(|method| method.id() == id)
    }

    pub fn label(&self) -> &'static str {
        match self {
            CalculationMethod::Kemenag => "Kemenag RI",
            CalculationMethod::MuslimWorldLeague => "Muslim World League",
            CalculationMethod::Isna => "Islamic Society of North America",
            CalculationMethod::Egypt => "Egyptian General Authority of Survey",
            CalculationMethod::UmmAlQura => "Umm Al-Qura University, Makkah",
            CalculationMethod::Karachi => "University of Islamic Sciences, Karachi",
            CalculationMethod::Tehran => "Institute of Geophysics, University of Tehran",
            CalculationMethod::Custom { .. } => "Custom",
        }
    }

    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("method", self.id().to_string())];
        if let CalculationMethod::Custom { settings, tune } = self {
            params.push(("methodSettings", settings.to_query()));
            params.push(("tune", tune.to_query()));
        }
        params
    }
}

/// The five daily prayers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Prayer {
    Fajr,
    Dhuhr,
    Asr,
    Maghrib,
    Isha,
}

impl Prayer {
    pub const ALL: [Prayer; 5] = [
        Prayer::Fajr,
        Prayer::Dhuhr,
        Prayer::Asr,
        Prayer::Maghrib,
        Prayer::Isha,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Prayer::Fajr => "Fajr",
            Prayer::Dhuhr => "Dhuhr",
            Prayer::Asr => "Asr",
            Prayer::Maghrib => "Maghrib",
            Prayer::Isha => "Isha",
        }
    }
}

impl fmt::Display for Prayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timings {
    pub imsak: String,
    pub fajr: String,
    pub sunrise: String,
    pub dhuhr: String,
    pub asr: String,
    #[serde(default)]
    pub sunset: Option<String>,
    pub maghrib: String,
    pub isha: String,
    #[serde(default)]
    pub midnight: Option<String>,
}

impl Timings {
    pub fn time_of(&self, prayer: Prayer) -> &str {
        match prayer {
            Prayer::Fajr => &self.fajr,
            Prayer::Dhuhr => &self.dhuhr,
            Prayer::Asr => &self.asr,
            Prayer::Maghrib => &self.maghrib,
            Prayer::Isha => &self.isha,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrayerDate {
    pub readable: String,
    pub gregorian: GregorianDate,
    pub hijri: HijriDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrayerTimes {
    pub date: PrayerDate,
    pub timings: Timings,
}

/// `HH:MM` or `HH:MM:SS`, 24-hour clock.
pub fn is_valid_time(value: &str) -> bool {
    let parts: Vec<&str> = value.split(':').collect();
    if !(2..=3).contains(&parts.len()) {
        return false;
    }

    let numeric = |part: &str, max: u32, widths: &[usize]| {
        widths.contains(&part.len())
            && part.bytes().all(|byte| byte.is_ascii_digit())
            && part.parse::<u32>().map_or(false, |number| number <= max)
    };

    numeric(parts[0], 23, &[1, 2]) && parts[1..].iter().all(|part| numeric(part, 59, &[2]))
}

/// Time string with any trailing timezone label (`"04:32 (WIB)"`) removed.
fn clean_time(value: &Value, field: &'static str) -> Result<String, CalendarError> {
    let raw = text(value, field)?;
    let time = raw.split_whitespace().next().unwrap_or_default().to_string();

    if !is_valid_time(&time) {
        return Err(CalendarError::validation(field, format!("'{}' is not HH:MM", raw)));
    }
    Ok(time)
}

fn optional_time(timings: &serde_json::Map<String, Value>, name: &'static str) -> Option<String> {
    timings.get(name).and_then(|value| clean_time(value, name).ok())
}

impl PrayerTimes {
    /// `true` when these timings belong to the Gregorian day `date`.
    pub fn is_for(&self, date: &DateKey) -> bool {
        let gregorian = &self.date.gregorian;
        (gregorian.day, gregorian.month, gregorian.year) == (date.day, date.month, date.year)
    }

    /// Validate one day of API timings.
    pub fn from_api(raw: &ApiTimingsDay) -> Result<Self, CalendarError> {
        let required = |name: &'static str| {
            let value = raw.timings.get(name).unwrap_or(&Value::Null);
            clean_time(value, name)
        };

        let timings = Timings {
            imsak: required("Imsak")?,
            fajr: required("Fajr")?,
            sunrise: required("Sunrise")?,
            dhuhr: required("Dhuhr")?,
            asr: required("Asr")?,
            sunset: optional_time(&raw.timings, "Sunset"),
            maghrib: required("Maghrib")?,
            isha: required("Isha")?,
            midnight: optional_time(&raw.timings, "Midnight"),
        };

        let hijri = raw
            .date
            .hijri
            .as_ref()
            .ok_or_else(|| CalendarError::validation("hijri", "missing"))?;
        let gregorian = raw
            .date
            .gregorian
            .as_ref()
            .ok_or_else(|| CalendarError::validation("gregorian", "missing"))?;

        let hijri = validate_hijri(hijri)?;
        let gregorian = validate_gregorian(gregorian)?;
        let readable = match &raw.date.readable {
            Value::String(readable) => sanitize(readable),
            _ => gregorian.formatted.clone(),
        };

        Ok(Self {
            date: PrayerDate {
                readable,
                gregorian,
                hijri,
            },
            timings,
        })
    }
}
