//! Next and current prayer for a day of timings.

use chrono::{Duration, NaiveTime};
use serde::Serialize;

use crate::prayer::types::{Prayer, Timings};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NextPrayer {
    pub prayer: Prayer,
    pub time: NaiveTime,
    pub minutes_until: i64,
    /// The next prayer is tomorrow's Fajr.
    pub tomorrow: bool,
}

pub fn parse_time(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .ok()
}

/// First prayer strictly after `now`, or tomorrow's Fajr once Isha has
/// passed. `None` when the timings cannot be parsed.
pub fn next_prayer(timings: &Timings, now: NaiveTime) -> Option<NextPrayer> {
    for prayer in Prayer::ALL {
        let time = parse_time(timings.time_of(prayer))?;
        if time > now {
            return Some(NextPrayer {
                prayer,
                time,
                minutes_until: (time - now).num_minutes(),
                tomorrow: false,
            });
        }
    }

    let fajr = parse_time(&timings.fajr)?;
    Some(NextPrayer {
        prayer: Prayer::Fajr,
        time: fajr,
        minutes_until: (Duration::days(1) - (now - fajr)).num_minutes(),
        tomorrow: true,
    })
}

/// Prayer whose period contains `now`. Fajr ends at sunrise, Dhuhr at Asr,
/// Asr at Maghrib, Maghrib at Isha and Isha at midnight. Between sunrise and
/// Dhuhr there is none.
pub fn current_prayer(timings: &Timings, now: NaiveTime) -> Option<Prayer> {
    let end_of_day = NaiveTime::from_hms_opt(23, 59, 0)?;
    let periods = [
        (Prayer::Fajr, &timings.fajr, parse_time(&timings.sunrise)?),
        (Prayer::Dhuhr, &timings.dhuhr, parse_time(&timings.asr)?),
        (Prayer::Asr, &timings.asr, parse_time(&timings.maghrib)?),
        (Prayer::Maghrib, &timings.maghrib, parse_time(&timings.isha)?),
        (Prayer::Isha, &timings.isha, end_of_day),
    ];

    periods.into_iter().find_map(|(prayer, start, end)| {
        let start = parse_time(start)?;
        (now >= start && now < end).then_some(prayer)
    })
}

/// `"2 h 5 min"` style countdown.
pub fn format_countdown(minutes: i64) -> String {
    let (hours, minutes) = (minutes / 60, minutes % 60);
    if hours > 0 {
        format!("{} h {} min", hours, minutes)
    } else {
        format!("{} min", minutes)
    }
}
