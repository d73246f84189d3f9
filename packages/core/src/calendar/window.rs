//! Countdown to the next Ayyamul Bidh window.

use serde::{Deserialize, Serialize};

use crate::calendar::types::HijriDate;

/// Month length assumed when counting into the next month. Real Hijri months
/// have 29 or 30 days, so `NextMonth` counts can be one day long.
pub const ASSUMED_MONTH_LENGTH: u32 = 30;

const WINDOW_START: u32 = 13;
const WINDOW_END: u32 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowStatus {
    Upcoming,
    Current,
    NextMonth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowCountdown {
    pub days_until: u32,
    pub status: WindowStatus,
}

pub fn days_until_next_window(date: &HijriDate) -> WindowCountdown {
    window_for_day(date.day)
}

pub fn window_for_day(day: u32) -> WindowCountdown {
    if day < WINDOW_START {
        WindowCountdown {
            days_until: WINDOW_START - day,
            status: WindowStatus::Upcoming,
        }
    } else if day <= WINDOW_END {
        WindowCountdown {
            days_until: 0,
            status: WindowStatus::Current,
        }
    } else {
        WindowCountdown {
            days_until: ASSUMED_MONTH_LENGTH.saturating_sub(day) + WINDOW_START,
            status: WindowStatus::NextMonth,
        }
    }
}
