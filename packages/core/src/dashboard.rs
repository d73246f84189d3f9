//! Dashboard snapshot.
//!
//! Gathers everything the main screen shows in one pass. Each part is
//! fetched independently: a failure turns into a notification and the rest
//! of the snapshot is still filled in.

use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::calendar::chain::Strategy;
use crate::calendar::service::DateConversionService;
use crate::calendar::types::{DateKey, HijriDate};
use crate::calendar::window::{days_until_next_window, WindowCountdown, WindowStatus};
use crate::prayer::schedule::{current_prayer, format_countdown, next_prayer, NextPrayer};
use crate::prayer::service::PrayerTimesService;
use crate::prayer::types::{Location, Prayer, PrayerTimes};
use crate::settings::AppSettings;
use crate::store::KeyValueStore;
use crate::tracker::{FastingTracker, MonthlyStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    fn info(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            message: message.into(),
        }
    }

    fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Warning,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub today: NaiveDate,
    pub hijri: Option<HijriDate>,
    pub hijri_strategy: Option<Strategy>,
    pub window: Option<WindowCountdown>,
    pub location: Option<Location>,
    pub prayer_times: Option<PrayerTimes>,
    pub prayer_strategy: Option<Strategy>,
    pub next_prayer: Option<NextPrayer>,
    pub current_prayer: Option<Prayer>,
    pub monthly_stats: Option<MonthlyStats>,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub total_days: u32,
    pub notifications: Vec<Notification>,
}

impl DashboardSnapshot {
    fn empty(today: NaiveDate) -> Self {
        Self {
            today,
            hijri: None,
            hijri_strategy: None,
            window: None,
            location: None,
            prayer_times: None,
            prayer_strategy: None,
            next_prayer: None,
            current_prayer: None,
            monthly_stats: None,
            current_streak: 0,
            longest_streak: 0,
            total_days: 0,
            notifications: Vec::new(),
        }
    }

    pub fn has_errors(&self) -> bool {
        self.notifications
            .iter()
            .any(|notification| notification.level == NotificationLevel::Error)
    }
}

pub struct Dashboard {
    conversions: Arc<DateConversionService>,
    prayers: Arc<PrayerTimesService>,
    tracker: Arc<RwLock<FastingTracker>>,
    store: Arc<dyn KeyValueStore>,
}

impl Dashboard {
    pub fn new(
        conversions: Arc<DateConversionService>,
        prayers: Arc<PrayerTimesService>,
        tracker: Arc<RwLock<FastingTracker>>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            conversions,
            prayers,
            tracker,
            store,
        }
    }

    pub async fn build(&self, today: NaiveDate, now: NaiveTime) -> DashboardSnapshot {
        let mut snapshot = DashboardSnapshot::empty(today);

        let settings = match AppSettings::load(self.store.as_ref()).await {
            Ok(settings) => settings,
            Err(err) => {
                snapshot
                    .notifications
                    .push(Notification::error(format!("Could not read settings: {}", err)));
                AppSettings::default()
            }
        };
        let method = settings.calculation_method();
        let key = DateKey::from_date(today);

        let prayer_lookup = async {
            match &settings.location {
                Some(location) => Some(self.prayers.prayer_times(location, &method, &key).await),
                None => None,
            }
        };
        let (hijri, prayer) = tokio::join!(self.conversions.current_hijri_date(today), prayer_lookup);

        match hijri {
            Ok(resolution) => {
                if resolution.is_degraded() {
                    snapshot.notifications.push(Notification::warning(format!(
                        "Hijri date is a local {} estimate",
                        resolution.value.accuracy
                    )));
                }
                snapshot.window = Some(days_until_next_window(&resolution.value));
                snapshot.hijri_strategy = Some(resolution.strategy);
                snapshot.hijri = Some(resolution.value);
            }
            Err(err) => {
                tracing::warn!("Dashboard has no Hijri date: {}", err);
                snapshot
                    .notifications
                    .push(Notification::error(format!("Hijri date unavailable: {}", err)));
            }
        }

        match prayer {
            None => snapshot
                .notifications
                .push(Notification::info("No location configured, run setup for prayer times")),
            Some(Ok(resolution)) => {
                if resolution.strategy == Strategy::StaleCache {
                    snapshot.notifications.push(Notification::warning(format!(
                        "Prayer times are from {} and may be out of date",
                        resolution.value.date.readable
                    )));
                }
                snapshot.next_prayer = next_prayer(&resolution.value.timings, now);
                snapshot.current_prayer = current_prayer(&resolution.value.timings, now);
                snapshot.prayer_strategy = Some(resolution.strategy);
                snapshot.prayer_times = Some(resolution.value);
            }
            Some(Err(err)) => {
                tracing::warn!("Dashboard has no prayer times: {}", err);
                snapshot
                    .notifications
                    .push(Notification::error(format!("Prayer times unavailable: {}", err)));
            }
        }
        snapshot.location = settings.location;

        let tracker = self.tracker.read().await;
        if let Some(hijri) = &snapshot.hijri {
            snapshot.monthly_stats = Some(tracker.monthly_stats(hijri.month, hijri.year));
            snapshot.current_streak = tracker.current_streak(hijri.month, hijri.year);
        }
        snapshot.longest_streak = tracker.longest_streak();
        snapshot.total_days = tracker.total_fasting_days();

        snapshot
    }
}

/// Plain-text rendering of a snapshot.
pub fn render(snapshot: &DashboardSnapshot) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "Ayyamul Bidh Tracker  {}", snapshot.today.format("%A, %d %B %Y"));
    let _ = writeln!(out);

    match (&snapshot.hijri, snapshot.hijri_strategy) {
        (Some(hijri), Some(strategy)) => {
            let _ = writeln!(out, "Hijri date     {} ({})", hijri.formatted, strategy);
        }
        _ => {
            let _ = writeln!(out, "Hijri date     unavailable");
        }
    }

    if let Some(window) = &snapshot.window {
        let line = match window.status {
            WindowStatus::Current => "fasting days are today".to_string(),
            WindowStatus::Upcoming => format!("{} days until the 13th", window.days_until),
            WindowStatus::NextMonth => {
                format!("about {} days until next month's 13th", window.days_until)
            }
        };
        let _ = writeln!(out, "Ayyamul Bidh   {}", line);
    }

    if let Some(location) = &snapshot.location {
        let _ = writeln!(out, "Location       {}", location);
    }

    if let Some(times) = &snapshot.prayer_times {
        let _ = writeln!(out);
        let timings = &times.timings;
        let _ = writeln!(out, "Imsak    {}", timings.imsak);
        for prayer in Prayer::ALL {
            let marker = if snapshot.current_prayer == Some(prayer) { "*" } else { " " };
            let _ = writeln!(out, "{}{:<8}{}", marker, prayer.name(), timings.time_of(prayer));
        }
        if let Some(next) = &snapshot.next_prayer {
            let _ = writeln!(
                out,
                "Next: {} at {} (in {})",
                next.prayer,
                next.time.format("%H:%M"),
                format_countdown(next.minutes_until)
            );
        }
    }

    if let Some(stats) = &snapshot.monthly_stats {
        let _ = writeln!(out);
        let days: Vec<String> = stats.marked_days.iter().map(u32::to_string).collect();
        let _ = writeln!(
            out,
            "{} {}: {}/3 days fasted{}",
            stats.month_name,
            stats.year,
            stats.total_days,
            if days.is_empty() {
                String::new()
            } else {
                format!(" ({})", days.join(", "))
            }
        );
    }
    let _ = writeln!(
        out,
        "Streak: {} months (longest {}), {} days in total",
        snapshot.current_streak, snapshot.longest_streak, snapshot.total_days
    );

    if !snapshot.notifications.is_empty() {
        let _ = writeln!(out);
        for notification in &snapshot.notifications {
            let label = match notification.level {
                NotificationLevel::Info => "info",
                NotificationLevel::Warning => "warning",
                NotificationLevel::Error => "error",
            };
            let _ = writeln!(out, "[{}] {}", label, notification.message);
        }
    }

    out
}
