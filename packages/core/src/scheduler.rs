//! Dashboard refresh scheduler.
//!
//! Drives the watch loop: each tick rebuilds the dashboard snapshot for the
//! current local date and time and prints it, so a long-running dashboard
//! picks up the new Hijri day, prayer times and fasting progress.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::signal;
use tokio::time;

use crate::dashboard::{render, Dashboard, DashboardSnapshot};

/// Run the refresh loop.
///
/// On each tick:
/// 1. Build a snapshot for the current local date and time
/// 2. Log a summary of what succeeded and what degraded
/// 3. Print the rendered dashboard
///
/// Failures inside a refresh end up as notifications in the snapshot, so a
/// bad tick never stops the loop.
///
/// Runs until `Ctrl+C` (SIGINT) is received.
pub async fn run_refresh(dashboard: Arc<Dashboard>, refresh_interval_seconds: u64) {
    let mut interval = time::interval(Duration::from_secs(refresh_interval_seconds));

    tracing::info!(
        "Dashboard refresh started (interval: {}s)",
        refresh_interval_seconds
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let snapshot = refresh_once(&dashboard).await;
                println!("{}", render(&snapshot));
            }

            _ = signal::ctrl_c() => {
                tracing::info!("Shutdown signal received. Stopping refresh.");
                break;
            }
        }
    }

    tracing::info!("Dashboard refresh stopped cleanly");
}

/// Execute a single refresh cycle for the current local time.
pub async fn refresh_once(dashboard: &Dashboard) -> DashboardSnapshot {
    let now = Local::now().naive_local();
    let snapshot = dashboard.build(now.date(), now.time()).await;
    log_summary(&snapshot);
    snapshot
}

fn log_summary(snapshot: &DashboardSnapshot) {
    match (&snapshot.hijri, snapshot.hijri_strategy) {
        (Some(hijri), Some(strategy)) => tracing::info!(
            "Dashboard refreshed: {} via {}, {} notifications",
            hijri.formatted,
            strategy,
            snapshot.notifications.len()
        ),
        _ => tracing::warn!(
            "Dashboard refreshed without a Hijri date, {} notifications",
            snapshot.notifications.len()
        ),
    }

    for notification in &snapshot.notifications {
        tracing::debug!("{:?}: {}", notification.level, notification.message);
    }
}
