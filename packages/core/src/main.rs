use std::sync::Arc;

use ayyamul_bidh_tracker::cache::CacheLayer;
use ayyamul_bidh_tracker::calendar::service::DateConversionService;
use ayyamul_bidh_tracker::calendar::types::DateKey;
use ayyamul_bidh_tracker::cli::{Cli, Command};
use ayyamul_bidh_tracker::config::Config;
use ayyamul_bidh_tracker::dashboard::{render, Dashboard};
use ayyamul_bidh_tracker::db;
use ayyamul_bidh_tracker::error::AppError;
use ayyamul_bidh_tracker::logging::init_logging;
use ayyamul_bidh_tracker::metrics::CoreMetrics;
use ayyamul_bidh_tracker::prayer::service::PrayerTimesService;
use ayyamul_bidh_tracker::prayer::types::{CalculationMethod, Location};
use ayyamul_bidh_tracker::queue::RequestQueue;
use ayyamul_bidh_tracker::scheduler::{refresh_once, run_refresh};
use ayyamul_bidh_tracker::services::{AladhanClient, CalendarApi};
use ayyamul_bidh_tracker::settings::AppSettings;
use ayyamul_bidh_tracker::store::{clear_app_data, KeyValueStore, SqliteStore};
use ayyamul_bidh_tracker::tracker::FastingTracker;
use chrono::{Datelike, Local, NaiveDate};
use clap::Parser;
use dotenvy::dotenv;
use tokio::sync::RwLock;

struct App {
    config: Config,
    store: Arc<dyn KeyValueStore>,
    cache: CacheLayer,
    conversions: Arc<DateConversionService>,
    prayers: Arc<PrayerTimesService>,
    tracker: Arc<RwLock<FastingTracker>>,
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_logging();

    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        tracing::error!("{}", err);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let mut config = Config::from_env().map_err(AppError::Config)?;
    if let Some(url) = cli.aladhan_url {
        config.aladhan_base_url = url;
    }
    if let Some(url) = cli.database_url {
        config.database_url = url;
    }
    tracing::info!("Tracker started with config: {:?}", config);

    let metrics = Arc::new(
        CoreMetrics::new().map_err(|err| AppError::Startup(format!("metrics: {}", err)))?,
    );
    let app = build_app(config, metrics.clone()).await?;

    let result = execute(&app, cli.command.unwrap_or(Command::Dashboard { watch: false })).await;

    app.cache.flush().await;
    if cli.metrics {
        match metrics.render() {
            Ok(text) => print!("{}", text),
            Err(err) => tracing::warn!("Could not render metrics: {}", err),
        }
    }

    result
}

async fn build_app(config: Config, metrics: Arc<CoreMetrics>) -> Result<App, AppError> {
    let pool = db::create_pool(&config.database_url)
        .await
        .map_err(|err| AppError::Startup(format!("database {}: {}", config.database_url, err)))?;
    let store: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::new(pool));
    let cache = CacheLayer::load(store.clone()).await?;

    let client = AladhanClient::new(config.aladhan_base_url.as_str(), config.http_timeout())
        .map_err(|err| AppError::Startup(format!("HTTP client: {}", err)))?;
    let api: Arc<dyn CalendarApi> = Arc::new(client);
    let queue = RequestQueue::with_metrics(config.queue_config(), Some(metrics.clone()));

    let conversions = DateConversionService::new(api.clone(), queue.clone(), cache.clone())
        .with_metrics(Some(metrics.clone()));
    let prayers = PrayerTimesService::new(api, queue, cache.clone())
        .with_max_age(config.prayer_cache_max_age())
        .with_metrics(Some(metrics));
    let tracker = FastingTracker::load(store.clone()).await?;

    Ok(App {
        config,
        store,
        cache,
        conversions: Arc::new(conversions),
        prayers: Arc::new(prayers),
        tracker: Arc::new(RwLock::new(tracker)),
    })
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Hijri `(month, year)` of today.
async fn current_hijri_month(app: &App) -> Result<(u32, i32), AppError> {
    let hijri = app.conversions.current_hijri_date(today()).await?.value;
    Ok((hijri.month, hijri.year))
}

async fn month_or_current(
    app: &App,
    month: Option<u32>,
    year: Option<i32>,
) -> Result<(u32, i32), AppError> {
    match (month, year) {
        (Some(month), Some(year)) => Ok((month, year)),
        _ => {
            let (current_month, current_year) = current_hijri_month(app).await?;
            Ok((month.unwrap_or(current_month), year.unwrap_or(current_year)))
        }
    }
}

async fn execute(app: &App, command: Command) -> Result<(), AppError> {
    match command {
        Command::Dashboard { watch } => {
            let dashboard = Dashboard::new(
                app.conversions.clone(),
                app.prayers.clone(),
                app.tracker.clone(),
                app.store.clone(),
            );
            if watch {
                run_refresh(Arc::new(dashboard), app.config.refresh_interval_seconds).await;
            } else {
                let snapshot = refresh_once(&dashboard).await;
                print!("{}", render(&snapshot));
            }
        }

        Command::Convert { date, to_gregorian } => {
            let key: DateKey = date.parse()?;
            if to_gregorian {
                let resolution = app.conversions.hijri_to_gregorian(&key).await?;
                println!(
                    "{} H = {} ({})",
                    key, resolution.value.formatted, resolution.strategy
                );
            } else {
                let resolution = app.conversions.gregorian_to_hijri(&key).await?;
                println!(
                    "{} = {} ({}, {})",
                    key, resolution.value.formatted, resolution.value.accuracy, resolution.strategy
                );
                if resolution.value.is_ayyamul_bidh() {
                    println!("This is an Ayyamul Bidh day.");
                }
            }
        }

        Command::Mark { day, month, year } => {
            let (month, year) = month_or_current(app, month, year).await?;
            let changed = app.tracker.write().await.mark(day, month, year).await?;
            if changed {
                println!("Marked day {} of {}/{}", day, month, year);
            } else {
                println!("Day {} of {}/{} was already marked", day, month, year);
            }
        }

        Command::Unmark { day, month, year } => {
            let (month, year) = month_or_current(app, month, year).await?;
            let changed = app.tracker.write().await.unmark(day, month, year).await?;
            if changed {
                println!("Unmarked day {} of {}/{}", day, month, year);
            } else {
                println!("Day {} of {}/{} was not marked", day, month, year);
            }
        }

        Command::Stats { year } => {
            let year = match year {
                Some(year) => year,
                None => current_hijri_month(app).await?.1,
            };
            let tracker = app.tracker.read().await;
            let stats = tracker.yearly_stats(year);

            println!(
                "{} H: {}/{} days ({}%), {} complete, {} partial, {} empty months",
                stats.year,
                stats.total_days,
                stats.max_possible_days,
                stats.percentage,
                stats.complete_months,
                stats.partial_months,
                stats.empty_months
            );
            for month in &stats.monthly_details {
                let days: Vec<String> = month.marked_days.iter().map(u32::to_string).collect();
                println!("  {:<16} {}/3  {}", month.month_name, month.total_days, days.join(" "));
            }
            println!("Longest streak: {} months", tracker.longest_streak());
        }

        Command::Upcoming { months } => {
            for month in app.conversions.upcoming_ayyamul_bidh(today(), months).await? {
                let dates: Vec<String> = month
                    .dates
                    .iter()
                    .map(|date| format!("{} = {}", date.hijri_day, date.gregorian.formatted))
                    .collect();
                println!(
                    "{} {}: {}",
                    month.hijri_month_name,
                    month.hijri_year,
                    if dates.is_empty() {
                        "unavailable".to_string()
                    } else {
                        dates.join(", ")
                    }
                );
            }
        }

        Command::Calendar {
            month,
            year,
            gregorian,
        } => {
            let days = if gregorian {
                let today = today();
                let month = month.unwrap_or(today.month());
                let year = year.unwrap_or(today.year());
                app.conversions.gregorian_month_calendar(month, year).await?
            } else {
                let (month, year) = month_or_current(app, month, year).await?;
                app.conversions.hijri_month_calendar(month, year).await?
            };

            for day in days {
                println!(
                    "{}{}  {}",
                    if day.is_ayyamul_bidh { "*" } else { " " },
                    day.hijri,
                    day.gregorian
                );
            }
        }

        Command::Setup {
            city,
            country,
            latitude,
            longitude,
            method,
        } => {
            let mut settings = AppSettings::load(app.store.as_ref()).await?;

            let location = match (city, country, latitude, longitude) {
                (Some(city), Some(country), _, _) => Some(Location::city(city, country)?),
                (_, _, Some(latitude), Some(longitude)) => {
                    Some(Location::coordinates(latitude, longitude)?)
                }
                _ => None,
            };
            match location {
                Some(location) => settings.set_location(location)?,
                None if settings.location.is_none() => {
                    return Err(AppError::Usage(
                        "give --city and --country, or --latitude and --longitude".to_string(),
                    ));
                }
                None => {}
            }

            if let Some(id) = method {
                let method = CalculationMethod::from_id(id)
                    .ok_or_else(|| AppError::Usage(format!("unknown calculation method {}", id)))?;
                settings.set_method(&method);
            }

            settings.save(app.store.as_ref()).await?;
            println!(
                "Saved: {} using {}",
                settings
                    .location
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
                settings.calculation_method().label()
            );
        }

        Command::Export => {
            let export = app.tracker.read().await.export();
            let json = serde_json::to_string_pretty(&export)
                .map_err(|err| AppError::Usage(format!("export: {}", err)))?;
            println!("{}", json);
        }

        Command::Import { file } => {
            let raw = tokio::fs::read_to_string(&file)
                .await
                .map_err(|err| AppError::Usage(format!("{}: {}", file.display(), err)))?;
            let document: serde_json::Value = serde_json::from_str(&raw)
                .map_err(|err| AppError::Usage(format!("{}: {}", file.display(), err)))?;

            let summary = app.tracker.write().await.import(&document).await?;
            println!(
                "Imported {} months ({} days), skipped {}",
                summary.months, summary.days, summary.skipped
            );
        }

        Command::Reset => {
            app.cache.reset();
            app.tracker.write().await.reset().await?;
            clear_app_data(app.store.as_ref()).await?;
            println!("All settings, fasting records and cached data were deleted");
        }
    }

    Ok(())
}
