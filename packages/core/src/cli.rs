use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Ayyamul Bidh Tracker CLI arguments
#[derive(Debug, Parser)]
#[command(
    name = "ayyamul-bidh-tracker",
    version,
    about = "Track the Ayyamul Bidh fasting days (13th-15th of every Hijri month)"
)]
pub struct Cli {
    /// Aladhan API base URL
    #[arg(long)]
    pub aladhan_url: Option<String>,

    /// SQLite database URL
    #[arg(long)]
    pub database_url: Option<String>,

    /// Print the metrics registry before exiting
    #[arg(long, global = true)]
    pub metrics: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show today's Hijri date, prayer times and fasting progress
    Dashboard {
        /// Keep refreshing until Ctrl+C
        #[arg(long)]
        watch: bool,
    },

    /// Convert a DD-MM-YYYY date between calendars
    Convert {
        date: String,

        /// Treat the date as Hijri and convert it to Gregorian
        #[arg(long)]
        to_gregorian: bool,
    },

    /// Mark a white day as fasted (defaults to the current Hijri month)
    Mark {
        day: u32,
        #[arg(long)]
        month: Option<u32>,
        #[arg(long)]
        year: Option<i32>,
    },

    /// Remove a fasted mark
    Unmark {
        day: u32,
        #[arg(long)]
        month: Option<u32>,
        #[arg(long)]
        year: Option<i32>,
    },

    /// Fasting statistics for a Hijri year (defaults to the current one)
    Stats {
        #[arg(long)]
        year: Option<i32>,
    },

    /// Gregorian dates of the coming white days
    Upcoming {
        #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..=24))]
        months: u32,
    },

    /// Day-by-day calendar of a month
    Calendar {
        #[arg(long)]
        month: Option<u32>,
        #[arg(long)]
        year: Option<i32>,

        /// Read month and year as Gregorian instead of Hijri
        #[arg(long)]
        gregorian: bool,
    },

    /// Set the location and calculation method
    Setup {
        #[arg(long, requires = "country", conflicts_with_all = ["latitude", "longitude"])]
        city: Option<String>,
        #[arg(long, requires = "city")]
        country: Option<String>,
        #[arg(long, requires = "longitude", allow_negative_numbers = true)]
        latitude: Option<f64>,
        #[arg(long, requires = "latitude", allow_negative_numbers = true)]
        longitude: Option<f64>,

        /// Aladhan calculation method id (20 = Kemenag RI)
        #[arg(long)]
        method: Option<u32>,
    },

    /// Print the fasting record as JSON
    Export,

    /// Replace the fasting record with an exported JSON file
    Import { file: PathBuf },

    /// Delete settings, fasting record and cache
    Reset,
}
