// Library root: exposes the tracker's modules to the binary and to the
// integration tests in `tests/`. Production entry point remains `src/main.rs`.

pub mod cache;
pub mod calendar;
pub mod dashboard;
pub mod db;
pub mod metrics;
pub mod prayer;
pub mod queue;
pub mod scheduler;
pub mod services;
pub mod settings;
pub mod store;
pub mod tracker;

// Entry-point plumbing used by `main.rs`.
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
