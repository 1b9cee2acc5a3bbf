mod app;
mod config;
mod logging;
mod prompt;
mod telemetry;

pub use app::run_from_args;
