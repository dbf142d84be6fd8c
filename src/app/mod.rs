pub mod config;

pub use config::{Config, ConsoleSettings, MetricsSettings, WatchSettings};
