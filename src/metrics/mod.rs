//! Metric feed for scrapers
//!
//! Serves the latest progress snapshot as a counter-style text exposition,
//! one sample per plot still being written.

pub mod exposition;
pub mod server;

pub use exposition::Exposition;
pub use server::{MetricListener, MetricServer};
