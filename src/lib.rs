pub mod app;
pub mod logwatch;
pub mod metrics;
pub mod plotinfo;
