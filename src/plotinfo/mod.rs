//! Plot progress extraction
//!
//! Turns the free-form log of a plotter run into a completion percentage.
//! The plotter reports which table each phase is working on; those reports
//! map onto fixed percentages, and the furthest one seen wins.

pub mod error;
pub mod matcher;
pub mod progress;
pub mod stage;

pub use error::ClassifyError;
pub use progress::{
    classify_line, plot_progress, plot_progress_from_path, reduce_lines, reduce_lines_with,
    PlotProgress,
};
pub use stage::Stage;
