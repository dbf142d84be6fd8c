//! Plot log directory watching
//!
//! Periodically rescans a directory of plotter logs and publishes the
//! progress of every plot that is still being written. Finished plots are
//! remembered so they are never read again, and drop out of the published
//! snapshot.

pub mod tracker;
pub mod watcher;

use std::collections::HashMap;
use std::sync::Arc;

pub use tracker::{FileState, TrackedFiles};
pub use watcher::{LogWatcher, WatchConfig};

/// Log file name -> progress percent, for plots still in progress
pub type ProgressMap = HashMap<String, u8>;

/// Receives each snapshot the watcher publishes
pub trait ProgressSink: Send + Sync {
    fn set_progress(&self, progress: Arc<ProgressMap>);
}
