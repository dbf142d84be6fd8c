//! Per-file tracking state for the log directory

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

use super::ProgressMap;
use crate::plotinfo::{plot_progress_from_path, PlotProgress};

/// What is known about a log file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    /// Still being written; last progress observed
    InProgress(u8),
    /// Plot finished. Never read again.
    Completed,
}

/// Every log file seen in the watched directory
///
/// Entries are added the first time a file shows up in a listing and are
/// never removed.
#[derive(Debug, Default)]
pub struct TrackedFiles {
    files: HashMap<String, FileState>,
}

impl TrackedFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<FileState> {
        self.files.get(name).copied()
    }

    pub fn is_completed(&self, name: &str) -> bool {
        self.get(name) == Some(FileState::Completed)
    }

    pub fn completed_count(&self) -> usize {
        self.files
            .values()
            .filter(|state| **state == FileState::Completed)
            .count()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Scan the directory once and return the progress of unfinished plots
    ///
    /// Failing to list the directory is an error. A file that cannot be
    /// opened keeps its previous progress and is tried again next scan.
    pub fn scan(&mut self, dir: &Path) -> Result<ProgressMap> {
        self.scan_with(dir, plot_progress_from_path)
    }

    /// [`TrackedFiles::scan`] with the per-file reader supplied by the caller
    pub fn scan_with<F>(&mut self, dir: &Path, mut read_progress: F) -> Result<ProgressMap>
    where
        F: FnMut(&Path) -> Result<PlotProgress>,
    {
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read log directory: {}", dir.display()))?;

        let mut snapshot = ProgressMap::new();

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Failed to read entry in {}: {}", dir.display(), e);
                    continue;
                }
            };

            let name = entry.file_name().to_string_lossy().into_owned();
            if self.is_completed(&name) {
                continue;
            }

            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let state = self
                .files
                .entry(name.clone())
                .or_insert(FileState::InProgress(0));

            match read_progress(&path) {
                Ok(progress) if progress.completed => {
                    info!(file = %name, "Plot complete");
                    *state = FileState::Completed;
                }
                Ok(progress) => {
                    debug!(file = %name, percent = progress.percent, "Plot in progress");
                    *state = FileState::InProgress(progress.percent);
                    snapshot.insert(name, progress.percent);
                }
                Err(e) => {
                    warn!("Skipping {} this scan: {:#}", name, e);
                    if let FileState::InProgress(percent) = *state {
                        snapshot.insert(name, percent);
                    }
                }
            }
        }

        Ok(snapshot)
    }
}
