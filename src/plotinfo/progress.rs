//! Progress extraction from plotter logs
//!
//! A log is reduced to the furthest point the plotter is known to have
//! reached. Lines are classified one at a time; the result is the running
//! maximum, and the scan stops at the first line saying the plot is written.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::warn;

use super::error::ClassifyError;
use super::matcher::{match_line, LineMatch};

/// Progress of a single plot, in percent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PlotProgress {
    /// How close the plot is to completion, 0..=100
    pub percent: u8,
    /// Whether the plot has been fully written
    pub completed: bool,
}

impl PlotProgress {
    /// Nothing recognized yet
    pub const NONE: PlotProgress = PlotProgress {
        percent: 0,
        completed: false,
    };

    /// Plot written
    pub const DONE: PlotProgress = PlotProgress {
        percent: 100,
        completed: true,
    };

    /// In-flight progress at `percent`
    pub fn running(percent: u8) -> Self {
        Self {
            percent,
            completed: false,
        }
    }
}

/// Classify a single log line
///
/// Lines that don't look like progress output yield [`PlotProgress::NONE`].
/// A line that looks like progress output but names a table the phase
/// doesn't have is an error.
pub fn classify_line(line: &str) -> Result<PlotProgress, ClassifyError> {
    match match_line(line) {
        None => Ok(PlotProgress::NONE),
        Some(LineMatch::Terminal) => Ok(PlotProgress::DONE),
        Some(LineMatch::Table { stage, index }) => {
            let index: u32 = index
                .parse()
                .map_err(|source| ClassifyError::InvalidIndex { stage, source })?;

            let percent = stage.percent(index).ok_or_else(|| {
                let range = stage.index_range();
                ClassifyError::IndexOutOfRange {
                    stage,
                    index,
                    min: *range.start(),
                    max: *range.end(),
                }
            })?;

            Ok(PlotProgress::running(percent))
        }
    }
}

/// Reduce a sequence of log lines, reporting bad lines through `on_error`
///
/// `on_error` receives the 1-based line number and the failure. A bad line
/// counts as no progress; it never stops the scan. Lines after a terminal
/// marker are not consumed.
pub fn reduce_lines_with<I, S, F>(lines: I, mut on_error: F) -> PlotProgress
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
    F: FnMut(usize, &ClassifyError),
{
    let mut progress = PlotProgress::NONE;

    for (number, line) in lines.into_iter().enumerate() {
        let line_progress = match classify_line(line.as_ref()) {
            Ok(line_progress) => line_progress,
            Err(e) => {
                on_error(number + 1, &e);
                PlotProgress::NONE
            }
        };

        progress.percent = progress.percent.max(line_progress.percent);
        if line_progress.completed {
            progress.completed = true;
            break;
        }
    }

    progress
}

/// Reduce a sequence of log lines, logging bad lines
pub fn reduce_lines<I, S>(lines: I) -> PlotProgress
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    reduce_lines_with(lines, |number, e| {
        warn!(line = number, stage = %e.stage(), "Unusable progress line: {}", e);
    })
}

/// Read a plotter log and return its progress
pub fn plot_progress<R: BufRead>(reader: R) -> PlotProgress {
    reduce_lines(LogLines::new(reader))
}

/// Open a plotter log file and return its progress
pub fn plot_progress_from_path(path: &Path) -> Result<PlotProgress> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open log file: {}", path.display()))?;
    Ok(plot_progress(BufReader::new(file)))
}

/// Lazily splits a byte stream into lines
///
/// Line endings (`\n` or `\r\n`) are removed and invalid UTF-8 is replaced
/// rather than rejected. A read error ends the stream.
struct LogLines<R> {
    reader: R,
    buf: Vec<u8>,
    finished: bool,
}

impl<R: BufRead> LogLines<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            finished: false,
        }
    }
}

impl<R: BufRead> Iterator for LogLines<R> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.finished {
            return None;
        }

        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => {
                self.finished = true;
                None
            }
            Ok(_) => {
                if self.buf.last() == Some(&b'\n') {
                    self.buf.pop();
                }
                if self.buf.last() == Some(&b'\r') {
                    self.buf.pop();
                }
                Some(String::from_utf8_lossy(&self.buf).into_owned())
            }
            Err(e) => {
                warn!("Log read failed, using progress seen so far: {}", e);
                self.finished = true;
                None
            }
        }
    }
}
