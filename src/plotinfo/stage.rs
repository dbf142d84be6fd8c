//! Stage tables for the plotting phases
//!
//! Each phase works through the plot's tables in a fixed order. The
//! percentages are tuned to the relative wall-clock cost of each phase, so
//! they are constants rather than anything derived from the table index.

use std::fmt;
use std::ops::RangeInclusive;

/// Progress reached when phase 1 starts computing tables 1..=7
const COMPUTE_PROGRESS: [u8; 7] = [1, 6, 12, 20, 28, 36, 42];

/// Progress reached when phase 2 starts backpropagating tables 2..=7.
/// Backpropagation walks from table 7 down to table 2.
const BACKPROP_PROGRESS: [u8; 6] = [61, 58, 55, 51, 48, 43];

/// Progress reached when phase 3 starts compressing tables 1..=6
const COMPRESS_PROGRESS: [u8; 6] = [66, 73, 79, 85, 92, 98];

/// Plotting phase that reports per-table progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Phase 1: forward propagation
    Compute,
    /// Phase 2: backpropagation
    Backprop,
    /// Phase 3: compression
    Compress,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Compute => "compute",
            Stage::Backprop => "backprop",
            Stage::Compress => "compress",
        }
    }

    /// Table indexes this phase can legitimately report
    pub fn index_range(&self) -> RangeInclusive<u32> {
        match self {
            Stage::Compute => 1..=7,
            Stage::Backprop => 2..=7,
            Stage::Compress => 1..=6,
        }
    }

    /// Look up the progress percentage for a table index
    ///
    /// Returns `None` when the index is outside [`Stage::index_range`].
    pub fn percent(&self, index: u32) -> Option<u8> {
        let range = self.index_range();
        if !range.contains(&index) {
            return None;
        }

        let offset = (index - range.start()) as usize;
        let table: &[u8] = match self {
            Stage::Compute => &COMPUTE_PROGRESS,
            Stage::Backprop => &BACKPROP_PROGRESS,
            Stage::Compress => &COMPRESS_PROGRESS,
        };
        table.get(offset).copied()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
