use std::num::ParseIntError;
use thiserror::Error;

use super::stage::Stage;

/// A line had a recognized shape but an unusable table index
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifyError {
    #[error("invalid {stage} table number: {source}")]
    InvalidIndex {
        stage: Stage,
        #[source]
        source: ParseIntError,
    },

    #[error("{stage} table number {index} is outside {min}..={max}")]
    IndexOutOfRange {
        stage: Stage,
        index: u32,
        min: u32,
        max: u32,
    },
}

impl ClassifyError {
    /// Phase the offending line belonged to
    pub fn stage(&self) -> Stage {
        match self {
            ClassifyError::InvalidIndex { stage, .. } => *stage,
            ClassifyError::IndexOutOfRange { stage, .. } => *stage,
        }
    }
}
