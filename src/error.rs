use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Job-aborting error categories. Per-record anomalies (overlong line, short
/// line, open quote) are warning counters in [`crate::scan::ScanStats`], not
/// errors.
#[derive(Debug, Error)]
pub enum SortError {
    #[error("input file not found: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("empty input file: {}", .0.display())]
    EmptyInput(PathBuf),

    #[error("not enough disk space in {}: {required} more bytes needed", .dir.display())]
    InsufficientDisk { dir: PathBuf, required: u64 },

    #[error("not enough memory: {0}")]
    InsufficientMemory(String),

    /// A worker observed a key smaller than its predecessor while scanning a
    /// file that the operation requires to be sorted.
    #[error(
        "unsorted record {line_index} with key {key} inferior to key {previous_key} of previous record"
    )]
    UnsortedRecord {
        line_index: u64,
        key: String,
        previous_key: String,
    },

    #[error("interrupted by user")]
    Interrupted,

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type SortResult<T> = Result<T, SortError>;

impl SortError {
    /// Cancellation is sticky and distinct from failure; callers use this to
    /// tell "user stopped the job" from "the job broke".
    pub fn is_interrupted(&self) -> bool {
        matches!(self, SortError::Interrupted)
    }
}
