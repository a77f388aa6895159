use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while reading or writing the parallel corpus files.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Parallel files must have one line per sample.
    #[error("{path} has {found} lines, expected {expected}")]
    LineCountMismatch {
        path: PathBuf,
        expected: usize,
        found: usize,
    },

    #[error("sample id {value:?} is not a non-negative integer")]
    InvalidId { value: String },

    #[error("sample id {id} is outside the timestamp table ({len} entries)")]
    IdOutOfRange { id: usize, len: usize },

    #[error("line {line} of {path}: {value:?} is not a timestamp")]
    InvalidTimestamp {
        path: PathBuf,
        line: usize,
        value: String,
    },
}

impl DataError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DataError::Io {
            path: path.into(),
            source,
        }
    }
}
