//! Persistence errors.

use compsim_types::ErrorCode;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from encoding, decoding or writing metadata.
#[derive(Debug, Error)]
pub enum PersistError {
    /// Reading or writing the metadata file failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An entry's designation, type or payload would break the line format.
    #[error("invalid entry {designation}: {reason}")]
    InvalidEntry { designation: String, reason: String },

    /// A payload could not be decoded.
    #[error("corrupt entry {designation}: {reason}")]
    Corrupt { designation: String, reason: String },

    /// JSON payload encoding failed.
    #[error("payload codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl PersistError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a corrupt-entry error.
    pub fn corrupt(designation: impl Into<String>, reason: impl ToString) -> Self {
        Self::Corrupt {
            designation: designation.into(),
            reason: reason.to_string(),
        }
    }
}

impl ErrorCode for PersistError {
    fn code(&self) -> &'static str {
        match self {
            Self::Io { .. } => "PERSIST_IO",
            Self::InvalidEntry { .. } => "PERSIST_INVALID_ENTRY",
            Self::Corrupt { .. } => "PERSIST_CORRUPT_ENTRY",
            Self::Codec(_) => "PERSIST_CODEC",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::Corrupt { .. } | Self::Io { .. })
    }
}
