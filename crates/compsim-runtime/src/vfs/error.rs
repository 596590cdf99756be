//! Filesystem errors.
//!
//! Messages carry logical paths only. Host locations never appear here
//! because these errors can be shown to scripts.

use compsim_types::ErrorCode;
use thiserror::Error;

/// Errors from virtual filesystem operations.
#[derive(Debug, Error)]
pub enum VfsError {
    /// Some segment of the path does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A node with that name already exists in the parent folder.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The path is malformed or escapes the root.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// A single name is not usable as a node name.
    #[error("invalid name: {0:?}")]
    InvalidName(String),

    /// Expected a file, found a folder.
    #[error("not a file: {0}")]
    NotAFile(String),

    /// Expected a folder, found a file.
    #[error("not a folder: {0}")]
    NotAFolder(String),

    /// The root folder cannot be removed or replaced.
    #[error("operation not allowed on root")]
    RootImmutable,

    /// Host storage failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Logical path involved.
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl VfsError {
    pub(crate) fn io(path: impl ToString, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_string(),
            source,
        }
    }

    /// Whether this is a lookup miss.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::NotAFile(_))
    }
}

impl ErrorCode for VfsError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "VFS_NOT_FOUND",
            Self::AlreadyExists(_) => "VFS_ALREADY_EXISTS",
            Self::InvalidPath(_) => "VFS_INVALID_PATH",
            Self::InvalidName(_) => "VFS_INVALID_NAME",
            Self::NotAFile(_) => "VFS_NOT_A_FILE",
            Self::NotAFolder(_) => "VFS_NOT_A_FOLDER",
            Self::RootImmutable => "VFS_ROOT_IMMUTABLE",
            Self::Io { .. } => "VFS_IO",
        }
    }

    fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Io { .. })
    }
}
