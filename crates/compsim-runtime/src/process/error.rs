//! Process runtime errors.

use crate::vfs::VfsError;
use compsim_auth::AccessDenied;
use compsim_types::{ErrorCode, ProcessId};
use thiserror::Error;

/// Errors from [`ProcessRuntime`](super::ProcessRuntime) operations.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// No process with that id.
    #[error("process not found: {0}")]
    NotFound(ProcessId),

    /// The target script does not exist.
    #[error("{0} file not found")]
    FileNotFound(String),

    /// The capability set refused the execution.
    #[error(transparent)]
    PermissionDenied(#[from] AccessDenied),

    /// The process was killed.
    #[error("process {0} is interrupted")]
    Interrupted(ProcessId),

    /// The process is already executing.
    #[error("process {0} is already running")]
    Busy(ProcessId),

    /// The script failed. Carries the scrubbed message.
    #[error("{0}")]
    Script(String),

    /// A filesystem operation failed.
    #[error(transparent)]
    Vfs(#[from] VfsError),

    /// A worker thread could not be started.
    #[error("failed to spawn worker: {0}")]
    Spawn(#[source] std::io::Error),
}

impl ErrorCode for ProcessError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "PROCESS_NOT_FOUND",
            Self::FileNotFound(_) => "PROCESS_FILE_NOT_FOUND",
            Self::PermissionDenied(_) => "PROCESS_PERMISSION_DENIED",
            Self::Interrupted(_) => "PROCESS_INTERRUPTED",
            Self::Busy(_) => "PROCESS_BUSY",
            Self::Script(_) => "PROCESS_SCRIPT_FAILED",
            Self::Vfs(_) => "PROCESS_VFS",
            Self::Spawn(_) => "PROCESS_SPAWN",
        }
    }

    fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Interrupted(_) | Self::Spawn(_))
    }
}
