//! Machine and registry errors.

use crate::io::BridgeError;
use crate::persist::PersistError;
use crate::process::ProcessError;
use crate::vfs::VfsError;
use compsim_event::EventError;
use compsim_types::{DesignationError, ErrorCode};
use std::path::PathBuf;
use thiserror::Error;

/// Errors from building, driving or removing machines.
#[derive(Debug, Error)]
pub enum MachineError {
    /// The machine name cannot form a designation.
    #[error(transparent)]
    InvalidName(#[from] DesignationError),

    /// Preparing the machine's storage directory failed.
    #[error("failed to prepare storage at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Filesystem error.
    #[error(transparent)]
    Vfs(#[from] VfsError),

    /// Persistence error.
    #[error(transparent)]
    Persist(#[from] PersistError),

    /// Process runtime error.
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// Event bus error.
    #[error(transparent)]
    Event(#[from] EventError),

    /// Terminal error.
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    /// No machine with that designation in the registry.
    #[error("machine not found: {0}")]
    NotFound(String),

    /// The machine thread is gone.
    #[error("machine {0} is not running")]
    Stopped(String),

    /// The machine thread could not be started.
    #[error("failed to spawn machine thread: {0}")]
    Spawn(#[source] std::io::Error),
}

impl MachineError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }
}

impl ErrorCode for MachineError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidName(_) => "MACHINE_INVALID_NAME",
            Self::Storage { .. } => "MACHINE_STORAGE",
            Self::Vfs(_) => "MACHINE_VFS",
            Self::Persist(_) => "MACHINE_PERSIST",
            Self::Process(_) => "MACHINE_PROCESS",
            Self::Event(_) => "MACHINE_EVENT",
            Self::Bridge(_) => "MACHINE_BRIDGE",
            Self::NotFound(_) => "MACHINE_NOT_FOUND",
            Self::Stopped(_) => "MACHINE_STOPPED",
            Self::Spawn(_) => "MACHINE_SPAWN",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::Process(e) => e.is_recoverable(),
            Self::Event(e) => e.is_recoverable(),
            Self::NotFound(_) | Self::Bridge(_) => true,
            _ => false,
        }
    }
}
