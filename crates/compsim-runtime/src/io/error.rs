//! I/O bridge errors.

use compsim_types::{ErrorCode, TerminalId};
use thiserror::Error;

/// Errors from the I/O queue and terminal table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// The bridge side of the queue is gone.
    #[error("I/O queue closed")]
    Closed,

    /// No open terminal with that id.
    #[error("unknown terminal {0}")]
    UnknownTerminal(TerminalId),
}

impl ErrorCode for BridgeError {
    fn code(&self) -> &'static str {
        match self {
            Self::Closed => "BRIDGE_CLOSED",
            Self::UnknownTerminal(_) => "BRIDGE_UNKNOWN_TERMINAL",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::UnknownTerminal(_))
    }
}
