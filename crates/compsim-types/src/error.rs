//! Unified error interface for compsim.
//!
//! Every layer's error enum implements [`ErrorCode`] so that callers can
//! branch on stable machine-readable codes instead of message text.
//!
//! # Taxonomy
//!
//! | Condition | Typical code | Handling |
//! |-----------|--------------|----------|
//! | Lookup miss (path, user, group) | `*_NOT_FOUND` | reported, caller decides |
//! | Capability check fails | `*_PERMISSION_DENIED` | execution refused, status kept |
//! | Script raised an error | `SCRIPT_FAILED` | surfaced to the process stream |
//! | Persisted entry unreadable | `PERSIST_CORRUPT_ENTRY` | skipped with a warning |
//!
//! # Example
//!
//! ```
//! use compsim_types::ErrorCode;
//!
//! #[derive(Debug)]
//! enum LookupError {
//!     Missing(String),
//! }
//!
//! impl ErrorCode for LookupError {
//!     fn code(&self) -> &'static str {
//!         "LOOKUP_MISSING"
//!     }
//!
//!     fn is_recoverable(&self) -> bool {
//!         true
//!     }
//! }
//!
//! assert_eq!(LookupError::Missing("x".into()).code(), "LOOKUP_MISSING");
//! ```

/// Stable error code interface.
///
/// Codes are `UPPER_SNAKE_CASE`, prefixed with the layer that owns them
/// (`VFS_`, `PROCESS_`, `EVENT_`, ...), and never change once published.
///
/// An error is recoverable when the caller can continue using the same
/// machine after handling it. Nothing in the runtime is fatal to a
/// registry, so "not recoverable" only means retrying the same operation
/// unchanged will fail again.
pub trait ErrorCode {
    /// Machine-readable code.
    fn code(&self) -> &'static str;

    /// Whether the condition can be handled without discarding the machine.
    fn is_recoverable(&self) -> bool;
}

impl ErrorCode for crate::DesignationError {
    fn code(&self) -> &'static str {
        match self {
            Self::Empty => "DESIGNATION_EMPTY",
            Self::ForbiddenChar(_) => "DESIGNATION_FORBIDDEN_CHAR",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Designation, MachineId};

    #[test]
    fn designation_errors_have_codes() {
        let err = Designation::new(MachineId::new(0), "").unwrap_err();
        assert_eq!(err.code(), "DESIGNATION_EMPTY");
        assert!(!err.is_recoverable());
    }
}
