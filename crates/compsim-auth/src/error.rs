//! Authorization errors.

use compsim_types::ErrorCode;
use thiserror::Error;

/// A capability check failed.
///
/// Returned as a value, never raised into the event bus: the caller
/// decides whether to report it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessDenied {
    /// The execute flag is off.
    #[error("permission denied: execution not allowed")]
    Execute,

    /// The kernel flag is off.
    #[error("permission denied: kernel access not allowed")]
    Kernel,

    /// The namespace is not bound.
    #[error("permission denied: {operation} requires namespace '{namespace}'")]
    Namespace { namespace: String, operation: String },
}

impl ErrorCode for AccessDenied {
    fn code(&self) -> &'static str {
        match self {
            Self::Execute => "AUTH_EXECUTE_DENIED",
            Self::Kernel => "AUTH_KERNEL_DENIED",
            Self::Namespace { .. } => "AUTH_NAMESPACE_DENIED",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

/// User / group registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No user with that name.
    #[error("user not found: {0}")]
    UserNotFound(String),

    /// No group with that name.
    #[error("group not found: {0}")]
    GroupNotFound(String),

    /// A user with that name already exists.
    #[error("user already exists: {0}")]
    DuplicateUser(String),

    /// A group with that name already exists.
    #[error("group already exists: {0}")]
    DuplicateGroup(String),

    /// The persisted registry text could not be decoded.
    #[error("registry codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl ErrorCode for RegistryError {
    fn code(&self) -> &'static str {
        match self {
            Self::UserNotFound(_) => "AUTH_USER_NOT_FOUND",
            Self::GroupNotFound(_) => "AUTH_GROUP_NOT_FOUND",
            Self::DuplicateUser(_) => "AUTH_DUPLICATE_USER",
            Self::DuplicateGroup(_) => "AUTH_DUPLICATE_GROUP",
            Self::Codec(_) => "AUTH_CODEC",
        }
    }

    fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Codec(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_denied_is_not_recoverable() {
        assert!(!AccessDenied::Execute.is_recoverable());
        assert_eq!(AccessDenied::Kernel.code(), "AUTH_KERNEL_DENIED");
    }

    #[test]
    fn lookup_misses_are_recoverable() {
        let err = RegistryError::UserNotFound("ghost".into());
        assert!(err.is_recoverable());
        assert_eq!(err.to_string(), "user not found: ghost");
    }
}
