//! Event bus errors.

use crate::EventCategory;
use compsim_types::ErrorCode;
use thiserror::Error;

/// Errors raised by event registration and dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    /// The event name was never registered on this bus.
    #[error("unknown event: {0}")]
    UnknownEvent(String),

    /// The name is already registered under a different category.
    #[error("event {name} already registered as {existing}, not {requested}")]
    CategoryConflict {
        name: String,
        existing: EventCategory,
        requested: EventCategory,
    },

    /// Event names must be non-empty and free of whitespace.
    #[error("invalid event name: {0:?}")]
    InvalidName(String),
}

impl ErrorCode for EventError {
    fn code(&self) -> &'static str {
        match self {
            Self::UnknownEvent(_) => "EVENT_UNKNOWN",
            Self::CategoryConflict { .. } => "EVENT_CATEGORY_CONFLICT",
            Self::InvalidName(_) => "EVENT_INVALID_NAME",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::UnknownEvent(_))
    }
}
