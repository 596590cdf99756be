//! Event categories.
//!
//! Categories group event names for listing and filtering. They never
//! influence dispatch order.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Grouping tag attached to every registered event name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// Keyboard and text input.
    Key,
    /// Pointer input.
    Mouse,
    /// Terminal and machine lifecycle notifications.
    Lifecycle,
    /// Anything else registered by the machine itself.
    Misc,
    /// Category introduced by scripts at runtime.
    Extension(String),
}

impl EventCategory {
    /// Returns the string form used in script bindings and logs.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Key => "key",
            Self::Mouse => "mouse",
            Self::Lifecycle => "lifecycle",
            Self::Misc => "misc",
            Self::Extension(name) => name,
        }
    }

    /// Maps a string to a category. Unrecognized names become
    /// [`Extension`](Self::Extension).
    ///
    /// # Example
    ///
    /// ```
    /// use compsim_event::EventCategory;
    ///
    /// assert_eq!(EventCategory::from_name("mouse"), EventCategory::Mouse);
    /// assert_eq!(
    ///     EventCategory::from_name("net"),
    ///     EventCategory::Extension("net".into())
    /// );
    /// ```
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "key" => Self::Key,
            "mouse" => Self::Mouse,
            "lifecycle" => Self::Lifecycle,
            "misc" => Self::Misc,
            other => Self::Extension(other.to_string()),
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_names_round_trip() {
        for cat in [
            EventCategory::Key,
            EventCategory::Mouse,
            EventCategory::Lifecycle,
            EventCategory::Misc,
        ] {
            assert_eq!(EventCategory::from_name(cat.as_str()), cat);
        }
    }

    #[test]
    fn extension_keeps_its_name() {
        let cat = EventCategory::from_name("network");
        assert_eq!(cat.to_string(), "network");
    }
}
