//! Small persisted values owned by a machine.

use super::{PersistError, Persistable};
use chrono::{DateTime, Utc};
use compsim_auth::{UserRegistry, USER_REGISTRY_DESIGNATION};

/// Designation of the machine's own name entry.
pub const MACHINE_DESIG: &str = "machine_desig";

/// Designation of the last checkpoint time.
pub const LAST_SAVED: &str = "last_saved";

/// A named string, stored as a JSON string literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringEntry {
    designation: String,
    value: String,
}

impl StringEntry {
    /// Creates an entry.
    #[must_use]
    pub fn new(designation: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            designation: designation.into(),
            value: value.into(),
        }
    }

    /// Current value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl Persistable for StringEntry {
    fn type_tag(&self) -> &str {
        "str"
    }

    fn designation(&self) -> &str {
        &self.designation
    }

    fn serialize(&self) -> Result<String, PersistError> {
        Ok(serde_json::to_string(&self.value)?)
    }

    fn parse(&mut self, text: &str) -> Result<(), PersistError> {
        self.value =
            serde_json::from_str(text).map_err(|e| PersistError::corrupt(&self.designation, e))?;
        Ok(())
    }
}

/// A named UTC timestamp, stored as RFC 3339.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampEntry {
    designation: String,
    value: Option<DateTime<Utc>>,
}

impl TimestampEntry {
    /// Creates an unset entry.
    #[must_use]
    pub fn new(designation: impl Into<String>) -> Self {
        Self {
            designation: designation.into(),
            value: None,
        }
    }

    /// Entry set to the current time.
    #[must_use]
    pub fn now(designation: impl Into<String>) -> Self {
        Self {
            designation: designation.into(),
            value: Some(Utc::now()),
        }
    }

    /// Stored time, if any.
    #[must_use]
    pub fn value(&self) -> Option<DateTime<Utc>> {
        self.value
    }
}

impl Persistable for TimestampEntry {
    fn type_tag(&self) -> &str {
        "timestamp"
    }

    fn designation(&self) -> &str {
        &self.designation
    }

    fn serialize(&self) -> Result<String, PersistError> {
        Ok(self.value.map(|t| t.to_rfc3339()).unwrap_or_default())
    }

    fn parse(&mut self, text: &str) -> Result<(), PersistError> {
        if text.is_empty() {
            self.value = None;
            return Ok(());
        }
        let parsed = DateTime::parse_from_rfc3339(text)
            .map_err(|e| PersistError::corrupt(&self.designation, e))?;
        self.value = Some(parsed.with_timezone(&Utc));
        Ok(())
    }
}

impl Persistable for UserRegistry {
    fn type_tag(&self) -> &str {
        USER_REGISTRY_DESIGNATION
    }

    fn designation(&self) -> &str {
        USER_REGISTRY_DESIGNATION
    }

    fn serialize(&self) -> Result<String, PersistError> {
        self.to_payload()
            .map_err(|e| PersistError::InvalidEntry {
                designation: USER_REGISTRY_DESIGNATION.to_string(),
                reason: e.to_string(),
            })
    }

    fn parse(&mut self, text: &str) -> Result<(), PersistError> {
        self.apply_payload(text)
            .map_err(|e| PersistError::corrupt(USER_REGISTRY_DESIGNATION, e))
    }
}
