//! Human-readable, registry-unique machine names.

use crate::MachineId;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Why a name cannot be used to build a [`Designation`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DesignationError {
    /// The name was empty after trimming.
    #[error("machine name must not be empty")]
    Empty,

    /// The name contains a character that would break the metadata line
    /// format or the host directory layout.
    #[error("machine name contains forbidden character {0:?}")]
    ForbiddenChar(char),
}

/// A machine designation: `{id}_{name}`.
///
/// Designations name the machine's private storage directory, so the name
/// part may not contain path separators, `=` (the metadata key delimiter)
/// or control characters.
///
/// # Example
///
/// ```
/// use compsim_types::{Designation, MachineId};
///
/// let d = Designation::new(MachineId::new(2), "office").unwrap();
/// assert_eq!(d.to_string(), "2_office");
/// assert_eq!(d.name(), "office");
/// assert!(Designation::new(MachineId::new(2), "a/b").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Designation {
    id: MachineId,
    name: String,
    full: String,
}

impl Designation {
    /// Builds the designation for `name` on machine `id`.
    ///
    /// # Errors
    ///
    /// Returns [`DesignationError`] if the name is empty or contains a
    /// forbidden character.
    pub fn new(id: MachineId, name: &str) -> Result<Self, DesignationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DesignationError::Empty);
        }
        if let Some(c) = name
            .chars()
            .find(|c| matches!(c, '/' | '\\' | '=' | ':') || c.is_control())
        {
            return Err(DesignationError::ForbiddenChar(c));
        }
        Ok(Self {
            id,
            name: name.to_string(),
            full: format!("{id}_{name}"),
        })
    }

    /// Machine id part.
    #[must_use]
    pub fn id(&self) -> MachineId {
        self.id
    }

    /// Name part, without the id prefix.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full `{id}_{name}` string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.full
    }
}

impl fmt::Display for Designation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_id_and_name() {
        let d = Designation::new(MachineId::new(0), "test").expect("valid name");
        assert_eq!(d.as_str(), "0_test");
        assert_eq!(d.id(), MachineId::new(0));
    }

    #[test]
    fn trims_surrounding_whitespace() {
        let d = Designation::new(MachineId::new(1), "  lab ").expect("valid name");
        assert_eq!(d.as_str(), "1_lab");
    }

    #[test]
    fn rejects_empty_and_forbidden() {
        assert_eq!(
            Designation::new(MachineId::new(0), "   "),
            Err(DesignationError::Empty)
        );
        assert_eq!(
            Designation::new(MachineId::new(0), "a=b"),
            Err(DesignationError::ForbiddenChar('='))
        );
        assert_eq!(
            Designation::new(MachineId::new(0), "..\\x"),
            Err(DesignationError::ForbiddenChar('\\'))
        );
        assert!(Designation::new(MachineId::new(0), "line\nbreak").is_err());
    }
}
