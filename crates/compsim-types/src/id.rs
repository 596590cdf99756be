//! Identifier types.
//!
//! Machines, processes and terminals are identified by small sequential
//! integers. Machine ids are allocated by the registry, process ids by the
//! owning machine's runtime, and terminal ids by the machine that opens
//! them. None of these are globally unique on their own; a
//! [`Designation`](crate::Designation) is.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier for a machine within a registry.
///
/// # Example
///
/// ```
/// use compsim_types::MachineId;
///
/// let id = MachineId::new(3);
/// assert_eq!(id.get(), 3);
/// assert_eq!(id.next(), MachineId::new(4));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MachineId(u64);

impl MachineId {
    /// Creates a machine id from its numeric value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns the id following this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-machine sequential process identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(u32);

impl ProcessId {
    /// Creates a process id from its numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the numeric value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Correlates a machine-side terminal handle with an external I/O surface.
///
/// Travels as the sole string parameter of the `start_terminal` and
/// `end_terminal` lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TerminalId(u32);

impl TerminalId {
    /// Creates a terminal id from its numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the numeric value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Parses the string form carried by lifecycle events.
    ///
    /// Returns `None` if `s` is not a non-negative integer.
    #[must_use]
    pub fn parse_param(s: &str) -> Option<Self> {
        s.trim().parse::<u32>().ok().map(Self)
    }
}

impl fmt::Display for TerminalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
