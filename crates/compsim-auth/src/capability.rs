//! Capability sets.
//!
//! A [`CapabilitySet`] is a value: building one never affects a process
//! that already holds another. Processes keep theirs behind an `Arc`, so
//! changing a process's permissions means building a new set and swapping
//! the pointer before the next execution. An execution in flight keeps
//! the snapshot it started with.

use crate::AccessDenied;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Namespace that matches every other namespace.
pub const ALL_NAMESPACES: &str = "all";

bitflags! {
    /// Boolean permissions of a capability set.
    ///
    /// | Flag | Grants |
    /// |------|--------|
    /// | [`EXECUTE`](Self::EXECUTE) | running any script |
    /// | [`KERNEL`](Self::KERNEL) | the `kernel` binding and `kernel_table` reabsorption |
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct CapabilityFlags: u8 {
        /// May execute scripts.
        const EXECUTE = 0b0000_0001;
        /// May access the privileged kernel namespace.
        const KERNEL  = 0b0000_0010;
    }
}

/// Permission record consulted when a process executes a script.
///
/// A fresh set grants nothing: execute is off, kernel access is off and
/// no namespaces are bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    flags: CapabilityFlags,
    namespaces: BTreeSet<String>,
}

impl Default for CapabilitySet {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilitySet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            flags: CapabilityFlags::empty(),
            namespaces: BTreeSet::new(),
        }
    }

    /// Everything: execute, kernel access and the `all` namespace.
    #[must_use]
    pub fn root() -> Self {
        Self::new()
            .with_execute(true)
            .with_kernel_access(true)
            .with_namespace(ALL_NAMESPACES)
    }

    /// What a newly created process gets: execute plus `std`.
    #[must_use]
    pub fn process_default() -> Self {
        Self::new().with_execute(true).with_namespace("std")
    }

    /// What an unprivileged user account gets: nothing.
    #[must_use]
    pub fn user_default() -> Self {
        Self::new()
    }

    /// Sets the execute flag.
    #[must_use]
    pub fn with_execute(mut self, allowed: bool) -> Self {
        self.flags.set(CapabilityFlags::EXECUTE, allowed);
        self
    }

    /// Sets the kernel-access flag.
    #[must_use]
    pub fn with_kernel_access(mut self, allowed: bool) -> Self {
        self.flags.set(CapabilityFlags::KERNEL, allowed);
        self
    }

    /// Adds one namespace.
    #[must_use]
    pub fn with_namespace(mut self, name: impl Into<String>) -> Self {
        self.namespaces.insert(name.into());
        self
    }

    /// Adds several namespaces.
    #[must_use]
    pub fn with_namespaces<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.namespaces.extend(names.into_iter().map(Into::into));
        self
    }

    /// Boolean flags.
    #[must_use]
    pub fn flags(&self) -> CapabilityFlags {
        self.flags
    }

    /// Whether scripts may run at all.
    #[must_use]
    pub fn can_execute(&self) -> bool {
        self.flags.contains(CapabilityFlags::EXECUTE)
    }

    /// Whether the kernel namespace is reachable.
    #[must_use]
    pub fn has_kernel_access(&self) -> bool {
        self.flags.contains(CapabilityFlags::KERNEL)
    }

    /// Exact membership, or the `all` wildcard.
    #[must_use]
    pub fn allows_namespace(&self, name: &str) -> bool {
        self.namespaces.contains(ALL_NAMESPACES) || self.namespaces.contains(name)
    }

    /// Bound namespaces in sorted order.
    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.namespaces.iter().map(String::as_str)
    }

    /// Checks that `operation` in `namespace` may be called.
    ///
    /// # Errors
    ///
    /// Returns [`AccessDenied::Namespace`] if the namespace is not allowed.
    pub fn check_namespace(&self, namespace: &str, operation: &str) -> Result<(), AccessDenied> {
        if self.allows_namespace(namespace) {
            Ok(())
        } else {
            Err(AccessDenied::Namespace {
                namespace: namespace.to_string(),
                operation: operation.to_string(),
            })
        }
    }

    /// Checks the execute flag.
    ///
    /// # Errors
    ///
    /// Returns [`AccessDenied::Execute`] if execution is not permitted.
    pub fn check_execute(&self) -> Result<(), AccessDenied> {
        if self.can_execute() {
            Ok(())
        } else {
            Err(AccessDenied::Execute)
        }
    }

    /// Returns the first namespace in `required` that this set does not allow.
    #[must_use]
    pub fn first_missing<'a, I>(&self, required: I) -> Option<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        required.into_iter().find(|ns| !self.allows_namespace(ns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_set_grants_nothing() {
        let caps = CapabilitySet::new();
        assert!(!caps.can_execute());
        assert!(!caps.has_kernel_access());
        assert!(!caps.allows_namespace("std"));
        assert_eq!(caps.namespaces().count(), 0);
    }

    #[test]
    fn presets() {
        let root = CapabilitySet::root();
        assert!(root.can_execute());
        assert!(root.has_kernel_access());
        assert!(root.allows_namespace("fs"));

        let proc_default = CapabilitySet::process_default();
        assert!(proc_default.can_execute());
        assert!(!proc_default.has_kernel_access());
        assert!(proc_default.allows_namespace("std"));
        assert!(!proc_default.allows_namespace("fs"));

        assert_eq!(CapabilitySet::user_default(), CapabilitySet::new());
    }

    #[test]
    fn flags_toggle_off() {
        let caps = CapabilitySet::root().with_execute(false);
        assert!(!caps.can_execute());
        assert!(caps.has_kernel_access());
        assert_eq!(caps.flags(), CapabilityFlags::KERNEL);
    }

    #[test]
    fn check_namespace_reports_operation() {
        let caps = CapabilitySet::process_default();
        assert!(caps.check_namespace("std", "print").is_ok());
        let err = caps
            .check_namespace("fs", "write")
            .expect_err("fs is not bound");
        assert_eq!(
            err,
            AccessDenied::Namespace {
                namespace: "fs".into(),
                operation: "write".into()
            }
        );
    }

    #[test]
    fn first_missing_finds_gap() {
        let caps = CapabilitySet::new().with_namespaces(["std", "fs"]);
        assert_eq!(caps.first_missing(["std", "fs"]), None);
        assert_eq!(caps.first_missing(["std", "term", "event"]), Some("term"));
    }

    #[test]
    fn serde_round_trip() {
        let caps = CapabilitySet::new()
            .with_execute(true)
            .with_namespaces(["std", "event"]);
        let json = serde_json::to_string(&caps).expect("serialize");
        let back: CapabilitySet = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, caps);
    }

    mod proptest_wildcard {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn all_allows_any_name(name in "[a-z_]{1,16}", extra in proptest::collection::vec("[a-z]{1,8}", 0..4)) {
                let caps = CapabilitySet::new().with_namespaces(extra).with_namespace(ALL_NAMESPACES);
                prop_assert!(caps.allows_namespace(&name));
            }

            #[test]
            fn without_all_only_members_pass(
                members in proptest::collection::btree_set("[a-z]{1,8}", 0..6),
                candidate in "[a-z]{1,8}",
            ) {
                prop_assume!(candidate != ALL_NAMESPACES);
                let caps = CapabilitySet::new()
                    .with_namespaces(members.iter().filter(|m| m.as_str() != ALL_NAMESPACES).cloned());
                let expected = members.contains(&candidate);
                prop_assert_eq!(caps.allows_namespace(&candidate), expected);
            }
        }
    }
}
