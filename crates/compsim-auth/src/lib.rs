//! Permission model for compsim processes.
//!
//! Permissions attach to the *process*, not the script file: the same
//! script runs with different privileges depending on who launched it.
//!
//! # Layers
//!
//! ```text
//! CapabilitySet            (what a process may do)
//! ├── EXECUTE flag         may the process run scripts at all
//! ├── KERNEL flag          may it see / reabsorb the kernel table
//! └── namespaces           which host-operation libraries it may bind
//!                          ("std", "fs", ... or the wildcard "all")
//!
//! UserRegistry             (who is acting)
//! └── User                 username, credential, CapabilitySet, groups
//! ```
//!
//! # Example
//!
//! ```
//! use compsim_auth::CapabilitySet;
//!
//! let caps = CapabilitySet::new().with_execute(true).with_namespace("std");
//! assert!(caps.can_execute());
//! assert!(caps.allows_namespace("std"));
//! assert!(!caps.allows_namespace("fs"));
//!
//! assert!(CapabilitySet::root().allows_namespace("anything"));
//! ```

mod capability;
mod error;
mod user;

pub use capability::{CapabilityFlags, CapabilitySet, ALL_NAMESPACES};
pub use error::{AccessDenied, RegistryError};
pub use user::{User, UserGroup, UserRegistry, ROOT_USER, TEST_USER, USER_REGISTRY_DESIGNATION};
