//! Machines and the registry that runs them.
//!
//! A [`Machine`] bundles one simulated computer:
//!
//! | Part | Type |
//! |------|------|
//! | Filesystem | [`SharedVfs`](crate::vfs::SharedVfs) |
//! | Event bus | [`EventBus`](crate::bus::EventBus) |
//! | Processes | [`ProcessRuntime`](crate::process::ProcessRuntime) |
//! | Terminals | [`Terminals`](crate::io::Terminals) |
//! | Accounts | [`UserRegistry`](compsim_auth::UserRegistry) |
//! | Checkpoint | [`MetaStore`](crate::persist::MetaStore) |
//!
//! The [`MachineRegistry`] gives each machine its own thread and talks to
//! it through [`MachineHandle`]s.

mod env;
mod error;
#[allow(clippy::module_inception)]
mod machine;
mod registry;

pub use env::MachineEnv;
pub use error::MachineError;
pub use machine::{Machine, BOOT_PROCESS, FS_DIR, MACHINES_DIR};
pub use registry::{MachineCommand, MachineHandle, MachineRegistry};
