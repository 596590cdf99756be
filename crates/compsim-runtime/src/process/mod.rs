//! Process lifecycle and script execution.
//!
//! A process is a named, permissioned handle on a script file. The
//! [`ProcessRuntime`] owns a machine's process table and runs scripts
//! through the machine's [`ScriptEngine`](crate::script::ScriptEngine).
//!
//! # Status
//!
//! | Status | Meaning |
//! |--------|---------|
//! | `waiting` | created and never started, or blocked in `std.read_line` |
//! | `active` | executing |
//! | `ready` | finished a run; may be started again |
//! | `interrupted` | killed; every later execution is refused |
//!
//! # Concurrency
//!
//! Executions run synchronously on the calling thread (the machine's own
//! thread, or a worker from [`ProcessRuntime::spawn`]). One process never
//! runs twice at once. Filesystem access goes through the machine's
//! `RwLock`, so mutations are single-writer.

mod error;
mod ops;
mod runtime;
mod status;

pub use error::ProcessError;
pub use runtime::{ProcessInfo, ProcessRuntime, RuntimeContext};
pub use status::{ProcessStatus, UnknownStatus};
