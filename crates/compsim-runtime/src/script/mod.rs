//! The script-engine boundary.
//!
//! The runtime never interprets scripts itself. It hands a [`Script`] and
//! a [`BindingTable`] to a [`ScriptEngine`] and gets back either a
//! [`ScriptOutcome`] or a [`ScriptFailure`].
//!
//! ```text
//! ProcessRuntime::execute
//!     │  Script { path, source }
//!     │  BindingTable { values, operations }
//!     ▼
//! ScriptEngine::execute ──► Ok(ScriptOutcome)   reabsorbed into process/machine
//!                       └─► Err(ScriptFailure)  scrubbed, written to the stream
//! ```
//!
//! Host operations in the binding table check the process's capability
//! set every time they are called, so an engine can expose all of them
//! and still never run one the process is not allowed to use.

mod binding;
mod engine;
mod manifest;
mod value;

pub use binding::{BindingTable, HostFn, HostOperation};
pub use engine::{
    Script, ScriptEngine, ScriptFailure, ScriptOutcome, GLOBALS_KEY, KERNEL_TABLE_KEY,
    PROCESS_TABLE_KEY,
};
pub use manifest::required_namespaces;
pub use value::{BindingValue, Table};
