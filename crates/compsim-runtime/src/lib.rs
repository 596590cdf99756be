//! compsim runtime - machines, processes and everything they run on.
//!
//! # Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Foundation crates                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  compsim-types : MachineId, ProcessId, Designation          │
//! │  compsim-event : Event, EventCategory, default taxonomy     │
//! │  compsim-auth  : CapabilitySet, UserRegistry                │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Runtime Layer (THIS CRATE)                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  vfs/     : host-backed virtual filesystem                  │
//! │  bus/     : per-machine event bus                           │
//! │  script/  : ScriptEngine boundary, binding values           │
//! │  process/ : process lifecycle and host operations           │
//! │  persist/ : meta.dt checkpoint store                        │
//! │  io/      : streams, terminals, I/O bridge                  │
//! │  machine/ : Machine, MachineRegistry                        │
//! │  config/  : SimConfig, ConfigLoader                         │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │  compsim-lua : Lua ScriptEngine     compsim-cli : console   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The runtime never links an interpreter. Scripts run through a
//! [`ScriptEngine`](script::ScriptEngine) supplied by the embedder, and
//! terminals reach the user through an
//! [`IoSurface`](io::IoSurface) supplied the same way.
//!
//! # Test doubles
//!
//! With the `test-utils` feature the [`testing`] module exposes a
//! recording engine and in-memory terminal surfaces.

pub mod bus;
pub mod config;
pub mod io;
pub mod machine;
pub mod persist;
pub mod process;
pub mod sanitize;
pub mod script;
pub mod vfs;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-exports for convenience
pub use bus::EventBus;
pub use config::{
    default_config_dir, default_config_path, ConfigError, ConfigLoader, ConfigResolver,
    NoOpResolver, SimConfig,
};
pub use io::{IoBridge, IoQueue, IoSurface, MachineStream, SurfaceFactory};
pub use machine::{Machine, MachineEnv, MachineError, MachineHandle, MachineRegistry};
pub use persist::{MetaStore, Persistable, PersistError};
pub use process::{ProcessError, ProcessInfo, ProcessRuntime, ProcessStatus};
pub use sanitize::PathScrubber;
pub use script::{BindingTable, BindingValue, Script, ScriptEngine, ScriptFailure, ScriptOutcome};
pub use vfs::{SharedVfs, Vfs, VfsError, VfsPath};
