//! Simulator configuration.
//!
//! # Layers
//!
//! ```text
//! Priority (highest to lowest):
//!
//! ┌───────────────────────────────────────────┐
//! │  1. CLI flags (ConfigResolver)            │
//! ├───────────────────────────────────────────┤
//! │  2. Environment variables (COMPSIM_*)     │
//! ├───────────────────────────────────────────┤
//! │  3. Explicit file (--config)              │
//! ├───────────────────────────────────────────┤
//! │  4. Global file (~/.compsim/config.toml)  │
//! ├───────────────────────────────────────────┤
//! │  5. Defaults                              │
//! └───────────────────────────────────────────┘
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Field | Type |
//! |----------|-------|------|
//! | `COMPSIM_DEBUG` | `debug` | bool |
//! | `COMPSIM_ROOT` | `storage.root` | path |
//! | `COMPSIM_TICK_MS` | `scheduler.tick_ms` | u64 |
//! | `COMPSIM_BOOT_SCRIPT` | `boot.script` | string |
//!
//! # Example
//!
//! ```toml
//! debug = false
//!
//! [storage]
//! root = "/var/lib/compsim"
//! template = "/usr/share/compsim/fs"
//!
//! [boot]
//! script = "/boot/boot.lua"
//! machines = ["main"]
//!
//! [scheduler]
//! tick_ms = 50
//!
//! [script]
//! instruction_limit = 10000000
//!
//! [terminal]
//! prefix = "> "
//! ```

mod error;
mod loader;
mod resolver;
mod types;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use resolver::{ConfigResolver, NoOpResolver};
pub use types::{
    BootConfig, SchedulerConfig, ScriptConfig, SimConfig, StorageConfig, TerminalConfig,
    DEFAULT_BOOT_SCRIPT,
};

/// Global compsim directory (`~/.compsim`).
#[must_use]
pub fn default_config_dir() -> std::path::PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".compsim")
}

/// Global config file (`~/.compsim/config.toml`).
#[must_use]
pub fn default_config_path() -> std::path::PathBuf {
    default_config_dir().join("config.toml")
}
