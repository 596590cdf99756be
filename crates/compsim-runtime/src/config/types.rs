//! Configuration types.

use crate::io::DEFAULT_PREFIX;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default boot script path inside a machine.
pub const DEFAULT_BOOT_SCRIPT: &str = "/boot/boot.lua";

/// Merged configuration.
///
/// # Example
///
/// ```
/// use compsim_runtime::config::SimConfig;
///
/// let config = SimConfig::default();
/// assert_eq!(config.boot.script, "/boot/boot.lua");
/// assert_eq!(config.scheduler.tick_ms, 50);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimConfig {
    /// Verbose diagnostics.
    pub debug: bool,
    /// Host storage.
    pub storage: StorageConfig,
    /// Boot behavior.
    pub boot: BootConfig,
    /// Registry tick loop.
    pub scheduler: SchedulerConfig,
    /// Script engine limits.
    pub script: ScriptConfig,
    /// Terminal surfaces.
    pub terminal: TerminalConfig,
}

impl SimConfig {
    /// Serializes to TOML.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Parses TOML.
    ///
    /// # Errors
    ///
    /// Returns error if the text is not a valid config.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Merges `other` over `self`. Fields equal to the default are
    /// treated as unset.
    pub fn merge(&mut self, other: &Self) {
        if other.debug {
            self.debug = true;
        }
        self.storage.merge(&other.storage);
        self.boot.merge(&other.boot);
        self.scheduler.merge(&other.scheduler);
        self.script.merge(&other.script);
        self.terminal.merge(&other.terminal);
    }
}

/// Host storage locations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding `machines/<designation>/`.
    pub root: PathBuf,
    /// Directory copied into a machine's filesystem on first creation.
    pub template: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: super::default_config_dir(),
            template: None,
        }
    }
}

impl StorageConfig {
    fn merge(&mut self, other: &Self) {
        let default = Self::default();
        if other.root != default.root {
            self.root.clone_from(&other.root);
        }
        if other.template.is_some() {
            self.template.clone_from(&other.template);
        }
    }
}

/// Boot behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BootConfig {
    /// Script each machine executes at construction.
    pub script: String,
    /// Machines created at startup.
    pub machines: Vec<String>,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            script: DEFAULT_BOOT_SCRIPT.to_string(),
            machines: Vec::new(),
        }
    }
}

impl BootConfig {
    fn merge(&mut self, other: &Self) {
        if other.script != DEFAULT_BOOT_SCRIPT {
            self.script.clone_from(&other.script);
        }
        if !other.machines.is_empty() {
            self.machines.clone_from(&other.machines);
        }
    }
}

/// Registry tick loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Interval between ticks in milliseconds.
    pub tick_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { tick_ms: 50 }
    }
}

impl SchedulerConfig {
    fn merge(&mut self, other: &Self) {
        if other.tick_ms != Self::default().tick_ms {
            self.tick_ms = other.tick_ms;
        }
    }
}

/// Script engine limits.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScriptConfig {
    /// Instructions one execution may run; 0 means unlimited.
    pub instruction_limit: u64,
}

impl ScriptConfig {
    fn merge(&mut self, other: &Self) {
        if other.instruction_limit != 0 {
            self.instruction_limit = other.instruction_limit;
        }
    }
}

/// Terminal surfaces.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TerminalConfig {
    /// Prompt prefix for surfaces that do not request their own.
    pub prefix: String,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }
}

impl TerminalConfig {
    fn merge(&mut self, other: &Self) {
        if other.prefix != DEFAULT_PREFIX {
            self.prefix.clone_from(&other.prefix);
        }
    }
}
