//! Shared settings every machine is built from.

use crate::config::{SimConfig, DEFAULT_BOOT_SCRIPT};
use crate::io::{IoQueue, MachineStream};
use crate::script::ScriptEngine;
use std::path::PathBuf;
use std::sync::Arc;

/// Construction environment for [`Machine`](super::Machine)s.
#[derive(Clone)]
pub struct MachineEnv {
    /// Directory holding `machines/<designation>/`.
    pub storage_root: PathBuf,
    /// Copied into a machine's filesystem on first creation.
    pub template: Option<PathBuf>,
    /// Script executed at construction.
    pub boot_script: String,
    /// Engine every script runs on.
    pub engine: Arc<dyn ScriptEngine>,
    /// Queue to the I/O bridge.
    pub io: IoQueue,
    /// Stream new processes are bound to. `None` logs output.
    pub default_stream: Option<Arc<dyn MachineStream>>,
}

impl std::fmt::Debug for MachineEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MachineEnv")
            .field("storage_root", &self.storage_root)
            .field("template", &self.template)
            .field("boot_script", &self.boot_script)
            .field("engine", &self.engine.name())
            .finish_non_exhaustive()
    }
}

impl MachineEnv {
    /// Environment with the default boot script and no I/O bridge.
    #[must_use]
    pub fn new(storage_root: impl Into<PathBuf>, engine: Arc<dyn ScriptEngine>) -> Self {
        Self {
            storage_root: storage_root.into(),
            template: None,
            boot_script: DEFAULT_BOOT_SCRIPT.to_string(),
            engine,
            io: IoQueue::detached(),
            default_stream: None,
        }
    }

    /// Environment from a loaded config.
    #[must_use]
    pub fn from_config(config: &SimConfig, engine: Arc<dyn ScriptEngine>, io: IoQueue) -> Self {
        Self {
            storage_root: config.storage.root.clone(),
            template: config.storage.template.clone(),
            boot_script: config.boot.script.clone(),
            engine,
            io,
            default_stream: None,
        }
    }

    /// Sets the filesystem template.
    #[must_use]
    pub fn with_template(mut self, template: impl Into<PathBuf>) -> Self {
        self.template = Some(template.into());
        self
    }

    /// Sets the boot script path.
    #[must_use]
    pub fn with_boot_script(mut self, path: impl Into<String>) -> Self {
        self.boot_script = path.into();
        self
    }

    /// Connects machines to an I/O bridge.
    #[must_use]
    pub fn with_io(mut self, io: IoQueue) -> Self {
        self.io = io;
        self
    }

    /// Binds new processes to `stream`.
    #[must_use]
    pub fn with_default_stream(mut self, stream: Arc<dyn MachineStream>) -> Self {
        self.default_stream = Some(stream);
        self
    }
}
