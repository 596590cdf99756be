//! One simulated computer.

use super::{MachineEnv, MachineError};
use crate::bus::EventBus;
use crate::io::{LogStream, MachineStream, Terminals};
use crate::persist::{
    MetaStore, Restore, StringEntry, TimestampEntry, LAST_SAVED, MACHINE_DESIG, META_FILE_NAME,
};
use crate::process::{ProcessError, ProcessRuntime, RuntimeContext};
use crate::sanitize::PathScrubber;
use crate::script::BindingValue;
use crate::vfs::{SharedVfs, Vfs};
use compsim_auth::{CapabilitySet, UserRegistry};
use compsim_types::{Designation, MachineId, ProcessId, TerminalId};
use parking_lot::RwLock;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Host directory (under the storage root) holding every machine.
pub const MACHINES_DIR: &str = "machines";

/// Host directory (under a machine's directory) backing its filesystem.
pub const FS_DIR: &str = "fs";

/// Name of the process that runs the boot script.
pub const BOOT_PROCESS: &str = "boot";

/// A machine: filesystem, event bus, processes, users and metadata.
///
/// # Storage
///
/// ```text
/// <storage root>/machines/<id>_<name>/
/// ├── meta.dt        metadata checkpoint
/// └── fs/            backing for the virtual filesystem
/// ```
///
/// # Boot
///
/// Construction runs the boot script in a root-capability, continuous
/// process. A missing or failing boot script is logged; the machine is
/// returned anyway and stays usable.
pub struct Machine {
    designation: Designation,
    dir: PathBuf,
    vfs: SharedVfs,
    bus: Arc<EventBus>,
    terminals: Arc<Terminals>,
    runtime: ProcessRuntime,
    users: UserRegistry,
    meta: MetaStore,
    boot_pid: ProcessId,
}

impl std::fmt::Debug for Machine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("designation", &self.designation)
            .field("processes", &self.runtime.len())
            .finish_non_exhaustive()
    }
}

impl Machine {
    /// Builds and boots a machine.
    ///
    /// # Arguments
    ///
    /// * `id` - Registry-assigned id
    /// * `name` - Name part of the designation
    /// * `env` - Shared construction settings
    ///
    /// # Errors
    ///
    /// Returns [`MachineError`] if the name is invalid or storage,
    /// filesystem or metadata cannot be set up. Boot script problems are
    /// not errors.
    pub fn new(id: MachineId, name: &str, env: &MachineEnv) -> Result<Self, MachineError> {
        let designation = Designation::new(id, name)?;
        let dir = env
            .storage_root
            .join(MACHINES_DIR)
            .join(designation.as_str());
        let fs_root = dir.join(FS_DIR);
        populate(&fs_root, env.template.as_deref())?;

        let vfs: SharedVfs = Arc::new(RwLock::new(Vfs::open(&fs_root)?));
        let bus = Arc::new(EventBus::with_default_taxonomy(designation.clone()));
        let terminals = Arc::new(Terminals::new(
            designation.clone(),
            env.io.clone(),
            Arc::clone(&bus),
        ));

        let mut users = UserRegistry::with_defaults();
        let mut meta = MetaStore::new(dir.join(META_FILE_NAME));
        let first_boot = !meta.load()?;

        let default_stream: Arc<dyn MachineStream> = match &env.default_stream {
            Some(stream) => Arc::clone(stream),
            None => Arc::new(LogStream::new(designation.clone())),
        };
        let scrubber = PathScrubber::new()
            .with_root(&fs_root, "")
            .with_root(&dir, "<machine>")
            .with_root(&env.storage_root, "<storage>");
        let runtime = ProcessRuntime::new(RuntimeContext {
            machine: designation.clone(),
            vfs: Arc::clone(&vfs),
            bus: Arc::clone(&bus),
            terminals: Arc::clone(&terminals),
            engine: Arc::clone(&env.engine),
            default_stream,
            scrubber,
        });

        if first_boot {
            debug!(machine = %designation, "first boot, writing metadata");
        } else {
            let mut stored = StringEntry::new(MACHINE_DESIG, "");
            if meta.restore(&mut stored) == Restore::Applied && stored.value() != designation.as_str() {
                warn!(
                    machine = %designation,
                    stored = stored.value(),
                    "metadata belongs to another designation"
                );
            }
            if meta.restore(&mut users) != Restore::Applied {
                debug!(machine = %designation, "user registry not restored, using defaults");
            }
        }

        let boot_pid = runtime.create(BOOT_PROCESS, &env.boot_script, CapabilitySet::root())?;
        runtime.set_continuous(boot_pid, true)?;

        let mut machine = Self {
            designation,
            dir,
            vfs,
            bus,
            terminals,
            runtime,
            users,
            meta,
            boot_pid,
        };
        if first_boot {
            machine.save()?;
        }
        machine.boot(&env.boot_script);
        info!(machine = %machine.designation, "machine created");
        Ok(machine)
    }

    fn boot(&self, script: &str) {
        match self.runtime.start(self.boot_pid) {
            Ok(_) => debug!(machine = %self.designation, script, "boot script completed"),
            Err(ProcessError::FileNotFound(path)) => {
                error!(machine = %self.designation, path = %path, "boot script not found");
            }
            Err(e) => error!(machine = %self.designation, error = %e, "boot script failed"),
        }
    }

    /// Designation.
    #[must_use]
    pub fn designation(&self) -> &Designation {
        &self.designation
    }

    /// Numeric id.
    #[must_use]
    pub fn id(&self) -> MachineId {
        self.designation.id()
    }

    /// Filesystem.
    #[must_use]
    pub fn vfs(&self) -> &SharedVfs {
        &self.vfs
    }

    /// Event bus.
    #[must_use]
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Process runtime.
    #[must_use]
    pub fn runtime(&self) -> &ProcessRuntime {
        &self.runtime
    }

    /// Open terminals.
    #[must_use]
    pub fn terminals(&self) -> &Arc<Terminals> {
        &self.terminals
    }

    /// User registry.
    #[must_use]
    pub fn users(&self) -> &UserRegistry {
        &self.users
    }

    /// Mutable user registry. Changes are persisted on the next save.
    pub fn users_mut(&mut self) -> &mut UserRegistry {
        &mut self.users
    }

    /// Id of the boot process, the machine's default process context.
    #[must_use]
    pub fn boot_pid(&self) -> ProcessId {
        self.boot_pid
    }

    /// Host directory of this machine.
    #[must_use]
    pub fn storage_dir(&self) -> &Path {
        &self.dir
    }

    /// Executes a script in the default process context.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError::Process`] with the execution error.
    pub fn execute_script(&self, path: &str) -> Result<BindingValue, MachineError> {
        Ok(self.runtime.execute(self.boot_pid, path)?)
    }

    /// Creates a process and runs it on the machine thread.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError::Process`] if creation or execution fails.
    /// A process that failed to run still exists until reaped.
    pub fn start_process(
        &self,
        name: &str,
        path: &str,
        capabilities: CapabilitySet,
    ) -> Result<ProcessId, MachineError> {
        let pid = self.runtime.create(name, path, capabilities)?;
        self.runtime.start(pid)?;
        Ok(pid)
    }

    /// Creates a process and runs it on its own worker thread.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError::Process`] if creation or spawning fails.
    pub fn spawn_process(
        &self,
        name: &str,
        path: &str,
        capabilities: CapabilitySet,
    ) -> Result<ProcessId, MachineError> {
        let pid = self.runtime.create(name, path, capabilities)?;
        self.runtime.spawn(pid)?;
        Ok(pid)
    }

    /// Triggers an event on the machine bus.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError::Event`] for unregistered events.
    pub fn trigger(&self, name: &str, params: Vec<String>) -> Result<usize, MachineError> {
        Ok(self.bus.trigger(name, params)?)
    }

    /// Opens a terminal.
    #[must_use]
    pub fn open_terminal(&self, prefix: Option<&str>) -> TerminalId {
        self.terminals.open(prefix).id()
    }

    /// One scheduler step: reclaims finished processes.
    pub fn tick(&self) -> Vec<ProcessId> {
        self.runtime.reap()
    }

    /// Writes the metadata checkpoint.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError::Persist`] if encoding or writing fails.
    pub fn save(&mut self) -> Result<(), MachineError> {
        self.meta
            .add(&StringEntry::new(MACHINE_DESIG, self.designation.as_str()))?;
        self.meta.add(&self.users)?;
        self.meta.add(&TimestampEntry::now(LAST_SAVED))?;
        self.meta.save()?;
        debug!(machine = %self.designation, "metadata saved");
        Ok(())
    }

    /// Closes terminals, interrupts every process and saves.
    ///
    /// Scripts already inside the engine finish on their own.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError::Persist`] if the final save fails.
    pub fn shutdown(&mut self) -> Result<(), MachineError> {
        self.terminals.close_all();
        for info in self.runtime.list() {
            let _ = self.runtime.kill(info.id);
        }
        self.runtime.reap();
        self.save()?;
        info!(machine = %self.designation, "machine shut down");
        Ok(())
    }
}

/// Creates the machine's filesystem directory, seeding it from `template`
/// the first time.
fn populate(fs_root: &Path, template: Option<&Path>) -> Result<(), MachineError> {
    let fresh = !fs_root.exists();
    fs::create_dir_all(fs_root).map_err(|e| MachineError::storage(fs_root, e))?;
    if let (true, Some(template)) = (fresh, template) {
        if template.is_dir() {
            copy_tree(template, fs_root).map_err(|e| MachineError::storage(fs_root, e))?;
            debug!(template = %template.display(), "filesystem seeded from template");
        } else {
            warn!(template = %template.display(), "template directory missing, starting empty");
        }
    }
    Ok(())
}

fn copy_tree(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let kind = entry.file_type()?;
        let target = dst.join(entry.file_name());
        if kind.is_dir() {
            fs::create_dir_all(&target)?;
            copy_tree(&entry.path(), &target)?;
        } else if kind.is_file() {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
