//! Process table and script execution.

use super::ops;
use super::status::{BeginError, StatusCell};
use super::{ProcessError, ProcessStatus};
use crate::bus::EventBus;
use crate::io::{MachineStream, Terminals};
use crate::sanitize::PathScrubber;
use crate::script::{
    required_namespaces, BindingTable, BindingValue, ScriptEngine, ScriptOutcome, Table,
    GLOBALS_KEY, KERNEL_TABLE_KEY, PROCESS_TABLE_KEY,
};
use crate::vfs::{SharedVfs, VfsError, VfsPath};
use compsim_auth::{AccessDenied, CapabilitySet};
use compsim_types::{Designation, ErrorCode, ProcessId};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

/// Everything a [`ProcessRuntime`] needs from its machine.
pub struct RuntimeContext {
    /// Owning machine.
    pub machine: Designation,
    /// The machine's filesystem.
    pub vfs: SharedVfs,
    /// The machine's event bus.
    pub bus: Arc<EventBus>,
    /// The machine's terminals.
    pub terminals: Arc<Terminals>,
    /// Engine every script runs on.
    pub engine: Arc<dyn ScriptEngine>,
    /// Stream new processes are bound to.
    pub default_stream: Arc<dyn MachineStream>,
    /// Applied to every message shown to a process stream.
    pub scrubber: PathScrubber,
}

pub(crate) struct ProcessState {
    pub(crate) name: String,
    pub(crate) parent: Option<ProcessId>,
    pub(crate) working_dir: VfsPath,
    pub(crate) root_file: VfsPath,
    pub(crate) current_file: VfsPath,
    pub(crate) capabilities: Arc<CapabilitySet>,
    pub(crate) process_table: Table,
    pub(crate) environment: Table,
    pub(crate) reset_bindings_when_complete: bool,
    pub(crate) pass_capabilities_to_fork: bool,
    pub(crate) continuous: bool,
    pub(crate) reset_pending: bool,
    pub(crate) stream: Arc<dyn MachineStream>,
    pub(crate) runs: u64,
}

pub(crate) struct ProcessEntry {
    pub(crate) id: ProcessId,
    pub(crate) status: StatusCell,
    pub(crate) state: Mutex<ProcessState>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ProcessEntry {
    /// Current output stream. Looked up per call so `term.attach` takes
    /// effect inside the running script.
    pub(crate) fn stream(&self) -> Arc<dyn MachineStream> {
        Arc::clone(&self.state.lock().stream)
    }

    fn worker_done(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .map_or(true, JoinHandle::is_finished)
    }

    fn reapable(&self) -> bool {
        if self.status.is_running() || !self.worker_done() {
            return false;
        }
        match self.status.get() {
            ProcessStatus::Interrupted => true,
            ProcessStatus::Ready => {
                let state = self.state.lock();
                !state.continuous && state.runs > 0
            }
            ProcessStatus::Active | ProcessStatus::Waiting => false,
        }
    }
}

/// Snapshot of one process.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessInfo {
    pub id: ProcessId,
    pub name: String,
    pub status: ProcessStatus,
    pub parent: Option<ProcessId>,
    pub root_file: VfsPath,
    pub current_file: VfsPath,
    pub working_dir: VfsPath,
    pub continuous: bool,
    pub runs: u64,
    pub capabilities: CapabilitySet,
}

impl ProcessInfo {
    fn capture(entry: &ProcessEntry, state: &ProcessState) -> Self {
        Self {
            id: entry.id,
            name: state.name.clone(),
            status: entry.status.get(),
            parent: state.parent,
            root_file: state.root_file.clone(),
            current_file: state.current_file.clone(),
            working_dir: state.working_dir.clone(),
            continuous: state.continuous,
            runs: state.runs,
            capabilities: (*state.capabilities).clone(),
        }
    }

    /// Script-side representation (`params.process`, `process.current()`).
    #[must_use]
    pub fn to_binding(&self) -> BindingValue {
        BindingValue::table([
            ("object_type", "process".into()),
            ("id", self.id.get().into()),
            ("name", self.name.as_str().into()),
            ("status", self.status.as_str().into()),
            ("parent", self.parent.map(ProcessId::get).into()),
            ("file", self.current_file.to_string().into()),
            ("root_file", self.root_file.to_string().into()),
            ("working_dir", self.working_dir.to_string().into()),
            ("continuous", self.continuous.into()),
            ("runs", i64::try_from(self.runs).unwrap_or(i64::MAX).into()),
        ])
    }
}

struct Shared {
    ctx: RuntimeContext,
    table: RwLock<BTreeMap<ProcessId, Arc<ProcessEntry>>>,
    next_pid: AtomicU32,
    machine_globals: Mutex<Table>,
    kernel_globals: Mutex<Table>,
}

/// Per-machine process table and executor.
///
/// Cheap to clone; clones share the same table.
///
/// # Execution
///
/// ```text
/// execute(pid, path)
///   ├─ interrupted?            → Err(Interrupted), nothing else happens
///   ├─ resolve + load script   → missing: "<path> file not found" on stream
///   ├─ execute flag, manifest  → Err(PermissionDenied), silent
///   ├─ Waiting/Ready → Active, build BindingTable
///   ├─ engine.execute(..)
///   │     ├─ Ok   → reabsorb globals / kernel_table / process_table
///   │     └─ Err  → scrubbed message on stream
///   └─ → Ready (unless killed meanwhile)
/// ```
///
/// # Cancellation
///
/// [`kill`](Self::kill) is immediate for the status but cooperative for
/// code: a script already inside the engine runs until it returns or
/// fails on its own. Only later executions are refused.
#[derive(Clone)]
pub struct ProcessRuntime {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for ProcessRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessRuntime")
            .field("machine", &self.shared.ctx.machine)
            .field("processes", &self.len())
            .finish_non_exhaustive()
    }
}

impl ProcessRuntime {
    /// Empty runtime.
    #[must_use]
    pub fn new(ctx: RuntimeContext) -> Self {
        Self {
            shared: Arc::new(Shared {
                ctx,
                table: RwLock::new(BTreeMap::new()),
                next_pid: AtomicU32::new(0),
                machine_globals: Mutex::new(Table::new()),
                kernel_globals: Mutex::new(Table::new()),
            }),
        }
    }

    /// Owning machine.
    #[must_use]
    pub fn machine(&self) -> &Designation {
        &self.shared.ctx.machine
    }

    pub(crate) fn ctx(&self) -> &RuntimeContext {
        &self.shared.ctx
    }

    /// Number of processes in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.table.read().len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Creates a process in `Waiting`.
    ///
    /// The working folder is the root file's parent. The file does not
    /// have to exist yet; a missing file is reported when executed.
    ///
    /// # Arguments
    ///
    /// * `name` - Display name
    /// * `root_file` - Absolute logical path of the script to run
    /// * `capabilities` - Permission set attached to the process
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::Vfs`] if `root_file` is not a valid path.
    pub fn create(
        &self,
        name: &str,
        root_file: &str,
        capabilities: CapabilitySet,
    ) -> Result<ProcessId, ProcessError> {
        let root_file = VfsPath::parse(root_file)?;
        let working_dir = root_file.parent().unwrap_or_else(VfsPath::root);
        let pid = self.insert(ProcessState {
            name: name.to_string(),
            parent: None,
            working_dir,
            current_file: root_file.clone(),
            root_file,
            capabilities: Arc::new(capabilities),
            process_table: Table::new(),
            environment: Table::new(),
            reset_bindings_when_complete: false,
            pass_capabilities_to_fork: false,
            continuous: false,
            reset_pending: false,
            stream: Arc::clone(&self.shared.ctx.default_stream),
            runs: 0,
        });
        debug!(machine = %self.machine(), pid = %pid, name, "process created");
        Ok(pid)
    }

    fn insert(&self, state: ProcessState) -> ProcessId {
        let id = ProcessId::new(self.shared.next_pid.fetch_add(1, Ordering::Relaxed));
        let entry = Arc::new(ProcessEntry {
            id,
            status: StatusCell::new(),
            state: Mutex::new(state),
            worker: Mutex::new(None),
        });
        self.shared.table.write().insert(id, entry);
        id
    }

    pub(crate) fn entry(&self, pid: ProcessId) -> Result<Arc<ProcessEntry>, ProcessError> {
        self.shared
            .table
            .read()
            .get(&pid)
            .cloned()
            .ok_or(ProcessError::NotFound(pid))
    }

    /// Runs the process's current file.
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub fn start(&self, pid: ProcessId) -> Result<BindingValue, ProcessError> {
        let file = self.entry(pid)?.state.lock().current_file.to_string();
        self.execute(pid, &file)
    }

    /// Executes the script at `path` in process `pid`.
    ///
    /// `path` is resolved against the process's working folder. Returns
    /// the script's raw return value.
    ///
    /// # Errors
    ///
    /// - [`ProcessError::Interrupted`] if the process was killed; nothing
    ///   is loaded or written
    /// - [`ProcessError::FileNotFound`] after reporting it on the stream
    /// - [`ProcessError::PermissionDenied`] if the execute flag is off or
    ///   a `--@requires` namespace is not allowed; nothing is written
    /// - [`ProcessError::Busy`] if the process is already executing
    /// - [`ProcessError::Script`] with the scrubbed failure message, after
    ///   writing it to the stream
    pub fn execute(&self, pid: ProcessId, path: &str) -> Result<BindingValue, ProcessError> {
        let entry = self.entry(pid)?;
        if entry.status.get() == ProcessStatus::Interrupted {
            debug!(machine = %self.machine(), pid = %pid, "refusing to execute interrupted process");
            return Err(ProcessError::Interrupted(pid));
        }
        let (target, capabilities) = {
            let state = entry.state.lock();
            (state.working_dir.resolve(path), Arc::clone(&state.capabilities))
        };

        let loaded = target.and_then(|t| {
            let script = self.shared.ctx.vfs.read().load_script(&t);
            script.map_err(|e| match e {
                VfsError::NotFound(_) | VfsError::NotAFile(_) => VfsError::NotFound(t.to_string()),
                other => other,
            })
        });
        let script = match loaded {
            Ok(script) => script,
            Err(e) => {
                let err = match e {
                    VfsError::NotFound(missing) => ProcessError::FileNotFound(missing),
                    other => ProcessError::Vfs(other),
                };
                let msg = self.scrub(&err.to_string());
                entry.stream().write_line(&msg);
                warn!(machine = %self.machine(), pid = %pid, "{msg}");
                return Err(err);
            }
        };

        capabilities.check_execute()?;
        let required = required_namespaces(script.source());
        if let Some(missing) = capabilities.first_missing(required.iter().map(String::as_str)) {
            debug!(
                machine = %self.machine(),
                pid = %pid,
                namespace = missing,
                "script requires a namespace the process lacks"
            );
            return Err(AccessDenied::Namespace {
                namespace: missing.to_string(),
                operation: script.path().to_string(),
            }
            .into());
        }

        match entry.status.begin() {
            Ok(()) => {}
            Err(BeginError::Busy) => return Err(ProcessError::Busy(pid)),
            Err(BeginError::Interrupted) => return Err(ProcessError::Interrupted(pid)),
        }

        let bindings = {
            let mut state = entry.state.lock();
            state.current_file = script.path().clone();
            state.runs += 1;
            self.build_bindings(&entry, &state)
        };
        debug!(
            machine = %self.machine(),
            pid = %pid,
            path = %script.path(),
            engine = self.shared.ctx.engine.name(),
            "executing"
        );

        let result = match self.shared.ctx.engine.execute(&script, bindings) {
            Ok(outcome) => {
                let returned = outcome.returned.clone();
                self.settle(&entry, Some(outcome), &capabilities);
                Ok(returned)
            }
            Err(failure) => {
                let msg = self.scrub(&failure.to_string());
                entry.stream().write_line(&msg);
                warn!(
                    machine = %self.machine(),
                    pid = %pid,
                    code = failure.code(),
                    "script failed: {msg}"
                );
                self.settle(&entry, None, &capabilities);
                Err(ProcessError::Script(msg))
            }
        };
        entry.status.finish();
        result
    }

    fn build_bindings(&self, entry: &Arc<ProcessEntry>, state: &ProcessState) -> BindingTable {
        let mut bindings = BindingTable::new();
        for (name, value) in &state.environment {
            bindings.set(name.clone(), value.clone());
        }

        let stream = state.stream.info();
        let terminal = stream.terminal.map_or(-1, |t| i64::from(t.get()));
        let params = BindingValue::table([
            ("machine", self.machine().to_string().into()),
            (
                "stream",
                BindingValue::table([("kind", stream.kind.into()), ("terminal", terminal.into())]),
            ),
            (
                "terminal",
                BindingValue::table([("object_type", "terminal".into()), ("id", terminal.into())]),
            ),
            ("process", ProcessInfo::capture(entry, state).to_binding()),
        ]);
        bindings.set("params", params);
        bindings.set(PROCESS_TABLE_KEY, state.process_table.clone());
        bindings.set(GLOBALS_KEY, self.shared.machine_globals.lock().clone());
        if state.capabilities.has_kernel_access() {
            bindings.set(KERNEL_TABLE_KEY, self.shared.kernel_globals.lock().clone());
        }
        ops::install(self, entry, &state.capabilities, &mut bindings);
        bindings
    }

    /// Reabsorbs a finished execution into machine and process state.
    fn settle(
        &self,
        entry: &ProcessEntry,
        outcome: Option<ScriptOutcome>,
        capabilities: &CapabilitySet,
    ) {
        let mut environment = None;
        let mut process_table = None;
        if let Some(outcome) = outcome {
            if let Some(globals) = outcome.globals {
                *self.shared.machine_globals.lock() = globals;
            }
            if let Some(kernel) = outcome.kernel_table {
                if capabilities.has_kernel_access() {
                    *self.shared.kernel_globals.lock() = kernel;
                } else {
                    warn!(
                        machine = %self.machine(),
                        pid = %entry.id,
                        "kernel_table returned without kernel access, ignored"
                    );
                }
            }
            process_table = outcome.process_table;
            environment = Some(outcome.environment);
        }

        let mut state = entry.state.lock();
        if let Some(table) = process_table {
            state.process_table = table;
        }
        let reset = state.reset_bindings_when_complete || std::mem::take(&mut state.reset_pending);
        if reset {
            state.environment.clear();
        } else if let Some(environment) = environment {
            state.environment = environment;
        }
    }

    /// Creates a child process from `pid`'s configuration.
    ///
    /// The child shares the parent's capability set when the parent has
    /// `pass_capabilities_to_fork`, otherwise it gets
    /// [`CapabilitySet::process_default`]. No running state is inherited.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::NotFound`] for an unknown parent.
    pub fn fork(&self, pid: ProcessId) -> Result<ProcessId, ProcessError> {
        let parent = self.entry(pid)?;
        let child = {
            let state = parent.state.lock();
            let capabilities = if state.pass_capabilities_to_fork {
                Arc::clone(&state.capabilities)
            } else {
                Arc::new(CapabilitySet::process_default())
            };
            ProcessState {
                name: state.name.clone(),
                parent: Some(pid),
                working_dir: state.working_dir.clone(),
                root_file: state.root_file.clone(),
                current_file: state.current_file.clone(),
                capabilities,
                process_table: Table::new(),
                environment: Table::new(),
                reset_bindings_when_complete: state.reset_bindings_when_complete,
                pass_capabilities_to_fork: state.pass_capabilities_to_fork,
                continuous: state.continuous,
                reset_pending: false,
                stream: Arc::clone(&state.stream),
                runs: 0,
            }
        };
        let child_id = self.insert(child);
        debug!(machine = %self.machine(), parent = %pid, pid = %child_id, "process forked");
        Ok(child_id)
    }

    /// Interrupts a process. Irreversible.
    ///
    /// Returns the status it had before.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::NotFound`] for an unknown id.
    pub fn kill(&self, pid: ProcessId) -> Result<ProcessStatus, ProcessError> {
        let previous = self.entry(pid)?.status.kill();
        info!(machine = %self.machine(), pid = %pid, previous = %previous, "process killed");
        Ok(previous)
    }

    /// Current status.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::NotFound`] for an unknown id.
    pub fn status(&self, pid: ProcessId) -> Result<ProcessStatus, ProcessError> {
        Ok(self.entry(pid)?.status.get())
    }

    /// Snapshot of one process.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::NotFound`] for an unknown id.
    pub fn info(&self, pid: ProcessId) -> Result<ProcessInfo, ProcessError> {
        let entry = self.entry(pid)?;
        let state = entry.state.lock();
        Ok(ProcessInfo::capture(&entry, &state))
    }

    /// Snapshots of all processes, by id.
    #[must_use]
    pub fn list(&self) -> Vec<ProcessInfo> {
        let table = self.shared.table.read();
        table
            .values()
            .map(|entry| ProcessInfo::capture(entry, &entry.state.lock()))
            .collect()
    }

    /// Replaces the capability set. A running execution keeps the set it
    /// started with.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::NotFound`] for an unknown id.
    pub fn set_capabilities(
        &self,
        pid: ProcessId,
        capabilities: CapabilitySet,
    ) -> Result<(), ProcessError> {
        self.entry(pid)?.state.lock().capabilities = Arc::new(capabilities);
        Ok(())
    }

    /// Rebinds the process's I/O stream.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::NotFound`] for an unknown id.
    pub fn set_stream(
        &self,
        pid: ProcessId,
        stream: Arc<dyn MachineStream>,
    ) -> Result<(), ProcessError> {
        self.entry(pid)?.state.lock().stream = stream;
        Ok(())
    }

    /// Points [`start`](Self::start) at another file.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::NotFound`] for an unknown id, or
    /// [`ProcessError::Vfs`] if the file does not exist.
    pub fn set_file(&self, pid: ProcessId, path: &str) -> Result<(), ProcessError> {
        let entry = self.entry(pid)?;
        let target = entry.state.lock().working_dir.resolve(path)?;
        self.shared.ctx.vfs.read().file(&target)?;
        entry.state.lock().current_file = target;
        Ok(())
    }

    /// Clears carried script globals after every execution when set.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::NotFound`] for an unknown id.
    pub fn set_reset_bindings_when_complete(
        &self,
        pid: ProcessId,
        reset: bool,
    ) -> Result<(), ProcessError> {
        self.entry(pid)?.state.lock().reset_bindings_when_complete = reset;
        Ok(())
    }

    /// Whether forks share this process's capability set.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::NotFound`] for an unknown id.
    pub fn set_pass_capabilities_to_fork(
        &self,
        pid: ProcessId,
        pass: bool,
    ) -> Result<(), ProcessError> {
        self.entry(pid)?.state.lock().pass_capabilities_to_fork = pass;
        Ok(())
    }

    /// Keeps a completed process in the table across [`reap`](Self::reap).
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::NotFound`] for an unknown id.
    pub fn set_continuous(&self, pid: ProcessId, continuous: bool) -> Result<(), ProcessError> {
        self.entry(pid)?.state.lock().continuous = continuous;
        Ok(())
    }

    /// Drops carried script globals now, and again when a running
    /// execution completes.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::NotFound`] for an unknown id.
    pub fn reset_bindings(&self, pid: ProcessId) -> Result<(), ProcessError> {
        let entry = self.entry(pid)?;
        let running = entry.status.is_running();
        let mut state = entry.state.lock();
        state.environment.clear();
        state.reset_pending = running;
        Ok(())
    }

    /// Starts the process on its own worker thread.
    ///
    /// The worker may block on input without holding up the machine. The
    /// handle is stored before [`reap`](Self::reap) can look at the entry,
    /// so a fresh worker always keeps its process in the table.
    ///
    /// # Errors
    ///
    /// - [`ProcessError::NotFound`] for an unknown id
    /// - [`ProcessError::Busy`] while a previous worker is still running
    /// - [`ProcessError::Spawn`] if the thread cannot be created
    pub fn spawn(&self, pid: ProcessId) -> Result<(), ProcessError> {
        let entry = self.entry(pid)?;
        let mut slot = entry.worker.lock();
        if let Some(previous) = slot.take() {
            if !previous.is_finished() {
                *slot = Some(previous);
                return Err(ProcessError::Busy(pid));
            }
            let _ = previous.join();
        }
        let runtime = self.clone();
        let handle = std::thread::Builder::new()
            .name(format!("proc-{}-{pid}", self.machine()))
            .spawn(move || match runtime.start(pid) {
                Ok(_) | Err(ProcessError::Interrupted(_)) => {}
                Err(e) => {
                    warn!(machine = %runtime.machine(), pid = %pid, error = %e, "worker finished with error");
                }
            })
            .map_err(ProcessError::Spawn)?;
        *slot = Some(handle);
        Ok(())
    }

    /// Removes interrupted processes and completed non-continuous ones.
    ///
    /// Processes still executing, or with a live worker, are kept.
    /// Returns the removed ids.
    pub fn reap(&self) -> Vec<ProcessId> {
        let mut table = self.shared.table.write();
        let victims: Vec<ProcessId> = table
            .values()
            .filter(|entry| entry.reapable())
            .map(|entry| entry.id)
            .collect();
        for pid in &victims {
            if let Some(entry) = table.remove(pid) {
                if let Some(worker) = entry.worker.lock().take() {
                    let _ = worker.join();
                }
            }
        }
        if !victims.is_empty() {
            debug!(machine = %self.machine(), reaped = victims.len(), "processes reaped");
        }
        victims
    }

    /// Copy of the machine-global table.
    #[must_use]
    pub fn machine_globals(&self) -> Table {
        self.shared.machine_globals.lock().clone()
    }

    /// Copy of the kernel table.
    #[must_use]
    pub fn kernel_globals(&self) -> Table {
        self.shared.kernel_globals.lock().clone()
    }

    /// Copy of a process's table.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::NotFound`] for an unknown id.
    pub fn process_table(&self, pid: ProcessId) -> Result<Table, ProcessError> {
        Ok(self.entry(pid)?.state.lock().process_table.clone())
    }

    /// Removes host locations from `message`.
    #[must_use]
    pub fn scrub(&self, message: &str) -> String {
        self.shared.ctx.scrubber.scrub(message)
    }

    /// Shared event bus.
    #[must_use]
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.shared.ctx.bus
    }

    /// Shared terminal table.
    #[must_use]
    pub fn terminals(&self) -> &Arc<Terminals> {
        &self.shared.ctx.terminals
    }

    /// Shared filesystem.
    #[must_use]
    pub fn vfs(&self) -> &SharedVfs {
        &self.shared.ctx.vfs
    }
}
