//! Machine registry and per-machine threads.
//!
//! Every machine lives on its own named OS thread and is driven through a
//! command channel. The registry only holds handles, so a slow script on
//! one machine never stalls another. Processes launched through a handle
//! run on their own worker threads, so a process waiting for input never
//! stalls its machine's command loop. Terminal input bypasses the loop
//! and goes straight to the machine's terminal table.
//!
//! ```text
//! MachineRegistry ──► MachineHandle ──► mpsc<MachineCommand> ──► machine-0_office
//!        │                                                           │
//!        │            ◄────────────── oneshot reply ─────────────────┘
//!        └──► MachineHandle ──► mpsc<MachineCommand> ──► machine-1_lab
//! ```

use super::{Machine, MachineEnv, MachineError};
use crate::io::Terminals;
use crate::script::BindingValue;
use compsim_auth::CapabilitySet;
use compsim_types::{Designation, MachineId, ProcessId, TerminalId};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

type Reply<T> = oneshot::Sender<Result<T, MachineError>>;

/// Requests handled on a machine's thread.
#[derive(Debug)]
pub enum MachineCommand {
    /// One scheduler step.
    Tick,
    /// Create a process and run it on its own worker thread.
    SpawnProcess {
        /// Process name.
        name: String,
        /// Logical path of the root script.
        path: String,
        /// Capabilities of the new process.
        capabilities: CapabilitySet,
        /// Reply with the new process id once the worker started.
        reply: Reply<ProcessId>,
    },
    /// Create a process and run it to completion on the machine thread.
    ///
    /// The machine handles nothing else until the script returns.
    StartProcess {
        /// Process name.
        name: String,
        /// Logical path of the root script.
        path: String,
        /// Capabilities of the new process.
        capabilities: CapabilitySet,
        /// Reply with the new process id.
        reply: Reply<ProcessId>,
    },
    /// Run a script in the boot process context.
    Execute {
        /// Logical script path.
        path: String,
        /// Reply with the script's return value.
        reply: Reply<BindingValue>,
    },
    /// Trigger an event on the machine bus.
    Trigger {
        /// Event name.
        name: String,
        /// `key: value` parameters.
        params: Vec<String>,
        /// Reply with the number of subscribers notified.
        reply: Reply<usize>,
    },
    /// Open a terminal.
    OpenTerminal {
        /// Prompt prefix, `None` for the bridge default.
        prefix: Option<String>,
        /// Reply with the new terminal id.
        reply: Reply<TerminalId>,
    },
    /// Write the metadata checkpoint.
    Save {
        /// Reply when saved.
        reply: Reply<()>,
    },
    /// Shut the machine down and end its thread.
    Shutdown {
        /// Reply when the final save completed.
        reply: Reply<()>,
    },
}

/// Handle to a running machine thread.
#[derive(Debug)]
pub struct MachineHandle {
    designation: Designation,
    tx: mpsc::UnboundedSender<MachineCommand>,
    terminals: Arc<Terminals>,
    thread: Option<JoinHandle<()>>,
}

impl MachineHandle {
    /// Designation of the machine.
    #[must_use]
    pub fn designation(&self) -> &Designation {
        &self.designation
    }

    /// Returns `true` once the machine thread stopped accepting commands.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.tx.is_closed()
    }

    /// Sends a command without waiting for a reply.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError::Stopped`] if the machine thread is gone.
    pub fn send(&self, command: MachineCommand) -> Result<(), MachineError> {
        self.tx
            .send(command)
            .map_err(|_| MachineError::Stopped(self.designation.to_string()))
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> MachineCommand,
    ) -> Result<T, MachineError> {
        let (reply, rx) = oneshot::channel();
        self.send(command(reply))?;
        rx.await
            .map_err(|_| MachineError::Stopped(self.designation.to_string()))?
    }

    /// Creates a process and starts it on its own worker thread.
    ///
    /// Returns once the worker is running, not when the script ends. The
    /// machine keeps serving commands while the process waits for input.
    ///
    /// # Errors
    ///
    /// Returns the machine's creation or spawn error, or
    /// [`MachineError::Stopped`].
    pub async fn start_process(
        &self,
        name: &str,
        path: &str,
        capabilities: CapabilitySet,
    ) -> Result<ProcessId, MachineError> {
        self.request(|reply| MachineCommand::SpawnProcess {
            name: name.to_string(),
            path: path.to_string(),
            capabilities,
            reply,
        })
        .await
    }

    /// Creates a process and runs it to completion on the machine thread.
    ///
    /// Only for scripts that never wait for input: the machine serves no
    /// other command until the script returns.
    ///
    /// # Errors
    ///
    /// Returns the machine's error, or [`MachineError::Stopped`].
    pub async fn run_process(
        &self,
        name: &str,
        path: &str,
        capabilities: CapabilitySet,
    ) -> Result<ProcessId, MachineError> {
        self.request(|reply| MachineCommand::StartProcess {
            name: name.to_string(),
            path: path.to_string(),
            capabilities,
            reply,
        })
        .await
    }

    /// Runs a script in the boot process context.
    ///
    /// # Errors
    ///
    /// Returns the machine's error, or [`MachineError::Stopped`].
    pub async fn execute(&self, path: &str) -> Result<BindingValue, MachineError> {
        self.request(|reply| MachineCommand::Execute {
            path: path.to_string(),
            reply,
        })
        .await
    }

    /// Triggers an event.
    ///
    /// # Errors
    ///
    /// Returns the machine's error, or [`MachineError::Stopped`].
    pub async fn trigger(&self, name: &str, params: Vec<String>) -> Result<usize, MachineError> {
        self.request(|reply| MachineCommand::Trigger {
            name: name.to_string(),
            params,
            reply,
        })
        .await
    }

    /// Opens a terminal.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError::Stopped`] if the machine thread is gone.
    pub async fn open_terminal(&self, prefix: Option<&str>) -> Result<TerminalId, MachineError> {
        self.request(|reply| MachineCommand::OpenTerminal {
            prefix: prefix.map(str::to_string),
            reply,
        })
        .await
    }

    /// Delivers a line to a terminal.
    ///
    /// Does not go through the machine thread, so it reaches a process
    /// blocked on input even while the machine is busy.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError::Bridge`] if the terminal is not open.
    pub fn input(&self, terminal: TerminalId, line: &str) -> Result<(), MachineError> {
        Ok(self.terminals.feed(terminal, line)?)
    }

    /// Writes the metadata checkpoint.
    ///
    /// # Errors
    ///
    /// Returns the machine's error, or [`MachineError::Stopped`].
    pub async fn save(&self) -> Result<(), MachineError> {
        self.request(|reply| MachineCommand::Save { reply }).await
    }

    async fn stop(mut self) -> Result<(), MachineError> {
        let result = self.request(|reply| MachineCommand::Shutdown { reply }).await;
        drop(self.tx);
        if let Some(thread) = self.thread.take() {
            let joined = tokio::task::spawn_blocking(move || thread.join()).await;
            if !matches!(joined, Ok(Ok(()))) {
                warn!(machine = %self.designation, "machine thread panicked");
            }
        }
        result
    }
}

/// Owns every machine of a simulation.
///
/// Ids are assigned in creation order starting at 0. Names need not be
/// unique since the id is part of the designation.
#[derive(Debug)]
pub struct MachineRegistry {
    env: MachineEnv,
    next_id: u64,
    machines: BTreeMap<Designation, MachineHandle>,
}

impl MachineRegistry {
    /// Creates an empty registry building machines from `env`.
    #[must_use]
    pub fn new(env: MachineEnv) -> Self {
        Self {
            env,
            next_id: 0,
            machines: BTreeMap::new(),
        }
    }

    /// Construction environment.
    #[must_use]
    pub fn env(&self) -> &MachineEnv {
        &self.env
    }

    /// Builds and boots a machine on a new thread.
    ///
    /// Returns once the machine finished booting.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError::InvalidName`] before anything is created,
    /// [`MachineError::Spawn`] if the thread cannot start, or the
    /// construction error from the machine thread.
    pub async fn create(&mut self, name: &str) -> Result<Designation, MachineError> {
        let id = MachineId::new(self.next_id);
        let designation = Designation::new(id, name)?;
        self.next_id += 1;

        let (tx, rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let env = self.env.clone();
        let machine_name = name.to_string();
        let thread = std::thread::Builder::new()
            .name(format!("machine-{designation}"))
            .spawn(move || match Machine::new(id, &machine_name, &env) {
                Ok(machine) => {
                    let _ = ready_tx.send(Ok(Arc::clone(machine.terminals())));
                    run_machine(machine, rx);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(MachineError::Spawn)?;

        let ready = ready_rx
            .await
            .map_err(|_| MachineError::Stopped(designation.to_string()));
        let terminals = match ready.and_then(|r| r) {
            Ok(terminals) => terminals,
            Err(e) => {
                let _ = tokio::task::spawn_blocking(move || thread.join()).await;
                return Err(e);
            }
        };

        info!(machine = %designation, "machine registered");
        self.machines.insert(
            designation.clone(),
            MachineHandle {
                designation: designation.clone(),
                tx,
                terminals,
                thread: Some(thread),
            },
        );
        Ok(designation)
    }

    /// Handle by designation.
    #[must_use]
    pub fn get(&self, designation: &Designation) -> Option<&MachineHandle> {
        self.machines.get(designation)
    }

    /// First machine (lowest id) with the given name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&MachineHandle> {
        self.machines.values().find(|h| h.designation.name() == name)
    }

    /// Every designation, in id order.
    #[must_use]
    pub fn designations(&self) -> Vec<Designation> {
        self.machines.keys().cloned().collect()
    }

    /// Number of machines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.machines.len()
    }

    /// Returns `true` if no machine exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }

    /// Sends one tick to every machine. Returns how many accepted it.
    pub fn tick_all(&self) -> usize {
        self.machines
            .values()
            .filter(|h| h.send(MachineCommand::Tick).is_ok())
            .count()
    }

    /// Ticks every machine at `period` until `shutdown` completes.
    pub async fn run_ticks<F>(&self, period: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    debug!("tick loop stopping");
                    break;
                }
                _ = interval.tick() => {
                    self.tick_all();
                }
            }
        }
    }

    /// Shuts a machine down and removes it.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError::NotFound`] for unknown designations, or the
    /// machine's final save error. The machine is removed either way.
    pub async fn remove(&mut self, designation: &Designation) -> Result<(), MachineError> {
        let handle = self
            .machines
            .remove(designation)
            .ok_or_else(|| MachineError::NotFound(designation.to_string()))?;
        handle.stop().await
    }

    /// Shuts every machine down. Failures are logged.
    pub async fn shutdown_all(&mut self) {
        let machines = std::mem::take(&mut self.machines);
        for (designation, handle) in machines {
            if let Err(e) = handle.stop().await {
                warn!(machine = %designation, error = %e, "machine shutdown failed");
            }
        }
    }
}

fn run_machine(mut machine: Machine, mut rx: mpsc::UnboundedReceiver<MachineCommand>) {
    while let Some(command) = rx.blocking_recv() {
        match command {
            MachineCommand::Tick => {
                let reaped = machine.tick();
                if !reaped.is_empty() {
                    debug!(machine = %machine.designation(), count = reaped.len(), "processes reaped");
                }
            }
            MachineCommand::SpawnProcess {
                name,
                path,
                capabilities,
                reply,
            } => {
                let _ = reply.send(machine.spawn_process(&name, &path, capabilities));
            }
            MachineCommand::StartProcess {
                name,
                path,
                capabilities,
                reply,
            } => {
                let _ = reply.send(machine.start_process(&name, &path, capabilities));
            }
            MachineCommand::Execute { path, reply } => {
                let _ = reply.send(machine.execute_script(&path));
            }
            MachineCommand::Trigger {
                name,
                params,
                reply,
            } => {
                let _ = reply.send(machine.trigger(&name, params));
            }
            MachineCommand::OpenTerminal { prefix, reply } => {
                let _ = reply.send(Ok(machine.open_terminal(prefix.as_deref())));
            }
            MachineCommand::Save { reply } => {
                let _ = reply.send(machine.save());
            }
            MachineCommand::Shutdown { reply } => {
                let _ = reply.send(machine.shutdown());
                return;
            }
        }
    }
    if let Err(e) = machine.shutdown() {
        warn!(machine = %machine.designation(), error = %e, "shutdown after handle drop failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::META_FILE_NAME;
    use crate::testing::RecordingEngine;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn registry(dir: &TempDir) -> (MachineRegistry, Arc<RecordingEngine>) {
        let engine = Arc::new(RecordingEngine::new());
        let env = MachineEnv::new(dir.path(), engine.clone());
        (MachineRegistry::new(env), engine)
    }

    #[tokio::test]
    async fn ids_follow_creation_order() {
        let dir = TempDir::new().expect("temp dir");
        let (mut registry, _) = registry(&dir);

        let a = registry.create("office").await.expect("office");
        let b = registry.create("office").await.expect("second office");
        assert_eq!(a.as_str(), "0_office");
        assert_eq!(b.as_str(), "1_office");
        assert_eq!(registry.find("office").map(|h| h.designation().clone()), Some(a));

        registry.shutdown_all().await;
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn invalid_name_does_not_consume_an_id() {
        let dir = TempDir::new().expect("temp dir");
        let (mut registry, _) = registry(&dir);

        let err = registry.create("a=b").await.expect_err("forbidden char");
        assert!(matches!(err, MachineError::InvalidName(_)));
        let d = registry.create("ok").await.expect("valid");
        assert_eq!(d.as_str(), "0_ok");
        registry.shutdown_all().await;
    }

    #[tokio::test]
    async fn commands_reach_the_machine_thread() {
        let dir = TempDir::new().expect("temp dir");
        let (mut registry, engine) = registry(&dir);
        let d = registry.create("lab").await.expect("lab");

        let handle = registry.get(&d).expect("handle");
        let err = handle.execute("/missing.lua").await.expect_err("no such script");
        assert!(matches!(
            err,
            MachineError::Process(crate::process::ProcessError::FileNotFound(_))
        ));

        let notified = handle
            .trigger("text_entered", vec!["text: hi".into()])
            .await
            .expect("registered event");
        assert_eq!(notified, 0);
        assert_eq!(engine.call_count(), 0);

        registry.remove(&d).await.expect("remove");
        assert!(dir.path().join("machines/0_lab").join(META_FILE_NAME).exists());
        assert!(registry.get(&d).is_none());
    }

    #[tokio::test]
    async fn waiting_process_does_not_block_the_machine() {
        let dir = TempDir::new().expect("temp dir");
        let template = dir.path().join("template");
        std::fs::create_dir_all(template.join("bin")).expect("bin dir");
        std::fs::write(
            template.join("bin/wait.lua"),
            "call term.open\ncall term.attach 0\ncall std.read_line\n",
        )
        .expect("script");
        let engine = Arc::new(RecordingEngine::new());
        let env = MachineEnv::new(dir.path().join("store"), engine.clone()).with_template(&template);
        let mut registry = MachineRegistry::new(env);
        let d = registry.create("desk").await.expect("desk");
        let handle = registry.get(&d).expect("handle");

        let caps = CapabilitySet::process_default().with_namespace("term");
        handle
            .start_process("waiter", "/bin/wait.lua", caps)
            .await
            .expect("spawned");

        let limit = Duration::from_secs(2);
        let notified = tokio::time::timeout(limit, handle.trigger("moved", Vec::new()))
            .await
            .expect("trigger answered while a process waits");
        assert_eq!(notified.expect("registered event"), 0);
        tokio::time::timeout(limit, handle.save())
            .await
            .expect("save answered while a process waits")
            .expect("saved");

        // The terminal appears once the worker ran `term.open`.
        let terminal = TerminalId::new(0);
        let mut fed = handle.input(terminal, "hello");
        for _ in 0..100 {
            if fed.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            fed = handle.input(terminal, "hello");
        }
        fed.expect("input reaches the waiting process");

        tokio::time::timeout(limit, registry.shutdown_all())
            .await
            .expect("shutdown completes");
        assert_eq!(engine.call_count(), 1);
    }

    #[tokio::test]
    async fn shutdown_releases_a_process_still_waiting() {
        let dir = TempDir::new().expect("temp dir");
        let template = dir.path().join("template");
        std::fs::create_dir_all(template.join("bin")).expect("bin dir");
        std::fs::write(
            template.join("bin/wait.lua"),
            "call term.open\ncall term.attach 0\ncall std.read_line\n",
        )
        .expect("script");
        let env = MachineEnv::new(dir.path().join("store"), Arc::new(RecordingEngine::new()))
            .with_template(&template);
        let mut registry = MachineRegistry::new(env);
        let d = registry.create("desk").await.expect("desk");

        let caps = CapabilitySet::process_default().with_namespace("term");
        registry
            .get(&d)
            .expect("handle")
            .start_process("waiter", "/bin/wait.lua", caps)
            .await
            .expect("spawned");
        tokio::time::sleep(Duration::from_millis(50)).await;

        tokio::time::timeout(Duration::from_secs(2), registry.shutdown_all())
            .await
            .expect("shutdown completes");
    }

    #[tokio::test]
    async fn remove_unknown_machine_is_not_found() {
        let dir = TempDir::new().expect("temp dir");
        let (mut registry, _) = registry(&dir);
        let ghost = Designation::new(MachineId::new(9), "ghost").expect("designation");
        assert!(matches!(
            registry.remove(&ghost).await,
            Err(MachineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn run_ticks_stops_on_shutdown_signal() {
        let dir = TempDir::new().expect("temp dir");
        let (mut registry, _) = registry(&dir);
        registry.create("tick").await.expect("machine");

        registry
            .run_ticks(Duration::from_millis(10), tokio::time::sleep(Duration::from_millis(35)))
            .await;
        registry.shutdown_all().await;
    }
}
