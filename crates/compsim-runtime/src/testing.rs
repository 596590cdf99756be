//! Test doubles for the script-engine and I/O surface boundaries.
//!
//! [`RecordingEngine`] runs a tiny line language so runtime tests can
//! drive host operations without a real interpreter:
//!
//! ```text
//! -- comment
//! call std.print hello 42        call an operation; args are nil/bool/int/string
//! return process_table.count 3   add a reserved-table entry to the return value
//! env greeting hi                leave a global behind
//! fail something broke           raise a runtime failure
//! ```

use crate::io::{IoSurface, SurfaceFactory};
use crate::script::{
    BindingTable, BindingValue, Script, ScriptEngine, ScriptFailure, ScriptOutcome, Table,
};
use crate::vfs::VfsPath;
use compsim_types::{Designation, TerminalId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{mpsc, Arc};

/// One recorded [`ScriptEngine::execute`] call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// Logical path of the script.
    pub path: VfsPath,
    /// Names of the value bindings.
    pub values: Vec<String>,
    /// Qualified names of the operations that were installed.
    pub operations: Vec<String>,
    /// The bindings' `params` value.
    pub params: BindingValue,
}

type Handler = dyn Fn(&Script, &BindingTable) -> Result<ScriptOutcome, ScriptFailure> + Send + Sync;

/// A [`ScriptEngine`] that records every call.
pub struct RecordingEngine {
    calls: Mutex<Vec<RecordedCall>>,
    handler: Option<Box<Handler>>,
}

impl Default for RecordingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingEngine {
    /// Engine running the line language.
    #[must_use]
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            handler: None,
        }
    }

    /// Engine delegating every call to `handler`.
    #[must_use]
    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&Script, &BindingTable) -> Result<ScriptOutcome, ScriptFailure>
            + Send
            + Sync
            + 'static,
    {
        Self {
            calls: Mutex::new(Vec::new()),
            handler: Some(Box::new(handler)),
        }
    }

    /// Every call so far.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Number of calls so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

impl ScriptEngine for RecordingEngine {
    fn name(&self) -> &str {
        "recording"
    }

    fn execute(
        &self,
        script: &Script,
        bindings: BindingTable,
    ) -> Result<ScriptOutcome, ScriptFailure> {
        self.calls.lock().push(RecordedCall {
            path: script.path().clone(),
            values: bindings.values().keys().cloned().collect(),
            operations: bindings
                .operations()
                .iter()
                .map(crate::script::HostOperation::qualified_name)
                .collect(),
            params: bindings.get("params").cloned().unwrap_or_default(),
        });
        match &self.handler {
            Some(handler) => handler(script, &bindings),
            None => run_lines(script, &bindings),
        }
    }
}

fn run_lines(script: &Script, bindings: &BindingTable) -> Result<ScriptOutcome, ScriptFailure> {
    let mut returned = Table::new();
    let mut environment = Table::new();
    for (idx, line) in script.source().lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("--") || line.starts_with('#') {
            continue;
        }
        let mut words = line.split_whitespace();
        let verb = words.next().unwrap_or_default();
        let location = format!("{}:{}", script.path(), idx + 1);
        match verb {
            "call" => {
                let name = words.next().unwrap_or_default();
                let op = bindings.operation(name).ok_or_else(|| {
                    ScriptFailure::Runtime(format!("{location}: attempt to call nil '{name}'"))
                })?;
                let args: Vec<BindingValue> = words.map(literal).collect();
                op.call(&args)
                    .map_err(|e| ScriptFailure::Runtime(format!("{location}: {e}")))?;
            }
            "return" => {
                let key = words.next().unwrap_or_default();
                let value = words.next().map(literal).unwrap_or_default();
                let (section, field) = key.split_once('.').ok_or_else(|| {
                    ScriptFailure::Syntax(format!("{location}: expected section.key"))
                })?;
                let slot = returned
                    .entry(section.to_string())
                    .or_insert_with(|| BindingValue::Table(Table::new()));
                if let BindingValue::Table(table) = slot {
                    table.insert(field.to_string(), value);
                }
            }
            "env" => {
                let key = words.next().unwrap_or_default();
                let value = words.next().map(literal).unwrap_or_default();
                environment.insert(key.to_string(), value);
            }
            "fail" => {
                let msg = words.collect::<Vec<_>>().join(" ");
                return Err(ScriptFailure::Runtime(format!("{location}: {msg}")));
            }
            other => {
                return Err(ScriptFailure::Syntax(format!(
                    "{location}: unknown statement '{other}'"
                )))
            }
        }
    }
    Ok(ScriptOutcome::from_return(BindingValue::Table(returned))?.with_environment(environment))
}

fn literal(word: &str) -> BindingValue {
    match word {
        "nil" => BindingValue::Nil,
        "true" => BindingValue::Bool(true),
        "false" => BindingValue::Bool(false),
        _ => word
            .parse::<i64>()
            .map_or_else(|_| BindingValue::from(word), BindingValue::Int),
    }
}

/// In-memory [`IoSurface`].
pub struct MemorySurface {
    prefix: String,
    output: Mutex<Vec<String>>,
    input_tx: Mutex<Option<mpsc::Sender<String>>>,
    input_rx: Mutex<mpsc::Receiver<String>>,
    started: Mutex<Option<TerminalId>>,
}

impl MemorySurface {
    /// Surface showing `prefix`.
    #[must_use]
    pub fn new(prefix: &str) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            prefix: prefix.to_string(),
            output: Mutex::new(Vec::new()),
            input_tx: Mutex::new(Some(tx)),
            input_rx: Mutex::new(rx),
            started: Mutex::new(None),
        }
    }

    /// Prompt prefix this surface was opened with.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Lines written so far.
    #[must_use]
    pub fn output(&self) -> Vec<String> {
        self.output.lock().clone()
    }

    /// Simulates the user entering a line.
    pub fn type_line(&self, line: &str) {
        if let Some(tx) = self.input_tx.lock().as_ref() {
            let _ = tx.send(line.to_string());
        }
    }

    /// Terminal id passed to `start`.
    #[must_use]
    pub fn started(&self) -> Option<TerminalId> {
        *self.started.lock()
    }

    /// Whether `end` was called.
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.input_tx.lock().is_none()
    }
}

impl IoSurface for MemorySurface {
    fn write_line(&self, text: &str) {
        self.output.lock().push(text.to_string());
    }

    fn read_line(&self) -> Option<String> {
        self.input_rx.lock().recv().ok()
    }

    fn start(&self, id: TerminalId) {
        *self.started.lock() = Some(id);
    }

    fn end(&self, _id: TerminalId) {
        self.input_tx.lock().take();
    }
}

/// Factory handing out [`MemorySurface`]s and keeping them for inspection.
#[derive(Default)]
pub struct MemorySurfaceFactory {
    surfaces: Mutex<HashMap<(Designation, TerminalId), Arc<MemorySurface>>>,
}

impl MemorySurfaceFactory {
    /// Empty factory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The surface opened for `machine`'s terminal `id`.
    #[must_use]
    pub fn surface(&self, machine: &Designation, id: TerminalId) -> Option<Arc<MemorySurface>> {
        self.surfaces.lock().get(&(machine.clone(), id)).cloned()
    }
}

impl SurfaceFactory for MemorySurfaceFactory {
    fn open(&self, machine: &Designation, id: TerminalId, prefix: &str) -> Arc<dyn IoSurface> {
        let surface = Arc::new(MemorySurface::new(prefix));
        self.surfaces
            .lock()
            .insert((machine.clone(), id), Arc::clone(&surface));
        surface
    }
}
