//! Console presentation for machine output and terminals.
//!
//! ```text
//! IoBridge ──open()──► ConsoleSurfaceFactory ──► ConsoleSurface (prefix "> ")
//!                                                   │ write_line → stdout
//!                                                   │ read_line  ← stdin
//! Machine default stream ───────────────────────► ConsoleStream → stdout
//! ```
//!
//! Every surface shares the process's stdin. With several terminals open,
//! each line goes to whichever reader thread wins the lock.

use compsim_runtime::io::{IoSurface, MachineStream, StreamInfo, SurfaceFactory};
use compsim_types::{Designation, TerminalId};
use std::io::{BufRead, Write};
use std::sync::Arc;
use tracing::debug;

/// Terminal surface on stdin/stdout.
#[derive(Debug, Clone)]
pub struct ConsoleSurface {
    machine: Designation,
    prefix: String,
}

impl ConsoleSurface {
    /// Surface for a terminal of `machine` prompting with `prefix`.
    #[must_use]
    pub fn new(machine: Designation, prefix: impl Into<String>) -> Self {
        Self {
            machine,
            prefix: prefix.into(),
        }
    }

    /// Prompt shown before each read.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl IoSurface for ConsoleSurface {
    fn write_line(&self, text: &str) {
        write_stdout(text);
    }

    fn read_line(&self) -> Option<String> {
        {
            let mut out = std::io::stdout().lock();
            let _ = write!(out, "{}", self.prefix);
            let _ = out.flush();
        }
        read_stdin()
    }

    fn start(&self, id: TerminalId) {
        debug!(machine = %self.machine, terminal = %id, "console terminal started");
    }

    fn end(&self, id: TerminalId) {
        debug!(machine = %self.machine, terminal = %id, "console terminal ended");
    }
}

/// Opens a [`ConsoleSurface`] per terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSurfaceFactory;

impl SurfaceFactory for ConsoleSurfaceFactory {
    fn open(&self, machine: &Designation, _id: TerminalId, prefix: &str) -> Arc<dyn IoSurface> {
        Arc::new(ConsoleSurface::new(machine.clone(), prefix))
    }
}

/// Default process stream printing to stdout.
///
/// Yields no input: interactive input goes through terminals.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleStream;

impl MachineStream for ConsoleStream {
    fn read_line(&self) -> Option<String> {
        None
    }

    fn write_line(&self, text: &str) {
        write_stdout(text);
    }

    fn info(&self) -> StreamInfo {
        StreamInfo {
            kind: "console",
            terminal: None,
        }
    }
}

fn write_stdout(text: &str) {
    let mut out = std::io::stdout().lock();
    let _ = writeln!(out, "{text}");
    let _ = out.flush();
}

fn read_stdin() -> Option<String> {
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(trim_newline(line)),
    }
}

fn trim_newline(mut line: String) -> String {
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    line
}
