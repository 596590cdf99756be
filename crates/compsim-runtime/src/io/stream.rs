//! Line streams processes read from and write to.

use compsim_types::{Designation, TerminalId};
use parking_lot::Mutex;
use std::collections::VecDeque;
use tracing::info;

/// Description of a stream, exposed to scripts as `params.stream`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    /// Stream kind (`"terminal"`, `"buffer"`, `"log"`).
    pub kind: &'static str,
    /// Terminal id when the stream is a terminal.
    pub terminal: Option<TerminalId>,
}

/// Line-oriented I/O endpoint of a process.
pub trait MachineStream: Send + Sync {
    /// Blocks until a line is available. `None` means end of input.
    fn read_line(&self) -> Option<String>;

    /// Writes one line.
    fn write_line(&self, text: &str);

    /// What this stream is.
    fn info(&self) -> StreamInfo;
}

/// Writes to the log and never yields input.
///
/// Default stream of headless machines.
#[derive(Debug, Clone)]
pub struct LogStream {
    machine: Designation,
}

impl LogStream {
    /// Stream logging under `machine`.
    #[must_use]
    pub fn new(machine: Designation) -> Self {
        Self { machine }
    }
}

impl MachineStream for LogStream {
    fn read_line(&self) -> Option<String> {
        None
    }

    fn write_line(&self, text: &str) {
        info!(machine = %self.machine, "{text}");
    }

    fn info(&self) -> StreamInfo {
        StreamInfo {
            kind: "log",
            terminal: None,
        }
    }
}

/// In-memory stream with queued input and captured output.
#[derive(Debug, Default)]
pub struct BufferStream {
    input: Mutex<VecDeque<String>>,
    output: Mutex<Vec<String>>,
}

impl BufferStream {
    /// Empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer pre-loaded with input lines.
    #[must_use]
    pub fn with_input<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            input: Mutex::new(lines.into_iter().map(Into::into).collect()),
            output: Mutex::new(Vec::new()),
        }
    }

    /// Queues one input line.
    pub fn push_input(&self, line: impl Into<String>) {
        self.input.lock().push_back(line.into());
    }

    /// Copy of everything written so far.
    #[must_use]
    pub fn output(&self) -> Vec<String> {
        self.output.lock().clone()
    }

    /// Drains the captured output.
    #[must_use]
    pub fn take_output(&self) -> Vec<String> {
        std::mem::take(&mut *self.output.lock())
    }
}

impl MachineStream for BufferStream {
    fn read_line(&self) -> Option<String> {
        self.input.lock().pop_front()
    }

    fn write_line(&self, text: &str) {
        self.output.lock().push(text.to_string());
    }

    fn info(&self) -> StreamInfo {
        StreamInfo {
            kind: "buffer",
            terminal: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_replays_input_then_ends() {
        let stream = BufferStream::with_input(["one", "two"]);
        assert_eq!(stream.read_line().as_deref(), Some("one"));
        stream.push_input("three");
        assert_eq!(stream.read_line().as_deref(), Some("two"));
        assert_eq!(stream.read_line().as_deref(), Some("three"));
        assert_eq!(stream.read_line(), None);
    }

    #[test]
    fn buffer_captures_output() {
        let stream = BufferStream::new();
        stream.write_line("a");
        stream.write_line("b");
        assert_eq!(stream.output(), vec!["a", "b"]);
        assert_eq!(stream.take_output().len(), 2);
        assert!(stream.output().is_empty());
    }

    #[test]
    fn log_stream_has_no_input() {
        let machine = Designation::new(compsim_types::MachineId::new(0), "m").expect("name");
        let stream = LogStream::new(machine);
        stream.write_line("hello");
        assert_eq!(stream.read_line(), None);
        assert_eq!(stream.info().kind, "log");
    }
}
