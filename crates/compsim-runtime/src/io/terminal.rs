//! Machine-side terminal handles.

use super::{BridgeError, IoQueue, IoRequest, MachineStream, StreamInfo};
use crate::bus::EventBus;
use compsim_event::names;
use compsim_types::{Designation, TerminalId};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// A process stream backed by an external terminal surface.
///
/// Output is queued to the bridge. Input arrives on a private channel fed
/// by the bridge's reader; [`read_line`](MachineStream::read_line) sleeps
/// on it and fires `text_entered` for every line received.
///
/// `read_line` uses a blocking receive and must be called from a plain
/// thread (machine threads are), never from inside an async task.
pub struct TerminalStream {
    machine: Designation,
    id: TerminalId,
    queue: IoQueue,
    bus: Arc<EventBus>,
    input: Mutex<mpsc::UnboundedReceiver<String>>,
    closed: AtomicBool,
}

impl TerminalStream {
    /// Terminal id.
    #[must_use]
    pub fn id(&self) -> TerminalId {
        self.id
    }

    /// Whether the terminal has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for TerminalStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalStream")
            .field("machine", &self.machine)
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl MachineStream for TerminalStream {
    fn read_line(&self) -> Option<String> {
        if self.is_closed() {
            return None;
        }
        let line = self.input.lock().blocking_recv()?;
        if self.is_closed() {
            return None;
        }
        let param = format!("{}{line}", names::TEXT_ENTERED_PREFIX);
        if let Err(e) = self.bus.trigger(names::TEXT_ENTERED, vec![param]) {
            debug!(terminal = %self.id, error = %e, "text_entered not dispatched");
        }
        Some(line)
    }

    fn write_line(&self, text: &str) {
        if self.is_closed() {
            return;
        }
        let sent = self.queue.send(IoRequest::WriteLine {
            machine: self.machine.clone(),
            id: self.id,
            text: text.to_string(),
        });
        if sent.is_err() {
            debug!(machine = %self.machine, terminal = %self.id, "{text}");
        }
    }

    fn info(&self) -> StreamInfo {
        StreamInfo {
            kind: "terminal",
            terminal: Some(self.id),
        }
    }
}

struct OpenTerminal {
    stream: Arc<TerminalStream>,
    input: mpsc::UnboundedSender<String>,
}

/// Terminals opened by one machine.
pub struct Terminals {
    machine: Designation,
    queue: IoQueue,
    bus: Arc<EventBus>,
    next_id: AtomicU32,
    open: Mutex<BTreeMap<TerminalId, OpenTerminal>>,
}

impl std::fmt::Debug for Terminals {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Terminals")
            .field("machine", &self.machine)
            .field("open", &self.ids())
            .finish_non_exhaustive()
    }
}

impl Terminals {
    /// Empty table.
    #[must_use]
    pub fn new(machine: Designation, queue: IoQueue, bus: Arc<EventBus>) -> Self {
        Self {
            machine,
            queue,
            bus,
            next_id: AtomicU32::new(0),
            open: Mutex::new(BTreeMap::new()),
        }
    }

    /// Opens a terminal.
    ///
    /// Queues `StartTerminal` for the bridge and fires `start_terminal` on
    /// the machine bus with the new id. Works without a bridge: the
    /// terminal then only receives input through [`feed`](Self::feed).
    ///
    /// # Arguments
    ///
    /// * `prefix` - Prompt prefix for this surface only; `None` uses the
    ///   bridge default
    pub fn open(&self, prefix: Option<&str>) -> Arc<TerminalStream> {
        let id = TerminalId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        let stream = Arc::new(TerminalStream {
            machine: self.machine.clone(),
            id,
            queue: self.queue.clone(),
            bus: Arc::clone(&self.bus),
            input: Mutex::new(rx),
            closed: AtomicBool::new(false),
        });
        self.open.lock().insert(
            id,
            OpenTerminal {
                stream: Arc::clone(&stream),
                input: tx.clone(),
            },
        );
        let queued = self.queue.send(IoRequest::StartTerminal {
            machine: self.machine.clone(),
            id,
            prefix: prefix.map(str::to_string),
            input: tx,
        });
        if queued.is_err() {
            debug!(machine = %self.machine, terminal = %id, "no I/O bridge attached");
        }
        self.announce(names::START_TERMINAL, id);
        stream
    }

    /// Closes a terminal.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UnknownTerminal`] if `id` is not open.
    pub fn close(&self, id: TerminalId) -> Result<(), BridgeError> {
        let entry = self
            .open
            .lock()
            .remove(&id)
            .ok_or(BridgeError::UnknownTerminal(id))?;
        entry.stream.closed.store(true, Ordering::Release);
        // Wakes a reader blocked on this terminal; it sees the flag and ends.
        let _ = entry.input.send(String::new());
        drop(entry);
        let _ = self.queue.send(IoRequest::EndTerminal {
            machine: self.machine.clone(),
            id,
        });
        self.announce(names::END_TERMINAL, id);
        Ok(())
    }

    /// Closes every open terminal.
    pub fn close_all(&self) {
        for id in self.ids() {
            let _ = self.close(id);
        }
    }

    /// Open terminal by id.
    #[must_use]
    pub fn get(&self, id: TerminalId) -> Option<Arc<TerminalStream>> {
        self.open.lock().get(&id).map(|t| Arc::clone(&t.stream))
    }

    /// Delivers a line of input to a terminal as if typed on its surface.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UnknownTerminal`] if `id` is not open.
    pub fn feed(&self, id: TerminalId, line: impl Into<String>) -> Result<(), BridgeError> {
        let open = self.open.lock();
        let entry = open.get(&id).ok_or(BridgeError::UnknownTerminal(id))?;
        entry
            .input
            .send(line.into())
            .map_err(|_| BridgeError::UnknownTerminal(id))
    }

    /// Ids of open terminals, ascending.
    #[must_use]
    pub fn ids(&self) -> Vec<TerminalId> {
        self.open.lock().keys().copied().collect()
    }

    fn announce(&self, event: &str, id: TerminalId) {
        if let Err(e) = self.bus.trigger(event, vec![id.to_string()]) {
            debug!(event, error = %e, "terminal lifecycle event not dispatched");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compsim_types::MachineId;

    fn setup() -> (
        Terminals,
        Arc<EventBus>,
        mpsc::UnboundedReceiver<IoRequest>,
    ) {
        let machine = Designation::new(MachineId::new(0), "term").expect("name");
        let bus = Arc::new(EventBus::with_default_taxonomy(machine.clone()));
        let (queue, rx) = IoQueue::channel();
        (Terminals::new(machine, queue, Arc::clone(&bus)), bus, rx)
    }

    #[test]
    fn open_queues_start_and_fires_event() {
        let (terms, bus, mut rx) = setup();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in = Arc::clone(&seen);
        bus.subscribe(names::START_TERMINAL, move |ev| {
            seen_in.lock().push(ev.params().to_vec());
        })
        .expect("subscribe");

        let first = terms.open(Some("> "));
        let second = terms.open(None);
        assert_eq!(first.id(), TerminalId::new(0));
        assert_eq!(second.id(), TerminalId::new(1));
        assert_eq!(*seen.lock(), vec![vec!["0".to_string()], vec!["1".to_string()]]);

        match rx.try_recv() {
            Ok(IoRequest::StartTerminal { id, prefix, .. }) => {
                assert_eq!(id, TerminalId::new(0));
                assert_eq!(prefix.as_deref(), Some("> "));
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn write_line_goes_to_queue() {
        let (terms, _bus, mut rx) = setup();
        let t = terms.open(None);
        let _start = rx.try_recv().expect("start request");
        t.write_line("hello");
        match rx.try_recv() {
            Ok(IoRequest::WriteLine { text, id, .. }) => {
                assert_eq!(text, "hello");
                assert_eq!(id, t.id());
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn fed_input_is_read_and_announced() {
        let (terms, bus, _rx) = setup();
        let texts = Arc::new(Mutex::new(Vec::new()));
        let texts_in = Arc::clone(&texts);
        bus.subscribe(names::TEXT_ENTERED, move |ev| {
            texts_in.lock().push(ev.param(0).unwrap_or_default().to_string());
        })
        .expect("subscribe");

        let t = terms.open(None);
        terms.feed(t.id(), "ls").expect("feed");
        assert_eq!(t.read_line().as_deref(), Some("ls"));
        assert_eq!(*texts.lock(), vec!["text: ls"]);
    }

    #[test]
    fn reader_wakes_when_line_arrives() {
        let (terms, _bus, _rx) = setup();
        let t = terms.open(None);
        let reader = {
            let t = Arc::clone(&t);
            std::thread::spawn(move || t.read_line())
        };
        std::thread::sleep(std::time::Duration::from_millis(20));
        terms.feed(t.id(), "late").expect("feed");
        assert_eq!(reader.join().expect("reader thread").as_deref(), Some("late"));
    }

    #[test]
    fn close_wakes_a_blocked_reader() {
        // The queue receiver keeps the bridge's copy of the input sender alive.
        let (terms, _bus, _rx) = setup();
        let t = terms.open(None);
        let reader = {
            let t = Arc::clone(&t);
            std::thread::spawn(move || t.read_line())
        };
        std::thread::sleep(std::time::Duration::from_millis(20));
        terms.close(t.id()).expect("close");
        assert_eq!(reader.join().expect("reader thread"), None);
    }

    #[test]
    fn close_fires_end_and_forgets_terminal() {
        let (terms, bus, _rx) = setup();
        let ended = Arc::new(Mutex::new(Vec::new()));
        let ended_in = Arc::clone(&ended);
        bus.subscribe(names::END_TERMINAL, move |ev| {
            ended_in.lock().push(ev.param(0).unwrap_or_default().to_string());
        })
        .expect("subscribe");

        let t = terms.open(None);
        terms.close(t.id()).expect("close");
        assert!(t.is_closed());
        assert_eq!(t.read_line(), None);
        assert_eq!(*ended.lock(), vec!["0"]);
        assert_eq!(
            terms.close(t.id()),
            Err(BridgeError::UnknownTerminal(t.id()))
        );
        assert!(terms.feed(t.id(), "x").is_err());
    }
}
