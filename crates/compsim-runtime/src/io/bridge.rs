//! Presentation side of terminal I/O.

use super::IoRequest;
use compsim_types::{Designation, TerminalId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Prompt prefix used when a terminal does not request its own.
pub const DEFAULT_PREFIX: &str = "> ";

/// One external terminal surface: a console, a window, a socket.
pub trait IoSurface: Send + Sync {
    /// Shows a line.
    fn write_line(&self, text: &str);

    /// Blocks until the user enters a line. `None` ends input.
    ///
    /// Called on a dedicated reader thread, never on the bridge task.
    fn read_line(&self) -> Option<String>;

    /// Called once after the surface is opened, before its reader starts.
    fn start(&self, _id: TerminalId) {}

    /// Called once when the machine closes the terminal.
    fn end(&self, _id: TerminalId) {}
}

/// Creates surfaces on `StartTerminal`.
pub trait SurfaceFactory: Send + Sync {
    /// Opens the surface for terminal `id` of `machine`.
    fn open(&self, machine: &Designation, id: TerminalId, prefix: &str) -> Arc<dyn IoSurface>;
}

/// Consumes the [`IoQueue`](super::IoQueue) and drives surfaces.
///
/// Surfaces are keyed by `(machine, terminal)`, so two machines may both
/// own a terminal `0`.
pub struct IoBridge {
    rx: mpsc::UnboundedReceiver<IoRequest>,
    factory: Arc<dyn SurfaceFactory>,
    default_prefix: String,
    surfaces: HashMap<(Designation, TerminalId), Arc<dyn IoSurface>>,
}

impl std::fmt::Debug for IoBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoBridge")
            .field("default_prefix", &self.default_prefix)
            .field("surfaces", &self.surfaces.len())
            .finish_non_exhaustive()
    }
}

impl IoBridge {
    /// Bridge over the receiving end of an [`IoQueue`](super::IoQueue).
    #[must_use]
    pub fn new(rx: mpsc::UnboundedReceiver<IoRequest>, factory: Arc<dyn SurfaceFactory>) -> Self {
        Self {
            rx,
            factory,
            default_prefix: DEFAULT_PREFIX.to_string(),
            surfaces: HashMap::new(),
        }
    }

    /// Overrides the default prompt prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.default_prefix = prefix.into();
        self
    }

    /// Runs until every queue sender is dropped, then ends all surfaces.
    pub async fn run(mut self) {
        info!("I/O bridge started");
        while let Some(request) = self.rx.recv().await {
            self.handle(request);
        }
        self.end_all();
        info!("I/O bridge stopped");
    }

    /// Handles every request already queued without waiting.
    ///
    /// Returns the number handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(request) = self.rx.try_recv() {
            self.handle(request);
            handled += 1;
        }
        handled
    }

    /// Handles one request.
    pub fn handle(&mut self, request: IoRequest) {
        match request {
            IoRequest::StartTerminal {
                machine,
                id,
                prefix,
                input,
            } => {
                let prefix = prefix.as_deref().unwrap_or(&self.default_prefix);
                let surface = self.factory.open(&machine, id, prefix);
                surface.start(id);
                spawn_reader(&machine, id, Arc::clone(&surface), input);
                debug!(machine = %machine, terminal = %id, "surface opened");
                self.surfaces.insert((machine, id), surface);
            }
            IoRequest::EndTerminal { machine, id } => {
                match self.surfaces.remove(&(machine.clone(), id)) {
                    Some(surface) => {
                        surface.end(id);
                        debug!(machine = %machine, terminal = %id, "surface closed");
                    }
                    None => debug!(machine = %machine, terminal = %id, "end for unknown surface"),
                }
            }
            IoRequest::WriteLine { machine, id, text } => {
                match self.surfaces.get(&(machine.clone(), id)) {
                    Some(surface) => surface.write_line(&text),
                    None => warn!(machine = %machine, terminal = %id, "write to unknown surface"),
                }
            }
        }
    }

    /// Number of open surfaces.
    #[must_use]
    pub fn surface_count(&self) -> usize {
        self.surfaces.len()
    }

    fn end_all(&mut self) {
        for ((_, id), surface) in self.surfaces.drain() {
            surface.end(id);
        }
    }
}

/// Forwards surface input to the terminal's channel.
///
/// A plain thread rather than a blocking task: a surface may block on
/// input forever and must not hold up runtime shutdown.
fn spawn_reader(
    machine: &Designation,
    id: TerminalId,
    surface: Arc<dyn IoSurface>,
    input: mpsc::UnboundedSender<String>,
) {
    let name = format!("io-{machine}-{id}");
    let spawned = std::thread::Builder::new().name(name).spawn(move || {
        while let Some(line) = surface.read_line() {
            if input.send(line).is_err() {
                break;
            }
        }
    });
    if let Err(e) = spawned {
        warn!(machine = %machine, terminal = %id, error = %e, "failed to spawn reader");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::io::{IoQueue, MachineStream, Terminals};
    use crate::testing::MemorySurfaceFactory;
    use compsim_types::MachineId;

    fn machine(name: &str) -> Designation {
        Designation::new(MachineId::new(0), name).expect("name")
    }

    #[test]
    fn write_reaches_surface_and_input_returns() {
        let (queue, rx) = IoQueue::channel();
        let factory = Arc::new(MemorySurfaceFactory::new());
        let mut bridge = IoBridge::new(rx, factory.clone());
        let m = machine("bridge");
        let bus = Arc::new(EventBus::with_default_taxonomy(m.clone()));
        let terms = Terminals::new(m.clone(), queue, bus);

        let term = terms.open(None);
        term.write_line("hello");
        assert_eq!(bridge.pump(), 2);
        assert_eq!(bridge.surface_count(), 1);

        let surface = factory.surface(&m, term.id()).expect("surface");
        assert_eq!(surface.prefix(), DEFAULT_PREFIX);
        assert_eq!(surface.output(), vec!["hello"]);

        surface.type_line("whoami");
        assert_eq!(term.read_line().as_deref(), Some("whoami"));
    }

    #[test]
    fn surfaces_are_keyed_per_machine() {
        let (queue, rx) = IoQueue::channel();
        let factory = Arc::new(MemorySurfaceFactory::new());
        let mut bridge = IoBridge::new(rx, factory.clone()).with_prefix("$ ");
        let a = machine("a");
        let b = machine("b");
        let ta = Terminals::new(
            a.clone(),
            queue.clone(),
            Arc::new(EventBus::with_default_taxonomy(a.clone())),
        );
        let tb = Terminals::new(
            b.clone(),
            queue,
            Arc::new(EventBus::with_default_taxonomy(b.clone())),
        );
        let first = ta.open(None);
        let second = tb.open(Some("b> "));
        first.write_line("from a");
        second.write_line("from b");
        bridge.pump();

        assert_eq!(first.id(), second.id());
        let sa = factory.surface(&a, first.id()).expect("surface a");
        let sb = factory.surface(&b, second.id()).expect("surface b");
        assert_eq!(sa.prefix(), "$ ");
        assert_eq!(sb.prefix(), "b> ");
        assert_eq!(sa.output(), vec!["from a"]);
        assert_eq!(sb.output(), vec!["from b"]);

        ta.close(first.id()).expect("close");
        bridge.pump();
        assert_eq!(bridge.surface_count(), 1);
        assert!(sa.is_ended());
        assert!(!sb.is_ended());
    }

    #[tokio::test]
    async fn run_ends_surfaces_when_queue_drops() {
        let (queue, rx) = IoQueue::channel();
        let factory = Arc::new(MemorySurfaceFactory::new());
        let bridge = IoBridge::new(rx, factory.clone());
        let m = machine("run");
        let terms = Terminals::new(
            m.clone(),
            queue,
            Arc::new(EventBus::with_default_taxonomy(m.clone())),
        );
        let term = terms.open(None);
        drop(terms);
        let id = term.id();
        drop(term);

        bridge.run().await;
        let surface = factory.surface(&m, id).expect("surface");
        assert!(surface.is_ended());
    }
}
