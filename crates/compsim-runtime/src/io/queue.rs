//! Requests from machines to the I/O bridge.

use super::BridgeError;
use compsim_types::{Designation, TerminalId};
use tokio::sync::mpsc;

/// A request for the external presentation side.
#[derive(Debug)]
pub enum IoRequest {
    /// Open a surface for terminal `id` and feed its input into `input`.
    StartTerminal {
        machine: Designation,
        id: TerminalId,
        prefix: Option<String>,
        input: mpsc::UnboundedSender<String>,
    },
    /// Close terminal `id`.
    EndTerminal { machine: Designation, id: TerminalId },
    /// Show a line on terminal `id`.
    WriteLine {
        machine: Designation,
        id: TerminalId,
        text: String,
    },
}

/// Sending side of the I/O queue. Cheap to clone.
///
/// Unbounded, so a machine never blocks on a slow surface.
#[derive(Debug, Clone)]
pub struct IoQueue {
    tx: mpsc::UnboundedSender<IoRequest>,
}

impl IoQueue {
    /// Creates a queue and the receiver the bridge consumes.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<IoRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue with no bridge attached. Every send reports
    /// [`BridgeError::Closed`].
    #[must_use]
    pub fn detached() -> Self {
        let (queue, _rx) = Self::channel();
        queue
    }

    /// Enqueues a request.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Closed`] if the bridge has stopped.
    pub fn send(&self, request: IoRequest) -> Result<(), BridgeError> {
        self.tx.send(request).map_err(|_| BridgeError::Closed)
    }

    /// Whether the bridge has stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compsim_types::MachineId;

    fn machine() -> Designation {
        Designation::new(MachineId::new(0), "q").expect("name")
    }

    #[test]
    fn requests_arrive_in_order() {
        let (queue, mut rx) = IoQueue::channel();
        queue
            .send(IoRequest::EndTerminal {
                machine: machine(),
                id: TerminalId::new(1),
            })
            .expect("send");
        queue
            .send(IoRequest::WriteLine {
                machine: machine(),
                id: TerminalId::new(1),
                text: "x".into(),
            })
            .expect("send");
        assert!(matches!(rx.try_recv(), Ok(IoRequest::EndTerminal { .. })));
        assert!(matches!(rx.try_recv(), Ok(IoRequest::WriteLine { .. })));
    }

    #[test]
    fn detached_queue_reports_closed() {
        let queue = IoQueue::detached();
        assert!(queue.is_closed());
        let err = queue
            .send(IoRequest::EndTerminal {
                machine: machine(),
                id: TerminalId::new(0),
            })
            .expect_err("no receiver");
        assert_eq!(err, BridgeError::Closed);
    }
}
