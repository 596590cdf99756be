//! Machine streams and the I/O bridge.
//!
//! Processes read and write through a [`MachineStream`]. A stream may be
//! purely internal ([`BufferStream`], [`LogStream`]) or the machine side of
//! an external terminal ([`TerminalStream`]).
//!
//! # Architecture
//!
//! ```text
//!  machine thread                      │  bridge task               external
//! ─────────────────────────────────────┼──────────────────────────────────────
//!  Terminals::open ──StartTerminal──►  │  IoBridge ── factory.open ─► IoSurface
//!                                      │      │                        │
//!  TerminalStream::write_line          │      │                        │
//!        └──────────WriteLine────────► │      └── surface.write_line ─►│
//!                                      │                               │
//!  TerminalStream::read_line ◄── input channel ◄── reader thread ◄─ read_line
//!        └─► bus.trigger("text_entered")
//! ```
//!
//! Requests travel on the [`IoQueue`], separate from the machine's event
//! bus. Machine state is never touched from the bridge side; the only way
//! back in is the per-terminal input channel.
//!
//! Input is a blocking receive on that channel: a process waiting for a
//! line sleeps until exactly one line arrives, and only that process
//! waits.

mod bridge;
mod error;
mod queue;
mod stream;
mod terminal;

pub use bridge::{IoBridge, IoSurface, SurfaceFactory, DEFAULT_PREFIX};
pub use error::BridgeError;
pub use queue::{IoQueue, IoRequest};
pub use stream::{BufferStream, LogStream, MachineStream, StreamInfo};
pub use terminal::{TerminalStream, Terminals};
