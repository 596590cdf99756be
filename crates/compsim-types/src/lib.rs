//! Core types for compsim.
//!
//! This crate holds the identifier types shared by every layer of the
//! machine simulation, plus the [`ErrorCode`] interface implemented by
//! each layer's error enum.
//!
//! # Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  compsim-types   : ids, Designation, ErrorCode   ◄── HERE    │
//! │  compsim-event   : Event, EventCategory, taxonomy            │
//! │  compsim-auth    : CapabilitySet, UserRegistry               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  compsim-runtime : vfs, bus, persist, process, machine, io   │
//! │  compsim-lua     : Lua ScriptEngine                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  compsim-cli     : `compsim` binary                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use compsim_types::{Designation, MachineId};
//!
//! let desig = Designation::new(MachineId::new(0), "test").unwrap();
//! assert_eq!(desig.as_str(), "0_test");
//! ```

mod designation;
pub mod error;
mod id;

pub use designation::{Designation, DesignationError};
pub use error::ErrorCode;
pub use id::{MachineId, ProcessId, TerminalId};
