//! Event types for compsim machines.
//!
//! An [`Event`] is an immutable record of something that happened on a
//! machine: a key press, a pointer move, a terminal being opened. Events
//! are published on the machine's event bus (in `compsim-runtime`) and
//! delivered synchronously to subscribers.
//!
//! # Default Taxonomy
//!
//! | Name | Category | Params |
//! |------|----------|--------|
//! | `key_pressed` | `key` | key code |
//! | `key_released` | `key` | key code |
//! | `text_entered` | `key` | `"text: <line>"` |
//! | `button_pressed` | `mouse` | button, x, y |
//! | `scrolled` | `mouse` | amount |
//! | `moved` | `mouse` | x, y |
//! | `start_terminal` | `lifecycle` | terminal id |
//! | `end_terminal` | `lifecycle` | terminal id |
//!
//! # Example
//!
//! ```
//! use compsim_event::{Event, EventCategory, names};
//! use compsim_types::{Designation, MachineId};
//!
//! let machine = Designation::new(MachineId::new(0), "test").unwrap();
//! let event = Event::new(machine, names::START_TERMINAL, EventCategory::Lifecycle, vec!["3".into()]);
//! assert_eq!(event.param(0), Some("3"));
//! ```

mod category;
mod error;
mod event;
pub mod names;

pub use category::EventCategory;
pub use error::EventError;
pub use event::Event;
pub use names::default_taxonomy;
