//! Persistence codec for machine metadata.
//!
//! Durable entities implement [`Persistable`]. A [`MetaStore`] collects
//! their encodings and writes them as one line each to the machine's
//! metadata file:
//!
//! ```text
//! designation=type:payload
//! machine_desig=str:"0_test"
//! user_registry=user_registry:{"users":[...],"groups":[],"current":"test_user"}
//! last_saved=timestamp:2026-10-19T12:00:00+00:00
//! ```
//!
//! The designation ends at the first `=`, the type at the first `:` after
//! it; the payload is the rest of the line and never contains a newline.
//!
//! # Checkpoint Semantics
//!
//! Nothing is written until an owner calls [`MetaStore::save`]. The file
//! is a checkpoint, not a live mirror of memory.
//!
//! # Tolerance
//!
//! | Situation on load/restore | Result |
//! |---------------------------|--------|
//! | Malformed line | skipped, `warn!` |
//! | Designation nobody asks for | ignored |
//! | Payload the owner cannot parse | [`Restore::Corrupt`], `warn!` |

mod entries;
mod error;
mod store;

pub use entries::{StringEntry, TimestampEntry, MACHINE_DESIG, LAST_SAVED};
pub use error::PersistError;
pub use store::{MetaStore, PersistedEntry, Restore, META_FILE_NAME};

/// An entity with a durable text encoding.
pub trait Persistable {
    /// Type tag written between `=` and `:`.
    fn type_tag(&self) -> &str;

    /// Key identifying this entity in the metadata file.
    fn designation(&self) -> &str;

    /// Encodes the entity. Must not contain newlines.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError`] if the entity cannot be encoded.
    fn serialize(&self) -> Result<String, PersistError>;

    /// Replaces this entity's state from an encoding produced by
    /// [`serialize`](Self::serialize).
    ///
    /// # Errors
    ///
    /// Returns [`PersistError`] if `text` cannot be decoded. The entity
    /// should be left unchanged in that case.
    fn parse(&mut self, text: &str) -> Result<(), PersistError>;
}
