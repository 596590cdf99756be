//! The metadata file.

use super::{PersistError, Persistable};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File name of a machine's metadata file.
pub const META_FILE_NAME: &str = "meta.dt";

/// One `designation=type:payload` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedEntry {
    pub designation: String,
    pub type_tag: String,
    pub payload: String,
}

impl PersistedEntry {
    /// Builds an entry, validating that it fits on one line.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::InvalidEntry`] if the designation contains
    /// `=`, the type contains `:`, or any part contains a line break.
    pub fn new(
        designation: impl Into<String>,
        type_tag: impl Into<String>,
        payload: impl Into<String>,
    ) -> Result<Self, PersistError> {
        let entry = Self {
            designation: designation.into(),
            type_tag: type_tag.into(),
            payload: payload.into(),
        };
        let reason = if entry.designation.is_empty() {
            Some("empty designation")
        } else if entry.designation.contains('=') {
            Some("designation contains '='")
        } else if entry.type_tag.contains(':') {
            Some("type contains ':'")
        } else if [&entry.designation, &entry.type_tag, &entry.payload]
            .iter()
            .any(|s| s.contains(['\n', '\r']))
        {
            Some("line break in entry")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(PersistError::InvalidEntry {
                designation: entry.designation,
                reason: reason.to_string(),
            }),
            None => Ok(entry),
        }
    }

    /// Parses a line. Returns `None` if either delimiter is missing.
    #[must_use]
    pub fn parse_line(line: &str) -> Option<Self> {
        let (designation, rest) = line.split_once('=')?;
        let (type_tag, payload) = rest.split_once(':')?;
        if designation.is_empty() {
            return None;
        }
        Some(Self {
            designation: designation.to_string(),
            type_tag: type_tag.to_string(),
            payload: payload.to_string(),
        })
    }

    /// Formats the entry as a line, without terminator.
    #[must_use]
    pub fn to_line(&self) -> String {
        format!("{}={}:{}", self.designation, self.type_tag, self.payload)
    }
}

/// Result of restoring one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Restore {
    /// The entity parsed its entry.
    Applied,
    /// No entry with the entity's designation.
    Absent,
    /// The entry exists but could not be parsed; the entity is unchanged.
    Corrupt,
}

/// In-memory view of a metadata file.
///
/// Entries keep first-insertion order; adding an existing designation
/// replaces its entry in place.
#[derive(Debug)]
pub struct MetaStore {
    path: PathBuf,
    entries: Vec<PersistedEntry>,
}

impl MetaStore {
    /// Binds a store to `path` without touching the disk.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Vec::new(),
        }
    }

    /// Bound file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces in-memory entries with the file's contents.
    ///
    /// Returns `false` if the file does not exist yet. Malformed lines
    /// are skipped with a warning; a later line for the same designation
    /// replaces an earlier one.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::Io`] if the file exists but cannot be read.
    pub fn load(&mut self) -> Result<bool, PersistError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no metadata file yet");
            return Ok(false);
        }
        let text = fs::read_to_string(&self.path).map_err(|e| PersistError::io(&self.path, e))?;
        self.entries.clear();
        for (idx, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match PersistedEntry::parse_line(line) {
                Some(entry) => self.upsert(entry),
                None => warn!(line = idx + 1, "skipping malformed metadata line"),
            }
        }
        debug!(entries = self.entries.len(), "loaded metadata");
        Ok(true)
    }

    /// Adds or replaces the entry for `item`.
    ///
    /// # Errors
    ///
    /// Returns the item's serialization error or
    /// [`PersistError::InvalidEntry`].
    pub fn add(&mut self, item: &dyn Persistable) -> Result<(), PersistError> {
        let entry = PersistedEntry::new(item.designation(), item.type_tag(), item.serialize()?)?;
        self.upsert(entry);
        Ok(())
    }

    /// Adds or replaces a raw entry.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::InvalidEntry`] if the entry does not fit
    /// the line format.
    pub fn add_raw(
        &mut self,
        designation: &str,
        type_tag: &str,
        payload: &str,
    ) -> Result<(), PersistError> {
        self.upsert(PersistedEntry::new(designation, type_tag, payload)?);
        Ok(())
    }

    fn upsert(&mut self, entry: PersistedEntry) {
        match self
            .entries
            .iter_mut()
            .find(|e| e.designation == entry.designation)
        {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    /// Entry for `designation`.
    #[must_use]
    pub fn entry(&self, designation: &str) -> Option<&PersistedEntry> {
        self.entries.iter().find(|e| e.designation == designation)
    }

    /// All entries.
    #[must_use]
    pub fn entries(&self) -> &[PersistedEntry] {
        &self.entries
    }

    /// Drops the entry for `designation`.
    pub fn remove(&mut self, designation: &str) -> Option<PersistedEntry> {
        let idx = self
            .entries
            .iter()
            .position(|e| e.designation == designation)?;
        Some(self.entries.remove(idx))
    }

    /// Feeds the entry for `item`'s designation to its parser.
    ///
    /// A type mismatch or parse failure is logged and reported as
    /// [`Restore::Corrupt`]; it never aborts the caller.
    pub fn restore(&self, item: &mut dyn Persistable) -> Restore {
        let Some(entry) = self.entry(item.designation()) else {
            return Restore::Absent;
        };
        if entry.type_tag != item.type_tag() {
            warn!(
                designation = %entry.designation,
                expected = item.type_tag(),
                found = %entry.type_tag,
                "metadata entry has unexpected type, skipping"
            );
            return Restore::Corrupt;
        }
        match item.parse(&entry.payload) {
            Ok(()) => Restore::Applied,
            Err(e) => {
                warn!(designation = %entry.designation, error = %e, "corrupt metadata entry, skipping");
                Restore::Corrupt
            }
        }
    }

    /// Restores every item, continuing past failures.
    ///
    /// Returns the number of items that were applied.
    pub fn restore_all(&self, items: &mut [&mut dyn Persistable]) -> usize {
        let mut applied = 0;
        for item in items.iter_mut() {
            if self.restore(&mut **item) == Restore::Applied {
                applied += 1;
            }
        }
        applied
    }

    /// Writes all entries to the bound file.
    ///
    /// Writes to a temporary sibling first and renames it into place, so
    /// a crash mid-write leaves the previous checkpoint intact.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::Io`] on any filesystem failure.
    pub fn save(&self) -> Result<(), PersistError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| PersistError::io(parent, e))?;
        }
        let mut text = String::new();
        for entry in &self.entries {
            text.push_str(&entry.to_line());
            text.push('\n');
        }
        let temp = self.path.with_extension("dt.tmp");
        fs::write(&temp, text).map_err(|e| PersistError::io(&temp, e))?;
        fs::rename(&temp, &self.path).map_err(|e| PersistError::io(&self.path, e))?;
        debug!(path = %self.path.display(), entries = self.entries.len(), "saved metadata");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::StringEntry;
    use tempfile::TempDir;

    struct Counter {
        value: u32,
    }

    impl Persistable for Counter {
        fn type_tag(&self) -> &str {
            "counter"
        }

        fn designation(&self) -> &str {
            "counter"
        }

        fn serialize(&self) -> Result<String, PersistError> {
            Ok(self.value.to_string())
        }

        fn parse(&mut self, text: &str) -> Result<(), PersistError> {
            self.value = text
                .parse()
                .map_err(|e| PersistError::corrupt("counter", e))?;
            Ok(())
        }
    }

    fn temp_store() -> (TempDir, MetaStore) {
        let dir = TempDir::new().expect("create temp dir");
        let store = MetaStore::new(dir.path().join(META_FILE_NAME));
        (dir, store)
    }

    #[test]
    fn load_missing_file_returns_false() {
        let (_dir, mut store) = temp_store();
        assert!(!store.load().expect("load"));
        assert!(store.entries().is_empty());
    }

    #[test]
    fn save_then_load_round_trip() {
        let (_dir, mut store) = temp_store();
        store.add(&Counter { value: 7 }).expect("add");
        store
            .add(&StringEntry::new("machine_desig", "0_test"))
            .expect("add string");
        store.save().expect("save");

        let mut reloaded = MetaStore::new(store.path());
        assert!(reloaded.load().expect("load"));
        let mut counter = Counter { value: 0 };
        assert_eq!(reloaded.restore(&mut counter), Restore::Applied);
        assert_eq!(counter.value, 7);

        let mut desig = StringEntry::new("machine_desig", "");
        assert_eq!(reloaded.restore(&mut desig), Restore::Applied);
        assert_eq!(desig.value(), "0_test");
    }

    #[test]
    fn splits_on_first_delimiters() {
        let entry = PersistedEntry::parse_line("k=t:a=b:c").expect("parse");
        assert_eq!(entry.designation, "k");
        assert_eq!(entry.type_tag, "t");
        assert_eq!(entry.payload, "a=b:c");
        assert!(PersistedEntry::parse_line("no delimiters").is_none());
        assert!(PersistedEntry::parse_line("k=missing colon").is_none());
    }

    #[test]
    fn rejects_entries_that_break_lines() {
        assert!(PersistedEntry::new("a=b", "t", "p").is_err());
        assert!(PersistedEntry::new("a", "t:x", "p").is_err());
        assert!(PersistedEntry::new("a", "t", "p\nq").is_err());
        assert!(PersistedEntry::new("", "t", "p").is_err());
    }

    #[test]
    fn unknown_and_malformed_lines_are_tolerated() {
        let (_dir, mut store) = temp_store();
        fs::write(
            store.path(),
            "garbage line\nfuture_thing=widget:{}\ncounter=counter:3\n\n",
        )
        .expect("write");
        assert!(store.load().expect("load"));
        assert_eq!(store.entries().len(), 2);
        let mut counter = Counter { value: 0 };
        assert_eq!(store.restore(&mut counter), Restore::Applied);
        assert_eq!(counter.value, 3);
    }

    #[test]
    fn corrupt_entry_is_skipped_and_others_continue() {
        let (_dir, mut store) = temp_store();
        fs::write(
            store.path(),
            "counter=counter:not-a-number\nmachine_desig=str:\"0_x\"\n",
        )
        .expect("write");
        store.load().expect("load");

        let mut counter = Counter { value: 9 };
        let mut desig = StringEntry::new("machine_desig", "");
        let mut items: [&mut dyn Persistable; 2] = [&mut counter, &mut desig];
        let applied = store.restore_all(&mut items);
        assert_eq!(applied, 1);
        assert_eq!(counter.value, 9);
        assert_eq!(desig.value(), "0_x");
    }

    #[test]
    fn later_line_wins_and_add_replaces() {
        let (_dir, mut store) = temp_store();
        fs::write(store.path(), "counter=counter:1\ncounter=counter:2\n").expect("write");
        store.load().expect("load");
        assert_eq!(store.entries().len(), 1);
        assert_eq!(store.entry("counter").map(|e| e.payload.as_str()), Some("2"));

        store.add(&Counter { value: 5 }).expect("add");
        assert_eq!(store.entries().len(), 1);
        assert_eq!(store.entry("counter").map(|e| e.payload.as_str()), Some("5"));
    }

    #[test]
    fn type_mismatch_is_corrupt() {
        let (_dir, mut store) = temp_store();
        store.add_raw("counter", "str", "\"x\"").expect("add raw");
        let mut counter = Counter { value: 1 };
        assert_eq!(store.restore(&mut counter), Restore::Corrupt);
        assert_eq!(counter.value, 1);
    }

    #[test]
    fn save_leaves_no_temp_file() {
        let (dir, mut store) = temp_store();
        store.add(&Counter { value: 1 }).expect("add");
        store.save().expect("save");
        let names: Vec<_> = fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![META_FILE_NAME.to_string()]);
    }
}
