//! The immutable event record.

use crate::EventCategory;
use compsim_types::Designation;
use serde::{Deserialize, Serialize};

/// A named, categorized occurrence on one machine.
///
/// All fields are private: once constructed an event cannot be changed,
/// so every subscriber observes exactly what the publisher sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    machine: Designation,
    name: String,
    category: EventCategory,
    params: Vec<String>,
}

impl Event {
    /// Creates an event.
    #[must_use]
    pub fn new(
        machine: Designation,
        name: impl Into<String>,
        category: EventCategory,
        params: Vec<String>,
    ) -> Self {
        Self {
            machine,
            name: name.into(),
            category,
            params,
        }
    }

    /// Machine the event belongs to.
    #[must_use]
    pub fn machine(&self) -> &Designation {
        &self.machine
    }

    /// Event name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Category tag.
    #[must_use]
    pub fn category(&self) -> &EventCategory {
        &self.category
    }

    /// All string-encoded parameters.
    #[must_use]
    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Parameter at `index`, if present.
    #[must_use]
    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compsim_types::MachineId;

    fn machine() -> Designation {
        Designation::new(MachineId::new(1), "bench").expect("valid name")
    }

    #[test]
    fn accessors_expose_fields() {
        let ev = Event::new(
            machine(),
            "moved",
            EventCategory::Mouse,
            vec!["10".into(), "20".into()],
        );
        assert_eq!(ev.name(), "moved");
        assert_eq!(ev.category(), &EventCategory::Mouse);
        assert_eq!(ev.machine().as_str(), "1_bench");
        assert_eq!(ev.params().len(), 2);
        assert_eq!(ev.param(1), Some("20"));
        assert_eq!(ev.param(2), None);
    }

    #[test]
    fn serializes_for_history_dumps() {
        let ev = Event::new(machine(), "scrolled", EventCategory::Mouse, vec!["-1".into()]);
        let json = serde_json::to_string(&ev).expect("serialize");
        let back: Event = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, ev);
    }
}
