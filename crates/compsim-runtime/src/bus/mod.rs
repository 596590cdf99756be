//! Per-machine event bus.
//!
//! The [`EventBus`] delivers named, categorized [`Event`]s to subscribers
//! synchronously: [`EventBus::trigger`] returns after every subscriber has
//! run.
//!
//! # Ordering
//!
//! ```text
//! subscribe(A) ─┐
//! subscribe(B) ─┼─► trigger("moved") ─► A(&ev) ─► B(&ev) ─► C(&ev) ─► return 3
//! subscribe(C) ─┘
//! ```
//!
//! Subscribers for one name run in registration order. Triggers on one bus
//! dispatch in trigger order. Categories only group names for listing.
//!
//! # Reentrancy
//!
//! Dispatch works on a snapshot of the subscriber list taken under the
//! lock; the lock is released before any callback runs. Callbacks may
//! therefore trigger, subscribe or unsubscribe on the same bus.
//! Each subscription carries an `active` flag checked right before its
//! callback runs, so once [`EventBus::unsubscribe`] returns, no later
//! dispatch invokes it, including the remainder of a dispatch already in
//! progress on the same thread.
//!
//! The check and the call happen under a per-subscription read guard.
//! `unsubscribe` clears the flag and then takes the write side, so it
//! returns only after every call already running on another thread has
//! finished. A callback that unsubscribes itself skips that wait.
//!
//! # External I/O
//!
//! Requests for external surfaces (opening a terminal, writing a line)
//! do not go through this bus; they go onto the separate
//! [`IoQueue`](crate::io::IoQueue) so a slow surface cannot stall dispatch.

use compsim_event::{default_taxonomy, Event, EventCategory, EventError};
use compsim_types::Designation;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::trace;

/// Number of recent events kept for inspection.
pub const HISTORY_LEN: usize = 64;

/// Subscriber callback.
pub type EventCallback = Arc<dyn Fn(&Event) + Send + Sync>;

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    active: AtomicBool,
    /// Held shared for the duration of each call.
    gate: RwLock<()>,
    /// Threads currently inside this callback.
    dispatching: Mutex<Vec<ThreadId>>,
    callback: EventCallback,
}

impl Subscription {
    fn new(id: SubscriptionId, callback: EventCallback) -> Self {
        Self {
            id,
            active: AtomicBool::new(true),
            gate: RwLock::new(()),
            dispatching: Mutex::new(Vec::new()),
            callback,
        }
    }

    /// Runs the callback unless deactivated. Returns whether it ran.
    fn invoke(&self, event: &Event) -> bool {
        // Recursive read: a nested trigger on this thread must not queue
        // behind a writer waiting for the outer call.
        let _guard = self.gate.read_recursive();
        if !self.active.load(Ordering::Acquire) {
            return false;
        }
        let me = thread::current().id();
        self.dispatching.lock().push(me);
        (self.callback)(event);
        let mut dispatching = self.dispatching.lock();
        if let Some(idx) = dispatching.iter().position(|t| *t == me) {
            dispatching.swap_remove(idx);
        }
        true
    }

    /// Deactivates and waits out calls running on other threads.
    fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
        let me = thread::current().id();
        if self.dispatching.lock().contains(&me) {
            return;
        }
        drop(self.gate.write());
    }
}

#[derive(Default)]
struct BusState {
    types: BTreeMap<String, EventCategory>,
    subscribers: HashMap<String, Vec<Arc<Subscription>>>,
    history: VecDeque<Event>,
}

/// Synchronous publish/dispatch for one machine.
///
/// Shared as `Arc<EventBus>`; all methods take `&self`.
pub struct EventBus {
    machine: Designation,
    state: Mutex<BusState>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("EventBus")
            .field("machine", &self.machine)
            .field("types", &state.types.len())
            .finish_non_exhaustive()
    }
}

impl EventBus {
    /// Empty bus for `machine`.
    #[must_use]
    pub fn new(machine: Designation) -> Self {
        Self {
            machine,
            state: Mutex::new(BusState::default()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Bus with the builtin key, mouse and terminal lifecycle events.
    #[must_use]
    pub fn with_default_taxonomy(machine: Designation) -> Self {
        let bus = Self::new(machine);
        {
            let mut state = bus.state.lock();
            for (name, category) in default_taxonomy() {
                state.types.insert(name.to_string(), category);
            }
        }
        bus
    }

    /// Machine this bus belongs to.
    #[must_use]
    pub fn machine(&self) -> &Designation {
        &self.machine
    }

    /// Registers an event name.
    ///
    /// Registering the same name with the same category again is a no-op.
    ///
    /// # Errors
    ///
    /// - [`EventError::InvalidName`] for empty or whitespace-containing names
    /// - [`EventError::CategoryConflict`] if the name has another category
    pub fn register_event_type(
        &self,
        name: &str,
        category: EventCategory,
    ) -> Result<(), EventError> {
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(EventError::InvalidName(name.to_string()));
        }
        let mut state = self.state.lock();
        match state.types.get(name) {
            Some(existing) if *existing == category => Ok(()),
            Some(existing) => Err(EventError::CategoryConflict {
                name: name.to_string(),
                existing: existing.clone(),
                requested: category,
            }),
            None => {
                state.types.insert(name.to_string(), category);
                Ok(())
            }
        }
    }

    /// Subscribes `callback` to `name`.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::UnknownEvent`] if `name` is not registered.
    pub fn subscribe<F>(&self, name: &str, callback: F) -> Result<SubscriptionId, EventError>
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let mut state = self.state.lock();
        if !state.types.contains_key(name) {
            return Err(EventError::UnknownEvent(name.to_string()));
        }
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        state
            .subscribers
            .entry(name.to_string())
            .or_default()
            .push(Arc::new(Subscription::new(id, Arc::new(callback))));
        Ok(id)
    }

    /// Removes a subscription. Returns `false` if it was not present.
    ///
    /// If the callback is running on another thread, blocks until that
    /// call returns.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = {
            let mut state = self.state.lock();
            state.subscribers.values_mut().find_map(|subs| {
                subs.iter()
                    .position(|s| s.id == id)
                    .map(|idx| subs.remove(idx))
            })
        };
        match removed {
            Some(sub) => {
                sub.deactivate();
                true
            }
            None => false,
        }
    }

    /// Publishes an event and runs every subscriber before returning.
    ///
    /// Returns the number of subscribers invoked.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::UnknownEvent`] if `name` is not registered.
    pub fn trigger(&self, name: &str, params: Vec<String>) -> Result<usize, EventError> {
        let (event, snapshot) = {
            let mut state = self.state.lock();
            let category = state
                .types
                .get(name)
                .cloned()
                .ok_or_else(|| EventError::UnknownEvent(name.to_string()))?;
            let event = Event::new(self.machine.clone(), name, category, params);
            if state.history.len() == HISTORY_LEN {
                state.history.pop_front();
            }
            state.history.push_back(event.clone());
            let snapshot = state.subscribers.get(name).cloned().unwrap_or_default();
            (event, snapshot)
        };

        let mut invoked = 0;
        for sub in &snapshot {
            if sub.invoke(&event) {
                invoked += 1;
            }
        }
        trace!(machine = %self.machine, event = name, invoked, "dispatched event");
        Ok(invoked)
    }

    /// All registered names with their categories, sorted by name.
    #[must_use]
    pub fn event_types(&self) -> Vec<(String, EventCategory)> {
        let state = self.state.lock();
        state
            .types
            .iter()
            .map(|(n, c)| (n.clone(), c.clone()))
            .collect()
    }

    /// Names registered under `category`, sorted.
    #[must_use]
    pub fn events_in(&self, category: &EventCategory) -> Vec<String> {
        let state = self.state.lock();
        state
            .types
            .iter()
            .filter(|(_, c)| *c == category)
            .map(|(n, _)| n.clone())
            .collect()
    }

    /// Category of a registered name.
    #[must_use]
    pub fn category_of(&self, name: &str) -> Option<EventCategory> {
        self.state.lock().types.get(name).cloned()
    }

    /// Number of live subscriptions for `name`.
    #[must_use]
    pub fn subscriber_count(&self, name: &str) -> usize {
        self.state
            .lock()
            .subscribers
            .get(name)
            .map_or(0, Vec::len)
    }

    /// Up to `limit` most recent events, oldest first.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<Event> {
        let state = self.state.lock();
        let skip = state.history.len().saturating_sub(limit);
        state.history.iter().skip(skip).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compsim_event::names;
    use compsim_types::MachineId;

    fn bus() -> EventBus {
        EventBus::with_default_taxonomy(
            Designation::new(MachineId::new(0), "test").expect("valid name"),
        )
    }

    fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &str) -> impl Fn(&Event) + Send + Sync {
        let log = Arc::clone(log);
        let tag = tag.to_string();
        move |ev: &Event| log.lock().push(format!("{tag}:{}", ev.name()))
    }

    #[test]
    fn dispatch_follows_registration_order() {
        let bus = bus();
        let log = Arc::new(Mutex::new(Vec::new()));
        for tag in ["A", "B", "C"] {
            bus.subscribe(names::MOVED, recorder(&log, tag))
                .expect("subscribe");
        }
        let invoked = bus
            .trigger(names::MOVED, vec!["1".into(), "2".into()])
            .expect("trigger");
        assert_eq!(invoked, 3);
        assert_eq!(*log.lock(), vec!["A:moved", "B:moved", "C:moved"]);
    }

    #[test]
    fn unknown_event_is_an_error() {
        let bus = bus();
        assert_eq!(
            bus.trigger("nope", Vec::new()),
            Err(EventError::UnknownEvent("nope".into()))
        );
        assert!(bus.subscribe("nope", |_| {}).is_err());
    }

    #[test]
    fn unsubscribed_callback_is_not_invoked() {
        let bus = bus();
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = bus
            .subscribe(names::SCROLLED, recorder(&log, "A"))
            .expect("subscribe");
        bus.subscribe(names::SCROLLED, recorder(&log, "B"))
            .expect("subscribe");
        assert!(bus.unsubscribe(a));
        assert!(!bus.unsubscribe(a));
        bus.trigger(names::SCROLLED, Vec::new()).expect("trigger");
        assert_eq!(*log.lock(), vec!["B:scrolled"]);
    }

    #[test]
    fn unsubscribe_during_dispatch_skips_later_subscriber() {
        let bus = Arc::new(bus());
        let log = Arc::new(Mutex::new(Vec::new()));
        let victim = Arc::new(Mutex::new(None));

        let bus_in = Arc::clone(&bus);
        let victim_in = Arc::clone(&victim);
        let log_a = Arc::clone(&log);
        bus.subscribe(names::KEY_PRESSED, move |_| {
            log_a.lock().push("A".to_string());
            if let Some(id) = victim_in.lock().take() {
                bus_in.unsubscribe(id);
            }
        })
        .expect("subscribe A");
        let b = bus
            .subscribe(names::KEY_PRESSED, recorder(&log, "B"))
            .expect("subscribe B");
        *victim.lock() = Some(b);

        let invoked = bus.trigger(names::KEY_PRESSED, Vec::new()).expect("trigger");
        assert_eq!(invoked, 1);
        assert_eq!(*log.lock(), vec!["A"]);
    }

    #[test]
    fn unsubscribe_waits_for_a_call_on_another_thread() {
        use std::sync::mpsc;
        use std::time::Duration;

        let bus = Arc::new(bus());
        let calls = Arc::new(AtomicU64::new(0));
        let finished = Arc::new(AtomicBool::new(false));
        let (entered_tx, entered_rx) = mpsc::channel();

        let calls_in = Arc::clone(&calls);
        let finished_in = Arc::clone(&finished);
        let id = bus
            .subscribe(names::MOVED, move |_| {
                calls_in.fetch_add(1, Ordering::SeqCst);
                let _ = entered_tx.send(());
                thread::sleep(Duration::from_millis(100));
                finished_in.store(true, Ordering::SeqCst);
            })
            .expect("subscribe");

        let dispatcher = {
            let bus = Arc::clone(&bus);
            thread::spawn(move || bus.trigger(names::MOVED, Vec::new()))
        };
        entered_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("callback entered");

        assert!(bus.unsubscribe(id));
        assert!(finished.load(Ordering::SeqCst), "returned mid-call");

        assert_eq!(dispatcher.join().expect("join"), Ok(1));
        assert_eq!(bus.trigger(names::MOVED, Vec::new()), Ok(0));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callback_may_unsubscribe_itself() {
        let bus = Arc::new(bus());
        let own = Arc::new(Mutex::new(None));
        let calls = Arc::new(AtomicU64::new(0));

        let bus_in = Arc::clone(&bus);
        let own_in = Arc::clone(&own);
        let calls_in = Arc::clone(&calls);
        let id = bus
            .subscribe(names::BUTTON_PRESSED, move |_| {
                calls_in.fetch_add(1, Ordering::SeqCst);
                let own = *own_in.lock();
                if let Some(id) = own {
                    assert!(bus_in.unsubscribe(id));
                }
            })
            .expect("subscribe");
        *own.lock() = Some(id);

        assert_eq!(bus.trigger(names::BUTTON_PRESSED, Vec::new()), Ok(1));
        assert_eq!(bus.trigger(names::BUTTON_PRESSED, Vec::new()), Ok(0));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(names::BUTTON_PRESSED), 0);
    }

    #[test]
    fn callbacks_may_trigger_reentrantly() {
        let bus = Arc::new(bus());
        let log = Arc::new(Mutex::new(Vec::new()));
        let inner = Arc::clone(&bus);
        bus.subscribe(names::START_TERMINAL, move |ev| {
            inner
                .trigger(names::END_TERMINAL, ev.params().to_vec())
                .expect("nested trigger");
        })
        .expect("subscribe");
        bus.subscribe(names::END_TERMINAL, recorder(&log, "end"))
            .expect("subscribe");
        bus.trigger(names::START_TERMINAL, vec!["0".into()])
            .expect("trigger");
        assert_eq!(*log.lock(), vec!["end:end_terminal"]);
    }

    #[test]
    fn register_is_idempotent_but_detects_conflicts() {
        let bus = bus();
        bus.register_event_type("net_packet", EventCategory::Extension("net".into()))
            .expect("register");
        bus.register_event_type("net_packet", EventCategory::Extension("net".into()))
            .expect("same category again");
        assert!(matches!(
            bus.register_event_type("net_packet", EventCategory::Misc),
            Err(EventError::CategoryConflict { .. })
        ));
        assert!(matches!(
            bus.register_event_type("two words", EventCategory::Misc),
            Err(EventError::InvalidName(_))
        ));
    }

    #[test]
    fn categories_group_names() {
        let bus = bus();
        assert_eq!(
            bus.events_in(&EventCategory::Key),
            vec!["key_pressed", "key_released", "text_entered"]
        );
        assert_eq!(bus.events_in(&EventCategory::Mouse).len(), 3);
        assert_eq!(
            bus.category_of(names::END_TERMINAL),
            Some(EventCategory::Lifecycle)
        );
    }

    #[test]
    fn history_is_bounded() {
        let bus = bus();
        for i in 0..(HISTORY_LEN + 5) {
            bus.trigger(names::MOVED, vec![i.to_string()])
                .expect("trigger");
        }
        let recent = bus.recent(usize::MAX);
        assert_eq!(recent.len(), HISTORY_LEN);
        assert_eq!(recent.last().and_then(|e| e.param(0)), Some("68"));
        assert_eq!(bus.recent(2).len(), 2);
    }

    #[test]
    fn events_carry_machine_and_params() {
        let bus = bus();
        let seen = Arc::new(Mutex::new(None));
        let seen_in = Arc::clone(&seen);
        bus.subscribe(names::TEXT_ENTERED, move |ev| {
            *seen_in.lock() = Some(ev.clone());
        })
        .expect("subscribe");
        bus.trigger(names::TEXT_ENTERED, vec!["text: hi".into()])
            .expect("trigger");
        let ev = seen.lock().clone().expect("event seen");
        assert_eq!(ev.machine().as_str(), "0_test");
        assert_eq!(ev.param(0), Some("text: hi"));
        assert_eq!(ev.category(), &EventCategory::Key);
    }
}
