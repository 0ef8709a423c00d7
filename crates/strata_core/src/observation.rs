//! Change notifications for committed updates.
//!
//! Events are built from a [`ChangeLog`] while an update is being prepared and
//! dispatched only after the canonical store reflects the change, so no
//! observer can see a notification for state it cannot read yet.
//!
//! # Usage
//!
//! ```rust,ignore
//! use strata_core::ObservationDispatcher;
//!
//! let dispatcher = Arc::new(ObservationDispatcher::new());
//! let receiver = dispatcher.subscribe();
//!
//! // Every committed update arrives as one bundle
//! std::thread::spawn(move || {
//!     while let Ok(bundle) = receiver.recv() {
//!         println!("{} events at #{}", bundle.events.len(), bundle.sequence);
//!     }
//! });
//! ```

use crate::change_log::ChangeLog;
use crate::item::{ItemId, ItemState, NodeId};
use parking_lot::{Mutex, RwLock};
use std::sync::mpsc::{self, Receiver, Sender};

/// Kind of change an event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// A node was created.
    NodeAdded,
    /// A node was removed.
    NodeRemoved,
    /// A property was created.
    PropertyAdded,
    /// A property value changed.
    PropertyChanged,
    /// A property was removed.
    PropertyRemoved,
}

/// A single change to one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemEvent {
    /// Kind of change.
    pub event_type: EventType,
    /// The changed item.
    pub item_id: ItemId,
    /// The node owning the item, `None` for the root.
    pub parent: Option<NodeId>,
}

impl ItemEvent {
    fn from_state(state: &ItemState, node: EventType, property: EventType) -> Self {
        Self {
            event_type: if state.is_node() { node } else { property },
            item_id: state.id(),
            parent: state.parent(),
        }
    }
}

/// The events of one update, not yet dispatched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventStateCollection {
    events: Vec<ItemEvent>,
}

impl EventStateCollection {
    /// Builds the events describing a change log.
    ///
    /// Node modifications are structural bookkeeping (child lists, property
    /// names) and are reported through the events of the changed children.
    #[must_use]
    pub fn from_change_log(changes: &ChangeLog) -> Self {
        let mut events = Vec::with_capacity(changes.len());
        events.extend(changes.added_states().map(|s| {
            ItemEvent::from_state(s, EventType::NodeAdded, EventType::PropertyAdded)
        }));
        events.extend(
            changes
                .modified_states()
                .filter(|s| !s.is_node())
                .map(|s| {
                    ItemEvent::from_state(s, EventType::PropertyChanged, EventType::PropertyChanged)
                }),
        );
        events.extend(changes.deleted_states().map(|s| {
            ItemEvent::from_state(s, EventType::NodeRemoved, EventType::PropertyRemoved)
        }));
        Self { events }
    }

    /// Returns the events.
    #[must_use]
    pub fn events(&self) -> &[ItemEvent] {
        &self.events
    }

    /// Returns `true` if there is nothing to report.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Produces and publishes the notifications of an update.
///
/// `create_event_state_collection` runs while the update is being prepared;
/// `dispatch` runs after the store applied it.
pub trait EventStateCollectionFactory: Send + Sync {
    /// Builds the notifications for a change log.
    fn create_event_state_collection(&self, changes: &ChangeLog) -> EventStateCollection;

    /// Publishes notifications of a committed update.
    fn dispatch(&self, events: EventStateCollection);
}

/// The events of one committed update, as delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventBundle {
    /// Position of the update in dispatch order, starting at 1.
    pub sequence: u64,
    /// The events, added items first, then changed, then removed.
    pub events: Vec<ItemEvent>,
}

/// Fans committed event bundles out to subscribers.
///
/// The dispatcher:
/// - Emits one bundle per committed update
/// - Preserves commit order
/// - Supports multiple subscribers
/// - Keeps a bounded history for polling
pub struct ObservationDispatcher {
    /// Subscribers (senders).
    subscribers: RwLock<Vec<Sender<EventBundle>>>,
    /// Recent bundles; the lock also orders sequence assignment.
    history: Mutex<Vec<EventBundle>>,
    /// Sequence of the last bundle.
    sequence: Mutex<u64>,
    /// Maximum history size.
    max_history: usize,
}

impl ObservationDispatcher {
    /// Creates a dispatcher with the default history limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_history(1000)
    }

    /// Creates a dispatcher with a specific history limit.
    #[must_use]
    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            history: Mutex::new(Vec::new()),
            sequence: Mutex::new(0),
            max_history,
        }
    }

    /// Subscribes to all future bundles.
    pub fn subscribe(&self) -> Receiver<EventBundle> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Returns bundles with a sequence above `cursor`, up to `limit`.
    pub fn poll(&self, cursor: u64, limit: usize) -> Vec<EventBundle> {
        self.history
            .lock()
            .iter()
            .filter(|b| b.sequence > cursor)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Returns the sequence of the last dispatched bundle, 0 if none.
    pub fn latest_sequence(&self) -> u64 {
        *self.sequence.lock()
    }

    /// Returns the number of connected subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Returns the number of bundles in history.
    pub fn history_len(&self) -> usize {
        self.history.lock().len()
    }

    fn emit(&self, events: Vec<ItemEvent>) {
        let mut sequence = self.sequence.lock();
        *sequence += 1;
        let bundle = EventBundle {
            sequence: *sequence,
            events,
        };

        {
            let mut history = self.history.lock();
            history.push(bundle.clone());
            if history.len() > self.max_history {
                let to_remove = history.len() - self.max_history;
                history.drain(0..to_remove);
            }
        }

        // Send while still holding the sequence lock so subscribers see
        // bundles in order; disconnected receivers are dropped
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| tx.send(bundle.clone()).is_ok());
    }
}

impl Default for ObservationDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ObservationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservationDispatcher")
            .field("latest_sequence", &self.latest_sequence())
            .field("subscribers", &self.subscriber_count())
            .finish_non_exhaustive()
    }
}

impl EventStateCollectionFactory for ObservationDispatcher {
    fn create_event_state_collection(&self, changes: &ChangeLog) -> EventStateCollection {
        EventStateCollection::from_change_log(changes)
    }

    fn dispatch(&self, events: EventStateCollection) {
        if !events.is_empty() {
            self.emit(events.events);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{NodeState, PropertyId, PropertyState, Value};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn one_node_log() -> (ChangeLog, NodeId) {
        let id = NodeId::new();
        let mut log = ChangeLog::new();
        log.add(NodeState::new(id, Some(NodeId::new()), "nt:file").into());
        (log, id)
    }

    #[test]
    fn events_follow_change_log_sets() {
        let owner = NodeId::new();
        let mut log = ChangeLog::new();
        log.add(NodeState::new(NodeId::new(), Some(owner), "nt:file").into());
        log.modify(NodeState::new(owner, None, "nt:folder").into());
        log.modify(PropertyState::new(PropertyId::new(owner, "title"), Value::from("x")).into());
        log.delete(PropertyState::new(PropertyId::new(owner, "old"), Value::from("y")).into());

        let events = EventStateCollection::from_change_log(&log);
        let types: Vec<_> = events.events().iter().map(|e| e.event_type).collect();
        assert_eq!(
            types,
            vec![
                EventType::NodeAdded,
                EventType::PropertyChanged,
                EventType::PropertyRemoved
            ]
        );
        assert_eq!(events.events()[1].parent, Some(owner));
    }

    #[test]
    fn dispatch_and_receive() {
        let dispatcher = ObservationDispatcher::new();
        let rx = dispatcher.subscribe();

        let (log, id) = one_node_log();
        let events = dispatcher.create_event_state_collection(&log);
        dispatcher.dispatch(events);

        let bundle = rx.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(bundle.sequence, 1);
        assert_eq!(bundle.events[0].item_id, ItemId::Node(id));
    }

    #[test]
    fn empty_collections_are_not_dispatched() {
        let dispatcher = ObservationDispatcher::new();
        dispatcher.dispatch(EventStateCollection::default());
        assert_eq!(dispatcher.latest_sequence(), 0);
        assert_eq!(dispatcher.history_len(), 0);
    }

    #[test]
    fn subscriber_cleanup() {
        let dispatcher = ObservationDispatcher::new();
        let rx = dispatcher.subscribe();
        assert_eq!(dispatcher.subscriber_count(), 1);
        drop(rx);

        let (log, _) = one_node_log();
        dispatcher.dispatch(EventStateCollection::from_change_log(&log));
        assert_eq!(dispatcher.subscriber_count(), 0);
    }

    #[test]
    fn history_is_bounded_and_pollable() {
        let dispatcher = ObservationDispatcher::with_max_history(3);
        for _ in 0..5 {
            let (log, _) = one_node_log();
            dispatcher.dispatch(EventStateCollection::from_change_log(&log));
        }

        assert_eq!(dispatcher.history_len(), 3);
        let bundles = dispatcher.poll(3, 10);
        assert_eq!(
            bundles.iter().map(|b| b.sequence).collect::<Vec<_>>(),
            vec![4, 5]
        );
    }

    #[test]
    fn threaded_subscribe() {
        let dispatcher = Arc::new(ObservationDispatcher::new());
        let rx = dispatcher.subscribe();

        let remote = Arc::clone(&dispatcher);
        let handle = thread::spawn(move || {
            let (log, _) = one_node_log();
            remote.dispatch(EventStateCollection::from_change_log(&log));
        });

        let bundle = rx.recv_timeout(Duration::from_millis(500)).unwrap();
        assert_eq!(bundle.events.len(), 1);
        handle.join().unwrap();
    }
}
