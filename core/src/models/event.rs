//! Domain event logging
//!
//! Every state transition, match, settlement and error in the core produces
//! an [`EventRecord`]. Records accumulate in the engine-owned [`EventLog`]
//! and are forwarded, one by one, to an optional [`DomainEventHandler`]
//! subscriber (the external logging layer). Deduplication of identical
//! consecutive records is the subscriber's responsibility, not the core's.

use serde::{Deserialize, Serialize};

/// A single domain event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Simulated tick when the event occurred
    pub tick: usize,

    /// ID of the instruction, transaction or institution the event is about
    pub subject_id: String,

    /// Human-readable description
    pub message: String,

    /// True for settlement-relevant events (creation, matching, settlement,
    /// cancellation), false for background activity
    pub is_settlement: bool,
}

/// Subscriber for domain events
///
/// Implemented by the external logging/persistence layer; called once per
/// record, in emission order.
pub trait DomainEventHandler {
    /// Receive one event record
    fn on_event(&mut self, record: &EventRecord);
}

/// In-memory log of all events emitted so far
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    records: Vec<EventRecord>,
}

impl EventLog {
    /// Create a new empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record
    pub fn push(&mut self, record: EventRecord) {
        self.records.push(record);
    }

    /// All records in emission order
    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if no events have been emitted
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records flagged as settlement-relevant
    pub fn settlement_records(&self) -> impl Iterator<Item = &EventRecord> {
        self.records.iter().filter(|r| r.is_settlement)
    }
}

/// Event emission point shared by the engine and the settlement protocol
///
/// Owns the log and the optional subscriber so that deeply nested settlement
/// recursion can emit events without reaching back into the engine.
#[derive(Default)]
pub struct EventSink {
    log: EventLog,
    handler: Option<Box<dyn DomainEventHandler>>,
}

impl EventSink {
    /// Create a sink with no subscriber
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the subscriber (replacing any previous one)
    pub fn set_handler(&mut self, handler: Box<dyn DomainEventHandler>) {
        self.handler = Some(handler);
    }

    /// Record an event and forward it to the subscriber
    pub fn emit(&mut self, tick: usize, subject_id: &str, message: String, is_settlement: bool) {
        let record = EventRecord {
            tick,
            subject_id: subject_id.to_string(),
            message,
            is_settlement,
        };
        if let Some(handler) = self.handler.as_mut() {
            handler.on_event(&record);
        }
        self.log.push(record);
    }

    /// The accumulated log
    pub fn log(&self) -> &EventLog {
        &self.log
    }
}
