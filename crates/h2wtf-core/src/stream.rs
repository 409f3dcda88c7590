//! Per-stream event history.

use std::collections::HashMap;

use h2wtf_log::LogRecord;

use crate::event_type::EventName;
use crate::types::StreamKey;

/// Everything observed for one stream or connection.
///
/// Each event name maps to its records in observation order. The first record
/// is "the" occurrence used for all timing; later ones are kept for
/// diagnostics only.
#[derive(Debug, Clone)]
pub struct StreamEvents {
    key: StreamKey,
    created: LogRecord,
    events: HashMap<EventName, Vec<LogRecord>>,
}

impl StreamEvents {
    /// Creates the entity from the record of its creating event.
    pub fn new(key: StreamKey, name: EventName, record: LogRecord) -> Self {
        let created = record.clone();
        Self {
            key,
            created,
            events: HashMap::from([(name, vec![record])]),
        }
    }

    /// The canonical identity.
    pub const fn key(&self) -> StreamKey {
        self.key
    }

    pub const fn is_connection(&self) -> bool {
        self.key.is_connection()
    }

    /// The record that created this entity. Never changes.
    pub const fn created(&self) -> &LogRecord {
        &self.created
    }

    /// Appends an occurrence of `name`.
    pub fn add_event(&mut self, name: EventName, record: LogRecord) {
        self.events.entry(name).or_default().push(record);
    }

    /// The first occurrence of `name`, if any.
    pub fn event(&self, name: &EventName) -> Option<&LogRecord> {
        self.events.get(name).and_then(|records| records.first())
    }

    /// All occurrences of `name` in observation order.
    pub fn occurrences(&self, name: &EventName) -> &[LogRecord] {
        self.events.get(name).map_or(&[], Vec::as_slice)
    }

    /// Names of all events seen, in no particular order.
    pub fn event_names(&self) -> impl Iterator<Item = &EventName> {
        self.events.keys()
    }
}
