//! Bounded, ordered, deduplicated event window

use std::collections::VecDeque;

use super::event::{DomainEvent, EventKey};

/// Outcome of a single append
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Inserted { evicted: usize },
    Duplicate,
}

/// Events ascending by `(block_number, log_index)`, unique keys,
/// at most `capacity` entries (oldest evicted first)
#[derive(Debug, Clone)]
pub struct EventWindow {
    events: VecDeque<DomainEvent>,
    capacity: usize,
}

impl EventWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity.min(1_024)),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn contains(&self, key: &EventKey) -> bool {
        self.position(key).is_ok()
    }

    fn position(&self, key: &EventKey) -> Result<usize, usize> {
        self.events.binary_search_by(|e| e.key().cmp(key))
    }

    /// Sorted insert, then evict from the front until within capacity.
    /// An event older than everything retained in a full window is
    /// inserted and evicted in the same call.
    pub fn append(&mut self, event: DomainEvent) -> AppendOutcome {
        let index = match self.position(&event.key()) {
            Ok(_) => return AppendOutcome::Duplicate,
            Err(index) => index,
        };
        self.events.insert(index, event);

        let mut evicted = 0;
        while self.events.len() > self.capacity {
            self.events.pop_front();
            evicted += 1;
        }
        AppendOutcome::Inserted { evicted }
    }

    pub fn extend(&mut self, events: impl IntoIterator<Item = DomainEvent>) -> usize {
        events
            .into_iter()
            .filter(|e| matches!(self.append(e.clone()), AppendOutcome::Inserted { .. }))
            .count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DomainEvent> {
        self.events.iter()
    }

    pub fn latest_key(&self) -> Option<EventKey> {
        self.events.back().map(|e| e.key())
    }

    /// Immutable copy for readers
    pub fn to_vec(&self) -> Vec<DomainEvent> {
        self.events.iter().cloned().collect()
    }
}
