//! Simulated-time event queue.

use std::{cmp::Ordering, collections::BTreeMap};

use crate::{event::Event, simulation::SimTime};

/// Key for ordering events in the queue.
///
/// Events are ordered by time (earlier first), then by the order in which
/// they were scheduled.
#[derive(Debug, Clone, Copy)]
pub struct EventKey {
    pub time: SimTime,
    pub sequence: u64,
}

impl Ord for EventKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .total_cmp(&other.time)
            .then(self.sequence.cmp(&other.sequence))
    }
}

impl PartialOrd for EventKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for EventKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for EventKey {}

/// Pending events, totally ordered by [`EventKey`].
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    events: BTreeMap<EventKey, Event>,
    sequence: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `event` behind every queued event with the same time.
    pub fn push(&mut self, event: Event) -> EventKey {
        let key = EventKey { time: event.time, sequence: self.sequence };
        self.sequence += 1;
        self.events.insert(key, event);

        key
    }

    /// Removes and returns the earliest event.
    pub fn pop(&mut self) -> Option<Event> {
        self.events.pop_first().map(|(_, event)| event)
    }

    /// Time of the earliest event, if any.
    pub fn peek_time(&self) -> Option<SimTime> {
        self.events.first_key_value().map(|(key, _)| key.time)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Queued events in dispatch order.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.values()
    }
}
