//! Discrete-event timeline shared by every node of a simulation.
//!
//! Events run in strict timestamp order; events scheduled for the same instant run in
//! the order they were scheduled. Popping an event advances the clock to its timestamp.

use core::cmp::Ordering;

use heapless::binary_heap::{BinaryHeap, Min};

use crate::device::timer::{self, Duration, EventId, Instant, Timer};
use crate::mac::types::MacTimer;

struct Scheduled<E> {
    at: Instant,
    id: EventId,
    event: E,
}

impl<E> PartialEq for Scheduled<E> {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.id == other.id
    }
}

impl<E> Eq for Scheduled<E> {}

impl<E> PartialOrd for Scheduled<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Scheduled<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.at.cmp(&other.at).then(self.id.cmp(&other.id))
    }
}

/// Min-heap of future events with a logical clock.
pub struct Timeline<E, const N: usize> {
    now: Instant,
    next_id: u64,
    queue: BinaryHeap<Scheduled<E>, Min, N>,
}

impl<E, const N: usize> Default for Timeline<E, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E, const N: usize> Timeline<E, N> {
    /// Creation, with the clock at zero.
    pub const fn new() -> Self {
        Self { now: Instant::ZERO, next_id: 0, queue: BinaryHeap::new() }
    }

    /// Current simulation time.
    pub fn now(&self) -> Instant {
        self.now
    }

    /// Place `event` on the timeline `delay` from now.
    pub fn schedule(&mut self, delay: Duration, event: E) -> Result<EventId, timer::Error> {
        self.schedule_at(self.now + delay, event)
    }

    /// Place `event` on the timeline at `at`, or now if `at` already passed.
    pub fn schedule_at(&mut self, at: Instant, event: E) -> Result<EventId, timer::Error> {
        let id = EventId(self.next_id);
        let at = if at < self.now { self.now } else { at };
        self.queue.push(Scheduled { at, id, event }).map_err(|_| timer::Error::QueueFull)?;
        self.next_id += 1;
        Ok(id)
    }

    /// Remove the earliest event and move the clock to its timestamp.
    pub fn pop(&mut self) -> Option<(EventId, E)> {
        let scheduled = self.queue.pop()?;
        self.now = scheduled.at;
        Some((scheduled.id, scheduled.event))
    }

    /// Timestamp of the earliest event.
    pub fn peek_time(&self) -> Option<Instant> {
        self.queue.peek().map(|s| s.at)
    }

    /// Move the clock forward to `at` without running anything. Earlier instants and
    /// instants past the next pending event are refused.
    pub fn advance_to(&mut self, at: Instant) -> bool {
        if at < self.now || self.peek_time().is_some_and(|next| next < at) {
            return false;
        }
        self.now = at;
        true
    }

    /// Number of pending events, stale ones included.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// No events left?
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Scheduling handle for one node of a multi-node simulation.
    pub fn node(&mut self, node: usize) -> NodeTimer<'_, E, N> {
        NodeTimer { timeline: self, node }
    }
}

impl<const N: usize> Timer for Timeline<MacTimer, N> {
    fn now(&self) -> Instant {
        self.now
    }

    fn schedule(&mut self, delay: Duration, timer: MacTimer) -> Result<EventId, timer::Error> {
        Timeline::schedule(self, delay, timer)
    }
}

/// A MAC timer tagged with the node that scheduled it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NodeEvent {
    /// Index of the node in the caller's node list.
    pub node: usize,
    /// What fires.
    pub timer: MacTimer,
}

/// [`Timer`] view of a shared timeline for a single node.
pub struct NodeTimer<'a, E, const N: usize> {
    timeline: &'a mut Timeline<E, N>,
    node: usize,
}

impl<E, const N: usize> Timer for NodeTimer<'_, E, N>
where
    E: From<NodeEvent>,
{
    fn now(&self) -> Instant {
        self.timeline.now
    }

    fn schedule(&mut self, delay: Duration, timer: MacTimer) -> Result<EventId, timer::Error> {
        self.timeline.schedule(delay, NodeEvent { node: self.node, timer }.into())
    }
}
