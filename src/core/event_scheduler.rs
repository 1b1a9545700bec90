use super::event::Event;
use super::types::SimTime;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Debug)]
pub struct ScheduledEvent {
    pub time: SimTime,
    pub sequence_num: u64,
    pub event: Event,
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.sequence_num == other.sequence_num
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (BinaryHeap is max-heap by default)
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.sequence_num.cmp(&self.sequence_num))
    }
}

/// Wait-queue of not-yet-due events, ordered by timestamp then insertion order
#[derive(Debug, Default)]
pub struct EventQueue {
    event_queue: BinaryHeap<ScheduledEvent>,
    sequence_counter: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: Event) {
        let scheduled_event = ScheduledEvent {
            time: event.time(),
            sequence_num: self.sequence_counter,
            event,
        };

        self.event_queue.push(scheduled_event);
        self.sequence_counter += 1;
    }

    /// Remove every event sharing the minimal timestamp, in insertion order
    pub fn pop_next_time(&mut self) -> Vec<Event> {
        let mut events = Vec::new();

        if let Some(next_time) = self.peek_next_time() {
            while self
                .event_queue
                .peek()
                .is_some_and(|scheduled| scheduled.time == next_time)
            {
                if let Some(scheduled) = self.event_queue.pop() {
                    events.push(scheduled.event);
                }
            }
        }

        events
    }

    pub fn peek_next_time(&self) -> Option<SimTime> {
        self.event_queue.peek().map(|scheduled| scheduled.time)
    }

    pub fn is_empty(&self) -> bool {
        self.event_queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.event_queue.len()
    }

    /// Timestamps of every queued event, earliest first
    pub fn timestamps(&self) -> Vec<SimTime> {
        let mut times: Vec<SimTime> = self.event_queue.iter().map(|s| s.time).collect();
        times.sort_unstable();
        times
    }
}
