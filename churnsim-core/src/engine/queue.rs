//! Min-heap event queue with lazy cancellation.

use std::collections::{BinaryHeap, HashSet};

use super::events::{Event, EventId, EventKind, EventTarget};
use super::simulation::SimulationError;

/// Pending events ordered by `(time, kind, id)`.
///
/// Cancelling an event only drops its id from the live set; the heap entry
/// stays put and is discarded when it reaches the top. Removing from the
/// middle of a binary heap would be linear.
#[derive(Debug)]
pub struct EventQueue {
    heap: BinaryHeap<Event>,
    live: HashSet<EventId>,
    next_id: u64,
    max_len: usize,
    discarded: u64,
}

impl EventQueue {
    /// Creates an empty queue holding at most `max_len` heap entries.
    pub fn new(max_len: usize) -> Self {
        Self {
            heap: BinaryHeap::new(),
            live: HashSet::new(),
            next_id: 0,
            max_len,
            discarded: 0,
        }
    }

    /// Inserts a new event at `time`.
    ///
    /// # Errors
    ///
    /// - `SimulationError::InvalidEventTime` - If `time` is NaN
    /// - `SimulationError::ScheduleInPast` - If `time` lies before `now`
    /// - `SimulationError::EventQueueOverflow` - If the queue is full
    pub fn schedule(
        &mut self,
        now: f64,
        time: f64,
        kind: EventKind,
        target: EventTarget,
        token: usize,
    ) -> Result<EventId, SimulationError> {
        if time.is_nan() {
            return Err(SimulationError::InvalidEventTime { time });
        }
        if time < now {
            return Err(SimulationError::ScheduleInPast {
                now,
                requested: time,
            });
        }
        if self.heap.len() >= self.max_len {
            return Err(SimulationError::EventQueueOverflow {
                count: self.heap.len(),
            });
        }

        let id = EventId(self.next_id);
        self.next_id += 1;
        self.heap.push(Event {
            id,
            time,
            kind,
            target,
            token,
        });
        self.live.insert(id);

        Ok(id)
    }

    /// Marks an event as expired. Returns false if it already fired or was
    /// cancelled before.
    pub fn cancel(&mut self, id: EventId) -> bool {
        self.live.remove(&id)
    }

    /// Tells whether the event is still waiting to fire.
    pub fn is_live(&self, id: EventId) -> bool {
        self.live.contains(&id)
    }

    /// Returns the earliest live event without removing it.
    pub fn peek(&mut self) -> Option<&Event> {
        self.discard_expired();
        self.heap.peek()
    }

    /// Removes and returns the earliest live event.
    pub fn pop(&mut self) -> Option<Event> {
        while let Some(event) = self.heap.pop() {
            if self.live.remove(&event.id) {
                return Some(event);
            }
            self.discarded += 1;
        }
        None
    }

    /// Number of events that will still fire.
    pub fn live_len(&self) -> usize {
        self.live.len()
    }

    /// True if no live events remain.
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Number of expired entries dropped so far.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    fn discard_expired(&mut self) {
        while let Some(top) = self.heap.peek() {
            if self.live.contains(&top.id) {
                return;
            }
            self.heap.pop();
            self.discarded += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn schedule(queue: &mut EventQueue, time: f64, kind: EventKind) -> EventId {
        queue
            .schedule(0.0, time, kind, EventTarget::Process(0), 0)
            .unwrap()
    }

    #[test]
    fn test_pop_in_time_then_kind_order() {
        let mut queue = EventQueue::new(16);
        schedule(&mut queue, 2.0, EventKind::PROCESS);
        schedule(&mut queue, 1.0, EventKind::ACTION);
        schedule(&mut queue, 1.0, EventKind::PROCESS);

        let popped: Vec<(f64, EventKind)> = std::iter::from_fn(|| queue.pop())
            .map(|event| (event.time, event.kind))
            .collect();

        assert_eq!(
            popped,
            vec![
                (1.0, EventKind::PROCESS),
                (1.0, EventKind::ACTION),
                (2.0, EventKind::PROCESS),
            ]
        );
    }

    #[test]
    fn test_cancelled_events_are_skipped() {
        let mut queue = EventQueue::new(16);
        let first = schedule(&mut queue, 1.0, EventKind::PROCESS);
        let second = schedule(&mut queue, 2.0, EventKind::PROCESS);

        assert!(queue.cancel(first));
        assert!(!queue.cancel(first));
        assert!(!queue.is_live(first));
        assert_eq!(queue.live_len(), 1);

        assert_eq!(queue.peek().map(|event| event.id), Some(second));
        assert_eq!(queue.pop().map(|event| event.id), Some(second));
        assert!(queue.pop().is_none());
        assert_eq!(queue.discarded(), 1);
    }

    #[test]
    fn test_schedule_in_past_is_rejected() {
        let mut queue = EventQueue::new(16);
        let result = queue.schedule(5.0, 4.0, EventKind::PROCESS, EventTarget::Process(0), 0);

        assert!(matches!(
            result,
            Err(SimulationError::ScheduleInPast { .. })
        ));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_nan_time_is_rejected() {
        let mut queue = EventQueue::new(16);
        let result = queue.schedule(0.0, f64::NAN, EventKind::PROCESS, EventTarget::Process(0), 0);

        assert!(matches!(
            result,
            Err(SimulationError::InvalidEventTime { .. })
        ));
    }

    #[test]
    fn test_queue_overflow() {
        let mut queue = EventQueue::new(2);
        schedule(&mut queue, 1.0, EventKind::PROCESS);
        schedule(&mut queue, 1.0, EventKind::PROCESS);

        let result = queue.schedule(0.0, 1.0, EventKind::PROCESS, EventTarget::Process(0), 0);
        assert!(matches!(
            result,
            Err(SimulationError::EventQueueOverflow { count: 2 })
        ));
    }

    proptest! {
        #[test]
        fn pops_are_non_decreasing(
            entries in prop::collection::vec((0.0f64..100.0, -3i32..3, any::<bool>()), 1..200)
        ) {
            let mut queue = EventQueue::new(usize::MAX);
            for (time, kind, cancel) in &entries {
                let id = schedule(&mut queue, *time, EventKind(*kind));
                if *cancel {
                    queue.cancel(id);
                }
            }

            let expected = entries.iter().filter(|(_, _, cancel)| !cancel).count();
            let mut popped = Vec::new();
            while let Some(event) = queue.pop() {
                popped.push((event.time, event.kind, event.id));
            }

            prop_assert_eq!(popped.len(), expected);
            for pair in popped.windows(2) {
                let (t0, k0, id0) = pair[0];
                let (t1, k1, id1) = pair[1];
                prop_assert!(t0 < t1 || (t0 == t1 && (k0 < k1 || (k0 == k1 && id0 < id1))));
            }
        }
    }
}
