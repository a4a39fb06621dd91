//! Deadline-ordered timer queue for timed waits, sleeps, and parks.
//!
//! The queue never invokes callbacks while borrowed: [`TimerQueue::take_due`]
//! removes expired entries and hands their callbacks back to the caller,
//! who runs them after releasing any cell borrow. Callbacks are free to
//! register new timers.

use std::time::{Duration, Instant};

/// Handle for cancelling a pending timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

struct TimerEntry {
    id: TimerId,
    deadline: Instant,
    callback: Box<dyn FnOnce()>,
}

/// Pending timers, fired by explicit polling between scheduler pumps.
#[derive(Default)]
pub struct TimerQueue {
    next_id: u64,
    entries: Vec<TimerEntry>,
}

impl TimerQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            next_id: 0,
            entries: Vec::new(),
        }
    }

    /// Register a callback to fire once `delay` has elapsed.
    pub fn set_timeout(&mut self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.entries.push(TimerEntry {
            id,
            deadline: Instant::now() + delay,
            callback,
        });
        id
    }

    /// Cancel a pending timer. Returns false if it already fired or was
    /// cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() != before
    }

    /// Remove every entry whose deadline has passed and return the
    /// callbacks, earliest deadline first. The caller invokes them.
    pub fn take_due(&mut self, now: Instant) -> Vec<Box<dyn FnOnce()>> {
        let mut due: Vec<TimerEntry> = Vec::new();
        let mut i = 0;
        while i < self.entries.len() {
            if self.entries[i].deadline <= now {
                due.push(self.entries.remove(i));
            } else {
                i += 1;
            }
        }
        due.sort_by_key(|e| e.deadline);
        due.into_iter().map(|e| e.callback).collect()
    }

    /// Earliest pending deadline, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.iter().map(|e| e.deadline).min()
    }

    /// Number of pending timers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no timers are pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
