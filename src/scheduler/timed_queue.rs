// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Due-time ordered task queue backing the virtual clock.
//!
//! Tasks are keyed by `(due, sequence)`: the earliest due time runs first and
//! tasks sharing a due time run in the order they were scheduled. Cancelled
//! tasks are skipped lazily when they reach the head of the queue, so
//! cancellation never has to search the heap.
//!
//! # Ordering
//!
//! Tasks are ordered by:
//! 1. **Due time** (earlier = runs first)
//! 2. **Sequence number** (assigned at insertion, stable FIFO tie-break)
//!
//! # Examples
//!
//! ```rust
//! use std::time::Duration;
//! use backflow::scheduler::timed_queue::{TimedQueue, TaskBody};
//! use tokio_util::sync::CancellationToken;
//!
//! let mut queue = TimedQueue::new();
//! queue.push(Duration::from_secs(5), TaskBody::Once(Box::new(|| {})), CancellationToken::new());
//! queue.push(Duration::from_secs(1), TaskBody::Once(Box::new(|| {})), CancellationToken::new());
//!
//! // Only the task due at 1s is runnable at 2s
//! let first = queue.pop_due(Duration::from_secs(2)).unwrap();
//! assert_eq!(first.due, Duration::from_secs(1));
//! assert!(queue.pop_due(Duration::from_secs(2)).is_none());
//! ```

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::scheduler::{PeriodicTask, Task};

/// What to run when a timed task comes due.
pub enum TaskBody {
    Once(Task),
    Periodic { task: PeriodicTask, period: Duration },
}

/// A task waiting for the clock to reach `due`.
pub struct TimedTask {
    pub due: Duration,
    pub sequence: u64,
    pub body: TaskBody,
    pub token: CancellationToken,
}

impl PartialEq for TimedTask {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.sequence == other.sequence
    }
}

impl Eq for TimedTask {}

impl PartialOrd for TimedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimedTask {
    /// `BinaryHeap` is a max-heap, so the comparison is reversed: the task
    /// with the smallest `(due, sequence)` compares greatest and pops first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Min-queue of [`TimedTask`] ordered by `(due, sequence)`.
#[derive(Default)]
pub struct TimedQueue {
    heap: BinaryHeap<TimedTask>,
    next_sequence: u64,
}

impl TimedQueue {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_sequence: 0,
        }
    }

    /// Insert a task and return its sequence number.
    pub fn push(&mut self, due: Duration, body: TaskBody, token: CancellationToken) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(TimedTask {
            due,
            sequence,
            body,
            token,
        });
        sequence
    }

    /// Remove and return the earliest live task due at or before `limit`.
    ///
    /// Cancelled tasks met on the way are discarded.
    pub fn pop_due(&mut self, limit: Duration) -> Option<TimedTask> {
        while let Some(head) = self.heap.peek() {
            if head.token.is_cancelled() {
                self.heap.pop();
                continue;
            }
            if head.due > limit {
                return None;
            }
            return self.heap.pop();
        }
        None
    }

    /// Due time of the earliest live task.
    pub fn next_due(&mut self) -> Option<Duration> {
        while let Some(head) = self.heap.peek() {
            if head.token.is_cancelled() {
                self.heap.pop();
                continue;
            }
            return Some(head.due);
        }
        None
    }

    /// Drop every pending task, cancelling their handles.
    pub fn clear(&mut self) {
        for task in self.heap.drain() {
            task.token.cancel();
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recording(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> TaskBody {
        let log = Arc::clone(log);
        TaskBody::Once(Box::new(move || log.lock().unwrap().push(name)))
    }

    fn run(task: TimedTask) {
        if let TaskBody::Once(f) = task.body {
            f();
        }
    }

    #[test]
    fn test_due_time_ordering() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut queue = TimedQueue::new();
        queue.push(Duration::from_secs(3), recording(&log, "late"), CancellationToken::new());
        queue.push(Duration::from_secs(1), recording(&log, "early"), CancellationToken::new());
        queue.push(Duration::from_secs(2), recording(&log, "middle"), CancellationToken::new());

        while let Some(task) = queue.pop_due(Duration::from_secs(10)) {
            run(task);
        }

        assert_eq!(*log.lock().unwrap(), vec!["early", "middle", "late"]);
    }

    #[test]
    fn test_same_due_time_keeps_insertion_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut queue = TimedQueue::new();
        for name in ["a", "b", "c", "d"] {
            queue.push(Duration::from_secs(1), recording(&log, name), CancellationToken::new());
        }

        while let Some(task) = queue.pop_due(Duration::from_secs(1)) {
            run(task);
        }

        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_pop_due_respects_limit() {
        let mut queue = TimedQueue::new();
        queue.push(Duration::from_secs(5), TaskBody::Once(Box::new(|| {})), CancellationToken::new());

        assert!(queue.pop_due(Duration::from_secs(4)).is_none());
        assert_eq!(queue.next_due(), Some(Duration::from_secs(5)));
        assert!(queue.pop_due(Duration::from_secs(5)).is_some());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_cancelled_tasks_are_skipped() {
        let mut queue = TimedQueue::new();
        let cancelled = CancellationToken::new();
        queue.push(Duration::from_secs(1), TaskBody::Once(Box::new(|| {})), cancelled.clone());
        queue.push(Duration::from_secs(2), TaskBody::Once(Box::new(|| {})), CancellationToken::new());
        cancelled.cancel();

        let task = queue.pop_due(Duration::from_secs(10)).unwrap();
        assert_eq!(task.due, Duration::from_secs(2));
        assert_eq!(queue.next_due(), None);
    }

    #[test]
    fn test_clear_cancels_pending_handles() {
        let mut queue = TimedQueue::new();
        let token = CancellationToken::new();
        queue.push(Duration::from_secs(1), TaskBody::Once(Box::new(|| {})), token.clone());

        queue.clear();

        assert!(token.is_cancelled());
        assert_eq!(queue.len(), 0);
    }
}
