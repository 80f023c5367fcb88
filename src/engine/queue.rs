use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::error::RuntimeError;
use crate::types::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueEntry {
    pub task_id: TaskId,
    pub priority: i32,
    seq: u64,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // max-heap: higher priority first, then lower sequence first
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Pending task ids of one agent, ordered by priority then submission.
#[derive(Debug)]
pub struct TaskQueue {
    heap: BinaryHeap<QueueEntry>,
    next_seq: u64,
    capacity: usize,
}

impl TaskQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
            capacity,
        }
    }

    pub fn push(&mut self, task_id: TaskId, priority: i32) -> Result<(), RuntimeError> {
        if self.is_full() {
            return Err(RuntimeError::QueueFull {
                capacity: self.capacity,
            });
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(QueueEntry {
            task_id,
            priority,
            seq,
        });
        Ok(())
    }

    /// Puts a popped entry back in its original position.
    pub fn requeue(&mut self, entry: QueueEntry) {
        self.heap.push(entry);
    }

    pub fn pop(&mut self) -> Option<QueueEntry> {
        self.heap.pop()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.heap.len() >= self.capacity
    }
}
