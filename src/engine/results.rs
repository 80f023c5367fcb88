use std::collections::{HashMap, VecDeque};

use crate::types::{TaskId, TaskResult, TaskStatus};

/// Task records of one agent in submission order.
///
/// Past `capacity`, terminal records are dropped oldest first. Pending and
/// running records are never dropped, so the store may briefly exceed its
/// capacity while they are outstanding.
#[derive(Debug)]
pub struct ResultStore {
    records: HashMap<TaskId, TaskResult>,
    order: VecDeque<TaskId>,
    capacity: usize,
}

impl ResultStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: HashMap::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    pub fn insert(&mut self, record: TaskResult) {
        let id = record.id;
        if self.records.insert(id, record).is_none() {
            self.order.push_back(id);
        }
        self.evict_overflow();
    }

    pub fn get(&self, id: &TaskId) -> Option<&TaskResult> {
        self.records.get(id)
    }

    pub fn get_mut(&mut self, id: &TaskId) -> Option<&mut TaskResult> {
        self.records.get_mut(id)
    }

    /// Newest first.
    pub fn list(&self, status: Option<TaskStatus>, limit: usize) -> Vec<TaskResult> {
        self.order
            .iter()
            .rev()
            .filter_map(|id| self.records.get(id))
            .filter(|record| status.map_or(true, |s| record.status == s))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &TaskResult> {
        self.order.iter().filter_map(|id| self.records.get(id))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn evict_overflow(&mut self) {
        let mut excess = self.records.len().saturating_sub(self.capacity);
        if excess == 0 {
            return;
        }

        let records = &mut self.records;
        self.order.retain(|id| {
            if excess == 0 {
                return true;
            }
            let terminal = records
                .get(id)
                .map_or(true, |record| record.status.is_terminal());
            if terminal {
                records.remove(id);
                excess -= 1;
                false
            } else {
                true
            }
        });
    }
}
