//! Indexed binary heap over active cases
//!
//! A plain `BinaryHeap` cannot remove an arbitrary element without a linear
//! scan, and assignment/reprioritization do exactly that. [`PriorityIndex`]
//! keeps the heap in a `Vec` and a side table from `case_id` to heap slot, so
//! insert, remove and reinsert are all O(log n).

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::case::{CaseRecord, Priority};

#[derive(Debug, Default, Clone)]
pub struct PriorityIndex {
    heap: Vec<CaseRecord>,
    slots: HashMap<String, usize>,
}

impl PriorityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from a set of active cases
    pub fn from_cases(cases: impl IntoIterator<Item = CaseRecord>) -> Self {
        let mut index = Self::new();
        index.rebuild(cases);
        index
    }

    /// Replace the whole content, discarding the previous state
    pub fn rebuild(&mut self, cases: impl IntoIterator<Item = CaseRecord>) {
        self.heap.clear();
        self.slots.clear();
        for case in cases {
            self.insert(case);
        }
    }

    /// Insert a case. An existing entry with the same id is replaced and returned.
    pub fn insert(&mut self, case: CaseRecord) -> Option<CaseRecord> {
        let previous = self.remove(&case.case_id);

        let slot = self.heap.len();
        self.slots.insert(case.case_id.clone(), slot);
        self.heap.push(case);
        self.sift_up(slot);

        previous
    }

    /// Case that would be dequeued next
    pub fn peek(&self) -> Option<&CaseRecord> {
        self.heap.first()
    }

    pub fn get(&self, case_id: &str) -> Option<&CaseRecord> {
        self.slots.get(case_id).map(|&slot| &self.heap[slot])
    }

    pub fn contains(&self, case_id: &str) -> bool {
        self.slots.contains_key(case_id)
    }

    /// Remove an arbitrary case; `None` if it is not indexed
    pub fn remove(&mut self, case_id: &str) -> Option<CaseRecord> {
        let slot = self.slots.remove(case_id)?;
        let last = self.heap.len() - 1;
        if slot != last {
            self.swap(slot, last);
        }
        let removed = self.heap.pop();

        if slot < self.heap.len() {
            self.sift_down(slot);
            self.sift_up(slot);
        }

        removed
    }

    /// Move a case to a new priority and ranking stamp. Returns false when the
    /// case is not indexed.
    pub fn reinsert(&mut self, case_id: &str, priority: Priority, ranked_at: DateTime<Utc>) -> bool {
        let Some(mut case) = self.remove(case_id) else {
            return false;
        };
        case.priority = priority;
        case.ranked_at = ranked_at;
        self.insert(case);
        true
    }

    /// 1-based dequeue rank: one plus the number of cases served first
    pub fn position_of(&self, case_id: &str) -> Option<usize> {
        self.cases_ahead(case_id).map(|ahead| ahead + 1)
    }

    /// Number of cases that would be dequeued before this one
    pub fn cases_ahead(&self, case_id: &str) -> Option<usize> {
        let target = self.get(case_id)?;
        Some(self.heap.iter().filter(|case| case.precedes(target)).count())
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Cases in heap (not dequeue) order
    pub fn iter(&self) -> impl Iterator<Item = &CaseRecord> {
        self.heap.iter()
    }

    /// Cases in dequeue order
    pub fn ordered(&self) -> Vec<&CaseRecord> {
        let mut cases: Vec<&CaseRecord> = self.heap.iter().collect();
        cases.sort_by(|a, b| a.rank_key().cmp(&b.rank_key()));
        cases
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        if let Some(slot) = self.slots.get_mut(&self.heap[a].case_id) {
            *slot = a;
        }
        if let Some(slot) = self.slots.get_mut(&self.heap[b].case_id) {
            *slot = b;
        }
    }

    fn sift_up(&mut self, mut slot: usize) {
        while slot > 0 {
            let parent = (slot - 1) / 2;
            if !self.heap[slot].precedes(&self.heap[parent]) {
                break;
            }
            self.swap(slot, parent);
            slot = parent;
        }
    }

    fn sift_down(&mut self, mut slot: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * slot + 1;
            let right = left + 1;
            let mut first = slot;

            if left < len && self.heap[left].precedes(&self.heap[first]) {
                first = left;
            }
            if right < len && self.heap[right].precedes(&self.heap[first]) {
                first = right;
            }
            if first == slot {
                break;
            }
            self.swap(slot, first);
            slot = first;
        }
    }
}
