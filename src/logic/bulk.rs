//! Grouping of contiguous operations for bulk execution.
//!
//! A run collects consecutive operations sharing a `BulkKey` (same code and
//! resource type). The executor flushes it when the key of the next index
//! differs or the batch ends.

use crate::model::{BulkKey, Operation};

/// Key of the operation following `position`, `None` past the end or when
/// that operation cannot be grouped.
pub fn lookahead_keys(operations: &[Operation]) -> Vec<Option<BulkKey>> {
    (0..operations.len())
        .map(|position| operations.get(position + 1).and_then(Operation::bulk_key))
        .collect()
}

#[derive(Debug)]
pub enum BulkRun<T> {
    Idle,
    Collecting { key: BulkKey, pending: Vec<T> },
}

impl<T> Default for BulkRun<T> {
    fn default() -> Self {
        BulkRun::Idle
    }
}

impl<T> BulkRun<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry to the current run. Returns the previous run when the
    /// key changes, which the caller must flush first.
    pub fn push(&mut self, key: BulkKey, item: T) -> Option<(BulkKey, Vec<T>)> {
        match self {
            BulkRun::Collecting { key: current, pending } if *current == key => {
                pending.push(item);
                None
            }
            _ => {
                let previous = self.take();
                *self = BulkRun::Collecting {
                    key,
                    pending: vec![item],
                };
                previous
            }
        }
    }

    /// True when the run must be flushed before `next` is processed.
    pub fn should_flush(&self, next: Option<&BulkKey>) -> bool {
        match self {
            BulkRun::Idle => false,
            BulkRun::Collecting { key, .. } => next != Some(key),
        }
    }

    pub fn take(&mut self) -> Option<(BulkKey, Vec<T>)> {
        match std::mem::take(self) {
            BulkRun::Idle => None,
            BulkRun::Collecting { key, pending } => Some((key, pending)),
        }
    }

    /// Items buffered in the current run.
    pub fn pending(&self) -> &[T] {
        match self {
            BulkRun::Idle => &[],
            BulkRun::Collecting { pending, .. } => pending,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            BulkRun::Idle => 0,
            BulkRun::Collecting { pending, .. } => pending.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
