//! Result table: one entry per submitted task.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{TaskId, TaskStatus};
use crate::observability::StatusCounts;

/// Outcome tracking for one task.
///
/// Design:
/// - This is the "single source of truth" for task status.
/// - The queue holds the task itself; only the id survives here once the
///   task has been processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEntry {
    #[serde(flatten)]
    pub status: TaskStatus,

    /// Number of times the agent has been invoked for this task.
    pub attempts: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResultEntry {
    fn pending(now: DateTime<Utc>) -> Self {
        Self {
            status: TaskStatus::Pending,
            attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Id allocation plus the status map.
///
/// Both live behind the orchestrator's single results lock, so the id
/// counter and the `pending` insert move together.
#[derive(Debug)]
pub struct ResultTable {
    entries: BTreeMap<TaskId, ResultEntry>,
    next_id: TaskId,
}

impl ResultTable {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_id: TaskId::new(1),
        }
    }

    /// Allocate the next id and record it as `pending`.
    pub fn insert_pending(&mut self, now: DateTime<Utc>) -> TaskId {
        let id = self.next_id;
        self.next_id = id.next();
        self.entries.insert(id, ResultEntry::pending(now));
        id
    }

    /// Drop an entry whose id was never handed to a caller (the enqueue
    /// that followed `insert_pending` failed). The id is not reused.
    pub fn discard(&mut self, id: TaskId) -> Option<ResultEntry> {
        self.entries.remove(&id)
    }

    pub fn record_attempt(&mut self, id: TaskId, now: DateTime<Utc>) -> Option<u32> {
        let entry = self.entries.get_mut(&id)?;
        entry.attempts += 1;
        entry.updated_at = now;
        Some(entry.attempts)
    }

    /// Apply the one terminal transition.
    ///
    /// Returns `false` (and changes nothing) if the entry is missing or
    /// already terminal.
    pub fn finish(&mut self, id: TaskId, status: TaskStatus, now: DateTime<Utc>) -> bool {
        debug_assert!(status.is_terminal());
        match self.entries.get_mut(&id) {
            Some(entry) if !entry.status.is_terminal() => {
                entry.status = status;
                entry.updated_at = now;
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, id: TaskId) -> Option<&ResultEntry> {
        self.entries.get(&id)
    }

    /// All entries, ordered by id.
    pub fn iter(&self) -> impl Iterator<Item = (TaskId, &ResultEntry)> {
        self.entries.iter().map(|(id, entry)| (*id, entry))
    }

    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for entry in self.entries.values() {
            match entry.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::Completed => counts.completed += 1,
                TaskStatus::Failed { .. } => counts.failed += 1,
            }
        }
        counts
    }
}

impl Default for ResultTable {
    fn default() -> Self {
        Self::new()
    }
}
