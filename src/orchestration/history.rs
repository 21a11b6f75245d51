//! Bounded history of recent runs.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::interpreter::{RunReport, RunStatus};
use crate::core::task::TaskId;

/// Summary of one run, kept after the run's blackboard keys may be gone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    /// The scheduler task hosting the run, for submitted runs.
    pub task_id: Option<TaskId>,
    pub status: RunStatus,
    pub actions: usize,
    pub failed: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl RunRecord {
    pub fn started(run_id: &str, task_id: Option<TaskId>) -> Self {
        Self {
            run_id: run_id.to_string(),
            task_id,
            status: RunStatus::Running,
            actions: 0,
            failed: 0,
            started_at: Utc::now(),
            finished_at: None,
            error: None,
        }
    }

    pub fn finished(run_id: &str, task_id: Option<TaskId>, report: &RunReport) -> Self {
        Self {
            run_id: run_id.to_string(),
            task_id,
            status: report.status,
            actions: report.results.len(),
            failed: report.failed(),
            started_at: report.started_at,
            finished_at: Some(report.finished_at),
            error: report.error.clone(),
        }
    }
}

/// Fixed-capacity ring buffer of run records; the oldest is evicted first.
#[derive(Debug, Clone)]
pub struct RunHistory {
    records: VecDeque<RunRecord>,
    capacity: usize,
}

impl RunHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Replace the record with the same run id in place, or append.
    pub fn upsert(&mut self, record: RunRecord) {
        if let Some(existing) = self
            .records
            .iter_mut()
            .find(|r| r.run_id == record.run_id)
        {
            *existing = record;
            return;
        }
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn get(&self, run_id: &str) -> Option<&RunRecord> {
        self.records.iter().find(|r| r.run_id == run_id)
    }

    /// Up to `n` records, newest first.
    pub fn recent(&self, n: usize) -> Vec<RunRecord> {
        self.records.iter().rev().take(n).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
