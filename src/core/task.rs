//! Task data model for the scheduler.
//!
//! A task is one schedulable unit of concurrent work. The record here is the
//! observable part: status, captured result or error, timing and the owning
//! group. The work itself lives in the scheduler's task table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::core::group::GroupId;
use crate::{Error, Result};

/// Unique identifier for a task.
///
/// Uses UUID v4 for generation and provides a short form display
/// for human-readable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Create a new unique task identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Lifecycle status shared by tasks and groups.
///
/// Completed, Failed and Cancelled are terminal: once reached, no
/// transition leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Pending,
        TaskStatus::Running,
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::Cancelled,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Whether moving from `self` to `next` respects the lifecycle.
    ///
    /// Pending may go to Running or straight to Cancelled; Running may go to
    /// any terminal state; terminal states go nowhere.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        match self {
            TaskStatus::Pending => matches!(next, TaskStatus::Running | TaskStatus::Cancelled),
            TaskStatus::Running => next.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable record of a single task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier for this task.
    pub id: TaskId,
    /// Human-readable name for the task.
    pub name: String,
    /// Current execution status.
    pub status: TaskStatus,
    /// Value produced by the work, set only on completion.
    pub result: Option<Value>,
    /// Captured error message, set only on failure.
    pub error: Option<String>,
    /// Owning group. A back-reference; the group table owns membership.
    pub group_id: Option<GroupId>,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
    /// When the task started execution.
    pub started_at: Option<DateTime<Utc>>,
    /// When the task reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a pending task. A missing name defaults to `Task-<short id>`.
    pub fn new(id: TaskId, name: Option<&str>) -> Self {
        Self {
            id,
            name: name
                .map(str::to_string)
                .unwrap_or_else(|| format!("Task-{}", id.short())),
            status: TaskStatus::Pending,
            result: None,
            error: None,
            group_id: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    fn transition(&mut self, next: TaskStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        if next == TaskStatus::Running {
            self.started_at = Some(Utc::now());
        } else {
            self.completed_at = Some(Utc::now());
        }
        true
    }

    /// Pending -> Running. Returns false if the task was not pending.
    pub fn start(&mut self) -> bool {
        self.transition(TaskStatus::Running)
    }

    /// Running -> Completed with the produced value.
    pub fn complete(&mut self, result: Value) -> bool {
        let moved = self.transition(TaskStatus::Completed);
        if moved {
            self.result = Some(result);
        }
        moved
    }

    /// Running -> Failed with a captured error message.
    pub fn fail(&mut self, error: &str) -> bool {
        let moved = self.transition(TaskStatus::Failed);
        if moved {
            self.error = Some(error.to_string());
        }
        moved
    }

    /// Pending or Running -> Cancelled.
    pub fn cancel(&mut self) -> bool {
        self.transition(TaskStatus::Cancelled)
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    /// Turn a terminal record into what an awaiting caller observes.
    pub fn outcome(&self) -> Result<Value> {
        match self.status {
            TaskStatus::Completed => Ok(self.result.clone().unwrap_or(Value::Null)),
            TaskStatus::Failed => Err(Error::TaskFailed {
                id: self.id,
                message: self.error.clone().unwrap_or_default(),
            }),
            TaskStatus::Cancelled => Err(Error::TaskCancelled(self.id)),
            status => Err(Error::InvalidState {
                what: format!("Task {}", self.id),
                status: status.to_string(),
            }),
        }
    }
}
