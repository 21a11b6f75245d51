//! Hierarchical task groups.
//!
//! Groups reference their member tasks and sub-groups by id; the scheduler's
//! tables hold the records. A group's terminal status is always derived from
//! the statuses of everything it transitively owns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::task::{Task, TaskId, TaskStatus};

/// Unique identifier for a task group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub Uuid);

impl GroupId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for GroupId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for GroupId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A container of tasks and nested sub-groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskGroup {
    pub id: GroupId,
    pub name: String,
    /// Parent back-reference; ownership runs parent -> child only.
    pub parent: Option<GroupId>,
    /// Owned tasks, in insertion order.
    pub tasks: Vec<TaskId>,
    /// Owned sub-groups, in insertion order.
    pub sub_groups: Vec<GroupId>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskGroup {
    pub fn new(id: GroupId, name: Option<&str>, parent: Option<GroupId>) -> Self {
        Self {
            id,
            name: name
                .map(str::to_string)
                .unwrap_or_else(|| format!("Group-{}", id.short())),
            parent,
            tasks: Vec::new(),
            sub_groups: Vec::new(),
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn add_task(&mut self, id: TaskId) {
        if !self.tasks.contains(&id) {
            self.tasks.push(id);
        }
    }

    pub fn add_sub_group(&mut self, id: GroupId) {
        if !self.sub_groups.contains(&id) {
            self.sub_groups.push(id);
        }
    }

    /// Pending -> Running. Returns false if the group was not pending.
    pub fn start(&mut self) -> bool {
        if self.status != TaskStatus::Pending {
            return false;
        }
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
        true
    }

    /// Record a derived terminal status. Ignored once the group is terminal.
    pub fn settle(&mut self, status: TaskStatus) -> bool {
        if self.is_finished() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        self.completed_at = Some(Utc::now());
        true
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Derive a group status from the statuses of its transitive members.
///
/// Precedence: any Failed wins over any Cancelled, which wins over any
/// unfinished member. An empty group, or one whose members all completed,
/// is Completed.
pub fn aggregate_status<I>(statuses: I) -> TaskStatus
where
    I: IntoIterator<Item = TaskStatus>,
{
    let mut cancelled = false;
    let mut unfinished = None;
    for status in statuses {
        match status {
            TaskStatus::Failed => return TaskStatus::Failed,
            TaskStatus::Cancelled => cancelled = true,
            TaskStatus::Running => unfinished = Some(TaskStatus::Running),
            TaskStatus::Pending => {
                unfinished.get_or_insert(TaskStatus::Pending);
            }
            TaskStatus::Completed => {}
        }
    }
    if cancelled {
        TaskStatus::Cancelled
    } else {
        unfinished.unwrap_or(TaskStatus::Completed)
    }
}

/// Snapshot of a group with its members expanded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupInfo {
    pub id: GroupId,
    pub name: String,
    pub status: TaskStatus,
    pub parent_group_id: Option<GroupId>,
    pub tasks: Vec<Task>,
    pub sub_groups: Vec<GroupInfo>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl GroupInfo {
    /// Every task in this group and its sub-groups, depth first.
    pub fn all_tasks(&self) -> Vec<&Task> {
        let mut out: Vec<&Task> = self.tasks.iter().collect();
        for sub in &self.sub_groups {
            out.extend(sub.all_tasks());
        }
        out
    }
}
