use thiserror::Error;

use crate::core::group::GroupId;
use crate::core::task::TaskId;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Task join error: {0}")]
    TaskJoin(String),

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Task already exists: {0}")]
    DuplicateTask(TaskId),

    #[error("Group not found: {0}")]
    GroupNotFound(GroupId),

    #[error("Group already exists: {0}")]
    DuplicateGroup(GroupId),

    #[error("{what} is {status}, expected pending")]
    InvalidState { what: String, status: String },

    #[error("Task {id} failed: {message}")]
    TaskFailed { id: TaskId, message: String },

    #[error("Task {0} was cancelled")]
    TaskCancelled(TaskId),

    #[error("Group {id} failed ({failed} failed task(s))")]
    GroupFailed { id: GroupId, failed: usize },

    #[error("Group {0} was cancelled")]
    GroupCancelled(GroupId),

    #[error("Action '{action}' failed: {message}")]
    ActionFailed { action: String, message: String },

    #[error("Action '{0}' cancelled")]
    ActionCancelled(String),

    #[error("Run {run_id} ended {status}: {message}")]
    RunEnded {
        run_id: String,
        status: String,
        message: String,
    },

    #[error("No handler registered for action type '{0}'")]
    UnknownAction(String),

    #[error("Handler error: {0}")]
    Handler(String),
}

pub type Result<T> = std::result::Result<T, Error>;
