//! Core domain models for the orchestration core.
//!
//! Tasks and groups are what the scheduler tracks; plans are what the
//! interpreter consumes.

pub mod group;
pub mod plan;
pub mod task;

pub use group::{aggregate_status, GroupId, GroupInfo, TaskGroup};
pub use plan::{Action, Plan, Stage, StageKind};
pub use task::{Task, TaskId, TaskStatus};
