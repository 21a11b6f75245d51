//! Task orchestration core for an AI-driven RTS control layer.
//!
//! - [`orchestration::TaskManager`]: hierarchical concurrent task/group scheduler.
//! - [`blackboard::Blackboard`]: namespaced, versioned key-value store with
//!   per-key change notification.
//! - [`orchestration::Interpreter`]: serial/parallel stage plan interpreter
//!   that picks up live plan updates from the blackboard.
//! - [`app::Orchestrator`]: the service container tying them together.

pub mod app;
pub mod blackboard;
pub mod config;
pub mod core;
pub mod error;
pub mod log;
pub mod orchestration;
pub mod util;

pub use app::{Orchestrator, RunHandle};
pub use error::{Error, Result};
