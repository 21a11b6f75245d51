//! Orchestration layer: the task scheduler, action handlers and the stage
//! plan interpreter that runs on top of them.

pub mod builtin;
mod handler;
mod history;
mod interpreter;
mod manager;

pub use builtin::{builtin_registry, register_builtins};
pub use handler::{ActionHandler, FnHandler, HandlerRegistry};
pub use history::{RunHistory, RunRecord};
pub use interpreter::{
    ActionOutcome, Interpreter, InterpreterState, RunReport, RunStatus, SerialFailurePolicy, Step,
};
pub use manager::{
    CallbackId, GroupHandle, GroupOptions, ManagerStats, TaskCallback, TaskEvent, TaskFuture,
    TaskHandle, TaskManager, TaskOptions,
};
