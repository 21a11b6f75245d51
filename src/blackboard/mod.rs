//! Shared state for runs and the rest of the process.
//!
//! The blackboard is the only resource mutated across concurrently scheduled
//! work. Every mutation goes through a key-scoped guard.

mod namespace;
mod store;

pub use namespace::{
    global_ns, ns, run_prefix, RUN_END_TIME, RUN_PLAN, RUN_START_TIME, RUN_STATUS,
};
pub use store::{Blackboard, BlackboardStats};
