//! Integration test suite for commander.
//!
//! These tests drive the scheduler, the blackboard and the plan interpreter
//! together through the public API.
//!
//! # Test Categories
//!
//! - `scheduler`: task and nested group lifecycle, cancellation, aggregation
//! - `blackboard`: versioning, change notification, namespaces
//! - `plan_runs`: plan execution, live plan updates, hosted runs

mod fixtures;

mod plan_runs;
mod scheduler;
