//! Key namespaces and run-scoped helpers.
//!
//! Run-level keys are `run:<run_id>:<name>`; process-wide keys are
//! `global:<name>`.

use std::time::Duration;

use serde_json::Value;

use super::Blackboard;

/// Run status: `"running"`, then `"completed"`, `"failed"` or `"cancelled"`.
pub const RUN_STATUS: &str = "status";
/// RFC 3339 timestamp written when a run starts.
pub const RUN_START_TIME: &str = "start_time";
/// RFC 3339 timestamp written when a run ends.
pub const RUN_END_TIME: &str = "end_time";
/// The live-updatable plan of a run.
pub const RUN_PLAN: &str = "subtask_plan";

/// `run:<run_id>:<name>`
pub fn ns(run_id: &str, name: &str) -> String {
    format!("run:{run_id}:{name}")
}

/// `global:<name>`
pub fn global_ns(name: &str) -> String {
    format!("global:{name}")
}

/// Prefix matching every key of one run.
pub fn run_prefix(run_id: &str) -> String {
    format!("run:{run_id}:")
}

impl Blackboard {
    pub async fn get_run_state(&self, run_id: &str, name: &str, default: Value) -> Value {
        self.get(&ns(run_id, name), default).await
    }

    pub async fn set_run_state(&self, run_id: &str, name: &str, value: Value) -> u64 {
        self.set(&ns(run_id, name), value).await
    }

    pub async fn update_run_state<F>(&self, run_id: &str, name: &str, f: F) -> (Value, u64)
    where
        F: FnOnce(Option<&Value>) -> Value,
    {
        self.update(&ns(run_id, name), f).await
    }

    pub async fn wait_for_run_change(
        &self,
        run_id: &str,
        name: &str,
        last_seen: u64,
        timeout: Option<Duration>,
    ) -> (Option<Value>, u64) {
        self.wait_for_change(&ns(run_id, name), last_seen, timeout)
            .await
    }

    /// Drop every key of a run. Returns how many were removed.
    pub async fn clear_run_state(&self, run_id: &str) -> usize {
        self.clear_namespace(&run_prefix(run_id)).await
    }
}
