//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Canned task bodies (succeed, fail, sleep forever)
//! - Handler registries with recording handlers
//! - Tagged actions and plans

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tempfile::TempDir;

use commander::config::Config;
use commander::core::{Action, Plan};
use commander::orchestration::{builtin_registry, ActionOutcome, HandlerRegistry};
use commander::{Error, Orchestrator, Result};

/// Work that completes with `value` after `ms` milliseconds.
pub fn succeed_after(ms: u64, value: Value) -> impl Future<Output = Result<Value>> + Send + 'static {
    async move {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(value)
    }
}

/// Work that fails with `message` after `ms` milliseconds.
pub fn fail_after(ms: u64, message: &str) -> impl Future<Output = Result<Value>> + Send + 'static {
    let message = message.to_string();
    async move {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Err(Error::Handler(message))
    }
}

/// Work that only ends by cancellation.
pub fn sleep_forever() -> impl Future<Output = Result<Value>> + Send + 'static {
    async {
        tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
        Ok(Value::Null)
    }
}

/// An action carrying a `tag` parameter for order assertions.
pub fn tagged(kind: &str, tag: &str) -> Action {
    Action::new(kind).with_param("tag", tag)
}

/// A `sleep` action with a tag.
pub fn nap(ms: u64, tag: &str) -> Action {
    tagged("sleep", tag).with_param("ms", ms)
}

/// Tags of recorded outcomes, in result order.
pub fn tags(results: &[ActionOutcome]) -> Vec<String> {
    results
        .iter()
        .map(|r| {
            r.action
                .param("tag")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        })
        .collect()
}

/// Records the tag of every `record` action in call order.
#[derive(Clone, Default)]
pub struct Recorder {
    seen: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }

    /// Built-in handlers plus a `record` handler feeding this recorder.
    pub fn registry(&self) -> HandlerRegistry {
        let mut registry = builtin_registry();
        let seen = Arc::clone(&self.seen);
        registry.register_fn("record", move |action: Action| {
            let seen = Arc::clone(&seen);
            async move {
                let tag = action
                    .param("tag")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                seen.lock().unwrap().push(tag.clone());
                Ok(json!({ "recorded": tag }))
            }
        });
        registry
    }
}

/// Parallel A,B then serial C,D.
pub fn four_action_plan() -> Plan {
    Plan::new()
        .parallel(vec![nap(40, "A"), nap(5, "B")])
        .serial(vec![nap(20, "C"), nap(1, "D")])
}

/// An orchestrator with built-in handlers and default config.
pub fn orchestrator() -> Orchestrator {
    Orchestrator::new(Config::default(), builtin_registry())
}

/// A temporary directory holding a config file with `contents`.
pub fn config_dir(contents: &str) -> (TempDir, std::path::PathBuf) {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let path = dir.path().join("commander.toml");
    std::fs::write(&path, contents).expect("Failed to write config");
    (dir, path)
}
