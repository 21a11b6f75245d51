//! Built-in handlers for dry runs: `echo`, `sleep` and `fail`.

use std::time::Duration;

use serde_json::{json, Value};

use super::handler::HandlerRegistry;
use crate::core::plan::Action;
use crate::{Error, Result};

/// A registry holding only the built-in handlers.
pub fn builtin_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    register_builtins(&mut registry);
    registry
}

pub fn register_builtins(registry: &mut HandlerRegistry) {
    registry
        .register_fn("echo", echo)
        .register_fn("sleep", sleep)
        .register_fn("fail", fail);
}

/// Returns the action's parameters.
async fn echo(action: Action) -> Result<Value> {
    Ok(Value::Object(action.params))
}

/// Sleeps for `ms` milliseconds (default 0).
async fn sleep(action: Action) -> Result<Value> {
    let ms = action.param("ms").and_then(Value::as_u64).unwrap_or(0);
    tokio::time::sleep(Duration::from_millis(ms)).await;
    Ok(json!({ "slept_ms": ms }))
}

/// Always fails, with `message` if given.
async fn fail(action: Action) -> Result<Value> {
    let message = action
        .param("message")
        .and_then(Value::as_str)
        .unwrap_or("requested failure");
    Err(Error::Handler(message.to_string()))
}
