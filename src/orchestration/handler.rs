//! Action handlers and the registry that resolves them by action type.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::core::plan::Action;
use crate::{Error, Result};

/// Executes one kind of action.
///
/// Handlers receive the action by value and return a result or an error;
/// they never see the scheduler or the blackboard.
pub trait ActionHandler: Send + Sync {
    fn handle(&self, action: Action) -> BoxFuture<'_, Result<Value>>;
}

/// Adapter turning an async closure into an [`ActionHandler`].
pub struct FnHandler<F> {
    f: F,
}

impl<F> FnHandler<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F, Fut> ActionHandler for FnHandler<F>
where
    F: Fn(Action) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    fn handle(&self, action: Action) -> BoxFuture<'_, Result<Value>> {
        Box::pin((self.f)(action))
    }
}

/// Maps action types to handlers, with an optional catch-all.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
    fallback: Option<Arc<dyn ActionHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one for `kind`.
    pub fn register<H>(&mut self, kind: &str, handler: H) -> &mut Self
    where
        H: ActionHandler + 'static,
    {
        self.handlers.insert(kind.to_string(), Arc::new(handler));
        self
    }

    pub fn register_fn<F, Fut>(&mut self, kind: &str, f: F) -> &mut Self
    where
        F: Fn(Action) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.register(kind, FnHandler::new(f))
    }

    /// Handler used for any type without a dedicated one.
    pub fn with_fallback<H>(mut self, handler: H) -> Self
    where
        H: ActionHandler + 'static,
    {
        self.set_fallback(handler);
        self
    }

    pub fn set_fallback<H>(&mut self, handler: H)
    where
        H: ActionHandler + 'static,
    {
        self.fallback = Some(Arc::new(handler));
    }

    pub fn resolve(&self, kind: &str) -> Option<Arc<dyn ActionHandler>> {
        self.handlers
            .get(kind)
            .or(self.fallback.as_ref())
            .cloned()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    /// Registered types, sorted.
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.handlers.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Resolve and run the handler for an action.
    pub async fn dispatch(&self, action: Action) -> Result<Value> {
        let handler = self
            .resolve(&action.kind)
            .ok_or_else(|| Error::UnknownAction(action.kind.clone()))?;
        handler.handle(action).await
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("kinds", &self.kinds())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}
