//! Declarative stage plans.
//!
//! A plan is what the planning layer hands over: an ordered list of stages,
//! each either serial or parallel, each holding opaque actions. The wire
//! shape is plain JSON so a plan can sit in the blackboard and be replaced
//! while a run is in flight:
//!
//! ```json
//! [
//!   {"kind": "parallel", "actions": [{"type": "produce", "unit": "rifle"}]},
//!   {"kind": "serial",   "actions": [{"type": "move", "to": [10, 20]}]}
//! ]
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, Result};

/// How the actions of a stage are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Serial,
    Parallel,
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageKind::Serial => write!(f, "serial"),
            StageKind::Parallel => write!(f, "parallel"),
        }
    }
}

/// One opaque unit of work, resolved to a handler by its `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: String,
    /// Handler-specific parameters, flattened beside `type` on the wire.
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl Action {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            params: Map::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.params.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{} {}", self.kind, Value::Object(self.params.clone()))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub kind: StageKind,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Stage {
    pub fn serial(actions: Vec<Action>) -> Self {
        Self {
            kind: StageKind::Serial,
            actions,
        }
    }

    pub fn parallel(actions: Vec<Action>) -> Self {
        Self {
            kind: StageKind::Parallel,
            actions,
        }
    }
}

/// An ordered sequence of stages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Plan {
    pub stages: Vec<Stage>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a serial stage.
    pub fn serial(mut self, actions: Vec<Action>) -> Self {
        self.stages.push(Stage::serial(actions));
        self
    }

    /// Append a parallel stage.
    pub fn parallel(mut self, actions: Vec<Action>) -> Self {
        self.stages.push(Stage::parallel(actions));
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Total number of actions across all stages.
    pub fn action_count(&self) -> usize {
        self.stages.iter().map(|s| s.actions.len()).sum()
    }

    /// Reject actions without a type discriminator.
    pub fn validate(&self) -> Result<()> {
        for (i, stage) in self.stages.iter().enumerate() {
            for (j, action) in stage.actions.iter().enumerate() {
                if action.kind.trim().is_empty() {
                    return Err(Error::Validation(format!(
                        "stage {i} action {j} has an empty type"
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let plan: Plan = serde_json::from_str(json)?;
        plan.validate()?;
        Ok(plan)
    }
}
