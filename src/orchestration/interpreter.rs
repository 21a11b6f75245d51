//! Stage plan interpreter.
//!
//! Drives a [`Plan`] stage by stage. Parallel stages fan out every action and
//! join; serial stages run one action per [`Interpreter::step`] behind a
//! persistent cursor. When bound to a run, the interpreter publishes the run's
//! status under `run:<id>:*` and, before each serial action, adopts a plan
//! that was replaced in the blackboard in the meantime.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::handler::HandlerRegistry;
use crate::blackboard::{ns, Blackboard, RUN_END_TIME, RUN_PLAN, RUN_START_TIME, RUN_STATUS};
use crate::core::plan::{Action, Plan, StageKind};
use crate::util::with_timeout;
use crate::{clog, clog_debug, clog_warn, Error, Result};

/// What to do with the rest of a serial stage after one action failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialFailurePolicy {
    /// Record the failure and keep going.
    #[default]
    Continue,
    /// Stop the run; it ends Failed.
    Abort,
}

/// The recorded outcome of one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub action: Action,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionOutcome {
    fn from_result(action: Action, result: Result<Value>) -> Self {
        match result {
            Ok(output) => Self {
                action,
                ok: true,
                output: Some(output),
                error: None,
            },
            Err(err) => Self {
                action,
                ok: false,
                output: None,
                error: Some(err.to_string()),
            },
        }
    }
}

/// Where the interpreter is inside its plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterpreterState {
    pub plan: Plan,
    pub stage_idx: usize,
    /// Position inside the current serial stage.
    pub serial_cursor: usize,
    /// Append-only.
    pub results: Vec<ActionOutcome>,
    pub run_id: Option<String>,
}

/// What one call to [`Interpreter::step`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// A whole parallel stage ran.
    ParallelStage { stage: usize, failed: usize },
    /// One serial action ran.
    SerialAction { stage: usize, index: usize, ok: bool },
    /// A serial stage ran out of actions.
    StageComplete { stage: usize },
    /// A serial action failed under [`SerialFailurePolicy::Abort`].
    Aborted { stage: usize, index: usize },
    Finished,
}

/// Terminal state of a run, as published under `run:<id>:status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Aggregated result of one plan run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Option<String>,
    pub status: RunStatus,
    pub results: Vec<ActionOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.ok).count()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| !r.ok).count()
    }

    /// [`Error::RunEnded`] unless the run completed.
    pub fn check(&self) -> Result<()> {
        match self.status {
            RunStatus::Completed => Ok(()),
            status => Err(Error::RunEnded {
                run_id: self.run_id.clone().unwrap_or_else(|| "-".to_string()),
                status: status.to_string(),
                message: self.error.clone().unwrap_or_default(),
            }),
        }
    }
}

pub struct Interpreter {
    state: InterpreterState,
    handlers: Arc<HandlerRegistry>,
    blackboard: Option<Arc<Blackboard>>,
    policy: SerialFailurePolicy,
    action_timeout: Option<Duration>,
    cancel: CancellationToken,
    /// Last version of `run:<id>:subtask_plan` that was looked at.
    plan_version: u64,
    aborted: bool,
}

impl Interpreter {
    pub fn new(plan: Plan, handlers: Arc<HandlerRegistry>) -> Self {
        Self {
            state: InterpreterState {
                plan,
                ..Default::default()
            },
            handlers,
            blackboard: None,
            policy: SerialFailurePolicy::default(),
            action_timeout: None,
            cancel: CancellationToken::new(),
            plan_version: 0,
            aborted: false,
        }
    }

    /// Bind to a run: status keys and live plan updates go through `blackboard`.
    pub fn with_run(mut self, run_id: &str, blackboard: Arc<Blackboard>) -> Self {
        self.state.run_id = Some(run_id.to_string());
        self.blackboard = Some(blackboard);
        self
    }

    pub fn with_policy(mut self, policy: SerialFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_action_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout = Some(timeout);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn state(&self) -> &InterpreterState {
        &self.state
    }

    pub fn results(&self) -> &[ActionOutcome] {
        &self.state.results
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.aborted || self.state.stage_idx >= self.state.plan.len()
    }

    fn scope(&self) -> Option<(String, Arc<Blackboard>)> {
        match (&self.state.run_id, &self.blackboard) {
            (Some(run_id), Some(bb)) => Some((run_id.clone(), Arc::clone(bb))),
            _ => None,
        }
    }

    /// Advance by one serial action or one whole parallel stage.
    pub async fn step(&mut self) -> Step {
        loop {
            if self.is_finished() {
                return Step::Finished;
            }
            let stage_idx = self.state.stage_idx;
            let stage = &self.state.plan.stages[stage_idx];

            match stage.kind {
                StageKind::Parallel => {
                    let actions = stage.actions.clone();
                    clog!(
                        "Interpreter: stage {} parallel, {} action(s)",
                        stage_idx,
                        actions.len()
                    );
                    let outcomes = join_all(actions.into_iter().map(|a| self.dispatch(a))).await;
                    let failed = outcomes.iter().filter(|o| !o.ok).count();
                    self.state.results.extend(outcomes);
                    self.advance_stage();
                    return Step::ParallelStage {
                        stage: stage_idx,
                        failed,
                    };
                }
                StageKind::Serial => {
                    if self.state.serial_cursor >= stage.actions.len() {
                        self.advance_stage();
                        return Step::StageComplete { stage: stage_idx };
                    }
                    if self.refresh_plan().await {
                        continue;
                    }

                    let index = self.state.serial_cursor;
                    let action = self.state.plan.stages[stage_idx].actions[index].clone();
                    if index == 0 {
                        clog!("Interpreter: stage {} serial", stage_idx);
                    }
                    let outcome = self.dispatch(action).await;
                    let ok = outcome.ok;
                    self.state.results.push(outcome);
                    self.state.serial_cursor += 1;

                    // A cancelled action is not a failure; run() reports Cancelled.
                    if !ok
                        && self.policy == SerialFailurePolicy::Abort
                        && !self.cancel.is_cancelled()
                    {
                        self.aborted = true;
                        return Step::Aborted {
                            stage: stage_idx,
                            index,
                        };
                    }
                    return Step::SerialAction {
                        stage: stage_idx,
                        index,
                        ok,
                    };
                }
            }
        }
    }

    fn advance_stage(&mut self) {
        self.state.stage_idx += 1;
        self.state.serial_cursor = 0;
    }

    /// Adopt the run's plan from the blackboard if it changed. Returns true
    /// when a different plan was adopted.
    async fn refresh_plan(&mut self) -> bool {
        let Some((run_id, bb)) = self.scope() else {
            return false;
        };
        let (value, version) = bb.get_with_version(&ns(&run_id, RUN_PLAN)).await;
        if version <= self.plan_version {
            return false;
        }
        self.plan_version = version;

        let Some(value) = value else {
            return false;
        };
        let plan = match serde_json::from_value::<Plan>(value) {
            Ok(plan) => plan,
            Err(e) => {
                clog_warn!("Interpreter: run {} ignoring unreadable plan: {}", run_id, e);
                return false;
            }
        };
        if plan == self.state.plan {
            return false;
        }
        if let Err(e) = plan.validate() {
            clog_warn!("Interpreter: run {} ignoring invalid plan: {}", run_id, e);
            return false;
        }
        self.adopt(plan);
        clog!(
            "Interpreter: run {} adopted updated plan (stage {}, cursor {})",
            run_id,
            self.state.stage_idx,
            self.state.serial_cursor
        );
        true
    }

    /// Swap in a new plan and clip the position to stay in bounds.
    fn adopt(&mut self, plan: Plan) {
        self.state.plan = plan;
        self.state.stage_idx = self.state.stage_idx.min(self.state.plan.len());
        self.state.serial_cursor = match self.state.plan.stages.get(self.state.stage_idx) {
            Some(stage) if stage.kind == StageKind::Serial => {
                self.state.serial_cursor.min(stage.actions.len())
            }
            _ => 0,
        };
    }

    async fn dispatch(&self, action: Action) -> ActionOutcome {
        let kind = action.kind.clone();
        let Some(handler) = self.handlers.resolve(&kind) else {
            clog_warn!("Interpreter: no handler for action type '{}'", kind);
            return ActionOutcome::from_result(action, Err(Error::UnknownAction(kind)));
        };

        let call = async {
            match AssertUnwindSafe(handler.handle(action.clone()))
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(_) => Err(Error::Handler(format!("handler for '{kind}' panicked"))),
            }
        };
        let bounded = async {
            match self.action_timeout {
                Some(limit) => with_timeout(limit, call).await,
                None => call.await,
            }
        };
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::ActionCancelled(kind.clone())),
            result = bounded => result,
        };

        match &result {
            Ok(_) => clog_debug!("Interpreter: action '{}' ok", kind),
            Err(Error::ActionCancelled(_)) => {
                clog_debug!("Interpreter: action '{}' cancelled", kind)
            }
            Err(e) => clog_warn!(
                "Interpreter: {}",
                Error::ActionFailed {
                    action: kind.clone(),
                    message: e.to_string(),
                }
            ),
        }
        ActionOutcome::from_result(action, result)
    }

    /// Drive the plan to the end and report.
    ///
    /// Bound to a run, this publishes the plan, `status`, `start_time` and
    /// `end_time` under the run's namespace. Cancellation is observed between
    /// steps and interrupts an in-flight action.
    pub async fn run(&mut self) -> Result<RunReport> {
        self.state.plan.validate()?;
        let started_at = Utc::now();
        let scope = self.scope();

        if let Some((run_id, bb)) = &scope {
            let plan = serde_json::to_value(&self.state.plan)?;
            self.plan_version = bb.set(&ns(run_id, RUN_PLAN), plan).await;
            bb.set(&ns(run_id, RUN_STATUS), Value::from(RunStatus::Running.as_str()))
                .await;
            bb.set(&ns(run_id, RUN_START_TIME), Value::from(started_at.to_rfc3339()))
                .await;
        }
        clog!(
            "Interpreter: run {} started, {} stage(s)",
            self.state.run_id.as_deref().unwrap_or("-"),
            self.state.plan.len()
        );

        let status = loop {
            if self.cancel.is_cancelled() {
                break RunStatus::Cancelled;
            }
            match self.step().await {
                Step::Finished => break RunStatus::Completed,
                Step::Aborted { .. } if self.cancel.is_cancelled() => break RunStatus::Cancelled,
                Step::Aborted { .. } => break RunStatus::Failed,
                _ => {}
            }
        };

        let error = match status {
            RunStatus::Failed => self
                .state
                .results
                .iter()
                .rev()
                .find(|r| !r.ok)
                .and_then(|r| r.error.clone()),
            RunStatus::Cancelled => Some("run cancelled".to_string()),
            _ => None,
        };
        let finished_at = Utc::now();

        if let Some((run_id, bb)) = &scope {
            bb.set(&ns(run_id, RUN_STATUS), Value::from(status.as_str()))
                .await;
            bb.set(&ns(run_id, RUN_END_TIME), Value::from(finished_at.to_rfc3339()))
                .await;
        }
        clog!(
            "Interpreter: run {} {} ({} action(s))",
            self.state.run_id.as_deref().unwrap_or("-"),
            status,
            self.state.results.len()
        );

        Ok(RunReport {
            run_id: self.state.run_id.clone(),
            status,
            results: self.state.results.clone(),
            started_at,
            finished_at,
            error,
        })
    }
}
