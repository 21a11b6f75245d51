//! The orchestrator: explicitly constructed owner of the blackboard, the
//! scheduler and the handler registry.
//!
//! One `Orchestrator` is created by the application at startup and torn down
//! with [`Orchestrator::shutdown`]. Runs either execute inline
//! ([`Orchestrator::execute_subtask`]) or are hosted as scheduler tasks
//! ([`Orchestrator::submit_run`]) so they can be cancelled and inspected.
//! Both kinds are registered as active while they run.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::blackboard::{ns, Blackboard, RUN_END_TIME, RUN_PLAN, RUN_STATUS};
use crate::config::Config;
use crate::core::plan::Plan;
use crate::core::task::TaskId;
use crate::orchestration::{
    HandlerRegistry, Interpreter, RunHistory, RunRecord, RunReport, RunStatus, TaskHandle,
    TaskManager, TaskOptions,
};
use crate::util::lock;
use crate::{clog, clog_debug, clog_warn, Error, Result};

type ActiveRuns = Mutex<HashMap<String, ActiveRun>>;

struct ActiveRun {
    /// Distinguishes reuses of the same run id.
    seq: u64,
    /// `None` for inline runs.
    task_id: Option<TaskId>,
    cancel: CancellationToken,
}

/// Drop a run from the active set unless its id was already taken over by a
/// newer run.
fn retire(active: &ActiveRuns, run_id: &str, seq: u64) {
    let mut active = lock(active);
    if active.get(run_id).is_some_and(|run| run.seq == seq) {
        active.remove(run_id);
    }
}

/// Keeps an inline run registered for as long as its future lives.
struct InlineRun<'a> {
    active: &'a ActiveRuns,
    run_id: &'a str,
    seq: u64,
}

impl Drop for InlineRun<'_> {
    fn drop(&mut self) {
        retire(self.active, self.run_id, self.seq);
    }
}

/// What a run hosted as a task needs once the interpreter is done.
struct HostedRun {
    run_id: String,
    seq: u64,
    task_id: TaskId,
    history: Arc<Mutex<RunHistory>>,
    active: Arc<ActiveRuns>,
    blackboard: Arc<Blackboard>,
    clear_on_finish: bool,
}

impl HostedRun {
    async fn drive(self, mut interpreter: Interpreter) -> Result<Value> {
        let report = interpreter.run().await;
        retire(&self.active, &self.run_id, self.seq);
        let report = report?;
        lock(&self.history).upsert(RunRecord::finished(&self.run_id, Some(self.task_id), &report));
        if self.clear_on_finish {
            self.blackboard.clear_run_state(&self.run_id).await;
        }

        report.check()?;
        Ok(serde_json::to_value(&report)?)
    }
}

/// Awaitable handle for a run hosted as a scheduler task.
#[derive(Debug)]
pub struct RunHandle {
    run_id: String,
    task: TaskHandle,
}

impl RunHandle {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn task_id(&self) -> TaskId {
        self.task.id()
    }

    /// Wait for the run. A failed or cancelled run surfaces as the hosting
    /// task's error.
    pub async fn wait(self) -> Result<RunReport> {
        let value = self.task.wait().await?;
        Ok(serde_json::from_value(value)?)
    }
}

pub struct Orchestrator {
    config: Config,
    blackboard: Arc<Blackboard>,
    tasks: TaskManager,
    handlers: Arc<HandlerRegistry>,
    history: Arc<Mutex<RunHistory>>,
    active: Arc<ActiveRuns>,
    next_seq: AtomicU64,
    shutdown: CancellationToken,
}

impl Orchestrator {
    pub fn new(config: Config, handlers: HandlerRegistry) -> Self {
        let tasks = match config.scheduler.max_concurrent {
            Some(limit) => TaskManager::with_limit(limit),
            None => TaskManager::new(),
        };
        let history = RunHistory::new(config.runs.history_capacity);
        clog_debug!(
            "Orchestrator: created with handlers {:?}",
            handlers.kinds()
        );
        Self {
            config,
            blackboard: Arc::new(Blackboard::new()),
            tasks,
            handlers: Arc::new(handlers),
            history: Arc::new(Mutex::new(history)),
            active: Arc::new(Mutex::new(HashMap::new())),
            next_seq: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn blackboard(&self) -> &Arc<Blackboard> {
        &self.blackboard
    }

    pub fn tasks(&self) -> &TaskManager {
        &self.tasks
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    fn interpreter(&self, plan: Plan, run_id: &str, cancel: CancellationToken) -> Interpreter {
        let interpreter = Interpreter::new(plan, Arc::clone(&self.handlers))
            .with_run(run_id, Arc::clone(&self.blackboard))
            .with_policy(self.config.interpreter.serial_failure)
            .with_cancellation(cancel);
        match self.config.interpreter.action_timeout() {
            Some(limit) => interpreter.with_action_timeout(limit),
            None => interpreter,
        }
    }

    /// Claim `run_id` for a new run. Rejected while another run holds it.
    fn register(
        &self,
        run_id: &str,
        task_id: Option<TaskId>,
        cancel: CancellationToken,
    ) -> Result<u64> {
        let mut active = lock(&self.active);
        if active.contains_key(run_id) {
            return Err(Error::Validation(format!("run '{run_id}' is already active")));
        }
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        active.insert(
            run_id.to_string(),
            ActiveRun {
                seq,
                task_id,
                cancel,
            },
        );
        Ok(seq)
    }

    /// Build, drive and report one plan run on the caller's task.
    ///
    /// The run is active until the returned future completes or is dropped,
    /// so [`Orchestrator::cancel_run`] and [`Orchestrator::shutdown`] reach it.
    pub async fn execute_subtask(&self, plan: Plan, run_id: &str) -> Result<RunReport> {
        plan.validate()?;
        let cancel = self.shutdown.child_token();
        let seq = self.register(run_id, None, cancel.clone())?;
        let _active = InlineRun {
            active: &self.active,
            run_id,
            seq,
        };
        lock(&self.history).upsert(RunRecord::started(run_id, None));

        let mut interpreter = self.interpreter(plan, run_id, cancel);
        let report = interpreter.run().await?;

        lock(&self.history).upsert(RunRecord::finished(run_id, None, &report));
        if self.config.runs.clear_on_finish {
            self.blackboard.clear_run_state(run_id).await;
        }
        Ok(report)
    }

    /// Host a plan run as a scheduler task and return at once.
    pub fn submit_run(&self, plan: Plan, run_id: &str) -> Result<RunHandle> {
        plan.validate()?;
        let cancel = self.shutdown.child_token();
        let task_id = TaskId::new();
        let seq = self.register(run_id, Some(task_id), cancel.clone())?;
        let interpreter = self.interpreter(plan, run_id, cancel);

        let hosted = HostedRun {
            run_id: run_id.to_string(),
            seq,
            task_id,
            history: Arc::clone(&self.history),
            active: Arc::clone(&self.active),
            blackboard: Arc::clone(&self.blackboard),
            clear_on_finish: self.config.runs.clear_on_finish,
        };

        let created = self.tasks.create_task(
            hosted.drive(interpreter),
            TaskOptions::new()
                .id(task_id)
                .name(&format!("run:{run_id}")),
        );
        if let Err(e) = created {
            retire(&self.active, run_id, seq);
            return Err(e);
        }
        lock(&self.history).upsert(RunRecord::started(run_id, Some(task_id)));

        let task = match self.tasks.submit_task(task_id) {
            Ok(task) => task,
            Err(e) => {
                retire(&self.active, run_id, seq);
                return Err(e);
            }
        };
        clog!("Orchestrator: run {} submitted as task {}", run_id, task_id.short());
        Ok(RunHandle {
            run_id: run_id.to_string(),
            task,
        })
    }

    /// Cancel an active run, inline or hosted. Returns false if it is not
    /// active.
    pub async fn cancel_run(&self, run_id: &str) -> bool {
        let Some(run) = lock(&self.active).remove(run_id) else {
            return false;
        };
        run.cancel.cancel();
        if let Some(task_id) = run.task_id {
            if !self.tasks.cancel_task(task_id) {
                return false;
            }
        }

        let record = {
            let mut history = lock(&self.history);
            let mut record = history
                .get(run_id)
                .cloned()
                .unwrap_or_else(|| RunRecord::started(run_id, run.task_id));
            record.status = RunStatus::Cancelled;
            record.finished_at = Some(Utc::now());
            record.error = Some("run cancelled".to_string());
            history.upsert(record.clone());
            record
        };

        if self.config.runs.clear_on_finish {
            self.blackboard.clear_run_state(run_id).await;
        } else {
            self.blackboard
                .set(&ns(run_id, RUN_STATUS), Value::from(RunStatus::Cancelled.as_str()))
                .await;
            if let Some(finished_at) = record.finished_at {
                self.blackboard
                    .set(&ns(run_id, RUN_END_TIME), Value::from(finished_at.to_rfc3339()))
                    .await;
            }
        }
        clog!("Orchestrator: run {} cancelled", run_id);
        true
    }

    /// Replace the live plan of a run. Picked up before its next serial action.
    pub async fn update_plan(&self, run_id: &str, plan: &Plan) -> Result<u64> {
        plan.validate()?;
        let version = self.blackboard.set_typed(&ns(run_id, RUN_PLAN), plan).await?;
        clog_debug!("Orchestrator: run {} plan updated (v{})", run_id, version);
        Ok(version)
    }

    /// Status published by a run, if any.
    pub async fn run_status(&self, run_id: &str) -> Option<RunStatus> {
        match self.blackboard.get_typed(&ns(run_id, RUN_STATUS)).await {
            Ok(status) => status,
            Err(e) => {
                clog_warn!("Orchestrator: run {} has an unreadable status: {}", run_id, e);
                None
            }
        }
    }

    pub fn active_runs(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.active).keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Up to `n` run records, newest first.
    pub fn recent_runs(&self, n: usize) -> Vec<RunRecord> {
        lock(&self.history).recent(n)
    }

    pub fn run_record(&self, run_id: &str) -> Option<RunRecord> {
        lock(&self.history).get(run_id).cloned()
    }

    /// Drop every blackboard key of a run.
    pub async fn clear_run(&self, run_id: &str) -> usize {
        self.blackboard.clear_run_state(run_id).await
    }

    /// Cancel every active run and task, then wait for the scheduler to
    /// drain. Returns the number of tasks cancelled.
    pub async fn shutdown(&self) -> usize {
        clog!("Orchestrator: shutting down");
        self.shutdown.cancel();
        for run_id in self.active_runs() {
            self.cancel_run(&run_id).await;
        }
        let cancelled = self.tasks.cancel_all();
        self.tasks.wait_all().await;
        clog_debug!("Orchestrator: shutdown complete ({} task(s) cancelled)", cancelled);
        cancelled
    }
}
