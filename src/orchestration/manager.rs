//! Task and group scheduler.
//!
//! The TaskManager creates, runs, cancels and reports on tasks and on
//! hierarchical groups of them. Each submitted task runs as its own tokio
//! task racing a cancellation token; its outcome is captured on the task
//! record and never thrown back into the scheduler.
//!
//! Three guards protect the tables: tasks, groups, and the running-id set.
//! When more than one is needed they are taken in that order, and none is
//! held across an await. Lifecycle callbacks run with no guard held.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::group::{aggregate_status, GroupId, GroupInfo, TaskGroup};
use crate::core::task::{Task, TaskId, TaskStatus};
use crate::util::{lock, with_timeout};
use crate::{clog_debug, clog_warn, Error, Result};

/// The unit of work a task runs.
pub type TaskFuture = BoxFuture<'static, Result<Value>>;

/// Optional attributes for [`TaskManager::create_task`].
#[derive(Debug, Clone, Default)]
pub struct TaskOptions {
    pub id: Option<TaskId>,
    pub name: Option<String>,
    pub group: Option<GroupId>,
}

impl TaskOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: TaskId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn group(mut self, group: GroupId) -> Self {
        self.group = Some(group);
        self
    }
}

/// Optional attributes for [`TaskManager::create_group`].
#[derive(Debug, Clone, Default)]
pub struct GroupOptions {
    pub id: Option<GroupId>,
    pub name: Option<String>,
    pub parent: Option<GroupId>,
}

impl GroupOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: GroupId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn parent(mut self, parent: GroupId) -> Self {
        self.parent = Some(parent);
        self
    }
}

/// Task lifecycle points a callback can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskEvent {
    Start,
    Complete,
    Error,
    Cancel,
}

impl std::fmt::Display for TaskEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TaskEvent::Start => "on_start",
            TaskEvent::Complete => "on_complete",
            TaskEvent::Error => "on_error",
            TaskEvent::Cancel => "on_cancel",
        };
        f.write_str(name)
    }
}

/// Called with a snapshot of the task record. An error is logged and
/// otherwise ignored.
pub type TaskCallback = Arc<dyn Fn(&Task) -> Result<()> + Send + Sync>;

/// Returned by [`TaskManager::add_callback`]; pass to `remove_callback`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

struct Hook {
    id: CallbackId,
    event: TaskEvent,
    callback: TaskCallback,
}

/// Counts for debugging and status displays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerStats {
    pub total_tasks: usize,
    pub running_tasks: usize,
    pub total_groups: usize,
    /// Every status is present, zero or not.
    pub tasks_by_status: BTreeMap<String, usize>,
}

/// Awaitable handle returned by [`TaskManager::submit_task`].
///
/// Dropping the handle does not stop the task.
#[derive(Debug)]
pub struct TaskHandle {
    id: TaskId,
    join: JoinHandle<Result<Value>>,
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the task to settle and surface its captured outcome.
    pub async fn wait(self) -> Result<Value> {
        self.join
            .await
            .map_err(|e| Error::TaskJoin(e.to_string()))?
    }
}

/// Awaitable handle returned by [`TaskManager::submit_group`].
pub struct GroupHandle {
    id: GroupId,
    join: JoinHandle<TaskStatus>,
    manager: TaskManager,
}

impl GroupHandle {
    pub fn id(&self) -> GroupId {
        self.id
    }

    /// Wait until every member settled, then surface the derived status.
    pub async fn wait(self) -> Result<GroupInfo> {
        let status = self
            .join
            .await
            .map_err(|e| Error::TaskJoin(e.to_string()))?;
        let info = self
            .manager
            .get_group_info(self.id)
            .ok_or(Error::GroupNotFound(self.id))?;
        match status {
            TaskStatus::Completed => Ok(info),
            TaskStatus::Failed => Err(Error::GroupFailed {
                id: self.id,
                failed: info
                    .all_tasks()
                    .iter()
                    .filter(|t| t.status == TaskStatus::Failed)
                    .count(),
            }),
            TaskStatus::Cancelled => Err(Error::GroupCancelled(self.id)),
            status => Err(Error::InvalidState {
                what: format!("Group {}", self.id),
                status: status.to_string(),
            }),
        }
    }
}

struct TaskEntry {
    record: Task,
    /// Taken when the task is launched.
    work: Option<TaskFuture>,
    cancel: CancellationToken,
}

struct Tables {
    tasks: Mutex<HashMap<TaskId, TaskEntry>>,
    groups: Mutex<HashMap<GroupId, TaskGroup>>,
    running: Mutex<HashSet<TaskId>>,
    /// Woken whenever a task reaches a terminal state.
    settled: Notify,
    limit: Option<Arc<Semaphore>>,
    /// Taken on its own, never together with the tables above.
    hooks: Mutex<Vec<Hook>>,
    next_hook: AtomicU64,
}

/// Hierarchical concurrent task scheduler.
///
/// Cheap to clone; clones share the same tables.
///
/// # Example
///
/// ```ignore
/// let manager = TaskManager::new();
/// let group = manager.create_group(GroupOptions::new().name("opening"))?;
/// manager.create_task(async { Ok(json!("rifles")) }, TaskOptions::new().group(group.id))?;
/// let info = manager.submit_group(group.id)?.wait().await?;
/// ```
#[derive(Clone)]
pub struct TaskManager {
    tables: Arc<Tables>,
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskManager {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// A manager that polls at most `max_concurrent` tasks at a time.
    ///
    /// Tasks waiting for a slot are already Running and can be cancelled.
    pub fn with_limit(max_concurrent: usize) -> Self {
        Self::build(Some(Arc::new(Semaphore::new(max_concurrent.max(1)))))
    }

    fn build(limit: Option<Arc<Semaphore>>) -> Self {
        Self {
            tables: Arc::new(Tables {
                tasks: Mutex::new(HashMap::new()),
                groups: Mutex::new(HashMap::new()),
                running: Mutex::new(HashSet::new()),
                settled: Notify::new(),
                limit,
                hooks: Mutex::new(Vec::new()),
                next_hook: AtomicU64::new(0),
            }),
        }
    }

    // ========== Creation ==========

    /// Register a pending task. It does not start until submitted.
    pub fn create_task<F>(&self, work: F, options: TaskOptions) -> Result<Task>
    where
        F: Future<Output = Result<Value>> + Send + 'static,
    {
        let id = options.id.unwrap_or_default();
        let mut record = Task::new(id, options.name.as_deref());

        let mut tasks = lock(&self.tables.tasks);
        if tasks.contains_key(&id) {
            return Err(Error::DuplicateTask(id));
        }
        if let Some(group_id) = options.group {
            let mut groups = lock(&self.tables.groups);
            let group = groups
                .get_mut(&group_id)
                .ok_or(Error::GroupNotFound(group_id))?;
            ensure_pending_group(group)?;
            group.add_task(id);
            record.group_id = Some(group_id);
        }

        clog_debug!("TaskManager: created task {} ({})", record.name, id.short());
        tasks.insert(
            id,
            TaskEntry {
                record: record.clone(),
                work: Some(Box::pin(work)),
                cancel: CancellationToken::new(),
            },
        );
        Ok(record)
    }

    /// Register a pending group, optionally nested under a parent.
    pub fn create_group(&self, options: GroupOptions) -> Result<TaskGroup> {
        let id = options.id.unwrap_or_default();
        let mut groups = lock(&self.tables.groups);
        if groups.contains_key(&id) {
            return Err(Error::DuplicateGroup(id));
        }
        if let Some(parent_id) = options.parent {
            let parent = groups
                .get_mut(&parent_id)
                .ok_or(Error::GroupNotFound(parent_id))?;
            ensure_pending_group(parent)?;
            parent.add_sub_group(id);
        }

        let group = TaskGroup::new(id, options.name.as_deref(), options.parent);
        clog_debug!("TaskManager: created group {} ({})", group.name, id.short());
        groups.insert(id, group.clone());
        Ok(group)
    }

    // ========== Execution ==========

    /// Launch a pending task as an independently scheduled unit of work.
    pub fn submit_task(&self, id: TaskId) -> Result<TaskHandle> {
        self.launch(id)
    }

    /// Launch every task of a pending group and of all its sub-groups.
    ///
    /// The group's status is derived once every member has settled; one
    /// member's failure never stops its siblings.
    pub fn submit_group(&self, id: GroupId) -> Result<GroupHandle> {
        {
            let mut groups = lock(&self.tables.groups);
            let group = groups.get_mut(&id).ok_or(Error::GroupNotFound(id))?;
            ensure_pending_group(group)?;
            group.start();
        }
        clog_debug!("TaskManager: group {} submitted", id.short());

        let run = self.start_group(id);
        Ok(GroupHandle {
            id,
            join: tokio::spawn(run),
            manager: self.clone(),
        })
    }

    fn launch(&self, id: TaskId) -> Result<TaskHandle> {
        let (work, cancel, snapshot) = {
            let mut tasks = lock(&self.tables.tasks);
            let entry = tasks.get_mut(&id).ok_or(Error::TaskNotFound(id))?;
            let invalid = Error::InvalidState {
                what: format!("Task {id}"),
                status: entry.record.status.to_string(),
            };
            if entry.record.status != TaskStatus::Pending {
                return Err(invalid);
            }
            let work = entry.work.take().ok_or(invalid)?;
            entry.record.start();
            (work, entry.cancel.clone(), entry.record.clone())
        };
        lock(&self.tables.running).insert(id);
        clog_debug!("TaskManager: task {} running", id.short());
        self.fire(TaskEvent::Start, &snapshot);

        let manager = self.clone();
        let join = tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = manager.execute(work) => Some(result),
            };
            manager.settle(id, outcome)
        });
        Ok(TaskHandle { id, join })
    }

    async fn execute(&self, work: TaskFuture) -> Result<Value> {
        let _permit = match &self.tables.limit {
            Some(semaphore) => Some(
                Arc::clone(semaphore)
                    .acquire_owned()
                    .await
                    .map_err(|e| Error::TaskJoin(e.to_string()))?,
            ),
            None => None,
        };
        match AssertUnwindSafe(work).catch_unwind().await {
            Ok(result) => result,
            Err(_) => Err(Error::Handler("task panicked".to_string())),
        }
    }

    /// Record a finished run of the work. `None` means the token fired.
    fn settle(&self, id: TaskId, outcome: Option<Result<Value>>) -> Result<Value> {
        let (result, event, snapshot) = {
            let mut tasks = lock(&self.tables.tasks);
            let entry = tasks.get_mut(&id).ok_or(Error::TaskNotFound(id))?;
            // `cancel_task` may already have settled the record.
            let event = match outcome {
                None => entry.record.cancel().then_some(TaskEvent::Cancel),
                Some(Ok(value)) => entry.record.complete(value).then_some(TaskEvent::Complete),
                Some(Err(err)) => {
                    let moved = entry.record.fail(&err.to_string());
                    if moved {
                        clog_debug!("TaskManager: task {} failed: {}", id.short(), err);
                    }
                    moved.then_some(TaskEvent::Error)
                }
            };
            (entry.record.outcome(), event, entry.record.clone())
        };
        lock(&self.tables.running).remove(&id);
        self.tables.settled.notify_waiters();
        clog_debug!("TaskManager: task {} settled", id.short());
        if let Some(event) = event {
            self.fire(event, &snapshot);
        }
        result
    }

    /// Launch the pending tasks of a group subtree and return a future that
    /// resolves to the group's derived status once all of them settled.
    fn start_group(&self, id: GroupId) -> BoxFuture<'static, TaskStatus> {
        let (task_ids, sub_ids) = {
            let mut groups = lock(&self.tables.groups);
            match groups.get_mut(&id) {
                Some(group) => {
                    group.start();
                    (group.tasks.clone(), group.sub_groups.clone())
                }
                None => (Vec::new(), Vec::new()),
            }
        };

        let mut members: Vec<BoxFuture<'static, ()>> = Vec::new();
        for task_id in task_ids {
            match self.launch(task_id) {
                Ok(handle) => members.push(
                    async move {
                        let _ = handle.wait().await;
                    }
                    .boxed(),
                ),
                // Already running on its own, or finished: just wait for it.
                Err(_) => {
                    let manager = self.clone();
                    members.push(
                        async move {
                            let _ = manager.wait_for_task(task_id, None).await;
                        }
                        .boxed(),
                    );
                }
            }
        }
        for sub_id in sub_ids {
            members.push(self.start_group(sub_id).map(|_| ()).boxed());
        }

        let manager = self.clone();
        async move {
            join_all(members).await;
            manager.finalize_group(id)
        }
        .boxed()
    }

    fn finalize_group(&self, id: GroupId) -> TaskStatus {
        let tasks = lock(&self.tables.tasks);
        let mut groups = lock(&self.tables.groups);
        let derived = aggregate_status(
            subtree_tasks(&groups, id)
                .iter()
                .filter_map(|t| tasks.get(t))
                .map(|entry| entry.record.status),
        );
        match groups.get_mut(&id) {
            Some(group) => {
                if group.settle(derived) {
                    clog_debug!("TaskManager: group {} {}", id.short(), derived);
                }
                group.status
            }
            None => derived,
        }
    }

    // ========== Cancellation ==========

    /// Request cooperative cancellation of a task.
    ///
    /// On success the task is Cancelled and out of the running set before
    /// this returns. Returns false for unknown or already terminal tasks.
    pub fn cancel_task(&self, id: TaskId) -> bool {
        let snapshot = {
            let mut tasks = lock(&self.tables.tasks);
            let Some(entry) = tasks.get_mut(&id) else {
                return false;
            };
            if !entry.record.cancel() {
                return false;
            }
            entry.cancel.cancel();
            entry.work = None;
            entry.record.clone()
        };
        lock(&self.tables.running).remove(&id);
        self.tables.settled.notify_waiters();
        clog_debug!("TaskManager: task {} cancelled", id.short());
        self.fire(TaskEvent::Cancel, &snapshot);
        true
    }

    /// Cancel every non-terminal task of a group subtree, then derive the
    /// status of each group in it. A member that already failed keeps the
    /// group Failed.
    ///
    /// Returns false for unknown or already terminal groups.
    pub fn cancel_group(&self, id: GroupId) -> bool {
        let task_ids = {
            let groups = lock(&self.tables.groups);
            match groups.get(&id) {
                Some(group) if !group.is_finished() => subtree_tasks(&groups, id),
                _ => return false,
            }
        };
        for task_id in task_ids {
            self.cancel_task(task_id);
        }

        let tasks = lock(&self.tables.tasks);
        let mut groups = lock(&self.tables.groups);
        for group_id in subtree_groups(&groups, id) {
            let derived = aggregate_status(
                subtree_tasks(&groups, group_id)
                    .iter()
                    .filter_map(|t| tasks.get(t))
                    .map(|entry| entry.record.status),
            );
            if let Some(group) = groups.get_mut(&group_id) {
                group.settle(derived);
            }
        }
        clog_debug!("TaskManager: group {} cancelled", id.short());
        true
    }

    /// Cancel every group and task that has not finished. Returns the number
    /// of tasks that were cancelled.
    pub fn cancel_all(&self) -> usize {
        let roots: Vec<GroupId> = lock(&self.tables.groups)
            .values()
            .filter(|g| g.parent.is_none() && !g.is_finished())
            .map(|g| g.id)
            .collect();
        let open: Vec<TaskId> = lock(&self.tables.tasks)
            .values()
            .filter(|e| !e.record.is_finished())
            .map(|e| e.record.id)
            .collect();

        for group_id in roots {
            self.cancel_group(group_id);
        }
        for task_id in &open {
            self.cancel_task(*task_id);
        }
        open.len()
    }

    // ========== Waiting ==========

    /// Wait until a task reaches a terminal state.
    ///
    /// Unlike blackboard waits, an elapsed `timeout` is an error here.
    pub async fn wait_for_task(&self, id: TaskId, timeout: Option<Duration>) -> Result<TaskStatus> {
        let wait = async {
            loop {
                let notified = self.tables.settled.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                match self.get_task_status(id) {
                    None => return Err(Error::TaskNotFound(id)),
                    Some(status) if status.is_terminal() => return Ok(status),
                    Some(_) => notified.await,
                }
            }
        };
        match timeout {
            Some(limit) => with_timeout(limit, wait).await,
            None => wait.await,
        }
    }

    /// Wait until no submitted task is still running.
    ///
    /// Tasks that were created but never submitted are not waited for.
    pub async fn wait_all(&self) {
        loop {
            let notified = self.tables.settled.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if !self.has_running() {
                return;
            }
            notified.await;
        }
    }

    /// [`TaskManager::wait_all`], then the outcome of every submitted task.
    ///
    /// An elapsed `timeout` is [`Error::Timeout`]; the tasks keep running.
    pub async fn wait_all_tasks(
        &self,
        timeout: Option<Duration>,
    ) -> Result<HashMap<TaskId, Result<Value>>> {
        let wait = async {
            self.wait_all().await;
            Ok::<(), Error>(())
        };
        match timeout {
            Some(limit) => with_timeout(limit, wait).await?,
            None => wait.await?,
        }

        Ok(lock(&self.tables.tasks)
            .values()
            .filter(|e| e.record.is_finished() && e.record.started_at.is_some())
            .map(|e| (e.record.id, e.record.outcome()))
            .collect())
    }

    fn has_running(&self) -> bool {
        lock(&self.tables.tasks)
            .values()
            .any(|e| e.record.status == TaskStatus::Running)
    }

    // ========== Callbacks ==========

    /// Subscribe to a lifecycle event of every task.
    ///
    /// Callbacks run on the thread that moved the task, after the scheduler
    /// released its guards, so they may call back into the manager.
    pub fn add_callback<F>(&self, event: TaskEvent, callback: F) -> CallbackId
    where
        F: Fn(&Task) -> Result<()> + Send + Sync + 'static,
    {
        let id = CallbackId(self.tables.next_hook.fetch_add(1, Ordering::Relaxed));
        lock(&self.tables.hooks).push(Hook {
            id,
            event,
            callback: Arc::new(callback),
        });
        id
    }

    /// Returns false if `id` was not registered.
    pub fn remove_callback(&self, id: CallbackId) -> bool {
        let mut hooks = lock(&self.tables.hooks);
        let before = hooks.len();
        hooks.retain(|h| h.id != id);
        hooks.len() != before
    }

    fn fire(&self, event: TaskEvent, task: &Task) {
        let callbacks: Vec<TaskCallback> = lock(&self.tables.hooks)
            .iter()
            .filter(|h| h.event == event)
            .map(|h| Arc::clone(&h.callback))
            .collect();
        for callback in callbacks {
            match std::panic::catch_unwind(AssertUnwindSafe(|| callback(task))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => clog_warn!(
                    "TaskManager: {} callback for task {} failed: {}",
                    event,
                    task.id.short(),
                    e
                ),
                Err(_) => clog_warn!(
                    "TaskManager: {} callback for task {} panicked",
                    event,
                    task.id.short()
                ),
            }
        }
    }

    // ========== Queries ==========

    pub fn get_task_status(&self, id: TaskId) -> Option<TaskStatus> {
        lock(&self.tables.tasks).get(&id).map(|e| e.record.status)
    }

    /// The value of a completed task.
    ///
    /// `Ok(None)` while the task has not finished (and for cancelled tasks);
    /// the captured error for failed tasks.
    pub fn get_task_result(&self, id: TaskId) -> Result<Option<Value>> {
        let tasks = lock(&self.tables.tasks);
        let entry = tasks.get(&id).ok_or(Error::TaskNotFound(id))?;
        match entry.record.status {
            TaskStatus::Completed | TaskStatus::Failed => entry.record.outcome().map(Some),
            _ => Ok(None),
        }
    }

    pub fn get_task_info(&self, id: TaskId) -> Option<Task> {
        lock(&self.tables.tasks).get(&id).map(|e| e.record.clone())
    }

    pub fn get_group_info(&self, id: GroupId) -> Option<GroupInfo> {
        let tasks = lock(&self.tables.tasks);
        let groups = lock(&self.tables.groups);
        group_info(&tasks, &groups, id)
    }

    /// Every task, oldest first.
    pub fn get_all_tasks_info(&self) -> Vec<Task> {
        let mut all: Vec<Task> = lock(&self.tables.tasks)
            .values()
            .map(|e| e.record.clone())
            .collect();
        all.sort_by_key(|t| t.created_at);
        all
    }

    /// Every group, oldest first. Nested groups also appear on their own.
    pub fn get_all_groups_info(&self) -> Vec<GroupInfo> {
        let tasks = lock(&self.tables.tasks);
        let groups = lock(&self.tables.groups);
        let mut ids: Vec<&TaskGroup> = groups.values().collect();
        ids.sort_by_key(|g| g.created_at);
        ids.iter()
            .filter_map(|g| group_info(&tasks, &groups, g.id))
            .collect()
    }

    pub fn get_running_tasks(&self) -> Vec<TaskId> {
        lock(&self.tables.running).iter().copied().collect()
    }

    pub fn is_running(&self, id: TaskId) -> bool {
        lock(&self.tables.running).contains(&id)
    }

    pub fn stats(&self) -> ManagerStats {
        let tasks = lock(&self.tables.tasks);
        let total_groups = lock(&self.tables.groups).len();
        let running_tasks = lock(&self.tables.running).len();

        let mut tasks_by_status: BTreeMap<String, usize> = TaskStatus::ALL
            .iter()
            .map(|s| (s.to_string(), 0))
            .collect();
        for entry in tasks.values() {
            *tasks_by_status
                .entry(entry.record.status.to_string())
                .or_default() += 1;
        }

        ManagerStats {
            total_tasks: tasks.len(),
            running_tasks,
            total_groups,
            tasks_by_status,
        }
    }
}

fn ensure_pending_group(group: &TaskGroup) -> Result<()> {
    if group.status == TaskStatus::Pending {
        Ok(())
    } else {
        Err(Error::InvalidState {
            what: format!("Group {}", group.id),
            status: group.status.to_string(),
        })
    }
}

/// Every task owned by a group, directly or through sub-groups.
fn subtree_tasks(groups: &HashMap<GroupId, TaskGroup>, id: GroupId) -> Vec<TaskId> {
    let mut out = Vec::new();
    if let Some(group) = groups.get(&id) {
        out.extend(group.tasks.iter().copied());
        for sub in &group.sub_groups {
            out.extend(subtree_tasks(groups, *sub));
        }
    }
    out
}

/// A group and all its descendants, children before parents.
fn subtree_groups(groups: &HashMap<GroupId, TaskGroup>, id: GroupId) -> Vec<GroupId> {
    let mut out = Vec::new();
    if let Some(group) = groups.get(&id) {
        for sub in &group.sub_groups {
            out.extend(subtree_groups(groups, *sub));
        }
        out.push(id);
    }
    out
}

fn group_info(
    tasks: &HashMap<TaskId, TaskEntry>,
    groups: &HashMap<GroupId, TaskGroup>,
    id: GroupId,
) -> Option<GroupInfo> {
    let group = groups.get(&id)?;
    Some(GroupInfo {
        id,
        name: group.name.clone(),
        status: group.status,
        parent_group_id: group.parent,
        tasks: group
            .tasks
            .iter()
            .filter_map(|t| tasks.get(t))
            .map(|e| e.record.clone())
            .collect(),
        sub_groups: group
            .sub_groups
            .iter()
            .filter_map(|g| group_info(tasks, groups, *g))
            .collect(),
        started_at: group.started_at,
        completed_at: group.completed_at,
    })
}
