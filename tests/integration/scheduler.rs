//! Scheduler integration tests.
//!
//! These tests verify task lifecycle guarantees and how group status is
//! derived through nested groups.

use std::time::Duration;

use serde_json::json;

use commander::core::{GroupId, TaskStatus};
use commander::orchestration::{GroupOptions, TaskManager, TaskOptions};
use commander::Error;
use tokio_test::{assert_err, assert_ok};

use crate::fixtures::{fail_after, sleep_forever, succeed_after};

fn rank(status: TaskStatus) -> u8 {
    match status {
        TaskStatus::Pending => 0,
        TaskStatus::Running => 1,
        _ => 2,
    }
}

/// Build root -> mid -> leaf, one task per level. Returns the group ids
/// outermost first.
fn three_levels(manager: &TaskManager) -> [GroupId; 3] {
    let root = manager.create_group(GroupOptions::new().name("root")).unwrap();
    let mid = manager
        .create_group(GroupOptions::new().name("mid").parent(root.id))
        .unwrap();
    let leaf = manager
        .create_group(GroupOptions::new().name("leaf").parent(mid.id))
        .unwrap();
    for group in [root.id, mid.id] {
        manager
            .create_task(succeed_after(5, json!("ok")), TaskOptions::new().group(group))
            .unwrap();
    }
    [root.id, mid.id, leaf.id]
}

/// Test: Status never moves backwards
/// Given several tasks with different outcomes
/// When their status is sampled throughout their lifetime
/// Then no sample is ever less advanced than the one before
#[tokio::test]
async fn test_status_is_monotonic() {
    let manager = TaskManager::new();
    let ids = vec![
        manager
            .create_task(succeed_after(10, json!(1)), TaskOptions::new())
            .unwrap()
            .id,
        manager
            .create_task(fail_after(5, "boom"), TaskOptions::new())
            .unwrap()
            .id,
        manager
            .create_task(sleep_forever(), TaskOptions::new())
            .unwrap()
            .id,
    ];
    let mut last: Vec<u8> = ids
        .iter()
        .map(|id| rank(manager.get_task_status(*id).unwrap()))
        .collect();

    for id in &ids {
        manager.submit_task(*id).unwrap();
    }
    for round in 0..30 {
        if round == 15 {
            manager.cancel_task(ids[2]);
        }
        for (i, id) in ids.iter().enumerate() {
            let now = rank(manager.get_task_status(*id).unwrap());
            assert!(now >= last[i], "task {i} went backwards");
            last[i] = now;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    assert_eq!(manager.get_task_status(ids[0]), Some(TaskStatus::Completed));
    assert_eq!(manager.get_task_status(ids[1]), Some(TaskStatus::Failed));
    assert_eq!(manager.get_task_status(ids[2]), Some(TaskStatus::Cancelled));
}

/// Test: Cancelling a running task is visible immediately
/// Given a submitted long-sleeping task
/// When it is cancelled
/// Then it is absent from the running set with no intervening wait
#[tokio::test(start_paused = true)]
async fn test_cancel_running_task_leaves_running_set() {
    let manager = TaskManager::new();
    let task = manager
        .create_task(sleep_forever(), TaskOptions::new().name("siege"))
        .unwrap();
    manager.submit_task(task.id).unwrap();
    tokio::task::yield_now().await;
    assert_eq!(manager.get_running_tasks(), vec![task.id]);

    assert!(manager.cancel_task(task.id));
    assert!(manager.get_running_tasks().is_empty());
    assert_eq!(manager.stats().running_tasks, 0);
    assert!(!manager.cancel_task(task.id));
}

/// Test: A task's error stays on the task
/// Given a task that fails
/// When it is submitted and later read back
/// Then submission succeeds and the error surfaces only on await or read
#[tokio::test]
async fn test_task_error_is_captured() {
    let manager = TaskManager::new();
    let task = manager
        .create_task(fail_after(1, "supply blocked"), TaskOptions::new())
        .unwrap();

    let handle = assert_ok!(manager.submit_task(task.id));
    let status = manager.wait_for_task(task.id, None).await.unwrap();
    assert_eq!(status, TaskStatus::Failed);

    match manager.get_task_result(task.id) {
        Err(Error::TaskFailed { id, message }) => {
            assert_eq!(id, task.id);
            assert!(message.contains("supply blocked"));
        }
        other => panic!("expected TaskFailed, got {other:?}"),
    }
    assert_err!(handle.wait().await);
    assert_err!(manager.submit_task(task.id));
}

/// Test: Completion propagates through nesting
/// Given three nested groups whose tasks all succeed
/// When the root is submitted
/// Then every level is Completed
#[tokio::test]
async fn test_nested_groups_complete() {
    let manager = TaskManager::new();
    let [root, mid, leaf] = three_levels(&manager);
    manager
        .create_task(succeed_after(1, json!("leaf")), TaskOptions::new().group(leaf))
        .unwrap();

    let info = manager.submit_group(root).unwrap().wait().await.unwrap();
    assert_eq!(info.status, TaskStatus::Completed);
    assert_eq!(info.all_tasks().len(), 3);
    for id in [mid, leaf] {
        assert_eq!(
            manager.get_group_info(id).unwrap().status,
            TaskStatus::Completed
        );
    }
}

/// Test: Failure deep in the tree fails every ancestor
/// Given three nested groups with a failing task in the innermost
/// When the root is submitted
/// Then leaf, mid and root are all Failed and siblings still completed
#[tokio::test]
async fn test_deep_failure_propagates() {
    let manager = TaskManager::new();
    let [root, mid, leaf] = three_levels(&manager);
    manager
        .create_task(fail_after(1, "lost"), TaskOptions::new().group(leaf))
        .unwrap();

    let err = manager.submit_group(root).unwrap().wait().await.unwrap_err();
    assert!(matches!(err, Error::GroupFailed { failed: 1, .. }));
    for id in [root, mid, leaf] {
        assert_eq!(manager.get_group_info(id).unwrap().status, TaskStatus::Failed);
    }

    let info = manager.get_group_info(root).unwrap();
    let completed = info
        .all_tasks()
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .count();
    assert_eq!(completed, 2);
}

/// Test: Cancellation deep in the tree cancels every ancestor
/// Given three nested groups with a never-ending task in the innermost
/// When the innermost group is cancelled mid-run
/// Then every level ends Cancelled
#[tokio::test(start_paused = true)]
async fn test_deep_cancellation_propagates() {
    let manager = TaskManager::new();
    let [root, mid, leaf] = three_levels(&manager);
    manager
        .create_task(sleep_forever(), TaskOptions::new().group(leaf))
        .unwrap();

    let handle = manager.submit_group(root).unwrap();
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(manager.cancel_group(leaf));

    assert!(matches!(handle.wait().await, Err(Error::GroupCancelled(_))));
    for id in [root, mid, leaf] {
        assert_eq!(
            manager.get_group_info(id).unwrap().status,
            TaskStatus::Cancelled
        );
    }
}

/// Test: Failure wins over cancellation
/// Given a group with one failed and one cancelled member in different sub-groups
/// When the group settles
/// Then it is Failed
#[tokio::test(start_paused = true)]
async fn test_failure_takes_precedence_over_cancellation() {
    let manager = TaskManager::new();
    let root = manager.create_group(GroupOptions::new()).unwrap();
    let failing = manager
        .create_group(GroupOptions::new().parent(root.id))
        .unwrap();
    let cancelled = manager
        .create_group(GroupOptions::new().parent(root.id))
        .unwrap();
    manager
        .create_task(fail_after(1, "ambush"), TaskOptions::new().group(failing.id))
        .unwrap();
    manager
        .create_task(sleep_forever(), TaskOptions::new().group(cancelled.id))
        .unwrap();

    let handle = manager.submit_group(root.id).unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    manager.cancel_group(cancelled.id);

    assert!(matches!(handle.wait().await, Err(Error::GroupFailed { .. })));
    assert_eq!(
        manager.get_group_info(cancelled.id).unwrap().status,
        TaskStatus::Cancelled
    );
    assert_eq!(manager.get_group_info(root.id).unwrap().status, TaskStatus::Failed);
}

/// Test: Group info mirrors the tree
/// Given a root with two sub-groups
/// When its info is read
/// Then sub-groups are nested with parent back-references
#[tokio::test]
async fn test_group_info_structure() {
    let manager = TaskManager::new();
    let root = manager.create_group(GroupOptions::new().name("army")).unwrap();
    for name in ["air", "ground"] {
        manager
            .create_group(GroupOptions::new().name(name).parent(root.id))
            .unwrap();
    }

    let info = manager.get_group_info(root.id).unwrap();
    assert_eq!(info.name, "army");
    assert_eq!(info.status, TaskStatus::Pending);
    assert_eq!(info.sub_groups.len(), 2);
    assert!(info
        .sub_groups
        .iter()
        .all(|g| g.parent_group_id == Some(root.id)));
    assert_eq!(manager.get_all_groups_info().len(), 3);
}
