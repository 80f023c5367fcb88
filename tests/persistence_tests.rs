//! Saving and restoring agents across runtimes.

mod common;

use serde_json::json;
use std::sync::Arc;

use adept::storage::{InMemoryStateStore, JsonFileStateStore, StateStore};
use adept::{AgentConfig, AgentStatus, Runtime, Task, TaskStatus};
use common::{fast_config, wait_for_status, wait_until, Recorder};

fn file_runtime(path: &std::path::Path) -> Runtime {
    let mut config = fast_config();
    config.storage.path = Some(path.to_path_buf());
    Runtime::builder().config(config).build()
}

#[tokio::test]
async fn test_restart_from_file_resumes_pending_work_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state").join("agents.json");

    let first = file_runtime(&path);
    let first_recorder = Arc::new(Recorder::new("recorder"));
    first.abilities().register(first_recorder.clone()).unwrap();
    assert_eq!(first.launch().await.unwrap(), 0);
    let agent_id = first
        .create_agent(AgentConfig::new("survivor").with_type("durable"))
        .unwrap();
    first.start_agent(agent_id).unwrap();
    wait_for_status(&first, agent_id, AgentStatus::Running).await;

    let stored = first
        .execute_task(
            agent_id,
            Task::direct("memory_store").with_payload(json!({"key": "city", "value": "Lisbon"})),
        )
        .await;
    assert!(stored.success);

    first.pause_agent(agent_id).unwrap();
    let submissions = [(0, 0), (1, 0), (2, 5), (3, 0)];
    let mut task_ids = Vec::new();
    for (n, priority) in submissions {
        let task = Task::queued("recorder")
            .with_payload(json!(n))
            .with_priority(priority);
        task_ids.push(first.execute_task(agent_id, task).await.task_id.unwrap());
    }
    first.shutdown().await.unwrap();
    assert!(path.exists());
    assert!(first_recorder.seen.lock().unwrap().is_empty());

    let second = file_runtime(&path);
    let second_recorder = Arc::new(Recorder::new("recorder"));
    second.abilities().register(second_recorder.clone()).unwrap();
    assert_eq!(second.launch().await.unwrap(), 1);

    let report = second.get_agent_status(agent_id).unwrap();
    assert_eq!(report.name, "survivor");
    assert_eq!(report.agent_type, "durable");
    assert_eq!(report.status, AgentStatus::Stopped);
    assert_eq!(report.queue_len, 4);
    for task_id in &task_ids {
        assert_eq!(
            second.get_task_status(agent_id, *task_id).unwrap(),
            TaskStatus::Pending
        );
    }

    second.start_agent(agent_id).unwrap();
    wait_until("restored tasks to finish", || {
        task_ids.iter().all(|id| {
            second.get_task_status(agent_id, *id).ok() == Some(TaskStatus::Completed)
        })
    })
    .await;

    // Priority first, then the order the tasks were originally submitted in
    let seen = second_recorder.seen.lock().unwrap().clone();
    assert_eq!(seen, vec![json!(2), json!(0), json!(1), json!(3)]);

    let recalled = second
        .execute_task(
            agent_id,
            Task::direct("memory_recall").with_payload(json!({"key": "city"})),
        )
        .await;
    assert!(recalled.success);
    assert_eq!(recalled.result.unwrap()["value"], json!("Lisbon"));

    second.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_restore_skips_known_agents() {
    let store = Arc::new(InMemoryStateStore::new());
    let runtime = Runtime::builder()
        .config(fast_config())
        .store(store.clone())
        .build();
    let agent_id = runtime.create_agent(AgentConfig::new("twice")).unwrap();
    runtime.persist().await.unwrap();

    assert_eq!(runtime.restore().await.unwrap(), 0);
    assert_eq!(runtime.list_agents().len(), 1);
    assert_eq!(
        runtime.get_agent_status(agent_id).unwrap().status,
        AgentStatus::Created
    );
}

#[tokio::test]
async fn test_stop_saves_through_store() {
    let store = Arc::new(InMemoryStateStore::new());
    let runtime = Runtime::builder()
        .config(fast_config())
        .store(store.clone())
        .build();
    let agent_id = runtime.create_agent(AgentConfig::new("noted")).unwrap();
    runtime.start_agent(agent_id).unwrap();
    wait_for_status(&runtime, agent_id, AgentStatus::Running).await;
    runtime
        .execute_task(agent_id, Task::direct("echo").with_payload(json!("hi")))
        .await;

    runtime.stop_agent(agent_id).await.unwrap();
    assert!(store.save_count() > 0);

    let saved = store.load().await.unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].history.len(), 1);
    assert_eq!(saved[0].results.len(), 1);
}

#[tokio::test]
async fn test_corrupt_state_file_fails_launch() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("agents.json");
    std::fs::write(&path, "{ not json").unwrap();

    let store = JsonFileStateStore::new(&path);
    assert!(store.load().await.is_err());

    let runtime = file_runtime(&path);
    assert!(runtime.launch().await.is_err());
}
