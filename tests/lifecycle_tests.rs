//! Lifecycle transitions, loop ownership and restart paths.

mod common;

use serde_json::json;
use std::sync::Arc;

use adept::storage::InMemoryStateStore;
use adept::{AgentConfig, AgentStatus, Runtime, RuntimeError, Task, TaskStatus};
use common::{fast_config, runtime_with, wait_for_status, wait_until, Boom, Gate};

#[tokio::test]
async fn test_full_lifecycle_walk() {
    let runtime = runtime_with(fast_config());
    let agent_id = runtime.create_agent(AgentConfig::new("walker")).unwrap();
    assert_eq!(
        runtime.get_agent_status(agent_id).unwrap().status,
        AgentStatus::Created
    );

    runtime.start_agent(agent_id).unwrap();
    wait_for_status(&runtime, agent_id, AgentStatus::Running).await;

    runtime.pause_agent(agent_id).unwrap();
    assert_eq!(
        runtime.get_agent_status(agent_id).unwrap().status,
        AgentStatus::Paused
    );

    runtime.resume_agent(agent_id).unwrap();
    assert_eq!(
        runtime.get_agent_status(agent_id).unwrap().status,
        AgentStatus::Running
    );

    runtime.stop_agent(agent_id).await.unwrap();
    let report = runtime.get_agent_status(agent_id).unwrap();
    assert_eq!(report.status, AgentStatus::Stopped);
    assert_eq!(report.uptime_secs, 0.0);
    assert!(runtime.loop_task_id(agent_id).is_none());

    // Stopped agents may start again
    runtime.start_agent(agent_id).unwrap();
    wait_for_status(&runtime, agent_id, AgentStatus::Running).await;
}

#[tokio::test]
async fn test_invalid_transitions_conflict() {
    let runtime = runtime_with(fast_config());
    let agent_id = runtime.create_agent(AgentConfig::new("strict")).unwrap();

    assert!(matches!(
        runtime.pause_agent(agent_id),
        Err(RuntimeError::StateConflict { .. })
    ));
    assert!(matches!(
        runtime.resume_agent(agent_id),
        Err(RuntimeError::StateConflict { .. })
    ));

    runtime.start_agent(agent_id).unwrap();
    wait_for_status(&runtime, agent_id, AgentStatus::Running).await;
    assert!(matches!(
        runtime.resume_agent(agent_id),
        Err(RuntimeError::StateConflict { .. })
    ));

    runtime.pause_agent(agent_id).unwrap();
    assert!(matches!(
        runtime.start_agent(agent_id),
        Err(RuntimeError::StateConflict { .. })
    ));
    assert_eq!(
        runtime.get_agent_status(agent_id).unwrap().status,
        AgentStatus::Paused
    );
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let runtime = runtime_with(fast_config());
    let agent_id = runtime.create_agent(AgentConfig::new("quiet")).unwrap();

    runtime.stop_agent(agent_id).await.unwrap();
    runtime.stop_agent(agent_id).await.unwrap();
    assert_eq!(
        runtime.get_agent_status(agent_id).unwrap().status,
        AgentStatus::Stopped
    );
}

#[tokio::test]
async fn test_second_start_keeps_single_loop() {
    let runtime = runtime_with(fast_config());
    let agent_id = runtime.create_agent(AgentConfig::new("single")).unwrap();

    runtime.start_agent(agent_id).unwrap();
    let first = runtime.loop_task_id(agent_id);
    assert!(first.is_some());

    runtime.start_agent(agent_id).unwrap();
    wait_for_status(&runtime, agent_id, AgentStatus::Running).await;
    runtime.start_agent(agent_id).unwrap();

    assert_eq!(runtime.loop_task_id(agent_id), first);
}

#[tokio::test]
async fn test_restart_recovers_from_error() {
    let runtime = runtime_with(fast_config());
    runtime.abilities().register(Arc::new(Boom)).unwrap();
    let agent_id = runtime.create_agent(AgentConfig::new("phoenix")).unwrap();
    runtime.start_agent(agent_id).unwrap();
    wait_for_status(&runtime, agent_id, AgentStatus::Running).await;
    let first_loop = runtime.loop_task_id(agent_id);

    runtime.execute_task(agent_id, Task::direct("boom")).await;
    assert_eq!(
        runtime.get_agent_status(agent_id).unwrap().status,
        AgentStatus::Error
    );
    assert!(matches!(
        runtime.start_agent(agent_id),
        Err(RuntimeError::StateConflict { .. })
    ));

    runtime.restart_agent(agent_id).await.unwrap();
    wait_for_status(&runtime, agent_id, AgentStatus::Running).await;

    let report = runtime.get_agent_status(agent_id).unwrap();
    assert!(report.last_error.is_none());
    assert!(report.last_error_at.is_none());
    let second_loop = runtime.loop_task_id(agent_id);
    assert!(second_loop.is_some());
    assert_ne!(second_loop, first_loop);
}

#[tokio::test]
async fn test_queued_failure_stops_loop_in_error() {
    let runtime = runtime_with(fast_config());
    runtime.abilities().register(Arc::new(Boom)).unwrap();
    let agent_id = runtime.create_agent(AgentConfig::new("doomed")).unwrap();
    runtime.start_agent(agent_id).unwrap();
    wait_for_status(&runtime, agent_id, AgentStatus::Running).await;

    let task_id = runtime
        .execute_task(agent_id, Task::queued("boom"))
        .await
        .task_id
        .unwrap();
    wait_for_status(&runtime, agent_id, AgentStatus::Error).await;
    wait_until("loop to exit", || runtime.loop_task_id(agent_id).is_none()).await;

    assert_eq!(
        runtime.get_task_status(agent_id, task_id).unwrap(),
        TaskStatus::Failed
    );
}

#[tokio::test]
async fn test_loop_restarts_itself_when_enabled() {
    let mut config = fast_config();
    config.restart.from_loop = true;
    let runtime = runtime_with(config);
    runtime.abilities().register(Arc::new(Boom)).unwrap();
    let agent_id = runtime.create_agent(AgentConfig::new("resilient")).unwrap();
    runtime.start_agent(agent_id).unwrap();
    wait_for_status(&runtime, agent_id, AgentStatus::Running).await;
    let first_loop = runtime.loop_task_id(agent_id);

    runtime.execute_task(agent_id, Task::queued("boom")).await;
    wait_until("a fresh loop", || {
        let loop_id = runtime.loop_task_id(agent_id);
        loop_id.is_some() && loop_id != first_loop
    })
    .await;
    wait_for_status(&runtime, agent_id, AgentStatus::Running).await;
    assert!(runtime.get_agent_status(agent_id).unwrap().last_error.is_none());
}

#[tokio::test]
async fn test_stop_timeout_moves_agent_to_error() {
    let mut config = fast_config();
    config.agent.stop_timeout_secs = 0.1;
    let runtime = runtime_with(config);
    let gate = Arc::new(Gate::new("gate"));
    runtime.abilities().register(gate.clone()).unwrap();

    let agent_id = runtime.create_agent(AgentConfig::new("stuck")).unwrap();
    runtime.start_agent(agent_id).unwrap();
    wait_for_status(&runtime, agent_id, AgentStatus::Running).await;

    let task_id = runtime
        .execute_task(agent_id, Task::queued("gate"))
        .await
        .task_id
        .unwrap();
    wait_until("task to start", || {
        runtime.get_task_status(agent_id, task_id).ok() == Some(TaskStatus::Running)
    })
    .await;

    runtime.stop_agent(agent_id).await.unwrap();

    let report = runtime.get_agent_status(agent_id).unwrap();
    assert_eq!(report.status, AgentStatus::Error);
    assert!(report.last_error.unwrap().contains("did not stop"));
    gate.permits.add_permits(1);
}

#[tokio::test]
async fn test_zero_stop_timeout_waits_for_loop() {
    let mut config = fast_config();
    config.agent.stop_timeout_secs = 0.0;
    let runtime = runtime_with(config);
    let gate = Arc::new(Gate::new("gate"));
    runtime.abilities().register(gate.clone()).unwrap();

    let agent_id = runtime.create_agent(AgentConfig::new("patient")).unwrap();
    runtime.start_agent(agent_id).unwrap();
    wait_for_status(&runtime, agent_id, AgentStatus::Running).await;

    let task_id = runtime
        .execute_task(agent_id, Task::queued("gate"))
        .await
        .task_id
        .unwrap();
    wait_until("task to start", || {
        runtime.get_task_status(agent_id, task_id).ok() == Some(TaskStatus::Running)
    })
    .await;

    let stopper = runtime.clone();
    let stop = tokio::spawn(async move { stopper.stop_agent(agent_id).await });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(!stop.is_finished());
    assert_ne!(
        runtime.get_agent_status(agent_id).unwrap().status,
        AgentStatus::Error
    );

    gate.permits.add_permits(1);
    stop.await.unwrap().unwrap();

    let report = runtime.get_agent_status(agent_id).unwrap();
    assert_eq!(report.status, AgentStatus::Stopped);
    assert!(report.last_error.is_none());
    assert!(runtime.loop_task_id(agent_id).is_none());
}

#[tokio::test]
async fn test_history_is_bounded_fifo() {
    let runtime = runtime_with(fast_config());
    let agent_id = runtime
        .create_agent(AgentConfig::new("forgetful").with_max_task_history(3))
        .unwrap();
    runtime.start_agent(agent_id).unwrap();
    wait_for_status(&runtime, agent_id, AgentStatus::Running).await;

    for i in 0..5 {
        let response = runtime
            .execute_task(agent_id, Task::direct("echo").with_payload(json!(i)))
            .await;
        assert!(response.success);
    }

    let history = runtime.get_agent(agent_id).unwrap().history();
    let inputs: Vec<_> = history.iter().map(|entry| entry.input.clone()).collect();
    assert_eq!(inputs, vec![json!(2), json!(3), json!(4)]);
    assert_eq!(runtime.get_agent_status(agent_id).unwrap().history_len, 3);
}

#[tokio::test]
async fn test_delete_agent_retires_id() {
    let runtime = runtime_with(fast_config());
    let agent_id = runtime.create_agent(AgentConfig::new("ephemeral")).unwrap();
    runtime.start_agent(agent_id).unwrap();
    wait_for_status(&runtime, agent_id, AgentStatus::Running).await;

    runtime.delete_agent(agent_id).await.unwrap();

    assert!(matches!(
        runtime.get_agent_status(agent_id),
        Err(RuntimeError::AgentNotFound(_))
    ));
    assert!(runtime.loop_task_id(agent_id).is_none());
    assert!(runtime.list_agents().is_empty());
    assert!(matches!(
        runtime.delete_agent(agent_id).await,
        Err(RuntimeError::AgentNotFound(_))
    ));
}

#[tokio::test]
async fn test_loop_exit_persists_state() {
    let store = Arc::new(InMemoryStateStore::new());
    let runtime = Runtime::builder()
        .config(fast_config())
        .store(store.clone())
        .build();
    let agent_id = runtime.create_agent(AgentConfig::new("saved")).unwrap();
    runtime.start_agent(agent_id).unwrap();
    wait_for_status(&runtime, agent_id, AgentStatus::Running).await;

    runtime.stop_agent(agent_id).await.unwrap();

    assert!(store.save_count() >= 1);
    let saved = store.snapshot();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].id, agent_id);
    assert_eq!(saved[0].status, AgentStatus::Stopped);
}
