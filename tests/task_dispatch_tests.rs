//! Task submission, queue ordering and task record tests.

mod common;

use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use adept::metrics::InMemoryMetrics;
use adept::{AgentConfig, AgentStatus, Runtime, RuntimeError, SkillConfig, Task, TaskStatus};
use common::{
    fast_config, runtime_with, wait_for_status, wait_until, Boom, Gate, Panicker, Probe, Recorder,
};

#[tokio::test]
async fn test_direct_echo_keeps_agent_running() {
    let runtime = runtime_with(fast_config());
    runtime
        .abilities()
        .register_fn("echo", "returns the payload", |_, task| Ok(task.payload.clone()))
        .unwrap();

    let agent_id = runtime
        .create_agent(AgentConfig::new("echoer").with_ability("echo"))
        .unwrap();
    runtime.start_agent(agent_id).unwrap();
    wait_for_status(&runtime, agent_id, AgentStatus::Running).await;

    let response = runtime
        .execute_task(agent_id, Task::direct("echo").with_payload(json!("hi")))
        .await;

    assert!(response.success);
    assert!(!response.queued);
    assert_eq!(response.result, Some(json!("hi")));
    assert_eq!(response.status, Some(TaskStatus::Completed));
    assert_eq!(
        runtime.get_agent_status(agent_id).unwrap().status,
        AgentStatus::Running
    );
}

#[tokio::test]
async fn test_direct_dispatch_to_unstarted_agent_is_rejected() {
    let runtime = runtime_with(fast_config());
    let agent_id = runtime.create_agent(AgentConfig::new("idle")).unwrap();

    let response = runtime
        .execute_task(agent_id, Task::direct("echo").with_payload(json!("hi")))
        .await;

    assert!(!response.success);
    assert_eq!(response.error.as_deref(), Some("Agent not in correct state"));
    assert!(response.task_id.is_none());
    assert!(runtime.list_tasks(agent_id, None, 10).unwrap().is_empty());
    assert_eq!(
        runtime.get_agent_status(agent_id).unwrap().status,
        AgentStatus::Created
    );
}

#[tokio::test]
async fn test_failing_ability_moves_agent_to_error() {
    let runtime = runtime_with(fast_config());
    runtime.abilities().register(Arc::new(Boom)).unwrap();
    let agent_id = runtime.create_agent(AgentConfig::new("fragile")).unwrap();
    runtime.start_agent(agent_id).unwrap();
    wait_for_status(&runtime, agent_id, AgentStatus::Running).await;

    let response = runtime.execute_task(agent_id, Task::direct("boom")).await;

    assert!(!response.success);
    assert_eq!(response.status, Some(TaskStatus::Failed));
    let task_id = response.task_id.unwrap();
    let record = runtime.get_task_result(agent_id, task_id).unwrap();
    assert_eq!(record.status, TaskStatus::Failed);
    assert!(record.error.unwrap().contains("kaboom"));

    let report = runtime.get_agent_status(agent_id).unwrap();
    assert_eq!(report.status, AgentStatus::Error);
    assert!(report.last_error.unwrap().contains("kaboom"));
    assert!(report.last_error_at.is_some());
}

#[tokio::test]
async fn test_panicking_ability_is_contained() {
    let runtime = runtime_with(fast_config());
    runtime.abilities().register(Arc::new(Panicker)).unwrap();
    let agent_id = runtime.create_agent(AgentConfig::new("brave")).unwrap();
    runtime.start_agent(agent_id).unwrap();
    wait_for_status(&runtime, agent_id, AgentStatus::Running).await;

    let response = runtime.execute_task(agent_id, Task::direct("panicker")).await;

    assert!(!response.success);
    assert!(response.error.unwrap().contains("ability exploded"));
    assert_eq!(
        runtime.get_agent_status(agent_id).unwrap().status,
        AgentStatus::Error
    );
}

#[tokio::test]
async fn test_rejections_in_check_order() {
    let runtime = runtime_with(fast_config());
    let scoped = runtime
        .create_agent(AgentConfig::new("scoped").with_ability("ping"))
        .unwrap();

    let missing = runtime
        .execute_task(adept::AgentId::new_v4(), Task::queued("echo"))
        .await;
    assert_eq!(missing.error.as_deref(), Some("Agent not found"));

    let unknown = runtime.execute_task(scoped, Task::queued("teleport")).await;
    assert_eq!(unknown.error.as_deref(), Some("Ability not found: teleport"));

    let empty = runtime.execute_task(scoped, Task::queued("")).await;
    assert_eq!(empty.error.as_deref(), Some("Ability not found: "));

    let disabled = runtime.execute_task(scoped, Task::queued("echo")).await;
    assert_eq!(
        disabled.error.as_deref(),
        Some("Ability not enabled for agent: echo")
    );

    let not_started = runtime.execute_task(scoped, Task::queued("ping")).await;
    assert_eq!(
        not_started.error.as_deref(),
        Some("Agent not in correct state")
    );

    assert!(runtime.list_tasks(scoped, None, 10).unwrap().is_empty());
}

#[tokio::test]
async fn test_queue_full_rejects() {
    let runtime = runtime_with(fast_config());
    let agent_id = runtime
        .create_agent(AgentConfig::new("tiny").with_queue_size(1))
        .unwrap();
    runtime.start_agent(agent_id).unwrap();
    wait_for_status(&runtime, agent_id, AgentStatus::Running).await;
    runtime.pause_agent(agent_id).unwrap();

    let first = runtime.execute_task(agent_id, Task::queued("echo")).await;
    let second = runtime.execute_task(agent_id, Task::queued("echo")).await;

    assert!(first.success && first.queued);
    assert!(!second.success);
    assert_eq!(second.error.as_deref(), Some("Task queue full"));
    assert_eq!(runtime.list_tasks(agent_id, None, 10).unwrap().len(), 1);
}

#[tokio::test]
async fn test_queue_runs_by_priority_then_submission() {
    let runtime = runtime_with(fast_config());
    let recorder = Arc::new(Recorder::new("record"));
    runtime.abilities().register(recorder.clone()).unwrap();

    let agent_id = runtime.create_agent(AgentConfig::new("ordered")).unwrap();
    runtime.start_agent(agent_id).unwrap();
    wait_for_status(&runtime, agent_id, AgentStatus::Running).await;
    runtime.pause_agent(agent_id).unwrap();

    for (label, priority) in [("first-5", 5), ("only-1", 1), ("second-5", 5)] {
        let response = runtime
            .execute_task(
                agent_id,
                Task::queued("record")
                    .with_priority(priority)
                    .with_payload(json!(label)),
            )
            .await;
        assert!(response.queued);
    }

    runtime.resume_agent(agent_id).unwrap();
    wait_until("three recorded tasks", || recorder.seen.lock().unwrap().len() == 3).await;

    let seen = recorder.seen.lock().unwrap().clone();
    assert_eq!(seen, vec![json!("first-5"), json!("second-5"), json!("only-1")]);
}

#[tokio::test]
async fn test_queued_task_passes_through_running() {
    let runtime = runtime_with(fast_config());
    let gate = Arc::new(Gate::new("gate"));
    runtime.abilities().register(gate.clone()).unwrap();

    let agent_id = runtime.create_agent(AgentConfig::new("observed")).unwrap();
    runtime.start_agent(agent_id).unwrap();
    wait_for_status(&runtime, agent_id, AgentStatus::Running).await;

    let response = runtime
        .execute_task(agent_id, Task::queued("gate").with_payload(json!(42)))
        .await;
    let task_id = response.task_id.unwrap();

    let mut observed = vec![runtime.get_task_status(agent_id, task_id).unwrap()];
    let mut released = false;
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    loop {
        let status = runtime.get_task_status(agent_id, task_id).unwrap();
        if observed.last() != Some(&status) {
            observed.push(status);
        }
        if status == TaskStatus::Running && !released {
            gate.permits.add_permits(1);
            released = true;
        }
        if status.is_terminal() || std::time::Instant::now() >= deadline {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }

    assert_eq!(
        observed,
        vec![TaskStatus::Pending, TaskStatus::Running, TaskStatus::Completed]
    );
    let record = runtime.get_task_result(agent_id, task_id).unwrap();
    assert_eq!(record.output, Some(json!(42)));
    assert!(record.started_at.is_some() && record.ended_at.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_abilities_never_overlap_on_one_agent() {
    let mut config = fast_config();
    config.agent.idle_poll_secs = 0.005;
    let runtime = runtime_with(config);
    let probe = Arc::new(Probe::default());
    runtime.abilities().register(probe.clone()).unwrap();

    let agent_id = runtime
        .create_agent(
            AgentConfig::new("serial").with_skill(SkillConfig::periodic("probe", 0.01)),
        )
        .unwrap();
    runtime.start_agent(agent_id).unwrap();
    wait_for_status(&runtime, agent_id, AgentStatus::Running).await;

    let mut queued = Vec::new();
    for _ in 0..8 {
        let response = runtime.execute_task(agent_id, Task::queued("probe")).await;
        queued.push(response.task_id.unwrap());
    }

    let mut direct = Vec::new();
    for _ in 0..8 {
        let runtime = runtime.clone();
        direct.push(tokio::spawn(async move {
            runtime.execute_task(agent_id, Task::direct("probe")).await
        }));
    }
    for handle in direct {
        assert!(handle.await.unwrap().success);
    }

    wait_until("queued probes to finish", || {
        queued.iter().all(|id| {
            runtime
                .get_task_status(agent_id, *id)
                .map(|s| s == TaskStatus::Completed)
                .unwrap_or(false)
        })
    })
    .await;

    assert!(probe.calls.load(Ordering::SeqCst) >= 16);
    assert_eq!(probe.peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cancel_pending_task_is_skipped() {
    let runtime = runtime_with(fast_config());
    let recorder = Arc::new(Recorder::new("record"));
    runtime.abilities().register(recorder.clone()).unwrap();

    let agent_id = runtime.create_agent(AgentConfig::new("cancels")).unwrap();
    runtime.start_agent(agent_id).unwrap();
    wait_for_status(&runtime, agent_id, AgentStatus::Running).await;
    runtime.pause_agent(agent_id).unwrap();

    let dropped = runtime
        .execute_task(agent_id, Task::queued("record").with_payload(json!("dropped")))
        .await
        .task_id
        .unwrap();
    let kept = runtime
        .execute_task(agent_id, Task::queued("record").with_payload(json!("kept")))
        .await
        .task_id
        .unwrap();

    runtime.cancel_task(agent_id, dropped).unwrap();
    runtime.resume_agent(agent_id).unwrap();
    wait_until("kept task", || {
        runtime
            .get_task_status(agent_id, kept)
            .map(|s| s == TaskStatus::Completed)
            .unwrap_or(false)
    })
    .await;

    assert_eq!(*recorder.seen.lock().unwrap(), vec![json!("kept")]);
    assert_eq!(
        runtime.get_task_status(agent_id, dropped).unwrap(),
        TaskStatus::Cancelled
    );
    assert!(matches!(
        runtime.cancel_task(agent_id, kept),
        Err(RuntimeError::TaskNotCancellable { .. })
    ));
}

#[tokio::test]
async fn test_cancelled_running_task_discards_output() {
    let metrics = Arc::new(InMemoryMetrics::new());
    let runtime = Runtime::builder()
        .config(fast_config())
        .metrics(metrics.clone())
        .build();
    let gate = Arc::new(Gate::new("gate"));
    runtime.abilities().register(gate.clone()).unwrap();

    let agent_id = runtime.create_agent(AgentConfig::new("discarder")).unwrap();
    runtime.start_agent(agent_id).unwrap();
    wait_for_status(&runtime, agent_id, AgentStatus::Running).await;

    let task_id = runtime
        .execute_task(agent_id, Task::queued("gate").with_payload(json!("late")))
        .await
        .task_id
        .unwrap();
    wait_until("task to start", || {
        runtime.get_task_status(agent_id, task_id).ok() == Some(TaskStatus::Running)
    })
    .await;

    runtime.cancel_task(agent_id, task_id).unwrap();
    gate.permits.add_permits(1);
    wait_until("ability to return", || {
        metrics.counter("agent.task.completed") >= 1.0
    })
    .await;

    let record = runtime.get_task_result(agent_id, task_id).unwrap();
    assert_eq!(record.status, TaskStatus::Cancelled);
    assert!(record.output.is_none());
    let report = runtime.get_agent_status(agent_id).unwrap();
    assert_eq!(report.history_len, 0);
    assert_eq!(report.status, AgentStatus::Running);
}

#[tokio::test]
async fn test_list_tasks_newest_first() {
    let runtime = runtime_with(fast_config());
    let agent_id = runtime.create_agent(AgentConfig::new("lister")).unwrap();
    runtime.start_agent(agent_id).unwrap();
    wait_for_status(&runtime, agent_id, AgentStatus::Running).await;

    let mut ids = Vec::new();
    for i in 0..3 {
        let response = runtime
            .execute_task(agent_id, Task::direct("echo").with_payload(json!(i)))
            .await;
        ids.push(response.task_id.unwrap());
    }

    let listed: Vec<_> = runtime
        .list_tasks(agent_id, Some(TaskStatus::Completed), 2)
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(listed, vec![ids[2], ids[1]]);
    assert!(matches!(
        runtime.get_task_result(agent_id, adept::TaskId::new_v4()),
        Err(RuntimeError::TaskNotFound(_))
    ));
}

#[tokio::test]
async fn test_builtin_memory_abilities() {
    let runtime = runtime_with(fast_config());
    let agent_id = runtime.create_agent(AgentConfig::new("rememberer")).unwrap();
    runtime.start_agent(agent_id).unwrap();
    wait_for_status(&runtime, agent_id, AgentStatus::Running).await;

    let stored = runtime
        .execute_task(
            agent_id,
            Task::direct("memory_store").with_payload(json!({"key": "color", "value": "teal"})),
        )
        .await;
    assert!(stored.success);

    let recalled = runtime
        .execute_task(
            agent_id,
            Task::direct("memory_recall").with_payload(json!({"key": "color"})),
        )
        .await;
    assert_eq!(recalled.result.unwrap()["value"], json!("teal"));

    let pong = runtime.execute_task(agent_id, Task::direct("ping")).await;
    assert_eq!(pong.result.unwrap()["agent_name"], json!("rememberer"));
}
