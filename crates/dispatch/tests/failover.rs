//! Dispatch and failover behaviour against a scripted node client.

mod common;

use common::{Behaviour, CountingRegistry, ScriptedClient, pool, subtasks};
use grid_dispatch::{
    AttemptOutcome, DispatchConfig, Dispatcher, FailureKind, Grid, LineSplitter, Registry,
    Subtask, TaskStatus,
};
use protocol::WorkerStatus;
use std::time::Duration;

fn settings(max_attempts: u32) -> DispatchConfig {
    DispatchConfig {
        max_attempts,
        ..DispatchConfig::default()
    }
}

#[tokio::test]
async fn initial_assignment_is_round_robin() {
    let registry = CountingRegistry::with_pool(3);
    let client = ScriptedClient::default();
    let settings = settings(3);

    let results = Dispatcher::new(&registry, &client, &settings)
        .distribute(&subtasks(5), &pool(3))
        .await;

    let workers: Vec<_> = results.iter().map(|r| r.worker_id).collect();
    assert_eq!(workers, [Some(1), Some(2), Some(3), Some(1), Some(2)]);
    assert!(results.iter().all(|r| r.attempts_used == 1));
    assert_eq!(registry.list_calls(), 0);
}

#[tokio::test]
async fn results_keep_input_order() {
    let registry = CountingRegistry::with_pool(3);
    let client = ScriptedClient::new([("http://w2", Behaviour::Slow(Duration::from_millis(30)))]);
    let settings = settings(3);

    let results = Dispatcher::new(&registry, &client, &settings)
        .distribute(&subtasks(10), &pool(3))
        .await;

    assert_eq!(results.len(), 10);
    for (i, result) in results.iter().enumerate() {
        assert_eq!(result.subtask_index, i);
        let endpoint = format!("http://w{}", i % 3 + 1);
        assert_eq!(result.output, format!("{endpoint}:task-{i}"));
    }
}

#[tokio::test]
async fn down_worker_fails_over_and_goes_offline() {
    let registry = CountingRegistry::with_pool(2);
    let client = ScriptedClient::new([("http://w1", Behaviour::Down)]);
    let settings = settings(3);

    let results = Dispatcher::new(&registry, &client, &settings)
        .distribute(&subtasks(3), &pool(2))
        .await;

    assert!(results.iter().all(|r| r.status == TaskStatus::Success));
    assert!(results.iter().all(|r| r.worker_id == Some(2)));
    assert_eq!(client.calls_for(0), [1, 2]);
    assert_eq!(client.calls_for(1), [2]);
    assert_eq!(client.calls_for(2), [1, 2]);
    assert_eq!(
        results[0]
            .attempts
            .iter()
            .map(|a| a.outcome)
            .collect::<Vec<_>>(),
        [AttemptOutcome::TransportError, AttemptOutcome::Success]
    );
    assert_eq!(registry.offline(), [1]);
    assert_eq!(
        registry.inner.get(1).map(|w| w.status),
        Some(WorkerStatus::Offline)
    );
}

#[tokio::test]
async fn whole_pool_down_exhausts_the_pool() {
    let registry = CountingRegistry::with_pool(2);
    let client = ScriptedClient::new([
        ("http://w1", Behaviour::Down),
        ("http://w2", Behaviour::Down),
    ]);
    let settings = settings(3);

    let results = Dispatcher::new(&registry, &client, &settings)
        .distribute(&subtasks(2), &pool(2))
        .await;

    for result in &results {
        assert_eq!(result.status, TaskStatus::Error);
        assert_eq!(result.failure, Some(FailureKind::PoolExhausted));
        assert_eq!(
            result.error_message.as_deref(),
            Some("No available workers remaining")
        );
        assert!(result.worker_id.is_none());
        assert!(result.output.is_empty());
        assert!(result.attempts_used <= 2);
    }
    assert_eq!(registry.offline(), [1, 2]);
}

#[tokio::test]
async fn attempt_budget_caps_retries() {
    let registry = CountingRegistry::with_pool(4);
    let client = ScriptedClient::new([
        ("http://w1", Behaviour::Down),
        ("http://w2", Behaviour::Down),
        ("http://w3", Behaviour::Down),
        ("http://w4", Behaviour::Down),
    ]);
    let settings = settings(3);

    let results = Dispatcher::new(&registry, &client, &settings)
        .distribute(&subtasks(1), &pool(4))
        .await;

    let result = &results[0];
    assert_eq!(result.failure, Some(FailureKind::RetriesExhausted));
    assert_eq!(
        result.error_message.as_deref(),
        Some("Task failed after 3 retries")
    );
    assert_eq!(result.attempts_used, 3);
    assert_eq!(client.calls_for(0), [1, 2, 3]);
    assert_eq!(
        registry.inner.get(4).map(|w| w.status),
        Some(WorkerStatus::Active)
    );
}

#[tokio::test]
async fn execution_failure_is_passed_through() {
    let registry = CountingRegistry::with_pool(2);
    let client = ScriptedClient::new([("http://w1", Behaviour::ExecFailed)]);
    let settings = settings(3);

    let results = Dispatcher::new(&registry, &client, &settings)
        .distribute(&subtasks(1), &pool(2))
        .await;

    let result = &results[0];
    assert_eq!(result.status, TaskStatus::Success);
    assert_eq!(result.worker_id, Some(1));
    assert!(result.execution_failed());
    assert_eq!(result.error_message.as_deref(), Some("exit status 1"));
    assert_eq!(result.attempts[0].outcome, AttemptOutcome::ExecutionError);
    assert_eq!(client.calls_for(0), [1]);
    assert!(registry.offline().is_empty());
    assert_eq!(registry.list_calls(), 0);
}

#[tokio::test]
async fn node_timeout_fails_over() {
    let registry = CountingRegistry::with_pool(2);
    let client = ScriptedClient::new([("http://w1", Behaviour::Timeout)]);
    let settings = settings(3);

    let results = Dispatcher::new(&registry, &client, &settings)
        .distribute(&subtasks(1), &pool(2))
        .await;

    let result = &results[0];
    assert_eq!(result.worker_id, Some(2));
    let outcomes: Vec<_> = result.attempts.iter().map(|a| a.outcome).collect();
    assert_eq!(outcomes, [AttemptOutcome::Timeout, AttemptOutcome::Success]);
    assert_eq!(registry.offline(), [1]);
}

#[tokio::test]
async fn rejected_worker_stays_online_and_is_skipped_run_wide() {
    let registry = CountingRegistry::with_pool(3);
    let client = ScriptedClient::new([
        ("http://w1", Behaviour::Reject),
        ("http://w2", Behaviour::Down),
    ]);
    let settings = settings(3);

    let results = Dispatcher::new(&registry, &client, &settings)
        .distribute(&subtasks(2), &pool(3))
        .await;

    assert!(results.iter().all(|r| r.worker_id == Some(3)));
    assert_eq!(results[0].attempts[0].outcome, AttemptOutcome::Rejected);
    // Subtask 1 reassigns after subtask 0 was rejected by w1.
    assert_eq!(client.calls_for(1), [2, 3]);
    assert!(!registry.offline().contains(&1));
    assert_eq!(
        registry.inner.get(1).map(|w| w.status),
        Some(WorkerStatus::Active)
    );
}

#[tokio::test]
async fn wrong_secret_everywhere_ends_within_budget() {
    let registry = CountingRegistry::with_pool(5);
    let client = ScriptedClient::new([
        ("http://w1", Behaviour::Reject),
        ("http://w2", Behaviour::Reject),
        ("http://w3", Behaviour::Reject),
        ("http://w4", Behaviour::Reject),
        ("http://w5", Behaviour::Reject),
    ]);
    let settings = settings(3);

    let results = Dispatcher::new(&registry, &client, &settings)
        .distribute(&subtasks(1), &pool(5))
        .await;

    assert_eq!(results[0].failure, Some(FailureKind::RetriesExhausted));
    assert_eq!(client.calls().len(), 3);
    assert!(registry.offline().is_empty());
}

#[tokio::test]
async fn invalid_request_stops_without_touching_the_registry() {
    let registry = CountingRegistry::with_pool(3);
    let client = ScriptedClient::new([
        ("http://w1", Behaviour::Invalid),
        ("http://w2", Behaviour::Invalid),
        ("http://w3", Behaviour::Invalid),
    ]);
    let settings = settings(3);

    let results = Dispatcher::new(&registry, &client, &settings)
        .distribute(&subtasks(2), &pool(3))
        .await;

    for result in &results {
        assert_eq!(result.status, TaskStatus::Error);
        assert_eq!(result.failure, Some(FailureKind::InvalidRequest));
        assert_eq!(result.attempts_used, 1);
        assert_eq!(result.attempts[0].outcome, AttemptOutcome::InvalidRequest);
        assert!(result.error_message.as_deref().unwrap().contains("422"));
    }
    assert_eq!(client.calls().len(), 2);
    assert_eq!(registry.list_calls(), 0);
    assert!(registry.offline().is_empty());
    assert_eq!(registry.inner.list_active().await.unwrap().len(), 3);
}

#[tokio::test]
async fn only_worker_faults_mark_offline() {
    let registry = CountingRegistry::with_pool(5);
    let client = ScriptedClient::new([
        ("http://w1", Behaviour::Down),
        ("http://w2", Behaviour::Timeout),
        ("http://w3", Behaviour::Reject),
        ("http://w4", Behaviour::Invalid),
        ("http://w5", Behaviour::ExecFailed),
    ]);
    let settings = settings(1);

    let results = Dispatcher::new(&registry, &client, &settings)
        .distribute(&subtasks(5), &pool(5))
        .await;

    assert_eq!(registry.offline(), [1, 2]);
    let failures: Vec<_> = results.iter().map(|r| r.failure).collect();
    assert_eq!(
        failures,
        [
            Some(FailureKind::RetriesExhausted),
            Some(FailureKind::RetriesExhausted),
            Some(FailureKind::RetriesExhausted),
            Some(FailureKind::InvalidRequest),
            None,
        ]
    );
    for id in 3..=5 {
        assert_eq!(
            registry.inner.get(id).map(|w| w.status),
            Some(WorkerStatus::Active)
        );
    }
}

#[tokio::test]
async fn out_of_range_timeout_is_never_sent() {
    let registry = CountingRegistry::with_pool(2);
    let client = ScriptedClient::default();
    let settings = settings(3);
    let batch = [
        Subtask::new(0, "zero", Duration::ZERO),
        Subtask::new(1, "fine", Duration::from_secs(5)),
        Subtask::new(2, "long", Duration::from_secs(7200)),
    ];

    let results = Dispatcher::new(&registry, &client, &settings)
        .distribute(&batch, &pool(2))
        .await;

    assert_eq!(results[0].failure, Some(FailureKind::InvalidRequest));
    assert!(results[0].attempts.is_empty());
    assert_eq!(
        results[2].error_message.as_deref(),
        Some("timeout must be between 1 and 3600 seconds, got 7200")
    );
    assert!(results[1].is_success());
    assert_eq!(client.calls(), [(1, 2)]);
    assert!(registry.offline().is_empty());
}

#[tokio::test]
async fn never_retries_the_same_worker() {
    let registry = CountingRegistry::with_pool(3);
    let client = ScriptedClient::new([
        ("http://w1", Behaviour::Down),
        ("http://w2", Behaviour::Down),
        ("http://w3", Behaviour::Down),
    ]);
    let settings = settings(10);

    let results = Dispatcher::new(&registry, &client, &settings)
        .distribute(&subtasks(4), &pool(3))
        .await;

    for (i, result) in results.iter().enumerate() {
        let mut tried = client.calls_for(i);
        let total = tried.len();
        tried.sort_unstable();
        tried.dedup();
        assert_eq!(tried.len(), total, "subtask {i} repeated a worker");
        assert!(total <= 3);
        assert_eq!(result.failure, Some(FailureKind::PoolExhausted));
    }
}

#[tokio::test]
async fn in_flight_calls_are_bounded() {
    let slow = Behaviour::Slow(Duration::from_millis(40));
    let registry = CountingRegistry::with_pool(4);
    let client = ScriptedClient::new([
        ("http://w1", slow),
        ("http://w2", slow),
        ("http://w3", slow),
        ("http://w4", slow),
    ]);
    let settings = DispatchConfig {
        max_in_flight: Some(2),
        ..DispatchConfig::default()
    };

    let results = Dispatcher::new(&registry, &client, &settings)
        .distribute(&subtasks(8), &pool(4))
        .await;

    assert!(results.iter().all(|r| r.status == TaskStatus::Success));
    assert!(client.peak() <= 2, "peak was {}", client.peak());
}

#[tokio::test]
async fn bound_defaults_to_worker_count() {
    let slow = Behaviour::Slow(Duration::from_millis(40));
    let registry = CountingRegistry::with_pool(2);
    let client = ScriptedClient::new([("http://w1", slow), ("http://w2", slow)]);
    let settings = DispatchConfig::default();

    Dispatcher::new(&registry, &client, &settings)
        .distribute(&subtasks(6), &pool(2))
        .await;

    assert_eq!(client.peak(), 2);
}

#[tokio::test]
async fn empty_pool_fails_every_subtask_without_queries() {
    let registry = CountingRegistry::default();
    let client = ScriptedClient::default();
    let settings = settings(3);

    let results = Dispatcher::new(&registry, &client, &settings)
        .distribute(&subtasks(3), &[])
        .await;

    assert_eq!(results.len(), 3);
    for result in &results {
        assert_eq!(result.failure, Some(FailureKind::NoWorkersAvailable));
        assert_eq!(result.error_message.as_deref(), Some("No workers available"));
        assert_eq!(result.attempts_used, 0);
    }
    assert_eq!(registry.list_calls(), 0);
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn run_counts_each_attempted_worker_once() {
    let grid = Grid::new(
        CountingRegistry::with_pool(3),
        ScriptedClient::new([("http://w1", Behaviour::Down)]),
        LineSplitter,
        settings(3),
    );

    let report = grid
        .run((0..4).map(|i| format!("task-{i}")).collect())
        .await
        .unwrap();

    assert!(report.all_succeeded());
    assert_eq!(report.workers.len(), 3);
    assert_eq!(grid.registry().increments(), [1, 2, 3]);
    assert_eq!(
        grid.registry().inner.get(2).map(|w| w.total_tasks),
        Some(1)
    );
}

#[tokio::test]
async fn run_with_no_workers_reports_every_subtask() {
    let grid = Grid::new(
        CountingRegistry::default(),
        ScriptedClient::default(),
        LineSplitter,
        settings(3),
    );

    let report = grid.run(vec!["a".into(), "b".into()]).await.unwrap();

    assert_eq!(report.failed(), 2);
    assert!(report.attempted_workers().is_empty());
    assert!(grid.registry().increments().is_empty());
    // Only the run-start snapshot.
    assert_eq!(grid.registry().list_calls(), 1);
}

#[tokio::test]
async fn command_is_split_to_pool_size() {
    let grid = Grid::new(
        CountingRegistry::with_pool(2),
        ScriptedClient::default(),
        LineSplitter,
        settings(3),
    );

    let report = grid
        .execute_command("alpha; beta; gamma", Some(Duration::from_millis(200)))
        .await
        .unwrap();

    assert_eq!(report.results.len(), 2);
    assert_eq!(report.results[0].output, "http://w1:alpha");
    assert_eq!(report.results[1].output, "http://w2:beta");
}

#[tokio::test]
async fn command_without_workers_is_an_error() {
    let grid = Grid::new(
        CountingRegistry::default(),
        ScriptedClient::default(),
        LineSplitter,
        settings(3),
    );

    let err = grid.execute_command("alpha", None).await.unwrap_err();
    assert!(err.to_string().contains("no active workers"));
    assert!(grid.client().calls().is_empty());
}

#[tokio::test]
async fn command_with_out_of_range_timeout_is_an_error() {
    let grid = Grid::new(
        CountingRegistry::with_pool(2),
        ScriptedClient::default(),
        LineSplitter,
        settings(3),
    );

    let err = grid
        .execute_command("hello", Some(Duration::from_secs(7200)))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("timeout must be between 1 and 3600"));

    let err = grid
        .execute_command("hello", Some(Duration::ZERO))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("got 0"));

    assert!(grid.client().calls().is_empty());
    assert!(grid.registry().offline().is_empty());
    assert_eq!(grid.registry().list_calls(), 0);
}
