// シャットダウン・ドレイン・完了待機の統合テスト

use crate::fixtures::{collect_all, small_config, RecordingReporter, TEST_TIMEOUT};
use pipeline_engine::core::{
    CompletionStatus, EngineError, PipelineState, Task, WorkerState,
};
use pipeline_engine::engine::{PipelineChain, PipelineEngine};
use pipeline_engine::services::NoOpProgressReporter;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

async fn slow_engine(
    reporter: Arc<RecordingReporter>,
    shards: usize,
) -> (
    PipelineEngine<u64>,
    pipeline_engine::channel::StreamReceiver<pipeline_engine::TaskResult<u64>>,
) {
    let config = small_config(4).with_queue_capacity(4).with_fan_in_source_count(shards);
    PipelineEngine::start(
        &config,
        |x: u64| async move {
            sleep(Duration::from_millis(15)).await;
            Ok::<_, anyhow::Error>(x)
        },
        &PipelineChain::new().stage("identity", |x: u64| Ok(x)),
        reporter,
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_shutdown_mid_run_accounts_for_all_tasks() {
    for shards in [1, 2] {
        let reporter = RecordingReporter::shared();
        let (engine, results) = slow_engine(reporter.clone(), shards).await;
        let engine = Arc::new(engine);
        let collector = tokio::spawn(collect_all(results));

        let submitter = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                let mut accepted = 0usize;
                for id in 0..1000u64 {
                    match engine.submit(Task::new(id, id)).await {
                        Ok(()) => accepted += 1,
                        Err(_) => break,
                    }
                }
                accepted
            })
        };

        sleep(Duration::from_millis(60)).await;
        assert!(engine.request_shutdown());
        assert_eq!(engine.state(), PipelineState::Draining);

        let status = engine.await_completion(TEST_TIMEOUT).await;
        assert_eq!(status, CompletionStatus::Completed);
        assert_eq!(engine.state(), PipelineState::Completed);
        assert_eq!(engine.live_units(), 0);

        let accepted = timeout(TEST_TIMEOUT, submitter).await.unwrap().unwrap();
        let delivered = timeout(TEST_TIMEOUT, collector).await.unwrap().unwrap().len();
        let summary = engine.summary();

        assert!(accepted < 1000);
        assert_eq!(summary.submitted, accepted);
        assert_eq!(summary.unaccounted(), 0, "{summary:?}");
        assert!(delivered <= summary.succeeded + summary.failed);
        assert_eq!(
            RecordingReporter::count(&reporter.dropped_tasks),
            summary.dropped
        );
        assert_eq!(RecordingReporter::count(&reporter.shutdown_requested), 1);
        assert_eq!(RecordingReporter::count(&reporter.completions), 1);
        assert!(engine
            .worker_states()
            .iter()
            .all(|state| *state == WorkerState::Exited));
    }
}

#[tokio::test]
async fn test_concurrent_shutdown_requests_transition_once() {
    let reporter = RecordingReporter::shared();
    let (engine, _results) = slow_engine(reporter.clone(), 1).await;
    let engine = Arc::new(engine);

    let requests: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.request_shutdown() })
        })
        .collect();
    let mut transitions = 0;
    for request in requests {
        if request.await.unwrap() {
            transitions += 1;
        }
    }
    assert_eq!(transitions, 1);

    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.await_completion(TEST_TIMEOUT).await })
        })
        .collect();
    for waiter in waiters {
        assert!(waiter.await.unwrap().is_completed());
    }
    assert_eq!(RecordingReporter::count(&reporter.completions), 1);
}

#[tokio::test]
async fn test_submit_rejected_after_drain_and_shutdown() {
    let (engine, _results) = slow_engine(RecordingReporter::shared(), 1).await;
    engine.submit(Task::new(1u64, 1)).await.unwrap();
    engine.finish();

    let error = engine.submit(Task::new(2u64, 2)).await.unwrap_err();
    assert!(matches!(error, EngineError::SubmitAfterDrainError { task_id: 2 }));
    assert!(!error.is_recoverable());

    let (engine, _results) = slow_engine(RecordingReporter::shared(), 1).await;
    engine.request_shutdown();
    assert!(engine.submit_payload(3).await.is_err());
}

#[tokio::test]
async fn test_await_completion_times_out_without_breaking_engine() {
    let (engine, results) = slow_engine(RecordingReporter::shared(), 1).await;
    let collector = tokio::spawn(collect_all(results));
    for id in 0..3u64 {
        engine.submit(Task::new(id, id)).await.unwrap();
    }

    // 入力が開いている間は完了しない
    let status = engine.await_completion(Duration::from_millis(30)).await;
    assert_eq!(status, CompletionStatus::TimedOut);
    assert_eq!(engine.state(), PipelineState::Running);

    engine.finish();
    assert!(engine
        .await_completion(TEST_TIMEOUT)
        .await
        .is_completed());
    assert_eq!(collector.await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_shutdown_after_deadline_stops_blocked_pipeline() {
    let config = small_config(1).with_queue_capacity(1).with_result_capacity(1);
    let (engine, _results) = PipelineEngine::start(
        &config,
        |x: u8| async move { Ok::<_, anyhow::Error>(x) },
        &PipelineChain::new(),
        Arc::new(NoOpProgressReporter::new()),
    )
    .await
    .unwrap();

    // 結果を誰も読まない: 1件目はバッファへ、2件目は送信で止まり、3件目はキューに残る
    for payload in 1..=3u8 {
        engine.submit_payload(payload).await.unwrap();
    }
    engine.finish();

    let status = engine
        .shutdown_after(Duration::from_millis(30), TEST_TIMEOUT)
        .await;
    assert!(status.is_completed());

    let summary = engine.summary();
    assert_eq!(summary.submitted, 3);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.dropped, 2);
    assert_eq!(summary.unaccounted(), 0);
}
