// エラーハンドリング統合テスト
// タスク単位の失敗はデータとして流れ、構造的な誤用は呼び出し元へのエラーになる

use crate::fixtures::{small_config, RecordingReporter, TEST_TIMEOUT};
use pipeline_engine::coordination::ShutdownCoordinator;
use pipeline_engine::core::{EngineError, FailureKind, StageFailurePolicy, TaskResult};
use pipeline_engine::engine::{process_all, PipelineChain, PipelineEngine};
use pipeline_engine::services::{DefaultPipelineConfig, NoOpProgressReporter};
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::time::timeout;

#[tokio::test]
async fn test_failures_and_panics_become_marked_results() {
    let processor = |x: u32| async move {
        if x % 7 == 0 {
            panic!("boom at {x}");
        }
        if x % 5 == 0 {
            anyhow::bail!("rejected {x}");
        }
        Ok(x)
    };

    let (results, summary) = timeout(
        TEST_TIMEOUT,
        process_all(
            &small_config(3),
            processor,
            &PipelineChain::new(),
            Arc::new(NoOpProgressReporter::new()),
            (1..=35).collect(),
        ),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(results.len(), 35);
    let panics = results
        .iter()
        .filter_map(TaskResult::failure_marker)
        .filter(|failure| failure.kind == FailureKind::Panic)
        .count();
    let errors = results
        .iter()
        .filter_map(TaskResult::failure_marker)
        .filter(|failure| failure.kind == FailureKind::Error)
        .count();

    // 7の倍数5件はパニック、35を除く5の倍数6件はエラー
    assert_eq!(panics, 5);
    assert_eq!(errors, 6);
    assert_eq!(summary.failed, 11);
    assert_eq!(summary.succeeded, 24);
    assert!(results
        .iter()
        .filter_map(TaskResult::failure_marker)
        .any(|failure| failure.message.contains("boom at 7")));
}

#[tokio::test]
async fn test_stage_failure_policies() {
    let chain = PipelineChain::new().stage("reject-odd", |x: i32| {
        if x % 2 == 1 {
            anyhow::bail!("odd value {x}");
        }
        Ok(x)
    });

    let reporter = RecordingReporter::shared();
    let (results, summary) = process_all(
        &small_config(2).with_stage_failure_policy(StageFailurePolicy::Skip),
        |x: i32| async move { Ok::<_, anyhow::Error>(x) },
        &chain,
        reporter.clone(),
        (0..10).collect(),
    )
    .await
    .unwrap();
    assert_eq!(results.len(), 5);
    assert!(results.iter().all(TaskResult::is_success));
    assert_eq!(summary.stage_skipped, 5);
    assert_eq!(RecordingReporter::count(&reporter.skipped), 5);

    let (results, summary) = process_all(
        &small_config(2).with_stage_failure_policy(StageFailurePolicy::ForwardMarked),
        |x: i32| async move { Ok::<_, anyhow::Error>(x) },
        &chain,
        Arc::new(NoOpProgressReporter::new()),
        (0..10).collect(),
    )
    .await
    .unwrap();
    assert_eq!(results.len(), 10);
    assert_eq!(summary.stage_failed, 5);
    let marked: Vec<_> = results.iter().filter_map(TaskResult::failure_marker).collect();
    assert_eq!(marked.len(), 5);
    assert!(marked.iter().all(|failure| failure.kind
        == FailureKind::Stage {
            stage: "reject-odd".to_string()
        }));
}

#[tokio::test]
async fn test_upstream_failures_pass_stages_untouched() {
    let chain = PipelineChain::new().stage("double", |x: i64| Ok(x * 2));
    let (results, _) = process_all(
        &small_config(2),
        |x: i64| async move {
            if x < 0 {
                anyhow::bail!("negative");
            }
            Ok(x)
        },
        &chain,
        Arc::new(NoOpProgressReporter::new()),
        vec![-1, 2],
    )
    .await
    .unwrap();

    let failure = results
        .iter()
        .find(|result| result.is_failure())
        .and_then(TaskResult::failure_marker)
        .unwrap();
    assert_eq!(failure.kind, FailureKind::Error);
    assert!(results.iter().any(|result| result.payload() == Some(&4)));
}

#[tokio::test]
async fn test_invalid_configurations_are_rejected() {
    let invalid = [
        small_config(0),
        small_config(2).with_fan_in_source_count(0),
        small_config(2).with_fan_in_source_count(3),
    ];

    for config in invalid {
        let started = PipelineEngine::start(
            &config,
            |x: u8| async move { Ok::<_, anyhow::Error>(x) },
            &PipelineChain::new(),
            Arc::new(NoOpProgressReporter::new()),
        )
        .await;
        assert!(
            matches!(started.err(), Some(EngineError::ValidationError { .. })),
            "{config:?}"
        );
    }
}

#[test]
fn test_config_file_errors() {
    let mut broken = NamedTempFile::new().unwrap();
    write!(broken, "{{ not json").unwrap();
    let error = DefaultPipelineConfig::from_json_file(broken.path()).unwrap_err();
    assert!(matches!(error, EngineError::ConfigLoadError { .. }));

    let mut invalid = NamedTempFile::new().unwrap();
    write!(invalid, r#"{{"worker_count": 0}}"#).unwrap();
    let error = DefaultPipelineConfig::from_json_file(invalid.path()).unwrap_err();
    assert!(matches!(error, EngineError::ValidationError { .. }));
}

#[tokio::test]
async fn test_spawn_on_completed_coordinator_fails() {
    let coordinator = ShutdownCoordinator::new();
    coordinator.wait_for_completion().await;

    let error = coordinator.spawn("late", async {}).unwrap_err();
    assert!(matches!(error, EngineError::BarrierCompletedError { .. }));
}

#[tokio::test]
async fn test_dropped_results_stream_unwinds_the_pipeline() {
    let (engine, results) = PipelineEngine::start(
        &small_config(2),
        |x: u64| async move { Ok::<_, anyhow::Error>(x) },
        &PipelineChain::new().stage("identity", |x: u64| Ok(x)),
        Arc::new(NoOpProgressReporter::new()),
    )
    .await
    .unwrap();

    let reader = tokio::spawn(async move {
        let mut results = results;
        results.recv().await
    });
    engine.submit_payload(1).await.unwrap();
    assert!(reader.await.unwrap().is_some());

    // 読み手がいなくなっても投入側は詰まらずに終了できる
    for payload in 2..50 {
        if engine.submit_payload(payload).await.is_err() {
            break;
        }
    }
    engine.finish();
    let summary = timeout(TEST_TIMEOUT, engine.wait_for_completion()).await.unwrap();
    assert_eq!(summary.unaccounted(), 0);
}
