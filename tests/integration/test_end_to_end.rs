// エンドツーエンド統合テスト

use crate::fixtures::{collect_all, small_config, success_ids, RecordingReporter, TEST_TIMEOUT};
use futures::StreamExt;
use pipeline_engine::coordination::ShutdownCoordinator;
use pipeline_engine::core::{DistributionPolicyKind, Task, TaskResult};
use pipeline_engine::engine::{fan_out, merge, process_all, spawn_generator, PipelineChain, PipelineEngine};
use pipeline_engine::services::{NoOpProgressReporter, RoundRobinPolicy};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::timeout;

#[tokio::test]
async fn test_every_submitted_task_yields_one_result() {
    for policy in [
        DistributionPolicyKind::RoundRobin,
        DistributionPolicyKind::Hash,
        DistributionPolicyKind::LeastLoaded,
    ] {
        for shards in [1, 3] {
            let config = small_config(6)
                .with_fan_in_source_count(shards)
                .with_distribution_policy(policy);
            let reporter = RecordingReporter::shared();
            let (engine, results) = PipelineEngine::start(
                &config,
                |x: u64| async move { Ok::<_, anyhow::Error>(x + 1000) },
                &PipelineChain::new(),
                reporter.clone(),
            )
            .await
            .unwrap();

            let collector = tokio::spawn(collect_all(results));
            for id in 0..300u64 {
                engine.submit(Task::new(id, id)).await.unwrap();
            }
            engine.finish();

            let results = timeout(TEST_TIMEOUT, collector).await.unwrap().unwrap();
            let summary = engine.wait_for_completion().await;

            assert_eq!(results.len(), 300, "{policy:?} / {shards} shards");
            assert_eq!(success_ids(&results), (0..300).collect::<Vec<_>>());
            assert!(results
                .iter()
                .all(|r| r.payload() == Some(&(r.task_id.value() + 1000))));
            assert_eq!(summary.unaccounted(), 0);
            assert_eq!(RecordingReporter::count(&reporter.completed_tasks), 300);
            assert_eq!(RecordingReporter::count(&reporter.completions), 1);
            assert_eq!(engine.live_units(), 0);
        }
    }
}

#[tokio::test]
async fn test_stage_chain_applies_in_declared_order() {
    let chain = PipelineChain::new()
        .stage("add-one", |x: i64| Ok(x + 1))
        .stage("double", |x| Ok(x * 2))
        .stage("subtract-three", |x| Ok(x - 3));

    let (results, _) = process_all(
        &small_config(2),
        |x: i64| async move { Ok::<_, anyhow::Error>(x) },
        &chain,
        Arc::new(NoOpProgressReporter::new()),
        vec![1, 2, 3],
    )
    .await
    .unwrap();

    let values: HashSet<i64> = results.into_iter().filter_map(TaskResult::into_payload).collect();
    assert_eq!(values, HashSet::from([1, 3, 5]));
}

#[tokio::test]
async fn test_concurrent_submitters_share_one_engine() {
    let (engine, results) = PipelineEngine::start(
        &small_config(4).with_queue_capacity(2),
        |x: u64| async move { Ok::<_, anyhow::Error>(x) },
        &PipelineChain::new(),
        Arc::new(NoOpProgressReporter::new()),
    )
    .await
    .unwrap();
    let engine = Arc::new(engine);
    let collector = tokio::spawn(collect_all(results));

    let submitters: Vec<_> = (0..4u64)
        .map(|producer| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                for n in 0..50u64 {
                    let id = producer * 1000 + n;
                    engine.submit(Task::new(id, id)).await.unwrap();
                }
            })
        })
        .collect();
    for submitter in submitters {
        submitter.await.unwrap();
    }
    engine.finish();

    let results = timeout(TEST_TIMEOUT, collector).await.unwrap().unwrap();
    assert_eq!(results.len(), 200);
    let expected: Vec<u64> = (0..4u64)
        .flat_map(|p| (0..50u64).map(move |n| p * 1000 + n))
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();
    assert_eq!(success_ids(&results), expected);
}

#[tokio::test]
async fn test_rendezvous_queue_still_delivers_everything() {
    let config = small_config(3).with_queue_capacity(0).with_result_capacity(0);
    let (results, summary) = timeout(
        TEST_TIMEOUT,
        process_all(
            &config,
            |x: u32| async move { Ok::<_, anyhow::Error>(x * 3) },
            &PipelineChain::new().stage("keep", |x: u32| Ok(x)),
            Arc::new(NoOpProgressReporter::new()),
            (0..40).collect(),
        ),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(results.len(), 40);
    assert_eq!(summary.succeeded, 40);
}

#[tokio::test]
async fn test_fan_in_of_independent_sources() {
    let coordinator = ShutdownCoordinator::new();
    let lengths = [5u64, 0, 12, 3];
    let sources = lengths
        .iter()
        .map(|&len| {
            spawn_generator(&coordinator, "source", 2, move |n| (n < len).then_some(n)).unwrap()
        })
        .collect();

    let merged = merge(&coordinator, sources, 1).unwrap();
    let values = timeout(TEST_TIMEOUT, merged.into_output().collect::<Vec<_>>())
        .await
        .unwrap();

    assert_eq!(values.len() as u64, lengths.iter().sum::<u64>());
    assert!(coordinator
        .await_completion(TEST_TIMEOUT)
        .await
        .is_completed());
}

#[tokio::test]
async fn test_round_robin_fan_out_assignment() {
    let coordinator = ShutdownCoordinator::new();
    let outputs_count = 4usize;
    let input = spawn_generator(&coordinator, "numbers", 4, |n| (n < 30).then_some(n + 1)).unwrap();

    let outputs = fan_out(&coordinator, input, outputs_count, 30, RoundRobinPolicy::new()).unwrap();
    for (j, output) in outputs.into_iter().enumerate() {
        let received: Vec<u64> = timeout(TEST_TIMEOUT, output.collect()).await.unwrap();
        let expected: Vec<u64> = (1..=30u64)
            .filter(|v| (*v as usize - 1) % outputs_count == j)
            .collect();
        assert_eq!(received, expected, "output {j}");
    }
}
