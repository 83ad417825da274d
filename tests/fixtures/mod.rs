// テストユーティリティ
// 統合テスト共通の設定・処理関数・記録用レポーター

#![allow(dead_code)]

use async_trait::async_trait;
use pipeline_engine::channel::StreamReceiver;
use pipeline_engine::core::{EngineSummary, ProgressReporter, TaskId, TaskResult};
use pipeline_engine::services::DefaultPipelineConfig;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// テストが固まらないための上限
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

pub fn small_config(workers: usize) -> DefaultPipelineConfig {
    DefaultPipelineConfig::new(1)
        .with_worker_count(workers)
        .with_queue_capacity(8)
        .with_result_capacity(8)
}

/// 結果ストリームをクローズまで読み切る
pub async fn collect_all<T: Send + 'static>(mut results: StreamReceiver<T>) -> Vec<T> {
    let mut collected = Vec::new();
    while let Some(value) = results.recv().await {
        collected.push(value);
    }
    collected
}

pub fn success_ids<T>(results: &[TaskResult<T>]) -> Vec<u64> {
    let mut ids: Vec<u64> = results
        .iter()
        .filter(|result| result.is_success())
        .map(|result| result.task_id.value())
        .collect();
    ids.sort_unstable();
    ids
}

/// 呼び出し回数だけを記録するレポーター
#[derive(Debug, Default)]
pub struct RecordingReporter {
    pub started: AtomicUsize,
    pub completed_tasks: AtomicUsize,
    pub dropped_tasks: AtomicUsize,
    pub skipped: AtomicUsize,
    pub shutdown_requested: AtomicUsize,
    pub completions: AtomicUsize,
}

impl RecordingReporter {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProgressReporter for RecordingReporter {
    async fn report_started(&self, _worker_count: usize) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    async fn report_task_completed(&self, _task_id: TaskId, _success: bool) {
        self.completed_tasks.fetch_add(1, Ordering::SeqCst);
    }

    async fn report_task_dropped(&self, _task_id: TaskId) {
        self.dropped_tasks.fetch_add(1, Ordering::SeqCst);
    }

    async fn report_stage_skipped(&self, _stage: &str, _task_id: TaskId, _error: &str) {
        self.skipped.fetch_add(1, Ordering::SeqCst);
    }

    async fn report_shutdown_requested(&self) {
        self.shutdown_requested.fetch_add(1, Ordering::SeqCst);
    }

    async fn report_completed(&self, _summary: &EngineSummary) {
        self.completions.fetch_add(1, Ordering::SeqCst);
    }
}
