// 進捗監視の具象実装

use crate::core::{EngineSummary, ProgressReporter, TaskId};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// コンソール出力による進捗報告実装
#[derive(Debug, Default, Clone)]
pub struct ConsoleProgressReporter {
    quiet: bool,
    completed: Arc<AtomicUsize>,
}

impl ConsoleProgressReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quiet() -> Self {
        Self {
            quiet: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl ProgressReporter for ConsoleProgressReporter {
    async fn report_started(&self, worker_count: usize) {
        if !self.quiet {
            println!("🚀 Starting pipeline with {worker_count} workers...");
        }
    }

    async fn report_task_completed(&self, task_id: TaskId, success: bool) {
        let completed = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        if self.quiet {
            return;
        }
        if !success {
            eprintln!("❌ Task {task_id} failed");
        }
        if completed % 100 == 0 {
            println!("📊 Progress: {completed} tasks processed");
        }
    }

    async fn report_task_dropped(&self, task_id: TaskId) {
        if !self.quiet {
            eprintln!("🗑️  Task {task_id} dropped during shutdown");
        }
    }

    async fn report_stage_skipped(&self, stage: &str, task_id: TaskId, error: &str) {
        if !self.quiet {
            eprintln!("⏭️  Stage '{stage}' skipped task {task_id}: {error}");
        }
    }

    async fn report_shutdown_requested(&self) {
        if !self.quiet {
            println!("🛑 Shutdown requested, draining...");
        }
    }

    async fn report_completed(&self, summary: &EngineSummary) {
        if !self.quiet {
            println!(
                "✅ Completed! Succeeded: {}, Failed: {}, Dropped: {}, Stage failed: {}, Stage skipped: {} ({} ms)",
                summary.succeeded,
                summary.failed,
                summary.dropped,
                summary.stage_failed,
                summary.stage_skipped,
                summary.elapsed_ms
            );
        }
    }
}

/// 何もしない進捗報告実装（テスト・ベンチマーク用）
#[derive(Debug, Default, Clone)]
pub struct NoOpProgressReporter;

impl NoOpProgressReporter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProgressReporter for NoOpProgressReporter {
    async fn report_started(&self, _worker_count: usize) {}

    async fn report_task_completed(&self, _task_id: TaskId, _success: bool) {}

    async fn report_task_dropped(&self, _task_id: TaskId) {}

    async fn report_stage_skipped(&self, _stage: &str, _task_id: TaskId, _error: &str) {}

    async fn report_shutdown_requested(&self) {}

    async fn report_completed(&self, _summary: &EngineSummary) {}
}
