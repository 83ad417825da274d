// Pipeline - ステージチェーン
//
// 各ステージは一つの並行ユニットで、入力ストリームの成功結果に変換を適用して
// 出力ストリームへ流す。失敗マーカー付きの結果は変換せずにそのまま通す。
// 入力の終了後、処理中のアイテムを流し終えてから出力をクローズする。

use super::stats::PipelineStats;
use crate::channel::{stream, Received, StreamReceiver};
use crate::coordination::ShutdownCoordinator;
use crate::core::{
    EngineError, EngineResult, ProgressReporter, StageFailurePolicy, Task, TaskFailure, TaskId,
    TaskOutcome, TaskProcessor, TaskResult,
};
use crate::services::processing::{apply_transform, execute_task};
use crate::services::NoOpProgressReporter;
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// ステージ群が共有する実行設定
#[derive(Clone)]
pub struct StageContext {
    failure_policy: StageFailurePolicy,
    capacity: usize,
    stats: Arc<PipelineStats>,
    reporter: Arc<dyn ProgressReporter>,
}

impl StageContext {
    pub fn new(failure_policy: StageFailurePolicy, capacity: usize) -> Self {
        Self {
            failure_policy,
            capacity,
            stats: Arc::new(PipelineStats::new()),
            reporter: Arc::new(NoOpProgressReporter::new()),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_stats(mut self, stats: Arc<PipelineStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn failure_policy(&self) -> StageFailurePolicy {
        self.failure_policy
    }

    pub fn stats(&self) -> &Arc<PipelineStats> {
        &self.stats
    }

    /// 変換結果を失敗ポリシーに従って次の結果へ変換する。`None` は破棄
    async fn settle<O>(
        &self,
        stage: &str,
        task_id: TaskId,
        outcome: Result<O, String>,
    ) -> Option<TaskResult<O>> {
        let message = match outcome {
            Ok(value) => return Some(TaskResult::success(task_id, value)),
            Err(message) => message,
        };

        match self.failure_policy {
            StageFailurePolicy::Skip => {
                warn!(stage, %task_id, error = %message, "stage skipped item");
                self.stats.stage_skipped.fetch_add(1, Ordering::Relaxed);
                self.reporter
                    .report_stage_skipped(stage, task_id, &message)
                    .await;
                None
            }
            StageFailurePolicy::ForwardMarked => {
                debug!(stage, %task_id, error = %message, "stage marked item as failed");
                self.stats.stage_failed.fetch_add(1, Ordering::Relaxed);
                Some(TaskResult::failure(task_id, TaskFailure::stage(stage, message)))
            }
        }
    }
}

impl fmt::Debug for StageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageContext")
            .field("failure_policy", &self.failure_policy)
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// 単一の変換ステージを起動する
pub fn spawn_stage<I, O, F>(
    coordinator: &ShutdownCoordinator,
    name: impl Into<String>,
    input: StreamReceiver<TaskResult<I>>,
    transform: F,
    context: &StageContext,
) -> EngineResult<StreamReceiver<TaskResult<O>>>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> anyhow::Result<O> + Send + Sync + 'static,
{
    let name = name.into();
    let (tx, rx) = stream(context.capacity);
    let context = context.clone();
    let signal = coordinator.signal();

    coordinator.spawn(format!("stage-{name}"), async move {
        let mut input = input;
        let mut passed = 0usize;
        loop {
            let item = match input.recv_until(&signal).await {
                Received::Value(item) => item,
                Received::Closed | Received::Shutdown => break,
            };

            let next = match item.outcome {
                TaskOutcome::Failure(failure) => Some(TaskResult::failure(item.task_id, failure)),
                TaskOutcome::Success(payload) => {
                    let outcome = apply_transform(&transform, payload);
                    context.settle(&name, item.task_id, outcome).await
                }
            };

            if let Some(next) = next {
                if tx.send(next, &signal).await.is_err() {
                    break;
                }
                passed += 1;
            }
        }
        debug!(stage = %name, passed, "stage finished");
    })?;

    Ok(rx)
}

/// 複数ユニットで並列に処理するステージを起動する
///
/// 非同期の処理関数を使う。ステージ内の順序は保証されない。
pub fn spawn_parallel_stage<I, O, P>(
    coordinator: &ShutdownCoordinator,
    name: impl Into<String>,
    input: StreamReceiver<TaskResult<I>>,
    processor: Arc<P>,
    workers: usize,
    context: &StageContext,
) -> EngineResult<StreamReceiver<TaskResult<O>>>
where
    I: Send + 'static,
    O: Send + 'static,
    P: TaskProcessor<I, O> + ?Sized + 'static,
{
    let name = name.into();
    if workers == 0 {
        return Err(EngineError::configuration(format!(
            "並列ステージ '{name}' のワーカー数が0です"
        )));
    }

    let (tx, rx) = stream(context.capacity);
    let input = Arc::new(Mutex::new(input));

    for worker_id in 0..workers {
        let input = Arc::clone(&input);
        let tx = tx.clone();
        let processor = Arc::clone(&processor);
        let context = context.clone();
        let signal = coordinator.signal();
        let name = name.clone();

        coordinator.spawn(format!("stage-{name}-{worker_id}"), async move {
            loop {
                let item = tokio::select! {
                    biased;
                    _ = signal.wait() => None,
                    mut receiver = input.lock() => match receiver.recv_until(&signal).await {
                        Received::Value(item) => Some(item),
                        Received::Closed | Received::Shutdown => None,
                    },
                };
                let Some(item) = item else { break };

                let task_id = item.task_id;
                let next = match item.outcome {
                    TaskOutcome::Failure(failure) => Some(TaskResult::failure(task_id, failure)),
                    TaskOutcome::Success(payload) => {
                        let task = Task::new(task_id, payload);
                        let result = execute_task(processor.as_ref(), task).await;
                        let outcome = match result.outcome {
                            TaskOutcome::Success(value) => Ok(value),
                            TaskOutcome::Failure(failure) => Err(failure.to_string()),
                        };
                        context.settle(&name, task_id, outcome).await
                    }
                };

                if let Some(next) = next {
                    if tx.send(next, &signal).await.is_err() {
                        break;
                    }
                }
            }
            debug!(stage = %name, worker_id, "parallel stage worker finished");
        })?;
    }

    Ok(rx)
}

/// チェーンに格納される同型変換
pub type StageFn<T> = Arc<dyn Fn(T) -> anyhow::Result<T> + Send + Sync>;

/// 名前付きステージを順に連結するチェーン
///
/// 実行時にステージ構成を組み立てられる。失敗ポリシーはチェーン全体で一つ。
pub struct PipelineChain<T> {
    stages: Vec<(String, StageFn<T>)>,
}

impl<T: Send + 'static> PipelineChain<T> {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    pub fn stage<F>(mut self, name: impl Into<String>, transform: F) -> Self
    where
        F: Fn(T) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.stages.push((name.into(), Arc::new(transform)));
        self
    }

    pub fn push_stage(&mut self, name: impl Into<String>, transform: StageFn<T>) {
        self.stages.push((name.into(), transform));
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// 全ステージを起動し、最終ステージの出力を返す。空のチェーンは入力をそのまま返す
    pub fn spawn(
        &self,
        coordinator: &ShutdownCoordinator,
        input: StreamReceiver<TaskResult<T>>,
        context: &StageContext,
    ) -> EngineResult<StreamReceiver<TaskResult<T>>> {
        let mut current = input;
        for (name, transform) in &self.stages {
            let transform = Arc::clone(transform);
            current = spawn_stage(
                coordinator,
                name.clone(),
                current,
                move |value| transform(value),
                context,
            )?;
        }
        Ok(current)
    }
}

impl<T: Send + 'static> Default for PipelineChain<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for PipelineChain<T> {
    fn clone(&self) -> Self {
        Self {
            stages: self.stages.clone(),
        }
    }
}

impl<T> fmt::Debug for PipelineChain<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.stages.iter().map(|(name, _)| name))
            .finish()
    }
}
