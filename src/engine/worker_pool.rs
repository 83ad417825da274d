// Worker Pool - 並列ワーカー機能
//
// 固定数のワーカーが一つのタスクキューを共有して処理する。
// 最後に終了したワーカーがキューをクローズして未処理タスクを破棄し、
// 全ワーカーの終了で結果ストリームがクローズされる。

use super::stats::PipelineStats;
use crate::channel::{Dequeued, StreamSender, TaskConsumer};
use crate::coordination::{ShutdownCoordinator, ShutdownSignal};
use crate::core::{
    EngineError, EngineResult, ProgressReporter, TaskProcessor, TaskResult, WorkerState,
};
use crate::services::processing::execute_task;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// 起動済みワーカープールへのハンドル
#[derive(Debug)]
pub struct WorkerPoolHandle {
    name: String,
    handles: Vec<JoinHandle<()>>,
    states: Vec<Arc<AtomicU8>>,
}

impl WorkerPoolHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn worker_count(&self) -> usize {
        self.states.len()
    }

    pub fn worker_states(&self) -> Vec<WorkerState> {
        self.states
            .iter()
            .map(|state| WorkerState::from_u8(state.load(Ordering::Acquire)))
            .collect()
    }

    /// 全ワーカーの終了を待つ
    pub async fn join(self) -> EngineResult<()> {
        for handle in self.handles {
            handle.await?;
        }
        Ok(())
    }
}

struct PoolShared<I, O, P: ?Sized> {
    name: String,
    queue: TaskConsumer<I>,
    output: StreamSender<TaskResult<O>>,
    processor: Arc<P>,
    reporter: Arc<dyn ProgressReporter>,
    stats: Arc<PipelineStats>,
    signal: ShutdownSignal,
    active: AtomicUsize,
}

impl<I, O, P: ?Sized> PoolShared<I, O, P> {
    async fn observe_shutdown(&self) {
        if self.stats.mark_shutdown_observed() {
            self.reporter.report_shutdown_requested().await;
        }
    }
}

/// Workers: 並列ワーカープールを起動する
#[allow(clippy::too_many_arguments)]
pub fn spawn_worker_pool<I, O, P>(
    coordinator: &ShutdownCoordinator,
    name: impl Into<String>,
    queue: TaskConsumer<I>,
    output: StreamSender<TaskResult<O>>,
    processor: Arc<P>,
    reporter: Arc<dyn ProgressReporter>,
    stats: Arc<PipelineStats>,
    worker_count: usize,
) -> EngineResult<WorkerPoolHandle>
where
    I: Send + 'static,
    O: Send + 'static,
    P: TaskProcessor<I, O> + ?Sized + 'static,
{
    let name = name.into();
    if worker_count == 0 {
        return Err(EngineError::configuration(format!(
            "ワーカープール '{name}' のワーカー数が0です"
        )));
    }

    let shared = Arc::new(PoolShared {
        name: name.clone(),
        queue,
        output,
        processor,
        reporter,
        stats,
        signal: coordinator.signal(),
        active: AtomicUsize::new(worker_count),
    });

    let mut handles = Vec::with_capacity(worker_count);
    let mut states = Vec::with_capacity(worker_count);
    for worker_id in 0..worker_count {
        let state = Arc::new(AtomicU8::new(WorkerState::Running as u8));
        let handle = coordinator.spawn(
            format!("{name}-worker-{worker_id}"),
            run_worker(worker_id, Arc::clone(&shared), Arc::clone(&state)),
        )?;
        handles.push(handle);
        states.push(state);
    }

    debug!(pool = %name, worker_count, "worker pool started");
    Ok(WorkerPoolHandle {
        name,
        handles,
        states,
    })
}

async fn run_worker<I, O, P>(
    worker_id: usize,
    shared: Arc<PoolShared<I, O, P>>,
    state: Arc<AtomicU8>,
) where
    I: Send + 'static,
    O: Send + 'static,
    P: TaskProcessor<I, O> + ?Sized + 'static,
{
    let mut processed = 0usize;

    loop {
        // 次の作業を取得
        let task = match shared.queue.dequeue(&shared.signal).await {
            Dequeued::Task(task) => task,
            Dequeued::Closed => break,
            Dequeued::Shutdown => {
                shared.observe_shutdown().await;
                break;
            }
        };

        let task_id = task.id();
        let result = execute_task(shared.processor.as_ref(), task).await;
        let success = result.is_success();
        if let Some(failure) = result.failure_marker() {
            warn!(pool = %shared.name, worker_id, %task_id, %failure, "task failed");
        }

        // 結果送信
        match shared.output.send(result, &shared.signal).await {
            Ok(()) => {
                shared.stats.record_result(success);
                shared.reporter.report_task_completed(task_id, success).await;
                processed += 1;
            }
            Err(error) => {
                shared.stats.dropped.fetch_add(1, Ordering::Relaxed);
                shared.reporter.report_task_dropped(task_id).await;
                debug!(pool = %shared.name, worker_id, %task_id, %error, "result not delivered");
                if shared.signal.is_requested() {
                    shared.observe_shutdown().await;
                }
                break;
            }
        }
    }

    state.store(WorkerState::Draining as u8, Ordering::Release);

    if shared.active.fetch_sub(1, Ordering::AcqRel) == 1 {
        // 最後のワーカー: これ以降の投入を拒否し、残りを破棄として計上
        let remaining = shared.queue.close_and_drain().await;
        if !remaining.is_empty() {
            warn!(pool = %shared.name, count = remaining.len(), "discarding unprocessed tasks");
        }
        for task in remaining {
            shared.stats.dropped.fetch_add(1, Ordering::Relaxed);
            shared.reporter.report_task_dropped(task.id()).await;
        }
    }

    state.store(WorkerState::Exited as u8, Ordering::Release);
    debug!(pool = %shared.name, worker_id, processed, "worker exited");
}
