// PipelineEngine - パイプライン全体の構築と制御
//
// 呼び出し側 → タスクキュー →（分配）→ ワーカープール →（合流）→ ステージチェーン
// → 呼び出し側が読む結果ストリーム、という構成を一つのインスタンスとして管理する。
// 全ユニットは ShutdownCoordinator 配下で起動され、完了は一度だけ報告される。

use super::fan_in::merge;
use super::fan_out::run_distribution;
use super::pipeline::{PipelineChain, StageContext};
use super::stats::PipelineStats;
use super::worker_pool::{spawn_worker_pool, WorkerPoolHandle};
use crate::channel::{stream, StreamReceiver, StreamSender, TaskConsumer, TaskProducer, TrySendError};
use crate::coordination::{ShutdownCoordinator, ShutdownSignal};
use crate::core::{
    CompletionStatus, DistributionPolicy, EngineError, EngineResult, EngineSummary,
    PipelineConfig, PipelineState, ProgressReporter, Task, TaskId, TaskIdGenerator,
    TaskProcessor, TaskResult, WorkerState,
};
use crate::services::{task_policy, validate_config};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const QUEUE_NAME: &str = "task queue";

/// 有界並行パイプラインのインスタンス
///
/// `submit` は複数タスクから同時に呼び出せる。入力を締め切るには `finish`、
/// 協調的に中断するには `request_shutdown` を呼ぶ。エンジンを破棄した場合も
/// 入力は締め切られ、投入済みのタスクは処理される。
pub struct PipelineEngine<I> {
    coordinator: ShutdownCoordinator,
    producer: Mutex<Option<TaskProducer<I>>>,
    ids: TaskIdGenerator,
    stats: Arc<PipelineStats>,
    reporter: Arc<dyn ProgressReporter>,
    pools: Vec<WorkerPoolHandle>,
    queue_capacity: usize,
    completion_reported: AtomicBool,
}

impl<I: Send + 'static> PipelineEngine<I> {
    /// パイプラインを構築して起動する
    ///
    /// 戻り値の結果ストリームは、全ワーカーと全ステージが終了した時点でクローズされる。
    pub async fn start<C, P, O>(
        config: &C,
        processor: P,
        chain: &PipelineChain<O>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> EngineResult<(Self, StreamReceiver<TaskResult<O>>)>
    where
        C: PipelineConfig + ?Sized,
        P: TaskProcessor<I, O> + 'static,
        O: Send + 'static,
    {
        validate_config(config)?;

        let coordinator = ShutdownCoordinator::new();
        let stats = Arc::new(PipelineStats::new());
        let processor = Arc::new(processor);
        let shards = config.fan_in_source_count();
        let worker_count = config.worker_count();

        let (intake, intake_rx) = stream::<Task<I>>(config.queue_capacity());
        let mut pools = Vec::with_capacity(shards);
        let mut shard_results = Vec::with_capacity(shards);

        if shards == 1 {
            let (result_tx, result_rx) = stream(config.result_capacity());
            pools.push(spawn_worker_pool(
                &coordinator,
                "pool-0",
                TaskConsumer::from_receiver(intake_rx),
                result_tx,
                Arc::clone(&processor),
                Arc::clone(&reporter),
                Arc::clone(&stats),
                worker_count,
            )?);
            shard_results.push(result_rx);
        } else {
            let mut shard_queues = Vec::with_capacity(shards);
            for shard in 0..shards {
                let (shard_tx, shard_rx) = stream(config.queue_capacity());
                let (result_tx, result_rx) = stream(config.result_capacity());
                pools.push(spawn_worker_pool(
                    &coordinator,
                    format!("pool-{shard}"),
                    TaskConsumer::from_receiver(shard_rx),
                    result_tx,
                    Arc::clone(&processor),
                    Arc::clone(&reporter),
                    Arc::clone(&stats),
                    shard_worker_count(worker_count, shards, shard),
                )?);
                shard_queues.push(shard_tx);
                shard_results.push(result_rx);
            }
            spawn_intake_distributor(
                &coordinator,
                intake_rx,
                shard_queues,
                task_policy(config.distribution_policy()),
                Arc::clone(&stats),
                Arc::clone(&reporter),
            )?;
        }

        let merged = if shard_results.len() == 1 {
            shard_results.remove(0)
        } else {
            merge(&coordinator, shard_results, config.result_capacity())?.into_output()
        };

        let context = StageContext::new(config.stage_failure_policy(), config.result_capacity())
            .with_stats(Arc::clone(&stats))
            .with_reporter(Arc::clone(&reporter));
        let output = chain.spawn(&coordinator, merged, &context)?;

        // 全ユニットの起動完了: 以降はジョインバリアへの追加を受け付けない
        coordinator.seal();

        info!(
            workers = worker_count,
            shards,
            queue_capacity = config.queue_capacity(),
            stages = chain.len(),
            "pipeline engine started"
        );
        reporter.report_started(worker_count).await;

        let engine = Self {
            coordinator,
            producer: Mutex::new(Some(TaskProducer::from_sender(intake))),
            ids: TaskIdGenerator::default(),
            stats,
            reporter,
            pools,
            queue_capacity: config.queue_capacity(),
            completion_reported: AtomicBool::new(false),
        };
        Ok((engine, output))
    }

    /// タスクを投入する。キューが満杯なら空きが出るまで待つ
    ///
    /// 待機はシャットダウンと競合し、中断された場合は `CancelledError` になる。
    pub async fn submit(&self, task: Task<I>) -> EngineResult<()> {
        let producer = self.producer.lock().clone();
        let Some(producer) = producer else {
            return Err(EngineError::submit_after_drain(task.id().value()));
        };

        self.stats.submitted.fetch_add(1, Ordering::AcqRel);
        let signal = self.coordinator.signal();
        if let Err(error) = producer.enqueue(task, &signal).await {
            self.stats.submitted.fetch_sub(1, Ordering::AcqRel);
            return Err(error);
        }
        Ok(())
    }

    /// IDを自動採番して投入する
    ///
    /// 自動採番と `submit` での手動IDを混在させるとIDが重複しうる。
    pub async fn submit_payload(&self, payload: I) -> EngineResult<TaskId> {
        let id = self.ids.next_id();
        self.submit(Task::new(id, payload)).await?;
        Ok(id)
    }

    /// ブロックしない投入。満杯なら `QueueFullError` を返し、タスクは破棄される
    pub fn try_submit(&self, task: Task<I>) -> EngineResult<()> {
        let producer = self.producer.lock().clone();
        let Some(producer) = producer else {
            return Err(EngineError::submit_after_drain(task.id().value()));
        };
        if self.coordinator.is_shutdown_requested() {
            return Err(EngineError::cancelled(format!("submit task {}", task.id())));
        }

        self.stats.submitted.fetch_add(1, Ordering::AcqRel);
        producer.try_enqueue(task).map_err(|error| {
            self.stats.submitted.fetch_sub(1, Ordering::AcqRel);
            match error {
                TrySendError::Full(_) => EngineError::queue_full(QUEUE_NAME, self.queue_capacity),
                TrySendError::Closed(_) => EngineError::queue_closed(QUEUE_NAME),
            }
        })
    }

    /// 入力を締め切る。投入済みのタスクは全て処理される（冪等）
    pub fn finish(&self) {
        if let Some(producer) = self.producer.lock().take() {
            producer.close();
            self.coordinator.begin_drain();
            debug!("input finished, draining");
        }
    }

    /// 協調的キャンセルを要求する（冪等）
    ///
    /// 最初に状態遷移させた呼び出しだけが `true` を返す。即座に戻る。
    pub fn request_shutdown(&self) -> bool {
        // シグナルを先に立て、ワーカーがキューのクローズより先にシャットダウンを観測するようにする
        let fired = self.coordinator.request_shutdown();
        self.producer.lock().take();
        fired
    }

    pub fn state(&self) -> PipelineState {
        self.coordinator.state()
    }

    /// 期限付きで完了を待つ。タイムアウトしてもエンジンは壊れず、再度待機できる
    pub async fn await_completion(&self, timeout: Duration) -> CompletionStatus {
        let status = self.coordinator.await_completion(timeout).await;
        if status.is_completed() {
            self.report_completion().await;
        }
        status
    }

    /// 完了まで待ち、最終サマリーを返す
    pub async fn wait_for_completion(&self) -> EngineSummary {
        self.coordinator.wait_for_completion().await;
        self.report_completion().await;
        self.summary()
    }

    /// `deadline` までに完了しなければシャットダウンを要求し、さらに `grace` だけ待つ
    pub async fn shutdown_after(&self, deadline: Duration, grace: Duration) -> CompletionStatus {
        if self.await_completion(deadline).await.is_completed() {
            return CompletionStatus::Completed;
        }
        warn!(?deadline, "deadline exceeded, requesting shutdown");
        self.request_shutdown();
        self.await_completion(grace).await
    }

    pub fn summary(&self) -> EngineSummary {
        self.stats.snapshot()
    }

    pub fn worker_count(&self) -> usize {
        self.pools.iter().map(WorkerPoolHandle::worker_count).sum()
    }

    pub fn worker_states(&self) -> Vec<WorkerState> {
        self.pools
            .iter()
            .flat_map(WorkerPoolHandle::worker_states)
            .collect()
    }

    /// 生存中の並行ユニット数
    pub fn live_units(&self) -> usize {
        self.coordinator.live_units()
    }

    /// 呼び出し側の生産者がシャットダウンを観測するためのシグナル
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.coordinator.signal()
    }

    async fn report_completion(&self) {
        if self.completion_reported.swap(true, Ordering::AcqRel) {
            return;
        }
        let summary = self.summary();
        info!(
            submitted = summary.submitted,
            succeeded = summary.succeeded,
            failed = summary.failed,
            dropped = summary.dropped,
            stage_failed = summary.stage_failed,
            stage_skipped = summary.stage_skipped,
            elapsed_ms = summary.elapsed_ms,
            "pipeline completed"
        );
        self.reporter.report_completed(&summary).await;
    }
}

/// シャードごとのワーカー数。端数は先頭のシャードから一つずつ割り当てる
fn shard_worker_count(total: usize, shards: usize, shard: usize) -> usize {
    total / shards + usize::from(shard < total % shards)
}

/// タスクキューからシャードキューへの分配ユニット
///
/// 途中終了した場合、タスクキューをクローズして残ったタスクを破棄として計上する。
fn spawn_intake_distributor<I>(
    coordinator: &ShutdownCoordinator,
    intake: StreamReceiver<Task<I>>,
    shards: Vec<StreamSender<Task<I>>>,
    policy: Box<dyn DistributionPolicy<Task<I>>>,
    stats: Arc<PipelineStats>,
    reporter: Arc<dyn ProgressReporter>,
) -> EngineResult<()>
where
    I: Send + 'static,
{
    let signal = coordinator.signal();
    coordinator.spawn("intake-fan-out", async move {
        let outcome = run_distribution(intake, shards, policy, signal).await;
        let mut input = outcome.input;
        let mut discarded = outcome.undelivered;
        discarded.extend(input.drain().await);

        if !discarded.is_empty() {
            warn!(count = discarded.len(), "discarding undistributed tasks");
        }
        for task in discarded {
            stats.dropped.fetch_add(1, Ordering::Relaxed);
            reporter.report_task_dropped(task.id()).await;
        }
        debug!(per_shard = ?outcome.report.per_output, "intake distribution finished");
    })?;
    Ok(())
}
