use crate::channel::StreamReceiver;
use crate::cli::BuiltinStage;
use crate::core::{
    DistributionPolicyKind, PipelineConfig, ProgressReporter, StageFailurePolicy, TaskId,
    TaskProcessor, TaskResult,
};
use crate::engine::{PipelineChain, PipelineEngine};
use crate::services::{ConsoleProgressReporter, DefaultPipelineConfig};
use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// run コマンドの設定（引数の数を抑えるための構造体）
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub tasks: u64,
    pub workers: Option<usize>,
    pub queue_capacity: Option<usize>,
    pub result_capacity: Option<usize>,
    pub fan_in: Option<usize>,
    pub policy: Option<DistributionPolicyKind>,
    pub stage_failure_policy: Option<StageFailurePolicy>,
    pub stages: Vec<BuiltinStage>,
    pub fail_every: Option<u64>,
    pub panic_every: Option<u64>,
    pub work_ms: u64,
    pub cancel_after_ms: Option<u64>,
    pub config: Option<PathBuf>,
    pub quiet: bool,
}

/// 障害注入付きの合成ワークロード
#[derive(Debug, Clone, Default)]
pub struct SyntheticProcessor {
    fail_every: Option<u64>,
    panic_every: Option<u64>,
    work: Duration,
}

impl SyntheticProcessor {
    pub fn new(fail_every: Option<u64>, panic_every: Option<u64>, work: Duration) -> Self {
        Self {
            fail_every,
            panic_every,
            work,
        }
    }
}

fn hits(every: Option<u64>, payload: i64) -> bool {
    matches!(every, Some(n) if n > 0 && payload.unsigned_abs() % n == 0)
}

#[async_trait]
impl TaskProcessor<i64, i64> for SyntheticProcessor {
    async fn process(&self, task_id: TaskId, payload: i64) -> Result<i64> {
        if !self.work.is_zero() {
            tokio::time::sleep(self.work).await;
        }
        if hits(self.panic_every, payload) {
            panic!("injected panic for task {task_id}");
        }
        if hits(self.fail_every, payload) {
            anyhow::bail!("injected failure for payload {payload}");
        }
        Ok(payload)
    }
}

/// 設定ファイルとフラグから構成を組み立てる。フラグが優先される
pub fn build_config(options: &RunOptions) -> Result<DefaultPipelineConfig> {
    let mut config = match &options.config {
        Some(path) => DefaultPipelineConfig::from_json_file(path)?,
        None => DefaultPipelineConfig::default(),
    };

    if let Some(workers) = options.workers {
        config = config.with_worker_count(workers);
    }
    if let Some(capacity) = options.queue_capacity {
        config = config.with_queue_capacity(capacity);
    }
    if let Some(capacity) = options.result_capacity {
        config = config.with_result_capacity(capacity);
    }
    if let Some(fan_in) = options.fan_in {
        config = config.with_fan_in_source_count(fan_in);
    }
    if let Some(policy) = options.policy {
        config = config.with_distribution_policy(policy);
    }
    if let Some(policy) = options.stage_failure_policy {
        config = config.with_stage_failure_policy(policy);
    }

    config.validate()?;
    Ok(config)
}

pub fn build_chain(stages: &[BuiltinStage]) -> PipelineChain<i64> {
    stages.iter().copied().fold(PipelineChain::new(), |chain, stage| {
        chain.stage(stage.name(), move |value: i64| stage.apply(value))
    })
}

/// 結果の集計
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ResultTally {
    pub successes: usize,
    pub failures: usize,
    pub checksum: i64,
}

async fn tally_results(mut results: StreamReceiver<TaskResult<i64>>) -> ResultTally {
    let mut tally = ResultTally::default();
    while let Some(result) = results.recv().await {
        match result.into_payload() {
            Some(value) => {
                tally.successes += 1;
                tally.checksum = tally.checksum.wrapping_add(value);
            }
            None => tally.failures += 1,
        }
    }
    tally
}

/// 合成ワークロードを実行してサマリーを表示する
pub async fn execute_run(options: RunOptions) -> Result<()> {
    let config = build_config(&options)?;
    let chain = build_chain(&options.stages);

    println!("🚀 パイプラインエンジン - runコマンド");
    println!("⚙️  設定:");
    println!("   - タスク数: {}", options.tasks);
    println!("   - ワーカー数: {}", config.worker_count());
    println!("   - キュー容量: {}", config.queue_capacity());
    println!("   - ファンイン数: {}", config.fan_in_source_count());
    println!("   - 分配ポリシー: {:?}", config.distribution_policy());
    println!("   - ステージ: {:?}", chain.stage_names());

    let reporter: Arc<dyn ProgressReporter> = if options.quiet {
        Arc::new(ConsoleProgressReporter::quiet())
    } else {
        Arc::new(ConsoleProgressReporter::new())
    };
    let processor = SyntheticProcessor::new(
        options.fail_every,
        options.panic_every,
        Duration::from_millis(options.work_ms),
    );

    let (engine, results) = PipelineEngine::start(&config, processor, &chain, reporter).await?;
    let engine = Arc::new(engine);

    if let Some(delay) = options.cancel_after_ms {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            if engine.request_shutdown() {
                info!(delay_ms = delay, "cancellation timer fired");
            }
        });
    }

    let last = i64::try_from(options.tasks)?;
    let submit_all = async {
        for payload in 1..=last {
            if let Err(error) = engine.submit_payload(payload).await {
                warn!(%error, "submission stopped");
                break;
            }
        }
        engine.finish();
    };
    let ((), tally) = tokio::join!(submit_all, tally_results(results));
    let summary = engine.wait_for_completion().await;

    println!("\n📊 処理結果:");
    println!("   - 成功: {}", tally.successes);
    println!("   - 失敗: {}", tally.failures);
    println!("   - チェックサム: {}", tally.checksum);
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if summary.unaccounted() > 0 {
        warn!(unaccounted = summary.unaccounted(), "tasks unaccounted for");
    }
    Ok(())
}
