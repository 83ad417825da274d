// 高レベル公開API
// PipelineEngineを一括処理として簡単に使用するための便利な関数

use super::pipeline::PipelineChain;
use super::pipeline_engine::PipelineEngine;
use crate::core::{
    EngineResult, EngineSummary, PipelineConfig, ProgressReporter, TaskProcessor, TaskResult,
};
use crate::services::{ConsoleProgressReporter, DefaultPipelineConfig, NoOpProgressReporter};
use futures::StreamExt;
use std::sync::Arc;

/// 全ペイロードを投入し、結果とサマリーを返す
///
/// 投入と結果の読み出しは並行に行われるため、キュー容量より多い入力でも詰まらない。
/// 投入がエラーになった場合も入力を締め切り、パイプラインの完了を待ってから返す。
pub async fn process_all<I, O, C, P>(
    config: &C,
    processor: P,
    chain: &PipelineChain<O>,
    reporter: Arc<dyn ProgressReporter>,
    payloads: Vec<I>,
) -> EngineResult<(Vec<TaskResult<O>>, EngineSummary)>
where
    I: Send + 'static,
    O: Send + 'static,
    C: PipelineConfig + ?Sized,
    P: TaskProcessor<I, O> + 'static,
{
    let (engine, results) = PipelineEngine::start(config, processor, chain, reporter).await?;

    let submit_all = async {
        let mut outcome = Ok(());
        for payload in payloads {
            if let Err(error) = engine.submit_payload(payload).await {
                outcome = Err(error);
                break;
            }
        }
        engine.finish();
        outcome
    };
    let (submitted, results) = tokio::join!(submit_all, results.collect::<Vec<_>>());

    let summary = engine.wait_for_completion().await;
    submitted?;
    Ok((results, summary))
}

/// デフォルト設定・コンソール出力での一括処理
pub async fn process_with_defaults<I, O, P>(
    processor: P,
    chain: &PipelineChain<O>,
    payloads: Vec<I>,
) -> EngineResult<(Vec<TaskResult<O>>, EngineSummary)>
where
    I: Send + 'static,
    O: Send + 'static,
    P: TaskProcessor<I, O> + 'static,
{
    process_all(
        &DefaultPipelineConfig::default(),
        processor,
        chain,
        Arc::new(ConsoleProgressReporter::new()),
        payloads,
    )
    .await
}

/// 一括処理（静音版）
///
/// テストやバックグラウンド処理用
pub async fn process_quietly<I, O, P>(
    processor: P,
    chain: &PipelineChain<O>,
    payloads: Vec<I>,
) -> EngineResult<(Vec<TaskResult<O>>, EngineSummary)>
where
    I: Send + 'static,
    O: Send + 'static,
    P: TaskProcessor<I, O> + 'static,
{
    process_all(
        &DefaultPipelineConfig::default(),
        processor,
        chain,
        Arc::new(NoOpProgressReporter::new()),
        payloads,
    )
    .await
}
