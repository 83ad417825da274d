// パイプラインエンジンのトレイト定義
// 処理関数・ステージ変換・分配ポリシー・設定・進捗報告の抽象化

use super::types::{
    DistributionPolicyKind, EngineSummary, StageFailurePolicy, TaskId,
};
use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use std::future::Future;

/// パイプラインの構築設定を抽象化するトレイト
#[automock]
pub trait PipelineConfig: Send + Sync {
    /// タスクキューの容量（0 はランデブー）
    fn queue_capacity(&self) -> usize;

    /// ワーカー・ステージ間の結果ストリーム容量
    fn result_capacity(&self) -> usize;

    /// ワーカープールの総ワーカー数
    fn worker_count(&self) -> usize;

    /// ファンインで合流させるシャード数
    fn fan_in_source_count(&self) -> usize;

    /// シャードへの分配ポリシー
    fn distribution_policy(&self) -> DistributionPolicyKind;

    /// ステージ変換失敗時のポリシー
    fn stage_failure_policy(&self) -> StageFailurePolicy;
}

// PipelineConfig for Box<dyn PipelineConfig>
impl PipelineConfig for Box<dyn PipelineConfig> {
    fn queue_capacity(&self) -> usize {
        self.as_ref().queue_capacity()
    }

    fn result_capacity(&self) -> usize {
        self.as_ref().result_capacity()
    }

    fn worker_count(&self) -> usize {
        self.as_ref().worker_count()
    }

    fn fan_in_source_count(&self) -> usize {
        self.as_ref().fan_in_source_count()
    }

    fn distribution_policy(&self) -> DistributionPolicyKind {
        self.as_ref().distribution_policy()
    }

    fn stage_failure_policy(&self) -> StageFailurePolicy {
        self.as_ref().stage_failure_policy()
    }
}

/// 進捗報告の抽象化トレイト
#[automock]
#[async_trait]
pub trait ProgressReporter: Send + Sync {
    /// エンジン起動時の報告
    async fn report_started(&self, worker_count: usize);

    /// タスク1件の処理完了（成功・失敗）
    async fn report_task_completed(&self, task_id: TaskId, success: bool);

    /// シャットダウンで処理されずに破棄されたタスク
    async fn report_task_dropped(&self, task_id: TaskId);

    /// Skip ポリシーで破棄されたステージアイテム
    async fn report_stage_skipped(&self, stage: &str, task_id: TaskId, error: &str);

    /// シャットダウン要求を受けた
    async fn report_shutdown_requested(&self);

    /// 全ユニット終了時の報告
    async fn report_completed(&self, summary: &EngineSummary);
}

// ProgressReporter for Box<dyn ProgressReporter>
#[async_trait]
impl ProgressReporter for Box<dyn ProgressReporter> {
    async fn report_started(&self, worker_count: usize) {
        self.as_ref().report_started(worker_count).await
    }

    async fn report_task_completed(&self, task_id: TaskId, success: bool) {
        self.as_ref().report_task_completed(task_id, success).await
    }

    async fn report_task_dropped(&self, task_id: TaskId) {
        self.as_ref().report_task_dropped(task_id).await
    }

    async fn report_stage_skipped(&self, stage: &str, task_id: TaskId, error: &str) {
        self.as_ref()
            .report_stage_skipped(stage, task_id, error)
            .await
    }

    async fn report_shutdown_requested(&self) {
        self.as_ref().report_shutdown_requested().await
    }

    async fn report_completed(&self, summary: &EngineSummary) {
        self.as_ref().report_completed(summary).await
    }
}

/// ワーカーが適用する処理関数
///
/// エラーもパニックもワーカー内で捕捉され、失敗マーカー付きの結果になる。
#[async_trait]
pub trait TaskProcessor<I, O>: Send + Sync {
    async fn process(&self, task_id: TaskId, payload: I) -> Result<O>;
}

// 非同期クロージャをそのまま処理関数として使えるようにする
#[async_trait]
impl<I, O, F, Fut> TaskProcessor<I, O> for F
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O>> + Send + 'static,
{
    async fn process(&self, _task_id: TaskId, payload: I) -> Result<O> {
        (self)(payload).await
    }
}

/// ファンアウトの分配ポリシー
pub trait DistributionPolicy<T>: Send {
    /// 次の出力先を選ぶ。`loads` は各出力の現在のバッファ使用数
    fn select(&mut self, value: &T, loads: &[usize]) -> usize;

    /// ログ用のポリシー名
    fn name(&self) -> &'static str;
}

impl<T> DistributionPolicy<T> for Box<dyn DistributionPolicy<T>> {
    fn select(&mut self, value: &T, loads: &[usize]) -> usize {
        self.as_mut().select(value, loads)
    }

    fn name(&self) -> &'static str {
        self.as_ref().name()
    }
}
