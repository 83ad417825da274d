// パイプラインを流れるデータ型とライフサイクル状態の定義

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// タスク識別子（生産者が割り当てる）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl TaskId {
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for TaskId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// 複数の生産者で共有する連番ID発行器
#[derive(Debug, Clone, Default)]
pub struct TaskIdGenerator {
    next: Arc<AtomicU64>,
}

impl TaskIdGenerator {
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: Arc::new(AtomicU64::new(first)),
        }
    }

    pub fn next_id(&self) -> TaskId {
        TaskId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// 作業単位
///
/// キューに投入された後は不変。フィールドは非公開で、構築後に
/// ペイロードを書き換える手段は提供しない。
#[derive(Debug, Clone, PartialEq)]
pub struct Task<T> {
    id: TaskId,
    payload: T,
}

impl<T> Task<T> {
    pub fn new(id: impl Into<TaskId>, payload: T) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    /// ワーカーが所有権を取得して処理関数へ渡す
    pub fn into_parts(self) -> (TaskId, T) {
        (self.id, self.payload)
    }
}

/// 失敗の発生源
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// 処理関数がエラーを返した
    Error,
    /// 処理関数がパニックした
    Panic,
    /// パイプラインステージの変換が失敗した
    Stage { stage: String },
}

/// 失敗マーカー
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl TaskFailure {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Error,
            message: message.into(),
        }
    }

    pub fn panic(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Panic,
            message: message.into(),
        }
    }

    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Stage {
                stage: stage.into(),
            },
            message: message.into(),
        }
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FailureKind::Error => write!(f, "error: {}", self.message),
            FailureKind::Panic => write!(f, "panic: {}", self.message),
            FailureKind::Stage { stage } => write!(f, "stage '{stage}': {}", self.message),
        }
    }
}

/// 個別タスクの処理結果
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome<T> {
    Success(T),
    Failure(TaskFailure),
}

/// 処理結果（元タスクIDを保持）
#[derive(Debug, Clone, PartialEq)]
pub struct TaskResult<T> {
    pub task_id: TaskId,
    pub outcome: TaskOutcome<T>,
}

impl<T> TaskResult<T> {
    pub fn success(task_id: TaskId, payload: T) -> Self {
        Self {
            task_id,
            outcome: TaskOutcome::Success(payload),
        }
    }

    pub fn failure(task_id: TaskId, failure: TaskFailure) -> Self {
        Self {
            task_id,
            outcome: TaskOutcome::Failure(failure),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, TaskOutcome::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }

    pub fn payload(&self) -> Option<&T> {
        match &self.outcome {
            TaskOutcome::Success(payload) => Some(payload),
            TaskOutcome::Failure(_) => None,
        }
    }

    pub fn failure_marker(&self) -> Option<&TaskFailure> {
        match &self.outcome {
            TaskOutcome::Success(_) => None,
            TaskOutcome::Failure(failure) => Some(failure),
        }
    }

    pub fn into_payload(self) -> Option<T> {
        match self.outcome {
            TaskOutcome::Success(payload) => Some(payload),
            TaskOutcome::Failure(_) => None,
        }
    }

    /// 成功ペイロードだけを変換し、失敗マーカーはそのまま引き継ぐ
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> TaskResult<U> {
        let outcome = match self.outcome {
            TaskOutcome::Success(payload) => TaskOutcome::Success(f(payload)),
            TaskOutcome::Failure(failure) => TaskOutcome::Failure(failure),
        };
        TaskResult {
            task_id: self.task_id,
            outcome,
        }
    }
}

/// 分配ポリシーの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DistributionPolicyKind {
    #[default]
    RoundRobin,
    Hash,
    LeastLoaded,
}

/// ステージ変換失敗時のポリシー（チェーン全体で一つ）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum StageFailurePolicy {
    /// 失敗したアイテムを破棄してログに残す
    Skip,
    /// 失敗マーカー付きの結果として下流へ流す
    #[default]
    ForwardMarked,
}

/// パイプラインインスタンスの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Running,
    Draining,
    Completed,
}

/// ワーカーの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Running = 0,
    Draining = 1,
    Exited = 2,
}

impl WorkerState {
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::Draining,
            _ => Self::Exited,
        }
    }
}

/// 完了待機の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    Completed,
    /// タイムアウト。エンジンはまだ生きている可能性がある
    TimedOut,
}

impl CompletionStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// エンジン実行全体のサマリー
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineSummary {
    pub submitted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub dropped: usize,
    /// ステージで失敗マーカーに変換された件数（ForwardMarked）
    pub stage_failed: usize,
    /// ステージで破棄された件数（Skip）
    pub stage_skipped: usize,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl EngineSummary {
    /// 投入済みタスクのうち、結果・破棄のいずれにも計上されていない数
    pub fn unaccounted(&self) -> usize {
        self.submitted
            .saturating_sub(self.succeeded + self.failed + self.dropped)
    }
}
