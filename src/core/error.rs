// Custom error types for the pipeline engine
// 構造的な誤用（設定・ライフサイクル違反）を表すエラー型定義
// タスク単位の失敗はエラーではなく TaskFailure としてデータ化される

use thiserror::Error;

/// パイプラインエンジン固有のエラー型
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("設定エラー: {message}")]
    ConfigurationError { message: String },

    #[error("バリデーションエラー: {field} - {reason}")]
    ValidationError { field: String, reason: String },

    #[error("設定ファイル読み込みエラー: {path} - {source}")]
    ConfigLoadError {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("キューは既にクローズされています: {queue}")]
    QueueClosedError { queue: String },

    #[error("キューが満杯です: {queue} (容量: {capacity})")]
    QueueFullError { queue: String, capacity: usize },

    #[error("ドレイン開始後の投入は許可されていません: task {task_id}")]
    SubmitAfterDrainError { task_id: u64 },

    #[error("シャットダウン要求によりキャンセルされました: {operation}")]
    CancelledError { operation: String },

    #[error("完了済みのバリアには登録できません: {unit}")]
    BarrierCompletedError { unit: String },

    #[error("タスクエラー: {source}")]
    TaskError {
        #[source]
        source: tokio::task::JoinError,
    },

    #[error("内部エラー: {source}")]
    InternalError {
        #[source]
        source: anyhow::Error,
    },
}

impl EngineError {
    /// 設定エラーの作成
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError {
            message: message.into(),
        }
    }

    /// バリデーションエラーの作成
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// 設定ファイル読み込みエラーの作成
    pub fn config_load(path: impl Into<String>, source: anyhow::Error) -> Self {
        Self::ConfigLoadError {
            path: path.into(),
            source,
        }
    }

    /// キュークローズエラーの作成
    pub fn queue_closed(queue: impl Into<String>) -> Self {
        Self::QueueClosedError {
            queue: queue.into(),
        }
    }

    /// キュー満杯エラーの作成
    pub fn queue_full(queue: impl Into<String>, capacity: usize) -> Self {
        Self::QueueFullError {
            queue: queue.into(),
            capacity,
        }
    }

    /// ドレイン後投入エラーの作成
    pub fn submit_after_drain(task_id: u64) -> Self {
        Self::SubmitAfterDrainError { task_id }
    }

    /// キャンセルエラーの作成
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::CancelledError {
            operation: operation.into(),
        }
    }

    /// バリア完了済みエラーの作成
    pub fn barrier_completed(unit: impl Into<String>) -> Self {
        Self::BarrierCompletedError { unit: unit.into() }
    }

    /// タスクエラーの作成
    pub fn task(source: tokio::task::JoinError) -> Self {
        Self::TaskError { source }
    }

    /// 内部エラーの作成
    pub fn internal(source: anyhow::Error) -> Self {
        Self::InternalError { source }
    }

    /// エラーの重要度を取得
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::ValidationError { .. } | Self::InternalError { .. } => ErrorSeverity::Critical,
            Self::ConfigurationError { .. } | Self::ConfigLoadError { .. } => ErrorSeverity::High,
            Self::BarrierCompletedError { .. } | Self::TaskError { .. } => ErrorSeverity::High,
            Self::SubmitAfterDrainError { .. } | Self::QueueClosedError { .. } => {
                ErrorSeverity::Medium
            }
            Self::QueueFullError { .. } | Self::CancelledError { .. } => ErrorSeverity::Low,
        }
    }

    /// エラーが回復可能かどうかを判定
    ///
    /// 満杯エラーは再試行で解消しうるが、クローズ・ドレイン後の投入は
    /// 同じエンジンに対しては二度と成功しない
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::QueueFullError { .. } => true,
            Self::TaskError { .. } => true,
            Self::CancelledError { .. } => false,
            Self::QueueClosedError { .. } | Self::SubmitAfterDrainError { .. } => false,
            Self::ConfigurationError { .. }
            | Self::ValidationError { .. }
            | Self::ConfigLoadError { .. } => false,
            Self::BarrierCompletedError { .. } => false,
            Self::InternalError { .. } => false,
        }
    }

    /// エラーコンテキストを取得
    pub fn context(&self) -> ErrorContext {
        match self {
            Self::ConfigurationError { message } => ErrorContext::new("configuration")
                .with_suggestion(format!("設定を確認してください: {message}")),
            Self::ValidationError { field, .. } => ErrorContext::new("validation")
                .with_resource(field.clone())
                .with_suggestion("設定値の範囲を確認してください"),
            Self::ConfigLoadError { path, .. } => ErrorContext::new("config_load")
                .with_resource(path.clone())
                .with_suggestion("ファイルパスとJSON形式を確認してください"),
            Self::QueueClosedError { queue } | Self::QueueFullError { queue, .. } => {
                ErrorContext::new("enqueue").with_resource(queue.clone())
            }
            Self::SubmitAfterDrainError { task_id } => ErrorContext::new("submit")
                .with_resource(format!("task {task_id}"))
                .with_suggestion("finish() または request_shutdown() の前に投入してください"),
            Self::BarrierCompletedError { unit } => ErrorContext::new("spawn")
                .with_resource(unit.clone())
                .with_suggestion("完了したパイプラインには新しいユニットを追加できません"),
            _ => ErrorContext::new("unknown"),
        }
    }
}

/// エラーの重要度レベル
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// 低重要度 - ログ出力程度
    Low,
    /// 中重要度 - 警告レベル
    Medium,
    /// 高重要度 - 要対応
    High,
    /// 致命的 - システム停止レベル
    Critical,
}

impl ErrorSeverity {
    /// 重要度の数値表現を取得
    pub const fn as_level(&self) -> u8 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
            Self::Critical => 4,
        }
    }

    /// 重要度の文字列表現を取得
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

/// エラーコンテキスト情報
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// 実行していた操作
    pub operation: String,
    /// 関連するリソース（キュー名・タスクID等）
    pub resource: Option<String>,
    /// エラー解決のための提案
    pub suggestion: Option<String>,
}

impl ErrorContext {
    /// 新しいエラーコンテキストを作成
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            resource: None,
            suggestion: None,
        }
    }

    /// リソース情報を追加
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// 提案を追加
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// エンジン操作の結果型
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// 検証結果 - バリデーション専用の結果型
pub type ValidationResult<T> = std::result::Result<T, ValidationError>;

/// バリデーション専用エラー型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("バリデーションエラー: {field} - {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    /// 新しいバリデーションエラーを作成
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<ValidationError> for EngineError {
    fn from(error: ValidationError) -> Self {
        EngineError::ValidationError {
            field: error.field,
            reason: error.reason,
        }
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(error: anyhow::Error) -> Self {
        EngineError::InternalError { source: error }
    }
}

impl From<tokio::task::JoinError> for EngineError {
    fn from(error: tokio::task::JoinError) -> Self {
        EngineError::TaskError { source: error }
    }
}
