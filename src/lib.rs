// 有界並行パイプラインエンジン
//
// 層構成:
// - core: 型・トレイト・エラー
// - channel: バックプレッシャー付きストリームとタスクキュー
// - coordination: シャットダウンシグナルとジョインバリア
// - services: 設定・分配ポリシー・進捗報告・タスク実行
// - engine: ワーカープール、ファンイン/ファンアウト、ステージチェーン、エンジン本体
// - cli: デモ用コマンドライン

pub mod channel;
pub mod cli;
pub mod coordination;
pub mod core;
pub mod engine;
pub mod services;

pub use crate::core::{EngineError, EngineResult, EngineSummary, Task, TaskId, TaskResult};
pub use crate::engine::{PipelineChain, PipelineEngine};
