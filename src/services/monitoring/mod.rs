// 進捗監視機能
// タスク完了・破棄・ステージスキップ・シャットダウン・完了サマリーの報告

pub mod implementations;

// 公開API
pub use implementations::{ConsoleProgressReporter, NoOpProgressReporter};
