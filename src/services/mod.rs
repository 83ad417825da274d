// サービス層 - 機能別のロジック
// 各サービスは特定の責任を持ち、エンジン層から組み合わせて使われる

pub mod config;
pub mod distribution;
pub mod monitoring;
pub mod processing;

// 公開API - 各サービスの主要機能を明示的にエクスポート
pub use config::{validate_config, DefaultPipelineConfig};
pub use distribution::{task_policy, KeyHashPolicy, LeastLoadedPolicy, RoundRobinPolicy};
pub use monitoring::{ConsoleProgressReporter, NoOpProgressReporter};
pub use processing::{apply_transform, execute_task};
