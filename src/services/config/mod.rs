// 設定管理
// パイプライン構築パラメータの保持・読み込み・検証

pub mod implementations;

pub use implementations::{validate_config, DefaultPipelineConfig};
