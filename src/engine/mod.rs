// エンジン層 - 並行ユニットの起動とオーケストレーション
// チャンネル・協調・サービス層を組み合わせてパイプラインを構成する

pub mod api;
pub mod fan_in;
pub mod fan_out;
pub mod pipeline;
pub mod pipeline_engine;
pub mod producer;
pub mod stats;
pub mod worker_pool;

// 公開API - 主要エンジンクラスと構成部品
pub use api::{process_all, process_quietly, process_with_defaults};
pub use fan_in::{merge, MergedStream};
pub use fan_out::{distribute, fan_out, DistributionReport};
pub use pipeline::{spawn_parallel_stage, spawn_stage, PipelineChain, StageContext, StageFn};
pub use pipeline_engine::PipelineEngine;
pub use producer::{spawn_generator, spawn_producer, spawn_producers, spawn_source};
pub use stats::PipelineStats;
pub use worker_pool::{spawn_worker_pool, WorkerPoolHandle};
