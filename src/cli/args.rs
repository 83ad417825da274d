use crate::core::{DistributionPolicyKind, StageFailurePolicy};
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pipeline_engine")]
#[command(about = "A bounded concurrent pipeline engine with cooperative shutdown")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a synthetic workload through the pipeline
    Run {
        /// Number of tasks to submit (payloads 1..=N)
        #[arg(short = 'n', long, default_value = "100")]
        tasks: u64,

        /// Number of workers across all pools
        #[arg(short, long)]
        workers: Option<usize>,

        /// Task queue capacity (0 = rendezvous)
        #[arg(long)]
        queue_capacity: Option<usize>,

        /// Capacity of result and stage streams
        #[arg(long)]
        result_capacity: Option<usize>,

        /// Number of worker pool shards merged by fan-in
        #[arg(long)]
        fan_in: Option<usize>,

        /// Distribution policy across shards
        #[arg(long, value_enum)]
        policy: Option<DistributionPolicyKind>,

        /// What to do with items whose stage transform fails
        #[arg(long, value_enum)]
        stage_failure_policy: Option<StageFailurePolicy>,

        /// Comma separated stage chain applied after the workers
        #[arg(long, value_enum, value_delimiter = ',')]
        stages: Vec<BuiltinStage>,

        /// Make every N-th task fail
        #[arg(long)]
        fail_every: Option<u64>,

        /// Make every N-th task panic
        #[arg(long)]
        panic_every: Option<u64>,

        /// Simulated work per task in milliseconds
        #[arg(long, default_value = "0")]
        work_ms: u64,

        /// Request shutdown after the given number of milliseconds
        #[arg(long)]
        cancel_after_ms: Option<u64>,

        /// JSON configuration file (flags override its values)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Suppress progress output
        #[arg(short, long)]
        quiet: bool,
    },
}

/// 組み込みのステージ変換
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuiltinStage {
    /// x + 1
    Add,
    /// x * 2
    Double,
    /// x - 3
    Subtract,
    /// x * x
    Square,
    /// -x
    Negate,
}

impl BuiltinStage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Add => "add-one",
            Self::Double => "double",
            Self::Subtract => "subtract-three",
            Self::Square => "square",
            Self::Negate => "negate",
        }
    }

    /// オーバーフローはステージ失敗として扱う
    pub fn apply(&self, value: i64) -> Result<i64> {
        let result = match self {
            Self::Add => value.checked_add(1),
            Self::Double => value.checked_mul(2),
            Self::Subtract => value.checked_sub(3),
            Self::Square => value.checked_mul(value),
            Self::Negate => value.checked_neg(),
        };
        result.ok_or_else(|| anyhow!("{} overflowed on {value}", self.name()))
    }
}
