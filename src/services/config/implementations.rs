// 設定管理の具象実装

use crate::core::{
    DistributionPolicyKind, EngineError, EngineResult, PipelineConfig, StageFailurePolicy,
    ValidationError, ValidationResult,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// デフォルト設定実装
///
/// JSON から読み込む場合、省略したフィールドはデフォルト値になる。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultPipelineConfig {
    worker_count: usize,
    queue_capacity: usize,
    result_capacity: usize,
    fan_in_source_count: usize,
    distribution_policy: DistributionPolicyKind,
    stage_failure_policy: StageFailurePolicy,
}

impl DefaultPipelineConfig {
    pub fn new(cpu_count: usize) -> Self {
        Self {
            worker_count: cpu_count.max(1) * 2,
            ..Self::base()
        }
    }

    fn base() -> Self {
        Self {
            worker_count: 1,
            queue_capacity: 100,
            result_capacity: 100,
            fan_in_source_count: 1,
            distribution_policy: DistributionPolicyKind::RoundRobin,
            stage_failure_policy: StageFailurePolicy::ForwardMarked,
        }
    }

    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_result_capacity(mut self, capacity: usize) -> Self {
        self.result_capacity = capacity;
        self
    }

    pub fn with_fan_in_source_count(mut self, count: usize) -> Self {
        self.fan_in_source_count = count;
        self
    }

    pub fn with_distribution_policy(mut self, policy: DistributionPolicyKind) -> Self {
        self.distribution_policy = policy;
        self
    }

    pub fn with_stage_failure_policy(mut self, policy: StageFailurePolicy) -> Self {
        self.stage_failure_policy = policy;
        self
    }

    /// JSON ファイルから設定を読み込み、検証する
    pub fn from_json_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let display = path.display().to_string();

        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::config_load(&display, e.into()))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| EngineError::config_load(&display, e.into()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ValidationResult<()> {
        validate_config(self)
    }
}

impl Default for DefaultPipelineConfig {
    fn default() -> Self {
        Self::new(num_cpus::get())
    }
}

impl PipelineConfig for DefaultPipelineConfig {
    fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    fn result_capacity(&self) -> usize {
        self.result_capacity
    }

    fn worker_count(&self) -> usize {
        self.worker_count
    }

    fn fan_in_source_count(&self) -> usize {
        self.fan_in_source_count
    }

    fn distribution_policy(&self) -> DistributionPolicyKind {
        self.distribution_policy
    }

    fn stage_failure_policy(&self) -> StageFailurePolicy {
        self.stage_failure_policy
    }
}

/// 任意の設定実装を検証する
///
/// 容量 0 はランデブーとして有効。
pub fn validate_config<C: PipelineConfig + ?Sized>(config: &C) -> ValidationResult<()> {
    if config.worker_count() == 0 {
        return Err(ValidationError::new(
            "worker_count",
            "ワーカー数は1以上である必要があります",
        ));
    }
    if config.fan_in_source_count() == 0 {
        return Err(ValidationError::new(
            "fan_in_source_count",
            "ファンインのソース数は1以上である必要があります",
        ));
    }
    if config.worker_count() < config.fan_in_source_count() {
        return Err(ValidationError::new(
            "worker_count",
            format!(
                "各シャードに1つ以上のワーカーが必要です（ワーカー {} < シャード {}）",
                config.worker_count(),
                config.fan_in_source_count()
            ),
        ));
    }
    Ok(())
}
