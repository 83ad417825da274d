// エンジン全体で共有する処理カウンタ

use crate::core::EngineSummary;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

#[derive(Debug)]
pub struct PipelineStats {
    pub submitted: AtomicUsize,
    pub succeeded: AtomicUsize,
    pub failed: AtomicUsize,
    pub dropped: AtomicUsize,
    pub stage_failed: AtomicUsize,
    pub stage_skipped: AtomicUsize,
    shutdown_observed: AtomicBool,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self {
            submitted: AtomicUsize::new(0),
            succeeded: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            dropped: AtomicUsize::new(0),
            stage_failed: AtomicUsize::new(0),
            stage_skipped: AtomicUsize::new(0),
            shutdown_observed: AtomicBool::new(false),
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    pub fn record_result(&self, success: bool) {
        if success {
            self.succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// シャットダウンを最初に観測したユニットだけが `true` を受け取る
    pub fn mark_shutdown_observed(&self) -> bool {
        !self.shutdown_observed.swap(true, Ordering::AcqRel)
    }

    pub fn snapshot(&self) -> EngineSummary {
        EngineSummary {
            submitted: self.submitted.load(Ordering::Acquire),
            succeeded: self.succeeded.load(Ordering::Acquire),
            failed: self.failed.load(Ordering::Acquire),
            dropped: self.dropped.load(Ordering::Acquire),
            stage_failed: self.stage_failed.load(Ordering::Acquire),
            stage_skipped: self.stage_skipped.load(Ordering::Acquire),
            started_at: self.started_at,
            elapsed_ms: self.started.elapsed().as_millis() as u64,
        }
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}
