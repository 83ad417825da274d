// ShutdownCoordinator - 全並行ユニットのライフサイクル管理
//
// シャットダウンシグナルの所有者であり、ジョインバリアを通じて
// 自身が起動した全ユニットの終了を追跡する。

use super::barrier::JoinBarrier;
use super::signal::{shutdown_channel, ShutdownHandle, ShutdownSignal};
use crate::core::{CompletionStatus, EngineResult, PipelineState};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    inner: Arc<CoordinatorInner>,
}

#[derive(Debug)]
struct CoordinatorInner {
    shutdown: ShutdownHandle,
    signal: ShutdownSignal,
    barrier: JoinBarrier,
    draining: AtomicBool,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (shutdown, signal) = shutdown_channel();
        Self {
            inner: Arc::new(CoordinatorInner {
                shutdown,
                signal,
                barrier: JoinBarrier::new(),
                draining: AtomicBool::new(false),
            }),
        }
    }

    /// ユニットへ渡すシャットダウンシグナル
    pub fn signal(&self) -> ShutdownSignal {
        self.inner.signal.clone()
    }

    /// バリアに登録した上で並行ユニットを起動する
    ///
    /// ユニットの future が完了（パニックを含む）した時点でバリアへ到着する。
    pub fn spawn<F>(&self, unit: impl Into<String>, future: F) -> EngineResult<JoinHandle<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let unit = unit.into();
        let guard = self.inner.barrier.register(&unit)?;
        debug!(unit = %unit, "unit spawned");

        Ok(tokio::spawn(async move {
            let _guard = guard;
            let output = future.await;
            debug!(unit = %unit, "unit exited");
            output
        }))
    }

    /// ユニットの追加を締め切る。以後 `spawn` は失敗する可能性がある
    pub fn seal(&self) {
        self.inner.barrier.seal();
    }

    /// 協調的キャンセルを要求する（冪等）
    ///
    /// 状態遷移を行った最初の呼び出しだけが `true` を返す。
    pub fn request_shutdown(&self) -> bool {
        self.inner.draining.store(true, Ordering::Release);
        let fired = self.inner.shutdown.request_shutdown();
        if fired {
            info!("shutdown requested");
        }
        fired
    }

    /// 入力の終了による通常のドレインへ移行する
    pub fn begin_drain(&self) {
        if !self.inner.draining.swap(true, Ordering::AcqRel) {
            debug!("draining started");
        }
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.inner.shutdown.is_requested()
    }

    pub fn state(&self) -> PipelineState {
        if self.inner.barrier.is_complete() {
            PipelineState::Completed
        } else if self.inner.draining.load(Ordering::Acquire) {
            PipelineState::Draining
        } else {
            PipelineState::Running
        }
    }

    /// 生存中のユニット数
    pub fn live_units(&self) -> usize {
        self.inner.barrier.outstanding()
    }

    /// 全ユニットの終了を待つ
    ///
    /// 待機を始めた時点でユニットの追加は締め切られる。
    pub async fn wait_for_completion(&self) {
        self.seal();
        self.inner.barrier.wait().await;
    }

    /// 期限付きで全ユニットの終了を待つ
    ///
    /// タイムアウトしてもエンジンを壊すことはなく、再度待機できる。
    pub async fn await_completion(&self, timeout: Duration) -> CompletionStatus {
        match tokio::time::timeout(timeout, self.wait_for_completion()).await {
            Ok(()) => CompletionStatus::Completed,
            Err(_) => CompletionStatus::TimedOut,
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_state_transitions() {
        let coordinator = ShutdownCoordinator::new();
        assert_eq!(coordinator.state(), PipelineState::Running);

        let signal = coordinator.signal();
        coordinator
            .spawn("waiter", async move { signal.wait().await })
            .unwrap();
        coordinator.seal();

        assert!(coordinator.request_shutdown());
        assert!(!coordinator.request_shutdown());

        let status = coordinator.await_completion(Duration::from_secs(1)).await;
        assert_eq!(status, CompletionStatus::Completed);
        assert_eq!(coordinator.state(), PipelineState::Completed);
    }

    #[tokio::test]
    async fn test_await_completion_times_out_and_can_retry() {
        let coordinator = ShutdownCoordinator::new();
        let signal = coordinator.signal();
        coordinator
            .spawn("blocked", async move { signal.wait().await })
            .unwrap();

        let status = coordinator.await_completion(Duration::from_millis(20)).await;
        assert_eq!(status, CompletionStatus::TimedOut);
        assert_eq!(coordinator.live_units(), 1);

        coordinator.request_shutdown();
        let status = coordinator.await_completion(Duration::from_secs(1)).await;
        assert!(status.is_completed());
        assert_eq!(coordinator.live_units(), 0);
    }

    #[tokio::test]
    async fn test_spawn_after_completion_fails() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.wait_for_completion().await;

        assert!(coordinator.spawn("late", async {}).is_err());
    }

    #[tokio::test]
    async fn test_begin_drain_reports_draining() {
        let coordinator = ShutdownCoordinator::new();
        let signal = coordinator.signal();
        coordinator
            .spawn("idle", async move { signal.wait().await })
            .unwrap();

        coordinator.begin_drain();
        assert_eq!(coordinator.state(), PipelineState::Draining);
        assert!(!coordinator.is_shutdown_requested());

        coordinator.request_shutdown();
        coordinator.wait_for_completion().await;
    }

    #[tokio::test]
    async fn test_all_units_observe_shutdown() {
        let coordinator = ShutdownCoordinator::new();
        let observed = Arc::new(AtomicUsize::new(0));

        for index in 0..6 {
            let signal = coordinator.signal();
            let observed = Arc::clone(&observed);
            coordinator
                .spawn(format!("unit-{index}"), async move {
                    signal.wait().await;
                    observed.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        coordinator.request_shutdown();
        let status = coordinator.await_completion(Duration::from_secs(1)).await;

        assert!(status.is_completed());
        assert_eq!(observed.load(Ordering::SeqCst), 6);
    }
}
