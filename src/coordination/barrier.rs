//! 参加ユニットが全て終了した時点で一度だけ発火するジョインバリア
//!
//! カウンタは「封印トークン」1 から始まる。ユニット登録で +1、ユニット終了
//! （ガードの破棄）と封印で -1。0 に到達した唯一の呼び出しが完了を発火する。
//! 0 に到達した後の登録は拒否されるため、完了は高々一度しか起きない。

use crate::core::{EngineError, EngineResult};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct JoinBarrier {
    inner: Arc<BarrierInner>,
}

#[derive(Debug)]
struct BarrierInner {
    outstanding: AtomicUsize,
    sealed: AtomicBool,
    done_tx: watch::Sender<bool>,
}

/// 登録済みユニットの生存を表すガード。破棄で到着を通知する
#[derive(Debug)]
pub struct BarrierGuard {
    inner: Arc<BarrierInner>,
}

impl JoinBarrier {
    pub fn new() -> Self {
        let (done_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(BarrierInner {
                outstanding: AtomicUsize::new(1),
                sealed: AtomicBool::new(false),
                done_tx,
            }),
        }
    }

    /// ユニットを登録する。完了済みのバリアには登録できない
    pub fn register(&self, unit: &str) -> EngineResult<BarrierGuard> {
        let mut current = self.inner.outstanding.load(Ordering::Acquire);
        loop {
            if current == 0 {
                return Err(EngineError::barrier_completed(unit));
            }
            match self.inner.outstanding.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        Ok(BarrierGuard {
            inner: Arc::clone(&self.inner),
        })
    }

    /// これ以上ユニットを追加しないことを宣言する（冪等）
    pub fn seal(&self) {
        if !self.inner.sealed.swap(true, Ordering::AcqRel) {
            self.inner.arrive();
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.inner.sealed.load(Ordering::Acquire)
    }

    pub fn is_complete(&self) -> bool {
        *self.inner.done_tx.borrow()
    }

    /// 生存中の登録ユニット数
    pub fn outstanding(&self) -> usize {
        let raw = self.inner.outstanding.load(Ordering::Acquire);
        if self.is_sealed() {
            raw
        } else {
            raw.saturating_sub(1)
        }
    }

    /// 完了まで待機する
    pub async fn wait(&self) {
        let mut rx = self.inner.done_tx.subscribe();
        // 送信側は self.inner が保持しているので待機中に閉じることはない
        let _ = rx.wait_for(|done| *done).await;
    }
}

impl Default for JoinBarrier {
    fn default() -> Self {
        Self::new()
    }
}

impl BarrierInner {
    fn arrive(&self) {
        if self.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.done_tx.send_replace(true);
        }
    }
}

impl Drop for BarrierGuard {
    fn drop(&mut self) {
        self.inner.arrive();
    }
}
