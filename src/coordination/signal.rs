//! 一度だけ発火するブロードキャスト型のシャットダウンシグナル
//!
//! `tokio::sync::watch` を `bool` 状態として扱う。発火後に購読した側も
//! 現在値 `true` を読めるため、観測の開始タイミングに関係なく見逃さない。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// シャットダウンを要求する側
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    inner: Arc<ShutdownInner>,
}

#[derive(Debug)]
struct ShutdownInner {
    fired: AtomicBool,
    tx: watch::Sender<bool>,
}

/// シャットダウンを観測する側（各ユニットに生成時に渡す）
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

/// 未発火状態のシャットダウンチャンネルを作成
pub fn shutdown_channel() -> (ShutdownHandle, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    let handle = ShutdownHandle {
        inner: Arc::new(ShutdownInner {
            fired: AtomicBool::new(false),
            tx,
        }),
    };
    (handle, ShutdownSignal { rx })
}

impl ShutdownHandle {
    /// シャットダウンを要求する
    ///
    /// 実際に状態遷移を行った呼び出しだけが `true` を返す。
    /// 以降の呼び出しは何もしない。
    pub fn request_shutdown(&self) -> bool {
        if self
            .inner
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        // 受信側がいなくても値は保持される
        self.inner.tx.send_replace(true);
        true
    }

    pub fn is_requested(&self) -> bool {
        self.inner.fired.load(Ordering::Acquire)
    }

    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.inner.tx.subscribe(),
        }
    }
}

impl ShutdownSignal {
    /// 決して発火しないシグナル（コーディネーター無しの単体利用向け）
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }

    /// 発火するまで待機する。既に発火済みなら即座に戻る
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|fired| *fired).await.is_err() {
            // 送信側が未発火のまま破棄された: 以後発火することはない
            std::future::pending::<()>().await;
        }
    }
}
