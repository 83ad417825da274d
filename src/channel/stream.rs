//! 容量付きの一方向ストリーム
//!
//! `tokio::sync::mpsc` をベースにしたバックプレッシャー付きチャンネル。
//! 容量 0 はランデブー（受信側が値を取り出すまで送信が完了しない）として扱う。
//! tokio の mpsc は容量 0 を受け付けないため、ランデブーは容量 1 のスロットと
//! oneshot による受け取り通知で表現する。

use crate::coordination::ShutdownSignal;
use futures::Stream;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

struct Envelope<T> {
    value: T,
    ack: Option<oneshot::Sender<()>>,
}

impl<T> Envelope<T> {
    fn accept(self) -> T {
        if let Some(ack) = self.ack {
            let _ = ack.send(());
        }
        self.value
    }
}

#[derive(Debug)]
struct Shared {
    capacity: usize,
    parked_receivers: AtomicUsize,
}

/// 受信待ちの間だけ待機カウンタを加算する（キャンセルされても戻す）
struct Parked(Arc<Shared>);

impl Parked {
    fn enter(shared: &Arc<Shared>) -> Self {
        shared.parked_receivers.fetch_add(1, Ordering::AcqRel);
        Self(Arc::clone(shared))
    }
}

impl Drop for Parked {
    fn drop(&mut self) {
        self.0.parked_receivers.fetch_sub(1, Ordering::AcqRel);
    }
}

/// 送信側。最後の送信側が破棄された時点でストリームは一度だけクローズされる
pub struct StreamSender<T> {
    tx: mpsc::Sender<Envelope<T>>,
    shared: Arc<Shared>,
}

/// 受信側
pub struct StreamReceiver<T> {
    rx: mpsc::Receiver<Envelope<T>>,
    shared: Arc<Shared>,
    /// `Stream` として待機中（`poll_next` が `Pending` を返した後）の登録
    polled: Option<Parked>,
}

#[derive(Error)]
pub enum SendError<T> {
    #[error("ストリームはクローズされています")]
    Closed(T),
    #[error("シャットダウンにより送信がキャンセルされました")]
    Cancelled(T),
}

#[derive(Error)]
pub enum TrySendError<T> {
    #[error("ストリームのバッファが満杯です")]
    Full(T),
    #[error("ストリームはクローズされています")]
    Closed(T),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TryRecvError {
    #[error("ストリームは空です")]
    Empty,
    #[error("ストリームはクローズされ、値も残っていません")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RecvTimeoutError {
    #[error("受信がタイムアウトしました")]
    Timeout,
    #[error("ストリームはクローズされ、値も残っていません")]
    Closed,
}

/// シャットダウンと競合させた受信の結果
#[derive(Debug, PartialEq)]
pub enum Received<T> {
    Value(T),
    Closed,
    Shutdown,
}

/// ストリームを作成する。`capacity == 0` でランデブー
pub fn stream<T>(capacity: usize) -> (StreamSender<T>, StreamReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let shared = Arc::new(Shared {
        capacity,
        parked_receivers: AtomicUsize::new(0),
    });
    (
        StreamSender {
            tx,
            shared: Arc::clone(&shared),
        },
        StreamReceiver {
            rx,
            shared,
            polled: None,
        },
    )
}

impl<T> StreamSender<T> {
    /// 値を送信する
    ///
    /// バッファが満杯なら空きが出るまで待つ（ランデブーでは受信側が取り出すまで）。
    /// 待機はシャットダウンと競合し、キャンセル時は値を返却する。
    pub async fn send(&self, value: T, shutdown: &ShutdownSignal) -> Result<(), SendError<T>> {
        if shutdown.is_requested() {
            return Err(SendError::Cancelled(value));
        }

        let permit = tokio::select! {
            biased;
            _ = shutdown.wait() => return Err(SendError::Cancelled(value)),
            permit = self.tx.reserve() => match permit {
                Ok(permit) => permit,
                Err(_) => return Err(SendError::Closed(value)),
            },
        };

        if self.shared.capacity > 0 {
            permit.send(Envelope { value, ack: None });
            return Ok(());
        }

        let (ack_tx, ack_rx) = oneshot::channel();
        permit.send(Envelope {
            value,
            ack: Some(ack_tx),
        });
        // スロットへ格納した時点で値はストリームに引き渡し済み
        tokio::select! {
            _ = ack_rx => {}
            _ = shutdown.wait() => {}
        }
        Ok(())
    }

    /// ブロックしない送信
    ///
    /// ランデブーでは受信側が待機中の場合にのみ成功する。`Stream` として
    /// 読まれている受信側は、次の値を待って `Pending` を返してから値を
    /// 受け取るまでの間を待機中とみなす。
    pub fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
        if self.shared.capacity == 0 && self.shared.parked_receivers.load(Ordering::Acquire) == 0 {
            return Err(if self.tx.is_closed() {
                TrySendError::Closed(value)
            } else {
                TrySendError::Full(value)
            });
        }

        self.tx
            .try_send(Envelope { value, ack: None })
            .map_err(|error| match error {
                mpsc::error::TrySendError::Full(envelope) => TrySendError::Full(envelope.value),
                mpsc::error::TrySendError::Closed(envelope) => TrySendError::Closed(envelope.value),
            })
    }

    /// バッファ中の値の数
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// 受信側がクローズまたは破棄されたか
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// この送信側を明示的に手放す。他に送信側が無ければストリームがクローズされる
    pub fn close(self) {}
}

impl<T> Clone for StreamSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for StreamSender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSender")
            .field("capacity", &self.shared.capacity)
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<T> StreamReceiver<T> {
    /// 次の値を待つ。クローズ済みかつ空なら `None`
    pub async fn recv(&mut self) -> Option<T> {
        let _parked = Parked::enter(&self.shared);
        self.rx.recv().await.map(Envelope::accept)
    }

    /// シャットダウンと競合させて受信する
    ///
    /// シャットダウンが発火していれば、バッファに値が残っていても `Shutdown` を返す。
    pub async fn recv_until(&mut self, shutdown: &ShutdownSignal) -> Received<T> {
        tokio::select! {
            biased;
            _ = shutdown.wait() => Received::Shutdown,
            value = self.recv() => match value {
                Some(value) => Received::Value(value),
                None => Received::Closed,
            },
        }
    }

    pub fn try_recv(&mut self) -> Result<T, TryRecvError> {
        self.rx
            .try_recv()
            .map(Envelope::accept)
            .map_err(|error| match error {
                mpsc::error::TryRecvError::Empty => TryRecvError::Empty,
                mpsc::error::TryRecvError::Disconnected => TryRecvError::Closed,
            })
    }

    /// 期限付き受信
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Result<T, RecvTimeoutError> {
        match tokio::time::timeout(timeout, self.recv()).await {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Err(RecvTimeoutError::Closed),
            Err(_) => Err(RecvTimeoutError::Timeout),
        }
    }

    /// `interval` ごとのタイムアウトを `attempts` 回まで繰り返す
    ///
    /// クローズを検知した時点で再試行せずに戻る。
    pub async fn recv_with_retry(
        &mut self,
        attempts: usize,
        interval: Duration,
    ) -> Result<T, RecvTimeoutError> {
        for attempt in 1..=attempts {
            match self.recv_timeout(interval).await {
                Ok(value) => return Ok(value),
                Err(RecvTimeoutError::Closed) => return Err(RecvTimeoutError::Closed),
                Err(RecvTimeoutError::Timeout) => {
                    debug!(attempt, attempts, "receive timed out, retrying");
                }
            }
        }
        Err(RecvTimeoutError::Timeout)
    }

    /// 新たな送信を拒否する。バッファ済みの値は引き続き受信できる
    pub fn close(&mut self) {
        self.rx.close();
    }

    /// クローズしてバッファに残った値を全て取り出す
    ///
    /// クローズ前に送信枠を確保済みの送信側はクローズ後も一件だけ送信できる。
    /// `recv` はそれらの枠が全て解放されるまで `None` を返さないため、
    /// 戻り値以外に取り残される値は無い。
    pub async fn drain(&mut self) -> Vec<T> {
        self.close();
        let mut remaining = Vec::new();
        while let Some(envelope) = self.rx.recv().await {
            remaining.push(envelope.accept());
        }
        remaining
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }
}

impl<T> Stream for StreamReceiver<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let this = &mut *self;
        match this.rx.poll_recv(cx) {
            Poll::Ready(envelope) => {
                this.polled = None;
                Poll::Ready(envelope.map(Envelope::accept))
            }
            Poll::Pending => {
                if this.polled.is_none() {
                    this.polled = Some(Parked::enter(&this.shared));
                }
                Poll::Pending
            }
        }
    }
}

impl<T> fmt::Debug for StreamReceiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamReceiver")
            .field("capacity", &self.shared.capacity)
            .field("len", &self.len())
            .finish()
    }
}

impl<T> SendError<T> {
    pub fn into_inner(self) -> T {
        match self {
            Self::Closed(value) | Self::Cancelled(value) => value,
        }
    }
}

impl<T> fmt::Debug for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed(_) => f.write_str("Closed(..)"),
            Self::Cancelled(_) => f.write_str("Cancelled(..)"),
        }
    }
}

impl<T> TrySendError<T> {
    pub fn into_inner(self) -> T {
        match self {
            Self::Full(value) | Self::Closed(value) => value,
        }
    }
}

impl<T> fmt::Debug for TrySendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => f.write_str("Full(..)"),
            Self::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}
