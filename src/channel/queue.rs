// タスクキュー - 生産者とワーカープールの間の容量付きFIFO
//
// 生産者側は複製可能で、全ての生産者が手放した時点でキューがクローズされる。
// ワーカー側は一つの受信口を Mutex で共有し、各タスクはちょうど一つの
// ワーカーにだけ渡る。

use super::stream::{stream, Received, SendError, StreamReceiver, StreamSender, TrySendError};
use crate::coordination::ShutdownSignal;
use crate::core::{EngineError, EngineResult, Task};
use std::sync::Arc;
use tokio::sync::Mutex;

/// キューへの投入側
#[derive(Debug)]
pub struct TaskProducer<T> {
    sender: StreamSender<Task<T>>,
}

/// ワーカー間で共有する取り出し側
#[derive(Debug)]
pub struct TaskConsumer<T> {
    receiver: Arc<Mutex<StreamReceiver<Task<T>>>>,
}

/// 取り出し結果
#[derive(Debug, PartialEq)]
pub enum Dequeued<T> {
    Task(Task<T>),
    /// キューがクローズされ、残りも無い
    Closed,
    /// シャットダウンが発火した
    Shutdown,
}

/// 容量 `capacity` のタスクキューを作成する（0 でランデブー）
pub fn task_queue<T>(capacity: usize) -> (TaskProducer<T>, TaskConsumer<T>) {
    let (sender, receiver) = stream(capacity);
    (
        TaskProducer::from_sender(sender),
        TaskConsumer::from_receiver(receiver),
    )
}

impl<T> TaskProducer<T> {
    pub fn from_sender(sender: StreamSender<Task<T>>) -> Self {
        Self { sender }
    }

    /// タスクを投入する。満杯なら空きが出るまで待つ
    pub async fn enqueue(&self, task: Task<T>, shutdown: &ShutdownSignal) -> EngineResult<()> {
        self.sender
            .send(task, shutdown)
            .await
            .map_err(|error| match error {
                SendError::Closed(task) => {
                    EngineError::queue_closed(format!("task queue (task {})", task.id()))
                }
                SendError::Cancelled(task) => {
                    EngineError::cancelled(format!("enqueue task {}", task.id()))
                }
            })
    }

    /// ブロックしない投入。失敗時はタスクを返却する
    pub fn try_enqueue(&self, task: Task<T>) -> Result<(), TrySendError<Task<T>>> {
        self.sender.try_send(task)
    }

    pub fn len(&self) -> usize {
        self.sender.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sender.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.sender.capacity()
    }

    /// この生産者を手放す。全ての生産者が手放すとキューはクローズされる
    pub fn close(self) {
        self.sender.close();
    }
}

impl<T> Clone for TaskProducer<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<T> TaskConsumer<T> {
    pub fn from_receiver(receiver: StreamReceiver<Task<T>>) -> Self {
        Self {
            receiver: Arc::new(Mutex::new(receiver)),
        }
    }

    /// 次のタスクを取り出す
    ///
    /// ロック待ちも受信待ちもシャットダウンと競合する。
    pub async fn dequeue(&self, shutdown: &ShutdownSignal) -> Dequeued<T> {
        tokio::select! {
            biased;
            _ = shutdown.wait() => Dequeued::Shutdown,
            mut receiver = self.receiver.lock() => match receiver.recv_until(shutdown).await {
                Received::Value(task) => Dequeued::Task(task),
                Received::Closed => Dequeued::Closed,
                Received::Shutdown => Dequeued::Shutdown,
            },
        }
    }

    /// キューをクローズし、未処理のタスクを全て取り出す
    ///
    /// クローズ後の投入は `QueueClosedError` になるため、ここで取り出した
    /// タスク以外に取り残されるものは無い。
    pub async fn close_and_drain(&self) -> Vec<Task<T>> {
        self.receiver.lock().await.drain().await
    }
}

impl<T> Clone for TaskConsumer<T> {
    fn clone(&self) -> Self {
        Self {
            receiver: Arc::clone(&self.receiver),
        }
    }
}
