// チャンネルレイヤー - バックプレッシャー付きストリームとタスクキュー

pub mod queue;
pub mod stream;

pub use queue::{task_queue, Dequeued, TaskConsumer, TaskProducer};
pub use stream::{
    stream, RecvTimeoutError, Received, SendError, StreamReceiver, StreamSender, TryRecvError,
    TrySendError,
};
