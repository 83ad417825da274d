// Producer - 値の生成と投入

use crate::channel::{stream, StreamReceiver, TaskProducer};
use crate::coordination::ShutdownCoordinator;
use crate::core::{EngineResult, Task, TaskId, TaskIdGenerator, TaskResult};
use tokio::task::JoinHandle;
use tracing::debug;

/// Producer: 値の列をタスクとしてキューへ投入する
///
/// 投入できた件数を返す。キューのクローズやシャットダウンで途中終了する。
/// 最後の生産者が終了した時点でキューはクローズされる。
pub fn spawn_producer<T>(
    coordinator: &ShutdownCoordinator,
    name: impl Into<String>,
    values: Vec<T>,
    queue: TaskProducer<T>,
    ids: TaskIdGenerator,
) -> EngineResult<JoinHandle<usize>>
where
    T: Send + 'static,
{
    let name = name.into();
    let signal = coordinator.signal();

    coordinator.spawn(name.clone(), async move {
        let mut enqueued = 0;
        for value in values {
            let task = Task::new(ids.next_id(), value);
            if let Err(error) = queue.enqueue(task, &signal).await {
                debug!(producer = %name, %error, "producer stopped early");
                break;
            }
            enqueued += 1;
        }
        enqueued
    })
}

/// 複数の生産者で一つのキューへ並行投入する
pub fn spawn_producers<T>(
    coordinator: &ShutdownCoordinator,
    batches: Vec<Vec<T>>,
    queue: TaskProducer<T>,
    ids: TaskIdGenerator,
) -> EngineResult<Vec<JoinHandle<usize>>>
where
    T: Send + 'static,
{
    let mut handles = Vec::with_capacity(batches.len());
    for (index, batch) in batches.into_iter().enumerate() {
        handles.push(spawn_producer(
            coordinator,
            format!("producer-{index}"),
            batch,
            queue.clone(),
            ids.clone(),
        )?);
    }
    // 各生産者だけがキューを保持する
    queue.close();
    Ok(handles)
}

/// 値の列を成功結果としてストリームへ流す（ステージチェーンの入力用）
///
/// タスクIDは 0 からの連番。
pub fn spawn_source<T>(
    coordinator: &ShutdownCoordinator,
    name: impl Into<String>,
    values: Vec<T>,
    capacity: usize,
) -> EngineResult<StreamReceiver<TaskResult<T>>>
where
    T: Send + 'static,
{
    let (tx, rx) = stream(capacity);
    let signal = coordinator.signal();

    coordinator.spawn(name, async move {
        for (index, value) in values.into_iter().enumerate() {
            let item = TaskResult::success(TaskId(index as u64), value);
            if tx.send(item, &signal).await.is_err() {
                break;
            }
        }
    })?;
    Ok(rx)
}

/// `generate` が `None` を返すかシャットダウンされるまで値を生成し続ける
pub fn spawn_generator<T, F>(
    coordinator: &ShutdownCoordinator,
    name: impl Into<String>,
    capacity: usize,
    mut generate: F,
) -> EngineResult<StreamReceiver<T>>
where
    T: Send + 'static,
    F: FnMut(u64) -> Option<T> + Send + 'static,
{
    let name = name.into();
    let (tx, rx) = stream(capacity);
    let signal = coordinator.signal();

    coordinator.spawn(name.clone(), async move {
        let mut sequence = 0u64;
        while let Some(value) = generate(sequence) {
            if tx.send(value, &signal).await.is_err() {
                break;
            }
            sequence += 1;
        }
        debug!(generator = %name, produced = sequence, "generator finished");
    })?;
    Ok(rx)
}
