// Worker - 単一タスク処理機能

use crate::core::{Task, TaskFailure, TaskProcessor, TaskResult};
use futures::FutureExt;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// 単一タスクの処理
///
/// 処理関数のエラーとパニックを捕捉し、失敗マーカー付きの結果に変換する。
/// ワーカー自身は処理関数の失敗で停止しない。
pub async fn execute_task<I, O, P>(processor: &P, task: Task<I>) -> TaskResult<O>
where
    P: TaskProcessor<I, O> + ?Sized,
{
    let (task_id, payload) = task.into_parts();

    match AssertUnwindSafe(processor.process(task_id, payload))
        .catch_unwind()
        .await
    {
        Ok(Ok(value)) => TaskResult::success(task_id, value),
        Ok(Err(error)) => TaskResult::failure(task_id, TaskFailure::error(format!("{error:#}"))),
        Err(panic) => TaskResult::failure(task_id, TaskFailure::panic(panic_message(panic.as_ref()))),
    }
}

/// ステージ変換を適用する。パニックはエラー文字列に変換する
pub fn apply_transform<I, O, F>(transform: &F, input: I) -> Result<O, String>
where
    F: Fn(I) -> anyhow::Result<O> + ?Sized,
{
    match catch_unwind(AssertUnwindSafe(|| transform(input))) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(format!("{error:#}")),
        Err(panic) => Err(format!("panic: {}", panic_message(panic.as_ref()))),
    }
}

/// パニックペイロードからメッセージを取り出す
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
