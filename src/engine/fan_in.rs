// Fan-In - 複数ストリームの合流
//
// ソースごとにフォワーダーを起動し、共有の出力ストリームへ転送する。
// 出力の送信側は各フォワーダーだけが保持しており、最後のフォワーダーの
// 終了で出力はちょうど一度クローズされる。

use crate::channel::{stream, Received, StreamReceiver, StreamSender};
use crate::coordination::{ShutdownCoordinator, ShutdownSignal};
use crate::core::{EngineError, EngineResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// 合流した出力と、まだ終了していないソース数
#[derive(Debug)]
pub struct MergedStream<T> {
    pub output: StreamReceiver<T>,
    remaining: Arc<AtomicUsize>,
}

impl<T> MergedStream<T> {
    /// 転送を終えていないソースの数
    pub fn remaining_sources(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    pub fn into_output(self) -> StreamReceiver<T> {
        self.output
    }
}

/// 複数のソースを一つの出力へ合流する
///
/// 同一ソース内の順序は保たれるが、ソース間のインターリーブは規定しない。
pub fn merge<T>(
    coordinator: &ShutdownCoordinator,
    sources: Vec<StreamReceiver<T>>,
    capacity: usize,
) -> EngineResult<MergedStream<T>>
where
    T: Send + 'static,
{
    if sources.is_empty() {
        return Err(EngineError::configuration(
            "ファンインには1つ以上のソースが必要です",
        ));
    }

    let (tx, rx) = stream(capacity);
    let remaining = Arc::new(AtomicUsize::new(sources.len()));

    for (index, source) in sources.into_iter().enumerate() {
        coordinator.spawn(
            format!("fan-in-{index}"),
            forward(
                index,
                source,
                tx.clone(),
                coordinator.signal(),
                Arc::clone(&remaining),
            ),
        )?;
    }

    Ok(MergedStream {
        output: rx,
        remaining,
    })
}

async fn forward<T>(
    index: usize,
    mut source: StreamReceiver<T>,
    output: StreamSender<T>,
    signal: ShutdownSignal,
    remaining: Arc<AtomicUsize>,
) {
    let mut forwarded = 0usize;
    loop {
        match source.recv_until(&signal).await {
            Received::Value(value) => {
                if output.send(value, &signal).await.is_err() {
                    break;
                }
                forwarded += 1;
            }
            Received::Closed | Received::Shutdown => break,
        }
    }

    let left = remaining.fetch_sub(1, Ordering::AcqRel) - 1;
    debug!(source = index, forwarded, remaining = left, "fan-in source finished");
}
