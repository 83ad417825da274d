// Fan-Out - 一つのストリームを複数の出力へ分配
//
// 各値はポリシーが選んだちょうど一つの出力へ送られる。選ばれた出力が
// 満杯ならその出力に空きが出るまで待つ。入力の終了（またはシャットダウン）で
// 全出力をそれぞれ一度だけクローズする。

use crate::channel::{stream, Received, SendError, StreamReceiver, StreamSender};
use crate::coordination::{ShutdownCoordinator, ShutdownSignal};
use crate::core::{DistributionPolicy, EngineError, EngineResult};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// 分配の集計
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DistributionReport {
    /// 出力ごとの送信件数
    pub per_output: Vec<usize>,
    /// 出力へ届けられなかった件数
    pub undelivered: usize,
}

impl DistributionReport {
    pub fn delivered(&self) -> usize {
        self.per_output.iter().sum()
    }
}

/// 分配ループの終了状態。入力と未配送の値を呼び出し側へ返す
pub(crate) struct DistributionOutcome<T> {
    pub report: DistributionReport,
    pub input: StreamReceiver<T>,
    pub undelivered: Vec<T>,
}

pub(crate) async fn run_distribution<T, D>(
    mut input: StreamReceiver<T>,
    outputs: Vec<StreamSender<T>>,
    mut policy: D,
    signal: ShutdownSignal,
) -> DistributionOutcome<T>
where
    D: DistributionPolicy<T>,
{
    let mut per_output = vec![0usize; outputs.len()];
    let mut undelivered = Vec::new();

    loop {
        let value = match input.recv_until(&signal).await {
            Received::Value(value) => value,
            Received::Closed | Received::Shutdown => break,
        };

        let loads: Vec<usize> = outputs.iter().map(StreamSender::len).collect();
        let index = policy.select(&value, &loads) % outputs.len();

        match outputs[index].send(value, &signal).await {
            Ok(()) => per_output[index] += 1,
            Err(SendError::Cancelled(value)) => {
                undelivered.push(value);
                break;
            }
            Err(SendError::Closed(value)) => {
                warn!(output = index, "fan-out output closed, stopping distribution");
                undelivered.push(value);
                break;
            }
        }
    }

    debug!(policy = policy.name(), ?per_output, "fan-out finished");
    // outputs はここで破棄され、各出力がクローズされる
    drop(outputs);

    DistributionOutcome {
        report: DistributionReport {
            per_output,
            undelivered: undelivered.len(),
        },
        input,
        undelivered,
    }
}

/// 既存の出力群へ分配するユニットを起動する
///
/// 途中終了した場合、入力に残った値は破棄される。
pub fn distribute<T, D>(
    coordinator: &ShutdownCoordinator,
    input: StreamReceiver<T>,
    outputs: Vec<StreamSender<T>>,
    policy: D,
) -> EngineResult<JoinHandle<DistributionReport>>
where
    T: Send + 'static,
    D: DistributionPolicy<T> + 'static,
{
    if outputs.is_empty() {
        return Err(EngineError::configuration(
            "ファンアウトには1つ以上の出力が必要です",
        ));
    }

    let signal = coordinator.signal();
    coordinator.spawn("fan-out", async move {
        let mut outcome = run_distribution(input, outputs, policy, signal).await;
        let discarded = outcome.input.drain().await.len();
        if discarded > 0 {
            debug!(discarded, "fan-out discarded buffered input");
        }
        outcome.report.undelivered += discarded;
        outcome.report
    })
}

/// 入力を `output_count` 本の新しいストリームへ分配する
pub fn fan_out<T, D>(
    coordinator: &ShutdownCoordinator,
    input: StreamReceiver<T>,
    output_count: usize,
    capacity: usize,
    policy: D,
) -> EngineResult<Vec<StreamReceiver<T>>>
where
    T: Send + 'static,
    D: DistributionPolicy<T> + 'static,
{
    let (senders, receivers): (Vec<_>, Vec<_>) = (0..output_count).map(|_| stream(capacity)).unzip();
    distribute(coordinator, input, senders, policy)?;
    Ok(receivers)
}
