//! ランデブーと有界バッファのスループット比較ベンチマーク
//!
//! 単一ストリームの受け渡しと、エンジン全体の一括処理の両方を測定

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use pipeline_engine::channel::stream;
use pipeline_engine::coordination::ShutdownSignal;
use pipeline_engine::engine::{process_all, PipelineChain};
use pipeline_engine::services::{DefaultPipelineConfig, NoOpProgressReporter};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

const MESSAGES: u64 = 10_000;
const CAPACITIES: [usize; 4] = [0, 1, 16, 256];

/// 1対1のストリーム受け渡し
fn benchmark_stream_handoff(c: &mut Criterion) {
    let runtime = Runtime::new().expect("failed to build tokio runtime");
    let mut group = c.benchmark_group("Stream Handoff");
    group.measurement_time(Duration::from_secs(10));

    for capacity in CAPACITIES {
        group.bench_with_input(
            BenchmarkId::from_parameter(capacity),
            &capacity,
            |b, &capacity| {
                b.to_async(&runtime).iter(|| async move {
                    let (tx, mut rx) = stream::<u64>(capacity);
                    let producer = tokio::spawn(async move {
                        let signal = ShutdownSignal::never();
                        for value in 0..MESSAGES {
                            if tx.send(value, &signal).await.is_err() {
                                break;
                            }
                        }
                    });
                    let mut sum = 0u64;
                    while let Some(value) = rx.recv().await {
                        sum += value;
                    }
                    producer.await.expect("producer panicked");
                    std::hint::black_box(sum)
                })
            },
        );
    }

    group.finish();
}

/// エンジン全体（キュー → ワーカー → 結果）
fn benchmark_engine_queue(c: &mut Criterion) {
    let runtime = Runtime::new().expect("failed to build tokio runtime");
    let mut group = c.benchmark_group("Engine Queue Capacity");
    group.measurement_time(Duration::from_secs(10));
    group.sample_size(20);

    for capacity in CAPACITIES {
        let config = DefaultPipelineConfig::new(2)
            .with_queue_capacity(capacity)
            .with_result_capacity(capacity);
        group.bench_with_input(
            BenchmarkId::from_parameter(capacity),
            &config,
            |b, config| {
                b.to_async(&runtime).iter(|| async {
                    let (results, _) = process_all(
                        config,
                        |x: u64| async move { Ok::<_, anyhow::Error>(x ^ 0x5a) },
                        &PipelineChain::new(),
                        Arc::new(NoOpProgressReporter::new()),
                        (0..1_000u64).collect(),
                    )
                    .await
                    .expect("pipeline failed");
                    std::hint::black_box(results.len())
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, benchmark_stream_handoff, benchmark_engine_queue);
criterion_main!(benches);
