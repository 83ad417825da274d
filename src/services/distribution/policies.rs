// ファンアウトの分配ポリシー実装

use crate::core::{DistributionPolicy, DistributionPolicyKind, Task};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// 出力先を順番に巡回する
#[derive(Debug, Default, Clone)]
pub struct RoundRobinPolicy {
    next: usize,
}

impl RoundRobinPolicy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T> DistributionPolicy<T> for RoundRobinPolicy {
    fn select(&mut self, _value: &T, loads: &[usize]) -> usize {
        let index = self.next % loads.len();
        self.next = self.next.wrapping_add(1);
        index
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}

/// キーのハッシュで出力先を固定する。同じキーは常に同じ出力へ
#[derive(Debug, Clone)]
pub struct KeyHashPolicy<F> {
    key: F,
}

impl<F> KeyHashPolicy<F> {
    pub fn new(key: F) -> Self {
        Self { key }
    }
}

impl<T, F> DistributionPolicy<T> for KeyHashPolicy<F>
where
    F: Fn(&T) -> u64 + Send,
{
    fn select(&mut self, value: &T, loads: &[usize]) -> usize {
        let mut hasher = DefaultHasher::new();
        (self.key)(value).hash(&mut hasher);
        (hasher.finish() % loads.len() as u64) as usize
    }

    fn name(&self) -> &'static str {
        "hash"
    }
}

/// バッファ使用数が最小の出力を選ぶ。同数の場合は巡回順で選ぶ
#[derive(Debug, Default, Clone)]
pub struct LeastLoadedPolicy {
    cursor: usize,
}

impl LeastLoadedPolicy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T> DistributionPolicy<T> for LeastLoadedPolicy {
    fn select(&mut self, _value: &T, loads: &[usize]) -> usize {
        let count = loads.len();
        let start = self.cursor % count;
        let mut best = start;
        for offset in 1..count {
            let index = (start + offset) % count;
            if loads[index] < loads[best] {
                best = index;
            }
        }
        self.cursor = best + 1;
        best
    }

    fn name(&self) -> &'static str {
        "least_loaded"
    }
}

/// タスク用のポリシーを種類から生成する。ハッシュはタスクIDをキーにする
pub fn task_policy<I: 'static>(kind: DistributionPolicyKind) -> Box<dyn DistributionPolicy<Task<I>>> {
    match kind {
        DistributionPolicyKind::RoundRobin => Box::new(RoundRobinPolicy::new()),
        DistributionPolicyKind::Hash => {
            Box::new(KeyHashPolicy::new(|task: &Task<I>| task.id().value()))
        }
        DistributionPolicyKind::LeastLoaded => Box::new(LeastLoadedPolicy::new()),
    }
}
