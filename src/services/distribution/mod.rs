// 分配ポリシー
// ファンアウトで値をどの出力へ送るかを決める

pub mod policies;

pub use policies::{task_policy, KeyHashPolicy, LeastLoadedPolicy, RoundRobinPolicy};
