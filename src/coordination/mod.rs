// 協調レイヤー - シャットダウンシグナルとユニット終了の追跡

pub mod barrier;
pub mod coordinator;
pub mod signal;

pub use barrier::{BarrierGuard, JoinBarrier};
pub use coordinator::ShutdownCoordinator;
pub use signal::{shutdown_channel, ShutdownHandle, ShutdownSignal};
