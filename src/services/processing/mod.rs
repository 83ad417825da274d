// タスク処理機能
// 処理関数・ステージ変換の適用と、エラー・パニックの失敗マーカー化

pub mod worker;

// 公開API
pub use worker::{apply_transform, execute_task, panic_message};
