//! モデル定義
//!
//! siteflowで使用されるデータモデルを定義します。
//! 各モデルは機能ごとにモジュールに分離されています。

mod alias;
mod compose;
mod cron;
mod level;
mod record;
mod service;
mod site;
mod volume;

// Re-exports
pub use alias::*;
pub use compose::*;
pub use cron::*;
pub use level::*;
pub use record::*;
pub use service::*;
pub use site::*;
pub use volume::*;
