//! siteflow
//!
//! Docker 上に WordPress サイトを作成するプロビジョニングライブラリ。
//! 作成処理はレベル付きのステートマシンとして実装され、失敗時は到達した
//! レベルまでの作成物だけをロールバックします。

pub mod cache;
pub mod cron;
pub mod error;
pub mod fatal;
pub mod hosts;
pub mod layout;
pub mod lifecycle;
pub mod machine;
pub mod materialize;
pub mod remote_db;
pub mod rollback;
pub mod ssl;
pub mod status;
pub mod vip;
pub mod wordpress;

pub use error::{ProvisionError, Result};
pub use fatal::install_panic_hook;
pub use machine::{Collaborators, ProvisionSettings, Provisioner};
pub use rollback::{Cleanup, CleanupReport, DbRollback, Footprint};
