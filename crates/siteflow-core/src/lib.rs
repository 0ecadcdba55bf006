//! siteflow-core
//!
//! WordPressサイトのプロビジョニングで使うデータモデルと純粋な変換処理。
//! I/O を伴う処理は他のクレートが担当します。

pub mod compose;
pub mod error;
pub mod model;
pub mod options;
pub mod password;
pub mod template;

pub use compose::*;
pub use error::*;
pub use model::*;
pub use options::*;
pub use template::*;
