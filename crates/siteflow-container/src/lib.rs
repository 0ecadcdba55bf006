pub mod command;
pub mod compose;
pub mod error;
pub mod global;
pub mod runtime;
pub mod waiter;

pub use command::*;
pub use compose::*;
pub use error::*;
pub use global::*;
pub use runtime::*;
pub use waiter::*;
