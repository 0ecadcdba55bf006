pub mod create;
pub mod info;
pub mod reload;
pub mod restart;
