//! Site store error types

use thiserror::Error;

/// Site record store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Site already exists: {0}")]
    SiteExists(String),

    #[error("Site not found: {0}")]
    SiteNotFound(String),

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
