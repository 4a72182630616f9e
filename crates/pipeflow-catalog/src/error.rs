//! Catalog error types.
//!
//! All catalog operations surface errors through [`CatalogError`], the single
//! error type returned by every public API in this crate.

/// Unified error type for the tool catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// An underlying SQLite operation failed.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON (de)serialization of a record column failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The blocking task running a database closure was cancelled or panicked.
    #[error("task join error: {0}")]
    TaskJoin(String),

    /// The requested tool record does not exist.
    #[error("tool not found in catalog: {name}")]
    NotFound { name: String },
}

/// Convenience alias used throughout the catalog crate.
pub type Result<T> = std::result::Result<T, CatalogError>;

impl From<tokio::task::JoinError> for CatalogError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskJoin(err.to_string())
    }
}
