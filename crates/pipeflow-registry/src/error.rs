//! Registry error types.
//!
//! All registry subsystems surface errors through [`RegistryError`].  Each
//! variant carries enough context for callers to decide how to handle the
//! failure without inspecting opaque strings.

use pipeflow_catalog::CatalogError;

/// Unified error type for the tool registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The requested tool is not present and no synthesis was requested.
    #[error("unknown tool: {name}")]
    UnknownTool { name: String },

    /// Source text was present but could not be loaded into a callable handle.
    #[error("failed to load tool `{name}`: {reason}")]
    LoadError { name: String, reason: String },

    /// Persisting a record to the catalog failed.  Non-fatal for callers: the
    /// in-memory record stays live and the failure is surfaced as a warning.
    #[error("failed to save tool `{name}` to catalog: {reason}")]
    SaveError { name: String, reason: String },

    /// The synthesizer could not produce source text for the request.
    #[error("synthesis failed: {reason}")]
    SynthesisError { reason: String },

    /// An error propagated from the catalog crate.
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the registry crate.
pub type Result<T> = std::result::Result<T, RegistryError>;

impl From<reqwest::Error> for RegistryError {
    fn from(err: reqwest::Error) -> Self {
        Self::SynthesisError {
            reason: err.to_string(),
        }
    }
}
