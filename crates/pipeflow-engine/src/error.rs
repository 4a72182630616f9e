//! Engine error types.
//!
//! All engine subsystems surface errors through [`EngineError`].  Plan-level
//! variants are fatal before any node runs; the rest are node-fatal and stop
//! the plan at the failing node.

use pipeflow_registry::RegistryError;

/// Unified error type for the orchestration engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    // -- Plan errors ---------------------------------------------------------
    /// The plan structure itself is invalid (duplicate ids, missing fields).
    #[error("malformed plan: {reason}")]
    MalformedPlan { reason: String },

    /// The placeholder references form a cycle.
    #[error("cyclic plan: {reason}")]
    CyclicPlan { reason: String },

    /// A placeholder references a component id that does not exist.
    #[error("dangling reference `{reference}` in node `{node}`")]
    DanglingReference { reference: String, node: String },

    /// The plan has no components and is not a chat-only plan.
    #[error("empty plan: no components to execute")]
    EmptyPlan,

    /// The parser collaborator failed to produce a plan.
    #[error("parser error: {reason}")]
    Parse { reason: String },

    // -- Node errors ---------------------------------------------------------
    /// The tool could not be resolved, even after synthesis.
    #[error("unknown tool: {name}")]
    UnknownTool { name: String },

    /// A node's tool invocation failed.
    #[error("node `{node_id}` failed: {reason}")]
    NodeFailed { node_id: String, reason: String },

    /// A node exceeded the configured per-node timeout.
    #[error("node `{node_id}` timed out")]
    Timeout { node_id: String },

    /// The run was cancelled cooperatively.
    #[error("execution cancelled")]
    Cancelled,

    // -- Upstream crate errors -----------------------------------------------
    /// An error propagated from the registry crate.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    // -- Generic -------------------------------------------------------------
    /// Catch-all for unexpected internal errors.  Prefer a typed variant
    /// whenever possible.
    #[error("internal engine error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Stable kind tag carried in `system_error` event data.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedPlan { .. } => "MalformedPlan",
            Self::CyclicPlan { .. } => "CyclicPlan",
            Self::DanglingReference { .. } => "DanglingReference",
            Self::EmptyPlan => "EmptyPlan",
            Self::Parse { .. } => "ParserError",
            Self::UnknownTool { .. } => "UnknownTool",
            Self::NodeFailed { .. } => "NodeFailed",
            Self::Timeout { .. } => "Timeout",
            Self::Cancelled => "Cancelled",
            Self::Registry(_) => "RegistryError",
            Self::Json(_) => "JsonError",
            Self::Internal(_) => "InternalError",
        }
    }
}

/// Convenience alias used throughout the engine crate.
pub type Result<T> = std::result::Result<T, EngineError>;
