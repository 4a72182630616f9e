//! The invocable tool contract.
//!
//! Every tool — built-in, user-supplied, or synthesized — implements [`Tool`]
//! and reports failure through [`ToolError`] rather than panicking.  The
//! executor treats any residual host fault as an internal error; a tool's
//! only sanctioned failure channel is its `Result`.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::schema::ToolSchema;

/// Errors a tool may return from [`Tool::invoke`].
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// The supplied parameters were missing or of the wrong shape.
    #[error("invalid parameters: {reason}")]
    InvalidParams { reason: String },

    /// The tool ran but could not complete its work.
    #[error("tool failed: {reason}")]
    Failed { reason: String },
}

/// Convenience alias for tool invocation results.
pub type ToolResult = std::result::Result<Value, ToolError>;

/// An invocable tool handle.
///
/// Handles are shared as `Arc<dyn Tool>` snapshots: once the executor has
/// resolved a handle for a node, later re-registration under the same name
/// does not affect that node.  Implementations must therefore be reentrant —
/// the same handle may be invoked for several components of one plan.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique tool name.
    fn name(&self) -> &str;

    /// Short human-readable description.
    fn description(&self) -> &str;

    /// The declared parameter schema, frozen at construction.
    fn schema(&self) -> &ToolSchema;

    /// Invoke the tool with a resolved parameter object.
    async fn invoke(&self, params: &Map<String, Value>) -> ToolResult;
}

impl std::fmt::Debug for dyn Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool").field("name", &self.name()).finish()
    }
}

/// Pull a string-valued parameter, falling back through a list of aliases.
pub fn string_param<'a>(params: &'a Map<String, Value>, names: &[&str]) -> Option<&'a str> {
    names.iter().find_map(|n| params.get(*n).and_then(Value::as_str))
}

/// Pull a required string parameter or produce an [`ToolError::InvalidParams`].
pub fn require_string<'a>(
    params: &'a Map<String, Value>,
    name: &str,
) -> std::result::Result<&'a str, ToolError> {
    params
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidParams {
            reason: format!("missing required string parameter `{name}`"),
        })
}
