//! Plan and result types.
//!
//! A plan is a declarative DAG of tool invocations.  Each component names a
//! tool, carries a nested parameter structure (possibly containing
//! `$node.output[.key]` placeholders), and declares which conceptual output
//! field to capture.  Alternatively a plan may be a chat-only short-circuit
//! carrying just the user's text.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EngineError, Result};

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// Descriptor of the conceptual output field a component produces.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputDescriptor {
    /// Value type tag (free-form, e.g. `"object"`, `"string"`).
    #[serde(rename = "type", default)]
    pub kind: String,
    /// The output key downstream placeholders address.
    pub key: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
}

/// One vertex of the plan: a single tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    /// Unique id within the plan.
    pub id: String,
    /// The tool to invoke.
    pub tool_name: String,
    /// Nested parameter structure, possibly containing placeholders.
    pub params: Value,
    /// Which output field to capture.
    pub output: OutputDescriptor,
}

/// A complete execution plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Unique identifier for this plan.
    pub id: String,
    /// The components to execute, in declaration order.
    #[serde(default)]
    pub components: Vec<Component>,
    /// When true, no components run; the plan is a conversational reply.
    #[serde(default)]
    pub chat_only: bool,
    /// The raw user text, for chat-only plans.
    #[serde(default)]
    pub user_text: Option<String>,
}

impl Plan {
    /// A task plan with the given components.
    pub fn task(id: impl Into<String>, components: Vec<Component>) -> Self {
        Self {
            id: id.into(),
            components,
            chat_only: false,
            user_text: None,
        }
    }

    /// A chat-only plan carrying the user's text.
    pub fn chat(id: impl Into<String>, user_text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            components: Vec::new(),
            chat_only: true,
            user_text: Some(user_text.into()),
        }
    }

    /// Structural validation: component ids must be unique and non-empty.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for component in &self.components {
            if component.id.is_empty() {
                return Err(EngineError::MalformedPlan {
                    reason: "component with empty id".to_string(),
                });
            }
            if !seen.insert(component.id.as_str()) {
                return Err(EngineError::MalformedPlan {
                    reason: format!("duplicate component id `{}`", component.id),
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Terminal status of one executed node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Success,
    Failed,
}

/// The recorded outcome of one node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeResult {
    /// The component id.
    pub node_id: String,
    /// The tool that was invoked.
    pub tool_name: String,
    /// The fully resolved parameters the tool received.
    pub input_params: Value,
    /// The tool's return value (null on failure).
    pub output: Value,
    /// Whether the node succeeded.
    pub status: NodeStatus,
    /// Provenance of the resolved tool record.
    pub tool_provenance: String,
    /// Wall-clock seconds spent in this node.
    pub execution_time: f64,
    /// Short label summarizing the output shape.
    pub result_summary: String,
    /// Error message, for failed nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Non-fatal warnings (adapter fallbacks, catalog save failures).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// One entry of the detailed action log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Unix milliseconds.
    pub timestamp: i64,
    pub node_id: String,
    pub tool_name: String,
    /// `start`, `success`, or `error`.
    pub action: String,
    pub message: String,
}

/// Aggregate counters for a finished run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub total_nodes: usize,
    pub successful_nodes: usize,
    pub failed_nodes: usize,
    pub total_execution_time: f64,
    pub average_node_time: f64,
}

/// The aggregate result of one plan execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// Whether every scheduled node completed.
    pub success: bool,
    /// Per-node outcomes, in execution order.
    pub node_results: Vec<NodeResult>,
    /// The extracted final answer.
    pub final_output: Value,
    /// Total wall-clock seconds.
    pub execution_time: f64,
    /// One human-readable string per fatal condition.
    pub errors: Vec<String>,
    /// One entry per attempted action.
    pub detailed_logs: Vec<LogEntry>,
    /// Aggregate counters.
    pub execution_summary: ExecutionSummary,
}

impl RunResult {
    /// A failed result carrying a single error string.
    pub fn failure(error: impl Into<String>, execution_time: f64) -> Self {
        Self {
            success: false,
            node_results: Vec::new(),
            final_output: Value::Null,
            execution_time,
            errors: vec![error.into()],
            detailed_logs: Vec::new(),
            execution_summary: ExecutionSummary {
                total_execution_time: execution_time,
                ..ExecutionSummary::default()
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
