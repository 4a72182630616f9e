//! Execution events.
//!
//! The executor narrates a run as a totally ordered sequence of
//! [`ExecutionEvent`]s pushed through an [`EventSink`].  Within one plan, a
//! node's success event strictly precedes the next node's start event; the
//! sink never buffers across nodes.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

/// The lifecycle phase an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    PipelineStart,
    NodeStart,
    NodeSuccess,
    NodeError,
    PipelineEnd,
    ChatReply,
    SystemError,
}

/// Coarse status of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Progress,
    Success,
    Error,
}

/// One step of an execution narrated to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub phase: Phase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    pub status: EventStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Overrides the streamer's derived step label (e.g. `tool_synthesis`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    /// Unix milliseconds.
    pub timestamp: i64,
}

impl ExecutionEvent {
    fn base(phase: Phase, status: EventStatus, message: impl Into<String>) -> Self {
        Self {
            phase,
            node_id: None,
            tool_name: None,
            status,
            message: message.into(),
            data: None,
            step: None,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// Attach structured data.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Override the derived step label.
    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }

    pub fn pipeline_start(total_nodes: usize) -> Self {
        Self::base(
            Phase::PipelineStart,
            EventStatus::Progress,
            "## 🔧 Task execution\n\nStarting plan",
        )
        .with_data(serde_json::json!({"total_nodes": total_nodes}))
    }

    pub fn node_start(node_id: &str, tool_name: &str) -> Self {
        let mut event = Self::base(
            Phase::NodeStart,
            EventStatus::Progress,
            format!("### 🚀 Running `{tool_name}`"),
        );
        event.node_id = Some(node_id.to_string());
        event.tool_name = Some(tool_name.to_string());
        event
    }

    pub fn node_success(node_id: &str, tool_name: &str, summary: &str) -> Self {
        let mut event = Self::base(
            Phase::NodeSuccess,
            EventStatus::Progress,
            format!("✅ `{tool_name}`: {summary}"),
        );
        event.node_id = Some(node_id.to_string());
        event.tool_name = Some(tool_name.to_string());
        event
    }

    pub fn node_error(node_id: &str, tool_name: &str, reason: &str) -> Self {
        let mut event = Self::base(
            Phase::NodeError,
            EventStatus::Error,
            format!("## ❌ Step failed\n\n`{tool_name}`: {reason}"),
        );
        event.node_id = Some(node_id.to_string());
        event.tool_name = Some(tool_name.to_string());
        event
    }

    pub fn pipeline_end(success: bool, message: impl Into<String>) -> Self {
        let status = if success {
            EventStatus::Success
        } else {
            EventStatus::Error
        };
        Self::base(Phase::PipelineEnd, status, message)
    }

    pub fn chat_reply(reply: impl Into<String>) -> Self {
        Self::base(Phase::ChatReply, EventStatus::Success, reply)
    }

    pub fn system_error(kind: &str, message: impl Into<String>) -> Self {
        Self::base(Phase::SystemError, EventStatus::Error, message)
            .with_data(serde_json::json!({"kind": kind}))
    }
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

/// Sending side of an event stream.  Emission never blocks the executor and
/// never fails it: a dropped receiver just stops the narration.
#[derive(Clone)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<ExecutionEvent>>,
}

impl EventSink {
    /// A connected sink plus its receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ExecutionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that drops every event.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Emit one event.
    pub fn emit(&self, event: ExecutionEvent) {
        tracing::debug!(
            phase = ?event.phase,
            node_id = event.node_id.as_deref().unwrap_or(""),
            "event emitted"
        );
        if let Some(tx) = &self.tx {
            // The receiver may have gone away (e.g. a disconnected client);
            // execution continues regardless.
            let _ = tx.send(event);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
