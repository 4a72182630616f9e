//! Event-stream framing.
//!
//! The streamer converts executor events into the transport's line format:
//! one UTF-8 JSON object per `\n`-terminated line, with fields
//! `{ mode, status, step, message, data?, timestamp }`.  It is passive — no
//! buffering across events; every line is flushed before the next event is
//! framed.  Consumers must tolerate unknown fields and unknown `step` values.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::events::{EventStatus, ExecutionEvent, Phase};

/// Top-level mode of a stream line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamMode {
    Chat,
    Task,
    Error,
}

/// One line of the event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamLine {
    pub mode: StreamMode,
    pub status: EventStatus,
    pub step: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Unix milliseconds.
    pub timestamp: i64,
}

/// Frames executor events as NDJSON lines.
pub struct EventStreamer;

impl EventStreamer {
    /// Convert one executor event into its line form.
    pub fn frame(event: &ExecutionEvent) -> StreamLine {
        let (mode, step) = match event.phase {
            Phase::PipelineStart => (StreamMode::Task, "pipeline_start".to_string()),
            Phase::NodeStart => (
                StreamMode::Task,
                format!("node_{}", event.node_id.as_deref().unwrap_or("unknown")),
            ),
            Phase::NodeSuccess => (StreamMode::Task, "node_success".to_string()),
            Phase::NodeError => (StreamMode::Error, "node_error".to_string()),
            Phase::PipelineEnd => match event.status {
                EventStatus::Error => (StreamMode::Error, "execution_failed".to_string()),
                _ => (StreamMode::Task, "task_completed".to_string()),
            },
            Phase::ChatReply => (StreamMode::Chat, "chat_completed".to_string()),
            Phase::SystemError => (StreamMode::Error, "system_error".to_string()),
        };

        StreamLine {
            mode,
            status: event.status,
            step: event.step.clone().unwrap_or(step),
            message: event.message.clone(),
            data: event.data.clone(),
            timestamp: event.timestamp,
        }
    }

    /// Serialize one line and write it, `\n`-terminated and flushed.
    pub async fn write_line<W>(writer: &mut W, line: &StreamLine) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let mut bytes = serde_json::to_vec(line)?;
        bytes.push(b'\n');
        writer.write_all(&bytes).await?;
        writer.flush().await
    }

    /// Drain a receiver into a writer until the sender side closes.
    pub async fn stream<W>(
        mut rx: mpsc::UnboundedReceiver<ExecutionEvent>,
        writer: &mut W,
    ) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        while let Some(event) = rx.recv().await {
            let line = Self::frame(&event);
            Self::write_line(writer, &line).await?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
