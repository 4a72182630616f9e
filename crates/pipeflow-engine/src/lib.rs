//! Orchestration engine for Pipeflow.
//!
//! Converts a parsed plan into an executable DAG, resolves inter-step data
//! references against completed outputs, dispatches each node to a tool from
//! the registry (synthesizing missing ones on demand), adapts mismatched
//! shapes, and streams structured progress events while it runs.
//!
//! ## Modules
//!
//! - [`plan`] -- Plan, component, and result types.
//! - [`resolver`] -- `$id.output[.key]` placeholder resolution and
//!   topological execution ordering.
//! - [`adapter`] -- Producer-to-consumer shape adaptation rules.
//! - [`executor`] -- The sequential node loop and public entry points.
//! - [`summary`] -- Result labels and final-output extraction.
//! - [`events`] / [`stream`] -- Typed events and NDJSON line framing.
//! - [`chat`] -- Conversational responder with a deterministic fallback.
//! - [`parser`] -- Plan parser collaborator seam and keyword fallback.
//! - [`config`] -- Environment-driven configuration.
//! - [`error`] -- Engine error types.

pub mod adapter;
pub mod chat;
pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod parser;
pub mod plan;
pub mod resolver;
pub mod stream;
pub mod summary;

pub use adapter::{AdapterRule, AdapterSpec, Analysis, TargetKind, TargetShape};
pub use chat::{ChatResponder, PresetResponder};
pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use events::{EventSink, EventStatus, ExecutionEvent, Phase};
pub use executor::{CancelFlag, Engine};
pub use parser::{KeywordPlanParser, ParserHints, PlanParser};
pub use plan::{
    Component, ExecutionSummary, LogEntry, NodeResult, NodeStatus, OutputDescriptor, Plan,
    RunResult,
};
pub use resolver::{NodeOutput, PlaceholderResolver, Reference, Resolved};
pub use stream::{EventStreamer, StreamLine, StreamMode};
pub use summary::{clean_text, extract_final_output, is_generic_message, result_summary};
