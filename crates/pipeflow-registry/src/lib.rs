//! Runtime tool registry for Pipeflow.
//!
//! This crate is the single source of truth at runtime for "given a tool
//! name, get an invocable handle and its schema":
//!
//! - **[`registry`]** -- Concurrent multi-source tool index over [`dashmap`],
//!   with catalog discovery, on-demand source loading, and non-fatal
//!   persistence.
//! - **[`tool`]** -- The [`Tool`] trait and its explicit error contract.
//! - **[`schema`]** -- Ordered parameter schemas, frozen at registration.
//! - **[`synth`]** -- On-demand source synthesis with template families and a
//!   backward-compatible parameter merge.
//! - **[`backend`]** -- Synthesis back-ends: deterministic templates and an
//!   OpenAI-compatible remote endpoint.
//! - **[`loader`]** -- The seam turning stored source text into live handles.
//! - **[`builtins`]** -- Deterministic starter tools.

pub mod backend;
pub mod builtins;
pub mod error;
pub mod loader;
pub mod registry;
pub mod schema;
pub mod synth;
pub mod tool;

pub use backend::{RemoteBackend, SynthBackend, SynthRequest, TemplateBackend};
pub use builtins::builtin_tools;
pub use error::{RegistryError, Result};
pub use loader::{TemplateLoader, ToolLoader};
pub use registry::{ToolInfo, ToolRecord, ToolRegistry};
pub use schema::{ParamSpec, Provenance, ToolSchema, json_type_name};
pub use synth::{SynthesizedTool, Synthesizer, TemplateFamily, merge_params};
pub use tool::{Tool, ToolError, ToolResult};
