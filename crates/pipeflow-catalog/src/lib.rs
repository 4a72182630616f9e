//! Persistent tool catalog for Pipeflow.
//!
//! The catalog is a key-value store keyed by tool name.  Each record carries
//! the tool's description, parameter schema, source text, and provenance tag,
//! so tools synthesized in one run can be rediscovered and reloaded in the
//! next.
//!
//! - **[`db`]** -- SQLite connection wrapper with WAL pragmas and a
//!   `spawn_blocking` execution bridge for async callers.
//! - **[`catalog`]** -- CRUD operations over tool records with a read-through
//!   cache in front of point lookups.
//! - **[`error`]** -- Catalog error types via [`thiserror`].

pub mod catalog;
pub mod db;
pub mod error;

pub use catalog::{CatalogRecord, ToolCatalog};
pub use db::Database;
pub use error::{CatalogError, Result};
