//! Runtime tool index.
//!
//! The registry is the single source of truth at runtime for "given a tool
//! name, get an invocable handle and its schema".  It layers three
//! provenances (built-in, user-supplied, synthesized), loads source-text
//! tools on demand through a [`ToolLoader`], and persists records to the
//! [`ToolCatalog`].
//!
//! Internally the index is a [`DashMap`]: lookups read a snapshot without a
//! global lock, and mutations are serialized per entry.  Handles are shared
//! as `Arc<dyn Tool>` values, so a handle captured by a running plan remains
//! valid even if the name is re-registered mid-plan.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;

use pipeflow_catalog::{CatalogRecord, ToolCatalog};

use crate::error::{RegistryError, Result};
use crate::loader::{TemplateLoader, ToolLoader};
use crate::schema::{Provenance, ToolSchema};
use crate::tool::Tool;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// An in-memory tool record.  Exactly one record exists per name;
/// re-registration replaces it.
pub struct ToolRecord {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Parameter schema, frozen at registration.
    pub schema: ToolSchema,
    /// Source text for synthesized and user-supplied tools.
    pub source_text: Option<String>,
    /// Where the record came from.
    pub provenance: Provenance,
    /// When the record was first created.
    pub created_at: DateTime<Utc>,
    /// When the record was last replaced or reloaded.
    pub updated_at: DateTime<Utc>,
    /// The live handle, if one has been registered or loaded.
    pub handle: Option<Arc<dyn Tool>>,
    /// Why the most recent load from source failed, if it did.
    pub last_load_error: Option<String>,
}

/// Serializable summary of a record, for listings and the manifest export.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub provenance: Provenance,
    pub schema: ToolSchema,
    /// Whether a live handle is currently loaded.
    pub is_loaded: bool,
    /// Whether source text is stored for this record.
    pub has_source: bool,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Concurrent multi-source tool registry.
pub struct ToolRegistry {
    tools: DashMap<String, ToolRecord>,
    catalog: Option<ToolCatalog>,
    loader: Arc<dyn ToolLoader>,
    static_dir: Option<PathBuf>,
}

impl ToolRegistry {
    /// Create an empty registry with the bundled template loader and no
    /// catalog.
    pub fn new() -> Self {
        Self {
            tools: DashMap::new(),
            catalog: None,
            loader: Arc::new(TemplateLoader),
            static_dir: None,
        }
    }

    /// Attach a persistent catalog.
    pub fn with_catalog(mut self, catalog: ToolCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Replace the source loader.
    pub fn with_loader(mut self, loader: Arc<dyn ToolLoader>) -> Self {
        self.loader = loader;
        self
    }

    /// Mirror synthesized source text into `dir` for later inspection.
    pub fn with_static_dir(mut self, dir: PathBuf) -> Self {
        self.static_dir = Some(dir);
        self
    }

    /// Register a live handle.
    ///
    /// The parameter schema is read from the handle once here and frozen into
    /// the record.  A prior record under the same name is replaced, which
    /// also drops any cached handle for that name; plans that already
    /// resolved the old handle keep their snapshot.
    pub fn register(&self, handle: Arc<dyn Tool>, provenance: Provenance) {
        let name = handle.name().to_string();
        let now = Utc::now();
        let created_at = self
            .tools
            .get(&name)
            .map(|r| r.created_at)
            .unwrap_or(now);

        tracing::info!(tool = %name, provenance = provenance.as_str(), "tool registered");

        self.tools.insert(
            name.clone(),
            ToolRecord {
                name,
                description: handle.description().to_string(),
                schema: handle.schema().clone(),
                source_text: None,
                provenance,
                created_at,
                updated_at: now,
                handle: Some(handle),
                last_load_error: None,
            },
        );
    }

    /// Whether a record exists under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// The provenance of the record under `name`, if any.
    pub fn provenance_of(&self, name: &str) -> Option<Provenance> {
        self.tools.get(name).map(|r| r.provenance)
    }

    /// The frozen schema of the record under `name`, if any.
    pub fn schema_of(&self, name: &str) -> Option<ToolSchema> {
        self.tools.get(name).map(|r| r.schema.clone())
    }

    /// All record summaries, unordered.
    pub fn list(&self) -> Vec<ToolInfo> {
        self.tools
            .iter()
            .map(|entry| {
                let r = entry.value();
                ToolInfo {
                    name: r.name.clone(),
                    description: r.description.clone(),
                    provenance: r.provenance,
                    schema: r.schema.clone(),
                    is_loaded: r.handle.is_some(),
                    has_source: r.source_text.is_some(),
                }
            })
            .collect()
    }

    /// All registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Discover records persisted in the catalog and index them (without
    /// loading handles).  Records whose name already has a live handle are
    /// left untouched.  Returns the number of records indexed.
    pub async fn load_catalog(&self) -> Result<usize> {
        let Some(catalog) = &self.catalog else {
            return Ok(0);
        };

        let records = catalog.list(1_000, 0).await?;
        let mut indexed = 0;

        for record in records {
            if let Some(existing) = self.tools.get(&record.name) {
                if existing.handle.is_some() {
                    continue;
                }
            }
            let name = record.name.clone();
            self.tools.insert(name, record_from_catalog(record));
            indexed += 1;
        }

        tracing::info!(count = indexed, "catalog tools indexed");
        Ok(indexed)
    }

    /// Resolve a name to an invocable handle.
    ///
    /// Returns the live handle when one is cached; otherwise tries to load
    /// from stored source text (in-memory record first, then the catalog).
    /// A load failure is recorded on the record and surfaces as `None`.
    pub async fn resolve(&self, name: &str) -> Option<Arc<dyn Tool>> {
        if let Some(record) = self.tools.get(name) {
            if let Some(handle) = &record.handle {
                return Some(Arc::clone(handle));
            }
        } else {
            // Not indexed yet: a record may still exist in the catalog.
            let catalog = self.catalog.as_ref()?;
            let found = catalog.find(name).await.ok().flatten()?;
            self.tools
                .insert(name.to_string(), record_from_catalog(found));
        }

        let source = {
            let record = self.tools.get(name)?;
            record.source_text.clone()
        };
        let source = match source {
            Some(s) => s,
            None => match &self.catalog {
                Some(catalog) => catalog.get_source(name).await.ok().flatten()?,
                None => return None,
            },
        };

        match self.loader.load(name, &source) {
            Ok(handle) => {
                if let Some(mut record) = self.tools.get_mut(name) {
                    record.handle = Some(Arc::clone(&handle));
                    record.source_text = Some(source);
                    record.last_load_error = None;
                    record.updated_at = Utc::now();
                }
                Some(handle)
            }
            Err(e) => {
                tracing::warn!(tool = %name, error = %e, "failed to load tool from source");
                if let Some(mut record) = self.tools.get_mut(name) {
                    record.last_load_error = Some(e.to_string());
                }
                None
            }
        }
    }

    /// Persist the record under `name` to the catalog.
    ///
    /// Fails with [`RegistryError::SaveError`] when the write fails; the
    /// in-memory record is unaffected either way.
    pub async fn save(&self, name: &str) -> Result<()> {
        let catalog = self
            .catalog
            .as_ref()
            .ok_or_else(|| RegistryError::SaveError {
                name: name.to_string(),
                reason: "no catalog configured".to_string(),
            })?;

        let record = self
            .tools
            .get(name)
            .ok_or_else(|| RegistryError::UnknownTool {
                name: name.to_string(),
            })?;

        let catalog_record = CatalogRecord {
            name: record.name.clone(),
            description: record.description.clone(),
            input_type: "any".to_string(),
            output_type: "any".to_string(),
            schema: record.schema.to_value(),
            source_text: record.source_text.clone(),
            provenance: record.provenance.as_str().to_string(),
            created_at: record.created_at.timestamp(),
            updated_at: record.updated_at.timestamp(),
        };
        drop(record);

        catalog
            .upsert(catalog_record)
            .await
            .map_err(|e| RegistryError::SaveError {
                name: name.to_string(),
                reason: e.to_string(),
            })
    }

    /// Load, register, mirror, and persist freshly synthesized source.
    ///
    /// Returns the live handle plus an optional warning when the catalog save
    /// failed (non-fatal: the in-memory record stays live).
    pub async fn install_synthesized(
        &self,
        name: &str,
        source: &str,
    ) -> Result<(Arc<dyn Tool>, Option<String>)> {
        let handle = self.loader.load(name, source)?;

        let now = Utc::now();
        let created_at = self
            .tools
            .get(name)
            .map(|r| r.created_at)
            .unwrap_or(now);

        self.tools.insert(
            name.to_string(),
            ToolRecord {
                name: name.to_string(),
                description: handle.description().to_string(),
                schema: handle.schema().clone(),
                source_text: Some(source.to_string()),
                provenance: Provenance::Synthesized,
                created_at,
                updated_at: now,
                handle: Some(Arc::clone(&handle)),
                last_load_error: None,
            },
        );

        self.mirror_source(name, source);

        let warning = if self.catalog.is_some() {
            match self.save(name).await {
                Ok(()) => None,
                Err(e) => {
                    tracing::warn!(tool = %name, error = %e, "catalog save failed");
                    Some(e.to_string())
                }
            }
        } else {
            None
        };

        Ok((handle, warning))
    }

    /// Obtain the source text for a record.
    ///
    /// Falls back from the stored text to the static-dir mirror, and finally
    /// to a reconstructed stub built from the frozen schema.
    pub async fn extract_source(&self, name: &str) -> Result<String> {
        let (schema, stored) = {
            let record = self
                .tools
                .get(name)
                .ok_or_else(|| RegistryError::UnknownTool {
                    name: name.to_string(),
                })?;
            (record.schema.clone(), record.source_text.clone())
        };

        if let Some(source) = stored {
            return Ok(source);
        }

        if let Some(catalog) = &self.catalog {
            if let Some(source) = catalog.get_source(name).await? {
                return Ok(source);
            }
        }

        if let Some(path) = self.mirror_path(name) {
            if let Ok(source) = std::fs::read_to_string(&path) {
                return Ok(source);
            }
        }

        Ok(reconstruct_stub(name, &schema))
    }

    /// Export the full tool manifest.
    pub fn export_manifest(&self) -> Value {
        let tools = self.list();
        serde_json::json!({
            "tools": tools,
            "total_tools": tools.len(),
            "exported_at": Utc::now().to_rfc3339(),
        })
    }

    fn mirror_path(&self, name: &str) -> Option<PathBuf> {
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return None;
        }
        self.static_dir.as_ref().map(|dir| dir.join(format!("{name}.rs")))
    }

    /// Best-effort source mirror to the static directory.
    fn mirror_source(&self, name: &str, source: &str) {
        let Some(path) = self.mirror_path(name) else {
            return;
        };
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!(error = %e, "failed to create static dir");
                return;
            }
        }
        match std::fs::write(&path, source) {
            Ok(()) => tracing::debug!(path = %path.display(), "synthesized source mirrored"),
            Err(e) => tracing::warn!(error = %e, "failed to mirror synthesized source"),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn record_from_catalog(record: CatalogRecord) -> ToolRecord {
    ToolRecord {
        name: record.name,
        description: record.description,
        schema: ToolSchema::from_value(&record.schema),
        source_text: record.source_text,
        provenance: Provenance::parse(&record.provenance),
        created_at: DateTime::from_timestamp(record.created_at, 0).unwrap_or_else(Utc::now),
        updated_at: DateTime::from_timestamp(record.updated_at, 0).unwrap_or_else(Utc::now),
        handle: None,
        last_load_error: None,
    }
}

/// Minimal stub emitted when no source can be recovered for a handle.
fn reconstruct_stub(name: &str, schema: &ToolSchema) -> String {
    let signature = schema
        .params
        .iter()
        .map(|p| format!("{}: serde_json::Value", p.name))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "// Source unavailable for `{name}`; reconstructed stub.\n\
         pub async fn {name}({signature}) -> serde_json::Value {{\n    serde_json::Value::Null\n}}\n"
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SynthRequest;
    use crate::schema::ParamSpec;
    use crate::synth::{TemplateFamily, render_source};
    use pipeflow_catalog::Database;

    fn synthesized_source(name: &str, params: Vec<ParamSpec>) -> String {
        render_source(&SynthRequest {
            name: name.to_string(),
            family: TemplateFamily::for_name(name),
            params,
            existing: None,
        })
    }

    async fn registry_with_catalog() -> ToolRegistry {
        let db = Database::open_in_memory().unwrap();
        let catalog = ToolCatalog::new(db).await.unwrap();
        ToolRegistry::new().with_catalog(catalog)
    }

    #[tokio::test]
    async fn install_then_resolve() {
        let registry = registry_with_catalog().await;
        let source = synthesized_source("web_search", vec![ParamSpec::required("query", "string")]);

        let (handle, warning) = registry.install_synthesized("web_search", &source).await.unwrap();
        assert_eq!(handle.name(), "web_search");
        assert!(warning.is_none());

        let resolved = registry.resolve("web_search").await.unwrap();
        assert_eq!(resolved.schema().names(), vec!["query"]);
        assert_eq!(registry.provenance_of("web_search"), Some(Provenance::Synthesized));
    }

    #[tokio::test]
    async fn resolve_unknown_returns_none() {
        let registry = ToolRegistry::new();
        assert!(registry.resolve("ghost").await.is_none());
    }

    #[tokio::test]
    async fn resolve_loads_from_catalog_source() {
        let db = Database::open_in_memory().unwrap();
        let catalog = ToolCatalog::new(db).await.unwrap();

        // Simulate a record persisted by an earlier run.
        let source = synthesized_source("text_extractor", vec![ParamSpec::required("source", "string")]);
        catalog
            .upsert(CatalogRecord {
                name: "text_extractor".to_string(),
                description: "Extraction tool".to_string(),
                input_type: "any".to_string(),
                output_type: "any".to_string(),
                schema: serde_json::json!([{"name": "source", "type": "string", "required": true}]),
                source_text: Some(source),
                provenance: "synthesized".to_string(),
                created_at: 0,
                updated_at: 0,
            })
            .await
            .unwrap();

        let registry = ToolRegistry::new().with_catalog(catalog);
        let handle = registry.resolve("text_extractor").await.unwrap();
        assert_eq!(handle.name(), "text_extractor");
    }

    #[tokio::test]
    async fn broken_source_records_load_failure() {
        let registry = registry_with_catalog().await;
        let err = registry
            .install_synthesized("broken", "not a manifest")
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::LoadError { .. }));
    }

    #[tokio::test]
    async fn reregistration_replaces_but_snapshots_survive(){
        let registry = registry_with_catalog().await;
        let v1 = synthesized_source("web_search", vec![ParamSpec::required("query", "string")]);
        let (old_handle, _) = registry.install_synthesized("web_search", &v1).await.unwrap();

        let v2 = synthesized_source(
            "web_search",
            vec![
                ParamSpec::required("query", "string"),
                ParamSpec::optional("limit", "number", serde_json::json!(5)),
            ],
        );
        registry.install_synthesized("web_search", &v2).await.unwrap();

        // The captured snapshot still has the old schema; the registry the new.
        assert_eq!(old_handle.schema().names(), vec!["query"]);
        assert_eq!(
            registry.schema_of("web_search").unwrap().names(),
            vec!["query", "limit"]
        );
    }

    #[tokio::test]
    async fn register_is_idempotent() {
        let registry = registry_with_catalog().await;
        let source = synthesized_source("web_search", vec![ParamSpec::required("query", "string")]);
        let (handle, _) = registry.install_synthesized("web_search", &source).await.unwrap();

        registry.register(Arc::clone(&handle), Provenance::Synthesized);
        registry.register(handle, Provenance::Synthesized);

        let infos = registry.list();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].schema.names(), vec!["query"]);
        assert_eq!(infos[0].provenance, Provenance::Synthesized);
    }

    #[tokio::test]
    async fn extract_source_prefers_stored_text() {
        let registry = registry_with_catalog().await;
        let source = synthesized_source("web_search", vec![ParamSpec::required("query", "string")]);
        registry.install_synthesized("web_search", &source).await.unwrap();

        let extracted = registry.extract_source("web_search").await.unwrap();
        assert_eq!(extracted, source);
    }

    #[tokio::test]
    async fn extract_source_reconstructs_stub_for_handle_only_records() {
        let registry = ToolRegistry::new();
        let source = synthesized_source("web_search", vec![ParamSpec::required("query", "string")]);
        let handle = TemplateLoader.load("web_search", &source).unwrap();

        // Register the bare handle: no source text travels with it.
        registry.register(handle, Provenance::UserSupplied);

        let extracted = registry.extract_source("web_search").await.unwrap();
        assert!(extracted.contains("reconstructed stub"));
        assert!(extracted.contains("pub async fn web_search(query:"));
    }

    #[tokio::test]
    async fn static_dir_mirror_written() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ToolRegistry::new().with_static_dir(dir.path().to_path_buf());

        let source = synthesized_source("web_search", vec![ParamSpec::required("query", "string")]);
        registry.install_synthesized("web_search", &source).await.unwrap();

        let mirrored = std::fs::read_to_string(dir.path().join("web_search.rs")).unwrap();
        assert_eq!(mirrored, source);
    }

    #[tokio::test]
    async fn load_catalog_indexes_persisted_records() {
        let db = Database::open_in_memory().unwrap();
        let catalog = ToolCatalog::new(db).await.unwrap();
        catalog
            .upsert(CatalogRecord {
                name: "report_maker".to_string(),
                description: "".to_string(),
                input_type: "any".to_string(),
                output_type: "any".to_string(),
                schema: serde_json::json!([]),
                source_text: None,
                provenance: "user_supplied".to_string(),
                created_at: 0,
                updated_at: 0,
            })
            .await
            .unwrap();

        let registry = ToolRegistry::new().with_catalog(catalog);
        let indexed = registry.load_catalog().await.unwrap();
        assert_eq!(indexed, 1);
        assert!(registry.contains("report_maker"));
        assert_eq!(
            registry.provenance_of("report_maker"),
            Some(Provenance::UserSupplied)
        );
    }
}
