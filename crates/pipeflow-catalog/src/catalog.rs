//! Tool record persistence.
//!
//! Provides SQLite-backed CRUD operations over tool records, keyed by tool
//! name.  Point lookups go through a read-through [`moka`] cache that is
//! invalidated on every write, so repeated `find` calls during plan execution
//! do not hit the database.

use chrono::Utc;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::db::Database;
use crate::error::{CatalogError, Result};

/// Maximum number of cached point lookups.
const FIND_CACHE_CAPACITY: u64 = 10_000;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A persisted tool record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogRecord {
    /// Unique tool name (primary key).
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Declared input type (free-form, `"any"` when unknown).
    pub input_type: String,
    /// Declared output type (free-form, `"any"` when unknown).
    pub output_type: String,
    /// Parameter schema as a JSON array of parameter specs, in declaration
    /// order.
    pub schema: serde_json::Value,
    /// Source text for user-supplied and synthesized tools.
    pub source_text: Option<String>,
    /// Where the tool came from (`built_in`, `user_supplied`, `synthesized`).
    pub provenance: String,
    /// Unix timestamp when the record was created.
    pub created_at: i64,
    /// Unix timestamp when the record was last updated.
    pub updated_at: i64,
}

// ---------------------------------------------------------------------------
// ToolCatalog
// ---------------------------------------------------------------------------

/// CRUD operations on tool records.
#[derive(Clone)]
pub struct ToolCatalog {
    db: Database,
    find_cache: Cache<String, Option<CatalogRecord>>,
}

impl ToolCatalog {
    /// Create a catalog backed by `db`, bootstrapping the schema if needed.
    pub async fn new(db: Database) -> Result<Self> {
        db.execute(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS tools (
                     name        TEXT PRIMARY KEY,
                     description TEXT NOT NULL DEFAULT '',
                     input_type  TEXT NOT NULL DEFAULT 'any',
                     output_type TEXT NOT NULL DEFAULT 'any',
                     schema      TEXT NOT NULL DEFAULT '[]',
                     source_text TEXT,
                     provenance  TEXT NOT NULL DEFAULT 'synthesized',
                     created_at  INTEGER NOT NULL,
                     updated_at  INTEGER NOT NULL
                 );",
            )?;
            Ok(())
        })
        .await?;

        Ok(Self {
            db,
            find_cache: Cache::new(FIND_CACHE_CAPACITY),
        })
    }

    /// List tool records ordered by name, with pagination.
    #[instrument(skip(self))]
    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<CatalogRecord>> {
        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT name, description, input_type, output_type, schema, source_text, provenance, created_at, updated_at \
                     FROM tools ORDER BY name LIMIT ?1 OFFSET ?2",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![limit, offset], row_to_raw)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;

                rows.into_iter().map(RawRow::into_record).collect()
            })
            .await
    }

    /// Fetch a single record by name, returning `None` if not found.
    ///
    /// Results are cached; every write through this catalog invalidates the
    /// cached entry for the affected name.
    #[instrument(skip(self))]
    pub async fn find(&self, name: &str) -> Result<Option<CatalogRecord>> {
        if let Some(cached) = self.find_cache.get(name).await {
            return Ok(cached);
        }

        let key = name.to_string();
        let lookup = key.clone();
        let record = self
            .db
            .execute(move |conn| {
                let result = conn.query_row(
                    "SELECT name, description, input_type, output_type, schema, source_text, provenance, created_at, updated_at \
                     FROM tools WHERE name = ?1",
                    rusqlite::params![lookup],
                    row_to_raw,
                );
                match result {
                    Ok(row) => row.into_record().map(Some),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(CatalogError::Sqlite(e)),
                }
            })
            .await?;

        self.find_cache.insert(key, record.clone()).await;
        Ok(record)
    }

    /// Fetch only the source text of a tool, returning `None` if the record
    /// does not exist or carries no source.
    pub async fn get_source(&self, name: &str) -> Result<Option<String>> {
        Ok(self.find(name).await?.and_then(|r| r.source_text))
    }

    /// Insert or update a record.
    ///
    /// On update the original `created_at` is preserved and `updated_at` is
    /// set to now.
    #[instrument(skip(self, record), fields(tool = %record.name))]
    pub async fn upsert(&self, record: CatalogRecord) -> Result<()> {
        let name = record.name.clone();
        let now = Utc::now().timestamp();
        let schema_json = serde_json::to_string(&record.schema)?;

        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO tools (name, description, input_type, output_type, schema, source_text, provenance, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8) \
                     ON CONFLICT(name) DO UPDATE SET \
                         description = excluded.description, \
                         input_type = excluded.input_type, \
                         output_type = excluded.output_type, \
                         schema = excluded.schema, \
                         source_text = excluded.source_text, \
                         provenance = excluded.provenance, \
                         updated_at = excluded.updated_at",
                    rusqlite::params![
                        record.name,
                        record.description,
                        record.input_type,
                        record.output_type,
                        schema_json,
                        record.source_text,
                        record.provenance,
                        now,
                    ],
                )?;
                Ok(())
            })
            .await?;

        self.find_cache.invalidate(&name).await;
        debug!(tool = %name, "catalog record upserted");
        Ok(())
    }

    /// Replace the stored source text of an existing record.
    #[instrument(skip(self, source))]
    pub async fn update_source(&self, name: &str, source: &str) -> Result<()> {
        let key = name.to_string();
        let name = key.clone();
        let source = source.to_string();
        let now = Utc::now().timestamp();

        let updated = self
            .db
            .execute(move |conn| {
                let n = conn.execute(
                    "UPDATE tools SET source_text = ?2, updated_at = ?3 WHERE name = ?1",
                    rusqlite::params![name, source, now],
                )?;
                Ok(n)
            })
            .await?;

        if updated == 0 {
            return Err(CatalogError::NotFound { name: key });
        }

        self.find_cache.invalidate(&key).await;
        Ok(())
    }

    /// Delete a record.  Returns `true` if a record was removed.
    #[instrument(skip(self))]
    pub async fn delete(&self, name: &str) -> Result<bool> {
        let key = name.to_string();
        let name = key.clone();

        let deleted = self
            .db
            .execute(move |conn| {
                let n = conn.execute("DELETE FROM tools WHERE name = ?1", rusqlite::params![name])?;
                Ok(n)
            })
            .await?;

        self.find_cache.invalidate(&key).await;
        Ok(deleted > 0)
    }

    /// Total number of stored records.
    pub async fn count(&self) -> Result<i64> {
        self.db
            .execute(|conn| {
                let n: i64 = conn.query_row("SELECT count(*) FROM tools", [], |row| row.get(0))?;
                Ok(n)
            })
            .await
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

/// Intermediate row with the schema column still serialized.
struct RawRow {
    name: String,
    description: String,
    input_type: String,
    output_type: String,
    schema: String,
    source_text: Option<String>,
    provenance: String,
    created_at: i64,
    updated_at: i64,
}

impl RawRow {
    fn into_record(self) -> Result<CatalogRecord> {
        Ok(CatalogRecord {
            name: self.name,
            description: self.description,
            input_type: self.input_type,
            output_type: self.output_type,
            schema: serde_json::from_str(&self.schema)?,
            source_text: self.source_text,
            provenance: self.provenance,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn row_to_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        name: row.get(0)?,
        description: row.get(1)?,
        input_type: row.get(2)?,
        output_type: row.get(3)?,
        schema: row.get(4)?,
        source_text: row.get(5)?,
        provenance: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
