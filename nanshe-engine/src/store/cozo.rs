//! CozoDB-backed engine store
//!
//! `CozoStore` wraps a `DbInstance` (RocksDB on disk, in-memory for tests),
//! applies the schema migrations on open and allocates row ids. The
//! per-table operations live in the sibling modules as further
//! `impl CozoStore` blocks.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use cozo::{DataValue, DbInstance, NamedRows, ScriptMutability};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::schema::{MIGRATIONS, Migration};
use crate::config::{DEFAULT_EMBEDDING_DIMENSION, StorageConfig, StorageEngine};
use crate::types::{Id, from_millis, to_millis};
use crate::{EngineError, Result};

/// Name of the single id sequence row.
const ID_SEQUENCE: &str = "global";

/// CozoDB-backed engine store
pub struct CozoStore {
    db: Arc<DbInstance>,
    /// Serializes id allocation (single writer per store)
    id_lock: Mutex<()>,
    /// Width of the stored embeddings, fixed when the store was created
    vector_dimension: usize,
}

impl CozoStore {
    /// Open or create a store at the given path
    pub async fn open(path: &Path) -> Result<Self> {
        Self::open_with_dimension(path, DEFAULT_EMBEDDING_DIMENSION).await
    }

    /// Open or create a store whose vectors are `dimension` wide.
    ///
    /// An existing store keeps the width it was created with.
    pub async fn open_with_dimension(path: &Path, dimension: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| EngineError::Database(format!("Failed to create directory: {e}")))?;
        }

        let db = DbInstance::new("rocksdb", path, "")
            .map_err(|e| EngineError::Database(format!("Failed to open database: {e}")))?;
        info!(path = %path.display(), "Opened engine store");
        Self::with_db(db, dimension).await
    }

    /// Open a throwaway in-memory store
    pub async fn open_mem() -> Result<Self> {
        Self::open_mem_with_dimension(DEFAULT_EMBEDDING_DIMENSION).await
    }

    pub async fn open_mem_with_dimension(dimension: usize) -> Result<Self> {
        let db = DbInstance::new("mem", "", "")
            .map_err(|e| EngineError::Database(format!("Failed to open database: {e}")))?;
        Self::with_db(db, dimension).await
    }

    /// Open the store described by the storage config
    pub async fn from_config(config: &StorageConfig, dimension: usize) -> Result<Self> {
        match config.engine {
            StorageEngine::Rocksdb => Self::open_with_dimension(&config.db_path, dimension).await,
            StorageEngine::Mem => Self::open_mem_with_dimension(dimension).await,
        }
    }

    async fn with_db(db: DbInstance, dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(EngineError::InvalidInput(
                "embedding dimension must be positive".into(),
            ));
        }
        let mut store = Self {
            db: Arc::new(db),
            id_lock: Mutex::new(()),
            vector_dimension: dimension,
        };
        store.ensure_schema(dimension).await?;
        store.vector_dimension = store.stored_vector_dimension().await?;
        if store.vector_dimension != dimension {
            warn!(
                stored = store.vector_dimension,
                configured = dimension,
                "Store keeps its original embedding width; vectors will be projected"
            );
        }
        Ok(store)
    }

    /// Width of the stored embeddings
    pub fn vector_dimension(&self) -> usize {
        self.vector_dimension
    }

    async fn stored_vector_dimension(&self) -> Result<usize> {
        let rows = self
            .run_query(
                "?[dimension] := *vector_settings{name, dimension}, name = 'embedding'",
                Default::default(),
            )
            .await?;
        let row = rows
            .rows
            .first()
            .ok_or_else(|| EngineError::Migration("vector settings missing".into()))?;
        Ok(get_int(row, 0, "vector dimension")? as usize)
    }

    /// Get current schema version from database
    pub async fn get_schema_version(&self) -> Result<u32> {
        let query = "?[version] := *schema_version{version}";

        match self.run_query(query, Default::default()).await {
            Ok(rows) => {
                let mut current = 0;
                for row in &rows.rows {
                    current = current.max(get_int(row, 0, "version")? as u32);
                }
                Ok(current)
            }
            Err(e) => {
                // Relation does not exist before the first migration
                let msg = e.to_string();
                if msg.contains("not found") || msg.contains("Cannot find") {
                    Ok(0)
                } else {
                    Err(e)
                }
            }
        }
    }

    async fn ensure_schema(&self, dimension: usize) -> Result<()> {
        let current = self.get_schema_version().await?;

        for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
            self.apply_migration(migration, dimension).await?;
        }

        Ok(())
    }

    async fn apply_migration(&self, migration: &Migration, dimension: usize) -> Result<()> {
        self.db
            .run_script(&migration.render(dimension), Default::default(), ScriptMutability::Mutable)
            .map_err(|e| {
                EngineError::Migration(format!("Migration {} failed: {e}", migration.version))
            })?;

        let record = params([
            ("version", DataValue::from(migration.version as i64)),
            ("applied_at", DataValue::from(to_millis(Utc::now()))),
            ("description", DataValue::from(migration.description)),
        ]);
        self.db
            .run_script(
                "?[version, applied_at, description] <- [[$version, $applied_at, $description]] \
                 :put schema_version {version => applied_at, description}",
                record,
                ScriptMutability::Mutable,
            )
            .map_err(|e| {
                EngineError::Migration(format!(
                    "Failed to record migration {}: {e}",
                    migration.version
                ))
            })?;

        debug!(version = migration.version, "Applied migration");
        Ok(())
    }

    /// Run a query and return results
    pub(crate) async fn run_query(
        &self,
        query: &str,
        params: BTreeMap<String, DataValue>,
    ) -> Result<NamedRows> {
        self.db
            .run_script(query, params, ScriptMutability::Immutable)
            .map_err(|e| EngineError::Database(format!("Query failed: {e}")))
    }

    /// Run a mutation query
    pub(crate) async fn run_mutation(
        &self,
        query: &str,
        params: BTreeMap<String, DataValue>,
    ) -> Result<NamedRows> {
        self.db
            .run_script(query, params, ScriptMutability::Mutable)
            .map_err(|e| EngineError::Database(format!("Mutation failed: {e}")))
    }

    /// Allocate the next row id
    pub async fn next_id(&self) -> Result<Id> {
        Ok(self.next_ids(1).await?[0])
    }

    /// Allocate `count` consecutive row ids
    pub async fn next_ids(&self, count: usize) -> Result<Vec<Id>> {
        let _guard = self.id_lock.lock().await;

        let rows = self
            .run_query(
                "?[value] := *id_sequence{name, value}, name = $name",
                params([("name", DataValue::from(ID_SEQUENCE))]),
            )
            .await?;
        let last = match rows.rows.first() {
            Some(row) => get_int(row, 0, "id_sequence.value")?,
            None => 0,
        };
        let next_last = last + count as i64;

        self.run_mutation(
            "?[name, value] <- [[$name, $value]] :put id_sequence {name => value}",
            params([
                ("name", DataValue::from(ID_SEQUENCE)),
                ("value", DataValue::from(next_last)),
            ]),
        )
        .await?;

        Ok(((last + 1)..=next_last).collect())
    }
}

// --- parameter and row helpers shared by the table modules ---

pub(crate) fn params<const N: usize>(
    entries: [(&str, DataValue); N],
) -> BTreeMap<String, DataValue> {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

pub(crate) fn opt_str(value: Option<&str>) -> DataValue {
    value.map(DataValue::from).unwrap_or(DataValue::Null)
}

pub(crate) fn opt_int(value: Option<i64>) -> DataValue {
    value.map(DataValue::from).unwrap_or(DataValue::Null)
}

pub(crate) fn opt_time(value: Option<DateTime<Utc>>) -> DataValue {
    opt_int(value.map(to_millis))
}

pub(crate) fn time(value: DateTime<Utc>) -> DataValue {
    DataValue::from(to_millis(value))
}

fn cell<'a>(row: &'a [DataValue], index: usize, what: &str) -> Result<&'a DataValue> {
    row.get(index)
        .ok_or_else(|| EngineError::Database(format!("Missing column {what}")))
}

pub(crate) fn get_int(row: &[DataValue], index: usize, what: &str) -> Result<i64> {
    cell(row, index, what)?
        .get_int()
        .ok_or_else(|| EngineError::Database(format!("Invalid {what}")))
}

pub(crate) fn get_float(row: &[DataValue], index: usize, what: &str) -> Result<f64> {
    cell(row, index, what)?
        .get_float()
        .ok_or_else(|| EngineError::Database(format!("Invalid {what}")))
}

pub(crate) fn get_bool(row: &[DataValue], index: usize, what: &str) -> Result<bool> {
    cell(row, index, what)?
        .get_bool()
        .ok_or_else(|| EngineError::Database(format!("Invalid {what}")))
}

pub(crate) fn get_string(row: &[DataValue], index: usize, what: &str) -> Result<String> {
    cell(row, index, what)?
        .get_str()
        .map(str::to_string)
        .ok_or_else(|| EngineError::Database(format!("Invalid {what}")))
}

pub(crate) fn get_opt_string(row: &[DataValue], index: usize) -> Option<String> {
    row.get(index).and_then(|v| v.get_str()).map(str::to_string)
}

pub(crate) fn get_opt_int(row: &[DataValue], index: usize) -> Option<i64> {
    row.get(index).and_then(|v| v.get_int())
}

pub(crate) fn get_time(row: &[DataValue], index: usize, what: &str) -> Result<DateTime<Utc>> {
    get_int(row, index, what).map(from_millis)
}

pub(crate) fn get_opt_time(row: &[DataValue], index: usize) -> Option<DateTime<Utc>> {
    get_opt_int(row, index).map(from_millis)
}

pub(crate) fn get_json<T: serde::de::DeserializeOwned>(
    row: &[DataValue],
    index: usize,
    what: &str,
) -> Result<T> {
    let text = get_string(row, index, what)?;
    serde_json::from_str(&text)
        .map_err(|e| EngineError::Database(format!("Invalid {what} JSON: {e}")))
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| EngineError::Serialization(e.to_string()))
}
