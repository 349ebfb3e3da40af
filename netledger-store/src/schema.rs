//! Schema file loading and idempotent initialization.

use std::path::{Path, PathBuf};

use netledger_core::error::StoreError;
use sqlx::SqlitePool;
use tracing::{debug, info};

/// Reads the schema definition at `path`.
///
/// A relative path that does not exist is retried one directory up, so a
/// process started inside a crate directory still finds the workspace schema.
pub fn read_schema_file(path: impl AsRef<Path>) -> Result<String, StoreError> {
    let path = path.as_ref();
    let mut candidates: Vec<PathBuf> = vec![path.to_path_buf()];
    if path.is_relative() {
        candidates.push(Path::new("..").join(path));
    }

    let mut last_error = None;
    for candidate in &candidates {
        match std::fs::read_to_string(candidate) {
            Ok(schema) => {
                debug!(path = %candidate.display(), "Loaded schema file");
                return Ok(schema);
            }
            Err(e) => last_error = Some(e),
        }
    }

    Err(StoreError::Schema(format!(
        "cannot read {}: {}",
        path.display(),
        last_error.map(|e| e.to_string()).unwrap_or_default()
    )))
}

/// Executes the schema file against `pool`. Safe to run on every startup.
pub async fn init_schema(pool: &SqlitePool, path: impl AsRef<Path>) -> Result<(), StoreError> {
    let schema = read_schema_file(path)?;
    sqlx::raw_sql(&schema)
        .execute(pool)
        .await
        .map_err(|e| StoreError::Schema(e.to_string()))?;
    info!("Database schema initialized");
    Ok(())
}
