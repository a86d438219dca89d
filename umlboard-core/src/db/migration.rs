//! Migration utilities for converting between storage backends
//!
//! Copies whole workspaces between backends (YAML and SQLite in either
//! direction) and imports/exports them as JSON for interoperability.

use anyhow::{Context, Result};
use std::path::Path;

use super::traits::DatabaseBackend;
use super::{SqliteBackend, YamlBackend};
use crate::models::WorkspaceSnapshot;

/// Moves a YAML workspace into a SQLite database
///
/// Returns the number of diagrams migrated
pub fn migrate_yaml_to_sqlite<P1: AsRef<Path>, P2: AsRef<Path>>(
    yaml_path: P1,
    sqlite_path: P2,
) -> Result<usize> {
    let source = YamlBackend::new(yaml_path);
    let target = SqliteBackend::new(sqlite_path)?;
    copy_between(&source, &target)
}

/// Moves a SQLite workspace into a YAML file
///
/// Returns the number of diagrams migrated
pub fn migrate_sqlite_to_yaml<P1: AsRef<Path>, P2: AsRef<Path>>(
    sqlite_path: P1,
    yaml_path: P2,
) -> Result<usize> {
    let source = SqliteBackend::new(sqlite_path)?;
    let target = YamlBackend::new(yaml_path);
    copy_between(&source, &target)
}

/// Copies every row from `source` into `target`, replacing its contents
pub fn copy_between(source: &dyn DatabaseBackend, target: &dyn DatabaseBackend) -> Result<usize> {
    let snapshot = source
        .load()
        .with_context(|| format!("Failed to load {} database", source.backend_type()))?;
    let count = snapshot.diagrams.len();
    target
        .save(&snapshot)
        .with_context(|| format!("Failed to save to {} database", target.backend_type()))?;
    log::info!(
        "Copied {} diagrams from {:?} to {:?}",
        count,
        source.path(),
        target.path()
    );
    Ok(count)
}

/// Exports a workspace to pretty-printed JSON
pub fn export_to_json<P: AsRef<Path>>(backend: &dyn DatabaseBackend, json_path: P) -> Result<()> {
    let snapshot = backend.load().context("Failed to load database")?;
    let json = serde_json::to_string_pretty(&snapshot).context("Failed to serialize to JSON")?;
    std::fs::write(json_path.as_ref(), json)
        .with_context(|| format!("Failed to write JSON file: {:?}", json_path.as_ref()))?;
    Ok(())
}

/// Replaces a workspace with the contents of a JSON export
///
/// Returns the number of diagrams imported
pub fn import_from_json<P: AsRef<Path>>(backend: &dyn DatabaseBackend, json_path: P) -> Result<usize> {
    let json = std::fs::read_to_string(json_path.as_ref())
        .with_context(|| format!("Failed to read JSON file: {:?}", json_path.as_ref()))?;
    let snapshot: WorkspaceSnapshot =
        serde_json::from_str(&json).context("Failed to parse JSON")?;
    let count = snapshot.diagrams.len();
    backend.save(&snapshot).context("Failed to save to database")?;
    Ok(count)
}
