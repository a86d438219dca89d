//! Database abstraction layer for umlboard workspaces
//!
//! This module provides a trait-based abstraction for storage backends,
//! allowing a workspace to live in SQLite or a single YAML file while the
//! stores above see one consistent interface.

mod migration;
mod sqlite_backend;
mod traits;
mod yaml_backend;

pub use migration::{
    copy_between, export_to_json, import_from_json, migrate_sqlite_to_yaml, migrate_yaml_to_sqlite,
};
pub use sqlite_backend::SqliteBackend;
pub use traits::{BackendType, DatabaseBackend, DatabaseConfig, DatabaseStats};
pub use yaml_backend::YamlBackend;

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

/// Infers the backend type from a file extension, defaulting to SQLite
pub fn backend_type_for(path: &Path) -> BackendType {
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => BackendType::Yaml,
        _ => BackendType::Sqlite,
    }
}

/// Creates a database backend based on the file extension or explicit type
pub fn create_backend(
    path: &Path,
    backend_type: Option<BackendType>,
) -> Result<Arc<dyn DatabaseBackend>> {
    let bt = backend_type.unwrap_or_else(|| backend_type_for(path));
    log::debug!("Opening {} backend at {:?}", bt, path);

    match bt {
        BackendType::Yaml => Ok(Arc::new(YamlBackend::new(path))),
        BackendType::Sqlite => Ok(Arc::new(SqliteBackend::new(path)?)),
    }
}

/// Opens an existing database or creates a new one
pub fn open_or_create(
    path: &Path,
    backend_type: Option<BackendType>,
) -> Result<Arc<dyn DatabaseBackend>> {
    let backend = create_backend(path, backend_type)?;
    backend.create_if_not_exists()?;
    Ok(backend)
}
