//! YAML file storage backend
//!
//! Stores the whole workspace in a single YAML file through `Storage`,
//! which provides the file locking. Every per-entity operation is the
//! trait's load-modify-save default, so this backend suits small,
//! hand-editable or version-controlled workspaces.

use anyhow::Result;
use std::path::{Path, PathBuf};

use super::traits::{BackendType, DatabaseBackend};
use crate::models::WorkspaceSnapshot;
use crate::storage::Storage;

/// YAML file backend implementation
pub struct YamlBackend {
    storage: Storage,
    path: PathBuf,
}

impl YamlBackend {
    /// Creates a new YAML backend for the given file path
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            storage: Storage::new(&path),
            path,
        }
    }

    /// Gets a reference to the underlying Storage
    pub fn storage(&self) -> &Storage {
        &self.storage
    }
}

impl DatabaseBackend for YamlBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Yaml
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<WorkspaceSnapshot> {
        self.storage.load()
    }

    fn save(&self, snapshot: &WorkspaceSnapshot) -> Result<()> {
        self.storage.save(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, CategoryLink, CategoryPatch, Diagram};
    use tempfile::TempDir;

    #[test]
    fn test_yaml_backend_crud() {
        let dir = TempDir::new().unwrap();
        let backend = YamlBackend::new(dir.path().join("board.yaml"));
        backend.create_if_not_exists().unwrap();

        let category = Category::new("Flows".into(), 1000.0);
        backend.insert_category(&category).unwrap();
        let diagram = Diagram::new("login".into(), "sequenceDiagram\n".into(), 1000.0);
        backend.insert_diagram(&diagram).unwrap();
        backend
            .add_link(&CategoryLink::new(&diagram.id, &category.id))
            .unwrap();

        let renamed = backend
            .patch_category(
                &category.id,
                &CategoryPatch {
                    name: Some("Sequences".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(renamed.name, "Sequences");

        backend.delete_category(&category.id).unwrap();
        assert!(backend.list_links().unwrap().is_empty());

        let stats = backend.stats().unwrap();
        assert_eq!(stats.category_count, 0);
        assert_eq!(stats.diagram_count, 1);
    }

    #[test]
    fn test_yaml_reorder_is_all_or_nothing() {
        let dir = TempDir::new().unwrap();
        let backend = YamlBackend::new(dir.path().join("board.yaml"));
        let category = Category::new("A".into(), 1000.0);
        backend.insert_category(&category).unwrap();

        let result = backend.reorder_categories(&[
            (category.id.clone(), 5000.0),
            ("missing".to_string(), 1.0),
        ]);
        assert!(result.is_err());
        assert_eq!(
            backend.get_category(&category.id).unwrap().unwrap().position,
            1000.0
        );
    }
}
