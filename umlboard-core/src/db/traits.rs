//! Database abstraction traits
//!
//! This module defines the core trait that all storage backends must implement.

use anyhow::Result;
use std::path::PathBuf;

use crate::models::{
    Category, CategoryLink, CategoryPatch, Diagram, DiagramPatch, WorkspaceSnapshot,
};

/// Types of database backends available
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    /// YAML file storage (single file)
    Yaml,
    /// SQLite database storage
    Sqlite,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendType::Yaml => write!(f, "YAML"),
            BackendType::Sqlite => write!(f, "SQLite"),
        }
    }
}

/// Configuration for database backends
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Path to the database file
    pub path: PathBuf,
    /// Backend type
    pub backend_type: BackendType,
    /// Whether to enable write-ahead logging (SQLite only)
    pub wal_mode: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("umlboard.db"),
            backend_type: BackendType::Sqlite,
            wal_mode: true,
        }
    }
}

/// Core trait for database backends
///
/// `load()` and `save()` work with a full `WorkspaceSnapshot`; the
/// per-entity operations default to a load-modify-save cycle over it.
/// Backends that can address single rows (SQLite) override them.
///
/// Every list operation returns rows ordered by `position` ascending.
pub trait DatabaseBackend: Send + Sync {
    /// Returns the backend type
    fn backend_type(&self) -> BackendType;

    /// Returns the path to the database file
    fn path(&self) -> &std::path::Path;

    // =========================================================================
    // Full Snapshot Operations
    // =========================================================================

    /// Loads the entire workspace from the database
    fn load(&self) -> Result<WorkspaceSnapshot>;

    /// Replaces the entire workspace in the database
    fn save(&self, snapshot: &WorkspaceSnapshot) -> Result<()>;

    // =========================================================================
    // Category Operations
    // =========================================================================

    fn list_categories(&self) -> Result<Vec<Category>> {
        Ok(self.load()?.sorted_categories())
    }

    fn get_category(&self, id: &str) -> Result<Option<Category>> {
        let snapshot = self.load()?;
        Ok(snapshot.categories.iter().find(|c| c.id == id).cloned())
    }

    fn insert_category(&self, category: &Category) -> Result<()> {
        let mut snapshot = self.load()?;
        if snapshot.categories.iter().any(|c| c.id == category.id) {
            anyhow::bail!("Category already exists: {}", category.id)
        }
        snapshot.categories.push(category.clone());
        self.save(&snapshot)
    }

    /// Writes only the fields present in `patch` plus `updated_at`,
    /// returning the stored row
    fn patch_category(&self, id: &str, patch: &CategoryPatch) -> Result<Category> {
        let mut snapshot = self.load()?;
        let category = snapshot
            .categories
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| anyhow::anyhow!("Category not found: {}", id))?;
        patch.apply(category);
        let updated = category.clone();
        self.save(&snapshot)?;
        Ok(updated)
    }

    /// Hard-deletes a category together with its links
    fn delete_category(&self, id: &str) -> Result<()> {
        let mut snapshot = self.load()?;
        let original_len = snapshot.categories.len();
        snapshot.categories.retain(|c| c.id != id);
        if snapshot.categories.len() == original_len {
            anyhow::bail!("Category not found: {}", id)
        }
        snapshot.links.retain(|l| l.category_id != id);
        self.save(&snapshot)
    }

    /// Writes several category positions as one unit of work
    fn reorder_categories(&self, positions: &[(String, f64)]) -> Result<()> {
        let mut snapshot = self.load()?;
        for (id, position) in positions {
            let category = snapshot
                .categories
                .iter_mut()
                .find(|c| &c.id == id)
                .ok_or_else(|| anyhow::anyhow!("Category not found: {}", id))?;
            category.position = *position;
            category.updated_at = chrono::Utc::now();
        }
        self.save(&snapshot)
    }

    // =========================================================================
    // Diagram Operations
    // =========================================================================

    fn list_diagrams(&self, include_deleted: bool) -> Result<Vec<Diagram>> {
        Ok(self.load()?.sorted_diagrams(include_deleted))
    }

    fn get_diagram(&self, id: &str) -> Result<Option<Diagram>> {
        let snapshot = self.load()?;
        Ok(snapshot.diagrams.iter().find(|d| d.id == id).cloned())
    }

    fn insert_diagram(&self, diagram: &Diagram) -> Result<()> {
        let mut snapshot = self.load()?;
        if snapshot.diagrams.iter().any(|d| d.id == diagram.id) {
            anyhow::bail!("Diagram already exists: {}", diagram.id)
        }
        snapshot.diagrams.push(diagram.clone());
        self.save(&snapshot)
    }

    /// Writes only the fields present in `patch` plus `updated_at`,
    /// returning the stored row
    fn patch_diagram(&self, id: &str, patch: &DiagramPatch) -> Result<Diagram> {
        let mut snapshot = self.load()?;
        let diagram = snapshot
            .diagrams
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| anyhow::anyhow!("Diagram not found: {}", id))?;
        patch.apply(diagram);
        let updated = diagram.clone();
        self.save(&snapshot)?;
        Ok(updated)
    }

    /// Sets or clears the soft-delete flag
    fn set_diagram_deleted(&self, id: &str, deleted: bool) -> Result<()> {
        let mut snapshot = self.load()?;
        let diagram = snapshot
            .diagrams
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| anyhow::anyhow!("Diagram not found: {}", id))?;
        diagram.is_deleted = deleted;
        diagram.updated_at = chrono::Utc::now();
        self.save(&snapshot)
    }

    /// Permanently removes a diagram and its links
    fn purge_diagram(&self, id: &str) -> Result<()> {
        let mut snapshot = self.load()?;
        let original_len = snapshot.diagrams.len();
        snapshot.diagrams.retain(|d| d.id != id);
        if snapshot.diagrams.len() == original_len {
            anyhow::bail!("Diagram not found: {}", id)
        }
        snapshot.links.retain(|l| l.diagram_id != id);
        self.save(&snapshot)
    }

    /// Writes several diagram positions as one unit of work
    fn reorder_diagrams(&self, positions: &[(String, f64)]) -> Result<()> {
        let mut snapshot = self.load()?;
        for (id, position) in positions {
            let diagram = snapshot
                .diagrams
                .iter_mut()
                .find(|d| &d.id == id)
                .ok_or_else(|| anyhow::anyhow!("Diagram not found: {}", id))?;
            diagram.position = *position;
            diagram.updated_at = chrono::Utc::now();
        }
        self.save(&snapshot)
    }

    // =========================================================================
    // Link Operations
    // =========================================================================

    fn list_links(&self) -> Result<Vec<CategoryLink>> {
        Ok(self.load()?.links)
    }

    fn add_link(&self, link: &CategoryLink) -> Result<()> {
        let mut snapshot = self.load()?;
        if !snapshot.links.contains(link) {
            snapshot.links.push(link.clone());
        }
        self.save(&snapshot)
    }

    fn remove_link(&self, link: &CategoryLink) -> Result<()> {
        let mut snapshot = self.load()?;
        let original_len = snapshot.links.len();
        snapshot.links.retain(|l| l != link);
        if snapshot.links.len() == original_len {
            anyhow::bail!(
                "Link not found: {} -> {}",
                link.diagram_id,
                link.category_id
            )
        }
        self.save(&snapshot)
    }

    // =========================================================================
    // Utility Operations
    // =========================================================================

    /// Returns true if the database file exists
    fn exists(&self) -> bool {
        self.path().exists()
    }

    /// Creates the database with empty data if it doesn't exist
    fn create_if_not_exists(&self) -> Result<()> {
        if !self.exists() {
            self.save(&WorkspaceSnapshot::new())?;
        }
        Ok(())
    }

    /// Returns statistics about the database
    fn stats(&self) -> Result<DatabaseStats> {
        let snapshot = self.load()?;
        let trashed = snapshot.diagrams.iter().filter(|d| d.is_deleted).count();
        Ok(DatabaseStats {
            category_count: snapshot.categories.len(),
            diagram_count: snapshot.diagrams.len() - trashed,
            trashed_count: trashed,
            link_count: snapshot.links.len(),
            backend_type: self.backend_type(),
        })
    }
}

/// Statistics about a database
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    pub category_count: usize,
    pub diagram_count: usize,
    pub trashed_count: usize,
    pub link_count: usize,
    pub backend_type: BackendType,
}
