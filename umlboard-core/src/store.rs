//! In-memory entity stores
//!
//! Each store mirrors one persisted entity type, loads independently, and
//! writes through to the injected backend before touching its own state.
//! A store's `revision` increases on every in-memory change so consumers
//! know when to re-derive the view.

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::db::DatabaseBackend;
use crate::models::{
    Category, CategoryLink, CategoryPatch, Diagram, DiagramPatch, DiagramSyntax,
};
use crate::position;

fn sort_by_position<T>(items: &mut [T], key: impl Fn(&T) -> f64) {
    items.sort_by(|a, b| key(a).total_cmp(&key(b)));
}

/// Categories, ordered by position
pub struct CategoryStore {
    backend: Arc<dyn DatabaseBackend>,
    items: Vec<Category>,
    loaded: bool,
    revision: u64,
}

impl CategoryStore {
    pub fn new(backend: Arc<dyn DatabaseBackend>) -> Self {
        Self {
            backend,
            items: Vec::new(),
            loaded: false,
            revision: 0,
        }
    }

    /// True once the first `load_all` has finished, successfully or not
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn items(&self) -> &[Category] {
        &self.items
    }

    pub fn get(&self, id: &str) -> Option<&Category> {
        self.items.iter().find(|c| c.id == id)
    }

    /// Finds a category by id or, failing that, by exact name
    pub fn find(&self, id_or_name: &str) -> Option<&Category> {
        self.get(id_or_name)
            .or_else(|| self.items.iter().find(|c| c.name == id_or_name))
    }

    fn touch(&mut self) {
        sort_by_position(&mut self.items, |c| c.position);
        self.revision += 1;
    }

    /// Replaces in-memory state with every persisted category.
    ///
    /// On failure the store is left empty but marked loaded, and the
    /// error is returned for the caller to report.
    pub fn load_all(&mut self) -> Result<()> {
        let result = self.backend.list_categories();
        self.loaded = true;
        match result {
            Ok(items) => {
                self.items = items;
                self.touch();
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to load categories: {:#}", e);
                self.items.clear();
                self.touch();
                Err(e)
            }
        }
    }

    /// Persists a new category appended after the current last one
    pub fn create(&mut self, name: String, description: Option<String>) -> Result<Category> {
        let position = position::next_position(self.items.iter().map(|c| c.position));
        let mut category = Category::new(name, position);
        category.description = description;

        self.backend
            .insert_category(&category)
            .context("Failed to create category")?;
        log::info!("Created category {} at {}", category.id, position);

        self.items.push(category.clone());
        self.touch();
        Ok(category)
    }

    pub fn update(&mut self, id: &str, patch: &CategoryPatch) -> Result<Category> {
        if patch.is_empty() {
            return self
                .get(id)
                .cloned()
                .with_context(|| format!("Unknown category {}", id));
        }
        let updated = self
            .backend
            .patch_category(id, patch)
            .with_context(|| format!("Failed to update category {}", id))?;

        match self.items.iter_mut().find(|c| c.id == id) {
            Some(existing) => *existing = updated.clone(),
            None => self.items.push(updated.clone()),
        }
        self.touch();
        Ok(updated)
    }

    pub fn delete(&mut self, id: &str) -> Result<()> {
        self.backend
            .delete_category(id)
            .with_context(|| format!("Failed to delete category {}", id))?;
        self.items.retain(|c| c.id != id);
        self.touch();
        Ok(())
    }

    /// Persists several positions in one transaction, then mirrors them
    pub fn reorder(&mut self, positions: &[(String, f64)]) -> Result<()> {
        self.backend
            .reorder_categories(positions)
            .context("Failed to reorder categories")?;
        for (id, pos) in positions {
            if let Some(category) = self.items.iter_mut().find(|c| &c.id == id) {
                category.position = *pos;
            }
        }
        self.touch();
        Ok(())
    }
}

/// Diagrams, including soft-deleted ones, ordered by position
pub struct DiagramStore {
    backend: Arc<dyn DatabaseBackend>,
    items: Vec<Diagram>,
    loaded: bool,
    revision: u64,
}

impl DiagramStore {
    pub fn new(backend: Arc<dyn DatabaseBackend>) -> Self {
        Self {
            backend,
            items: Vec::new(),
            loaded: false,
            revision: 0,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Every diagram, trash included
    pub fn items(&self) -> &[Diagram] {
        &self.items
    }

    /// Diagrams not in the trash
    pub fn live(&self) -> impl Iterator<Item = &Diagram> {
        self.items.iter().filter(|d| !d.is_deleted)
    }

    pub fn trashed(&self) -> impl Iterator<Item = &Diagram> {
        self.items.iter().filter(|d| d.is_deleted)
    }

    pub fn get(&self, id: &str) -> Option<&Diagram> {
        self.items.iter().find(|d| d.id == id)
    }

    /// Finds a diagram by id or, failing that, by exact name
    pub fn find(&self, id_or_name: &str) -> Option<&Diagram> {
        self.get(id_or_name)
            .or_else(|| self.items.iter().find(|d| d.name == id_or_name))
    }

    fn touch(&mut self) {
        sort_by_position(&mut self.items, |d| d.position);
        self.revision += 1;
    }

    fn replace(&mut self, diagram: Diagram) {
        match self.items.iter_mut().find(|d| d.id == diagram.id) {
            Some(existing) => *existing = diagram,
            None => self.items.push(diagram),
        }
        self.touch();
    }

    /// Replaces in-memory state with every persisted diagram.
    ///
    /// On failure the store is left empty but marked loaded, and the
    /// error is returned for the caller to report.
    pub fn load_all(&mut self) -> Result<()> {
        let result = self.backend.list_diagrams(true);
        self.loaded = true;
        match result {
            Ok(items) => {
                self.items = items;
                self.touch();
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to load diagrams: {:#}", e);
                self.items.clear();
                self.touch();
                Err(e)
            }
        }
    }

    /// Persists a new diagram appended after every existing one
    pub fn create(&mut self, name: String, content: String) -> Result<Diagram> {
        // Trashed rows count too
        let position = position::next_position(self.items.iter().map(|d| d.position));
        let diagram = Diagram::new(name, content, position);

        self.backend
            .insert_diagram(&diagram)
            .context("Failed to create diagram")?;
        log::info!("Created diagram {} ({})", diagram.id, diagram.kind);

        self.items.push(diagram.clone());
        self.touch();
        Ok(diagram)
    }

    /// Creates a diagram holding the dialect's placeholder source
    pub fn create_placeholder(&mut self, name: String, syntax: DiagramSyntax) -> Result<Diagram> {
        self.create(name, syntax.placeholder().to_string())
    }

    pub fn update(&mut self, id: &str, patch: &DiagramPatch) -> Result<Diagram> {
        if patch.is_empty() {
            return self
                .get(id)
                .cloned()
                .with_context(|| format!("Unknown diagram {}", id));
        }
        let updated = self
            .backend
            .patch_diagram(id, patch)
            .with_context(|| format!("Failed to update diagram {}", id))?;
        self.replace(updated.clone());
        Ok(updated)
    }

    pub fn update_content(&mut self, id: &str, content: String) -> Result<Diagram> {
        self.update(id, &DiagramPatch::content(content))
    }

    /// Moves a diagram to the trash
    pub fn delete(&mut self, id: &str) -> Result<()> {
        self.set_deleted(id, true)
    }

    /// Brings a diagram back from the trash.
    ///
    /// Live diagrams may have been respaced onto the trashed row's old
    /// position in the meantime; a restored diagram that would share a
    /// position is appended after every other diagram instead.
    pub fn restore(&mut self, id: &str) -> Result<()> {
        self.set_deleted(id, false)?;

        let Some(position) = self.get(id).map(|d| d.position) else {
            return Ok(());
        };
        if !self.live().any(|d| d.id != id && d.position == position) {
            return Ok(());
        }
        let fresh = position::next_position(self.items.iter().map(|d| d.position));
        log::info!(
            "Restored diagram {} collided at {}, moving it to {}",
            id,
            position,
            fresh
        );
        self.update(id, &DiagramPatch::position(fresh))?;
        Ok(())
    }

    fn set_deleted(&mut self, id: &str, deleted: bool) -> Result<()> {
        self.backend
            .set_diagram_deleted(id, deleted)
            .with_context(|| format!("Failed to change trash state of diagram {}", id))?;
        if let Some(diagram) = self.items.iter_mut().find(|d| d.id == id) {
            diagram.is_deleted = deleted;
            diagram.updated_at = chrono::Utc::now();
        }
        self.touch();
        Ok(())
    }

    /// Permanently removes a diagram; there is no way back
    pub fn purge(&mut self, id: &str) -> Result<()> {
        self.backend
            .purge_diagram(id)
            .with_context(|| format!("Failed to purge diagram {}", id))?;
        self.items.retain(|d| d.id != id);
        self.touch();
        Ok(())
    }

    /// Persists several positions in one transaction, then mirrors them
    pub fn reorder(&mut self, positions: &[(String, f64)]) -> Result<()> {
        self.backend
            .reorder_diagrams(positions)
            .context("Failed to reorder diagrams")?;
        for (id, pos) in positions {
            if let Some(diagram) = self.items.iter_mut().find(|d| &d.id == id) {
                diagram.position = *pos;
            }
        }
        self.touch();
        Ok(())
    }
}

/// Diagram-to-category membership links
pub struct LinkStore {
    backend: Arc<dyn DatabaseBackend>,
    items: Vec<CategoryLink>,
    loaded: bool,
    revision: u64,
}

impl LinkStore {
    pub fn new(backend: Arc<dyn DatabaseBackend>) -> Self {
        Self {
            backend,
            items: Vec::new(),
            loaded: false,
            revision: 0,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn items(&self) -> &[CategoryLink] {
        &self.items
    }

    /// The category a diagram belongs to; the first link wins
    pub fn category_of(&self, diagram_id: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|l| l.diagram_id == diagram_id)
            .map(|l| l.category_id.as_str())
    }

    /// Replaces in-memory state with every persisted link.
    ///
    /// On failure the store is left empty but marked loaded, and the
    /// error is returned for the caller to report.
    pub fn load_all(&mut self) -> Result<()> {
        let result = self.backend.list_links();
        self.loaded = true;
        match result {
            Ok(items) => {
                self.items = items;
                self.revision += 1;
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to load category links: {:#}", e);
                self.items.clear();
                self.revision += 1;
                Err(e)
            }
        }
    }

    pub fn add(&mut self, diagram_id: &str, category_id: &str) -> Result<CategoryLink> {
        let link = CategoryLink::new(diagram_id, category_id);
        self.backend
            .add_link(&link)
            .with_context(|| format!("Failed to add {} to category {}", diagram_id, category_id))?;
        if !self.items.contains(&link) {
            self.items.push(link.clone());
        }
        self.revision += 1;
        Ok(link)
    }

    pub fn remove(&mut self, diagram_id: &str, category_id: &str) -> Result<()> {
        let link = CategoryLink::new(diagram_id, category_id);
        self.backend.remove_link(&link).with_context(|| {
            format!(
                "Failed to remove {} from category {}",
                diagram_id, category_id
            )
        })?;
        self.items.retain(|l| l != &link);
        self.revision += 1;
        Ok(())
    }

    /// Replaces the `from` link of a diagram with a `to` link
    pub fn update(&mut self, diagram_id: &str, from: &str, to: &str) -> Result<CategoryLink> {
        self.remove(diagram_id, from)?;
        self.add(diagram_id, to)
    }

    /// Drops in-memory links to a category the backend already deleted
    pub fn forget_category(&mut self, category_id: &str) {
        let before = self.items.len();
        self.items.retain(|l| l.category_id != category_id);
        if self.items.len() != before {
            self.revision += 1;
        }
    }

    /// Drops in-memory links of a diagram the backend already purged
    pub fn forget_diagram(&mut self, diagram_id: &str) {
        let before = self.items.len();
        self.items.retain(|l| l.diagram_id != diagram_id);
        if self.items.len() != before {
            self.revision += 1;
        }
    }
}

/// The three stores of one workspace, sharing a backend
pub struct Stores {
    pub categories: CategoryStore,
    pub diagrams: DiagramStore,
    pub links: LinkStore,
    backend: Arc<dyn DatabaseBackend>,
}

impl Stores {
    pub fn new(backend: Arc<dyn DatabaseBackend>) -> Self {
        Self {
            categories: CategoryStore::new(Arc::clone(&backend)),
            diagrams: DiagramStore::new(Arc::clone(&backend)),
            links: LinkStore::new(Arc::clone(&backend)),
            backend,
        }
    }

    pub fn backend(&self) -> Arc<dyn DatabaseBackend> {
        Arc::clone(&self.backend)
    }

    /// Loads every store, attempting all three even if one fails;
    /// returns the first error
    pub fn load_all(&mut self) -> Result<()> {
        let categories = self.categories.load_all();
        let diagrams = self.diagrams.load_all();
        let links = self.links.load_all();
        categories.and(diagrams).and(links)
    }

    pub fn all_loaded(&self) -> bool {
        self.categories.is_loaded() && self.diagrams.is_loaded() && self.links.is_loaded()
    }

    /// Combined revision; changes whenever any store changes
    pub fn revision(&self) -> u64 {
        self.categories.revision() + self.diagrams.revision() + self.links.revision()
    }

    /// Deletes a category; its diagrams fall back to the default bucket
    pub fn delete_category(&mut self, id: &str) -> Result<()> {
        self.categories.delete(id)?;
        self.links.forget_category(id);
        Ok(())
    }

    /// Permanently removes a diagram along with its links
    pub fn purge_diagram(&mut self, id: &str) -> Result<()> {
        self.diagrams.purge(id)?;
        self.links.forget_diagram(id);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::{BackendType, SqliteBackend};
    use crate::models::WorkspaceSnapshot;
    use std::path::Path;

    /// Backend whose every operation fails
    pub(crate) struct FailingBackend;

    impl DatabaseBackend for FailingBackend {
        fn backend_type(&self) -> BackendType {
            BackendType::Sqlite
        }

        fn path(&self) -> &Path {
            Path::new("unreachable.db")
        }

        fn load(&self) -> Result<WorkspaceSnapshot> {
            anyhow::bail!("disk on fire")
        }

        fn save(&self, _snapshot: &WorkspaceSnapshot) -> Result<()> {
            anyhow::bail!("disk on fire")
        }
    }

    fn stores() -> Stores {
        Stores::new(Arc::new(SqliteBackend::in_memory().unwrap()))
    }

    #[test]
    fn test_stores_start_unloaded() {
        let stores = stores();
        assert!(!stores.all_loaded());
        assert!(!stores.categories.is_loaded());
    }

    #[test]
    fn test_create_appends_with_gap() {
        let mut stores = stores();
        stores.load_all().unwrap();
        let first = stores.categories.create("One".into(), None).unwrap();
        let second = stores.categories.create("Two".into(), None).unwrap();

        assert_eq!(first.position, 1000.0);
        assert_eq!(second.position, (1000.0 + 1.0) * 1000.0);
        assert_eq!(stores.categories.items().len(), 2);
    }

    #[test]
    fn test_load_all_reads_persisted_rows() {
        let backend: Arc<dyn DatabaseBackend> = Arc::new(SqliteBackend::in_memory().unwrap());
        let mut writer = Stores::new(Arc::clone(&backend));
        let category = writer.categories.create("Flows".into(), None).unwrap();
        let diagram = writer.diagrams.create("d".into(), String::new()).unwrap();
        writer.links.add(&diagram.id, &category.id).unwrap();

        let mut reader = Stores::new(backend);
        reader.load_all().unwrap();
        assert!(reader.all_loaded());
        assert_eq!(reader.categories.items()[0].name, "Flows");
        assert_eq!(reader.diagrams.items()[0].content, "");
        assert_eq!(reader.links.category_of(&diagram.id), Some(category.id.as_str()));
    }

    #[test]
    fn test_failed_load_is_empty_but_loaded() {
        let mut stores = Stores::new(Arc::new(FailingBackend));
        assert!(stores.load_all().is_err());
        assert!(stores.all_loaded());
        assert!(stores.categories.items().is_empty());
        assert!(stores.diagrams.items().is_empty());
    }

    #[test]
    fn test_failed_create_leaves_state_untouched() {
        let mut stores = Stores::new(Arc::new(FailingBackend));
        let revision = stores.revision();
        assert!(stores.categories.create("x".into(), None).is_err());
        assert!(stores.categories.items().is_empty());
        assert_eq!(stores.revision(), revision);
    }

    #[test]
    fn test_update_changes_only_patched_fields() {
        let mut stores = stores();
        let diagram = stores
            .diagrams
            .create_placeholder("seq".into(), DiagramSyntax::PlantUml)
            .unwrap();
        let renamed = stores
            .diagrams
            .update(
                &diagram.id,
                &DiagramPatch {
                    name: Some("renamed".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(renamed.name, "renamed");
        assert_eq!(renamed.content, diagram.content);
        assert!(renamed.updated_at >= diagram.updated_at);
    }

    #[test]
    fn test_empty_patch_skips_write() {
        let mut stores = stores();
        let category = stores.categories.create("c".into(), None).unwrap();
        let diagram = stores.diagrams.create("d".into(), "A -> B".into()).unwrap();
        let revision = stores.revision();

        let same = stores
            .categories
            .update(&category.id, &CategoryPatch::default())
            .unwrap();
        assert_eq!(same.updated_at, category.updated_at);
        let same = stores
            .diagrams
            .update(&diagram.id, &DiagramPatch::default())
            .unwrap();
        assert_eq!(same.updated_at, diagram.updated_at);
        assert_eq!(stores.revision(), revision);

        assert!(stores
            .diagrams
            .update("missing", &DiagramPatch::default())
            .is_err());
    }

    #[test]
    fn test_soft_delete_restore_purge() {
        let mut stores = stores();
        let category = stores.categories.create("c".into(), None).unwrap();
        let diagram = stores.diagrams.create("d".into(), String::new()).unwrap();
        stores.links.add(&diagram.id, &category.id).unwrap();

        stores.diagrams.delete(&diagram.id).unwrap();
        assert_eq!(stores.diagrams.live().count(), 0);
        assert_eq!(stores.diagrams.trashed().count(), 1);

        stores.diagrams.restore(&diagram.id).unwrap();
        assert_eq!(stores.diagrams.live().count(), 1);

        stores.purge_diagram(&diagram.id).unwrap();
        assert!(stores.diagrams.items().is_empty());
        assert!(stores.links.items().is_empty());
    }

    #[test]
    fn test_delete_category_forgets_links() {
        let mut stores = stores();
        let category = stores.categories.create("c".into(), None).unwrap();
        let diagram = stores.diagrams.create("d".into(), String::new()).unwrap();
        stores.links.add(&diagram.id, &category.id).unwrap();

        stores.delete_category(&category.id).unwrap();
        assert!(stores.categories.items().is_empty());
        assert_eq!(stores.links.category_of(&diagram.id), None);
    }

    #[test]
    fn test_link_update_replaces_old_link() {
        let mut stores = stores();
        let a = stores.categories.create("a".into(), None).unwrap();
        let b = stores.categories.create("b".into(), None).unwrap();
        let diagram = stores.diagrams.create("d".into(), String::new()).unwrap();
        stores.links.add(&diagram.id, &a.id).unwrap();

        stores.links.update(&diagram.id, &a.id, &b.id).unwrap();
        assert_eq!(stores.links.items().len(), 1);
        assert_eq!(stores.links.category_of(&diagram.id), Some(b.id.as_str()));
    }

    #[test]
    fn test_reorder_resorts_items() {
        let mut stores = stores();
        let a = stores.categories.create("a".into(), None).unwrap();
        let b = stores.categories.create("b".into(), None).unwrap();
        stores
            .categories
            .reorder(&[(a.id.clone(), 2000.0), (b.id.clone(), 1000.0)])
            .unwrap();
        let names: Vec<&str> = stores
            .categories
            .items()
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["b", "a"]);
    }
}
