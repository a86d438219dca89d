//! One open workspace: the stores plus the drag-and-drop reconciler

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::{self, DatabaseBackend};
use crate::dnd::{DndReconciler, DragState, DropOutcome, Entities};
use crate::persistence::{self, PersistFailure};
use crate::store::Stores;
use crate::view::{CategoryView, DndId, ViewState};

/// What a finished drop did, and which writes did not make it
#[derive(Debug)]
pub struct DropReport {
    pub outcome: DropOutcome,
    pub failures: Vec<PersistFailure>,
}

impl DropReport {
    pub fn is_clean(&self) -> bool {
        self.outcome.is_applied() && self.failures.is_empty()
    }
}

pub struct Board {
    pub stores: Stores,
    dnd: DndReconciler,
}

impl Board {
    pub fn new(backend: Arc<dyn DatabaseBackend>, min_gap: f64) -> Self {
        Self {
            stores: Stores::new(backend),
            dnd: DndReconciler::new(min_gap),
        }
    }

    /// Opens (creating if needed) the database at `path` and loads it.
    ///
    /// A failed load still yields a usable, empty board; the error is
    /// returned alongside for the caller to show.
    pub fn open(path: &Path, config: &AppConfig) -> Result<(Self, Option<anyhow::Error>)> {
        let backend = db::open_or_create(path, None)?;
        let mut board = Self::new(backend, config.min_position_gap);
        let load_error = board.reload().err();
        Ok((board, load_error))
    }

    pub fn backend(&self) -> Arc<dyn DatabaseBackend> {
        self.stores.backend()
    }

    pub fn reload(&mut self) -> Result<()> {
        let result = self.stores.load_all();
        self.dnd.sync(&self.stores);
        result
    }

    /// Current view, re-derived if any store changed
    pub fn view(&mut self) -> &CategoryView {
        self.dnd.sync(&self.stores);
        self.dnd.view()
    }

    pub fn view_state(&mut self) -> ViewState {
        if self.stores.all_loaded() {
            ViewState::Ready(self.view().clone())
        } else {
            ViewState::Loading
        }
    }

    pub fn drag_state(&self) -> &DragState {
        self.dnd.state()
    }

    pub fn drag_start(&mut self, active: DndId) {
        self.dnd.sync(&self.stores);
        self.dnd.drag_start(active);
    }

    pub fn drag_cancel(&mut self) {
        self.dnd.drag_cancel();
    }

    /// Ends the current drag and persists whatever it changed
    pub fn drop_on(&mut self, over: Option<&DndId>) -> DropReport {
        let outcome = self.dnd.drop_on(over, Entities::of(&self.stores));
        self.persist(outcome)
    }

    /// A complete drag of `active` onto `over` in one call
    pub fn move_item(&mut self, active: DndId, over: &DndId) -> DropReport {
        self.drag_start(active);
        self.drop_on(Some(over))
    }

    fn persist(&mut self, outcome: DropOutcome) -> DropReport {
        let failures = persistence::dispatch(&mut self.stores, outcome.ops().to_vec());
        DropReport { outcome, failures }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteBackend;
    use crate::models::DiagramPatch;
    use crate::position::DEFAULT_MIN_GAP;
    use crate::store::tests::FailingBackend;
    use crate::view::{CategoryKey, DiagramKey};
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_and_loads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("board.db");
        let (mut board, error) = Board::open(&path, &AppConfig::default()).unwrap();

        assert!(error.is_none());
        assert!(path.exists());
        assert!(!board.view_state().is_loading());
        assert!(board.view().bucket(&CategoryKey::Default).is_empty());
    }

    #[test]
    fn test_move_persists_and_rederives() {
        let mut board = Board::new(
            Arc::new(SqliteBackend::in_memory().unwrap()),
            DEFAULT_MIN_GAP,
        );
        board.reload().unwrap();
        let category = board.stores.categories.create("C".into(), None).unwrap();
        let diagram = board
            .stores
            .diagrams
            .create("D".into(), String::new())
            .unwrap();

        let target = CategoryKey::Category(category.id.clone());
        let report = board.move_item(
            format!("diagram-default#{}", diagram.id).parse().unwrap(),
            &DndId::Category(target.clone()),
        );

        assert!(report.is_clean());
        assert_eq!(
            board.stores.links.category_of(&diagram.id),
            Some(category.id.as_str())
        );
        assert_eq!(board.view().bucket(&target).len(), 1);
    }

    #[test]
    fn test_failed_writes_keep_optimistic_view() {
        let backend = Arc::new(SqliteBackend::in_memory().unwrap());
        let mut board = Board::new(backend.clone(), DEFAULT_MIN_GAP);
        board.reload().unwrap();
        let category = board.stores.categories.create("C".into(), None).unwrap();
        let diagram = board
            .stores
            .diagrams
            .create("D".into(), String::new())
            .unwrap();
        board.view();

        // Deleted behind the store's back, so the link insert fails
        backend.delete_category(&category.id).unwrap();

        let target = CategoryKey::Category(category.id.clone());
        let report = board.move_item(
            DndId::Diagram(DiagramKey::new(CategoryKey::Default, diagram.id.clone())),
            &DndId::Category(target.clone()),
        );

        assert!(report.outcome.is_applied());
        assert_eq!(report.failures.len(), 1);
        assert!(board.stores.links.items().is_empty());
        assert_eq!(board.view().bucket(&target).len(), 1);
    }

    #[test]
    fn test_restore_after_respacing_keeps_positions_unique() {
        let mut board = Board::new(
            Arc::new(SqliteBackend::in_memory().unwrap()),
            DEFAULT_MIN_GAP,
        );
        board.reload().unwrap();
        let mut ids = Vec::new();
        for name in ["a", "t", "x", "y"] {
            let d = board.stores.diagrams.create(name.into(), String::new()).unwrap();
            ids.push(d.id);
        }
        let (a, t, x, y) = (&ids[0], &ids[1], &ids[2], &ids[3]);
        let squeeze = |board: &mut Board| {
            board
                .stores
                .diagrams
                .update(x, &DiagramPatch::position(1000.0 + 1e-9))
                .unwrap();
        };
        let key = |id: &String| DndId::Diagram(DiagramKey::new(CategoryKey::Default, id.clone()));

        board
            .stores
            .diagrams
            .reorder(&[(a.clone(), 1000.0), (t.clone(), 5000.0), (y.clone(), 6000.0)])
            .unwrap();
        squeeze(&mut board);
        assert!(board.move_item(key(y), &key(x)).is_clean());
        assert_eq!(board.stores.diagrams.get(y).unwrap().position, 2000.0);

        board.stores.diagrams.delete(y).unwrap();
        squeeze(&mut board);
        assert!(board.move_item(key(t), &key(x)).is_clean());
        assert_eq!(board.stores.diagrams.get(t).unwrap().position, 2000.0);

        board.stores.diagrams.restore(y).unwrap();
        let mut positions: Vec<f64> = board.stores.diagrams.live().map(|d| d.position).collect();
        let count = positions.len();
        positions.dedup();
        assert_eq!(count, 4);
        assert_eq!(positions.len(), count, "duplicate live positions");

        let order: Vec<&str> = board
            .view()
            .bucket(&CategoryKey::Default)
            .iter()
            .map(|k| k.id.as_str())
            .collect();
        assert_eq!(order, vec![a.as_str(), t.as_str(), x.as_str(), y.as_str()]);
    }

    #[test]
    fn test_failed_load_leaves_empty_board() {
        let mut board = Board::new(Arc::new(FailingBackend), DEFAULT_MIN_GAP);
        assert!(board.reload().is_err());
        assert!(!board.view_state().is_loading());
        assert_eq!(board.view().diagram_count(), 0);
    }
}
