//! Drag-and-drop reconciliation
//!
//! A drop is classified from the dragged key and the key it lands on,
//! applied optimistically to the reconciler's own copy of the view, and
//! turned into `PersistOp`s for the persistence adapter.
//!
//! Items dropped onto a sibling land immediately before it, so the
//! reordered view and the positions written to storage always agree.

use thiserror::Error;

use crate::models::{Category, Diagram};
use crate::persistence::PersistOp;
use crate::position;
use crate::store::Stores;
use crate::view::{derive_view, CategoryKey, CategoryView, DiagramKey, DndId};

#[derive(Debug, Clone, PartialEq, Default)]
pub enum DragState {
    #[default]
    Idle,
    Dragging(DndId),
}

/// A drop that is refused outright and leaves everything untouched
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DropRejection {
    #[error("Categories cannot be dropped onto the uncategorized bucket")]
    CategoryOntoDefault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropKind {
    CategoryReorder,
    /// Diagram dropped onto a category header
    DiagramMove,
    /// Diagram dropped onto another diagram
    DiagramReorder,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DropOutcome {
    NoOp,
    Rejected(DropRejection),
    Applied { kind: DropKind, ops: Vec<PersistOp> },
}

impl DropOutcome {
    pub fn ops(&self) -> &[PersistOp] {
        match self {
            DropOutcome::Applied { ops, .. } => ops,
            _ => &[],
        }
    }

    pub fn into_ops(self) -> Vec<PersistOp> {
        match self {
            DropOutcome::Applied { ops, .. } => ops,
            _ => Vec::new(),
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, DropOutcome::Applied { .. })
    }
}

/// The store contents a drop is resolved against
#[derive(Debug, Clone, Copy)]
pub struct Entities<'a> {
    pub categories: &'a [Category],
    pub diagrams: &'a [Diagram],
}

impl<'a> Entities<'a> {
    pub fn of(stores: &'a Stores) -> Self {
        Self {
            categories: stores.categories.items(),
            diagrams: stores.diagrams.items(),
        }
    }

    fn category(&self, id: &str) -> Option<&'a Category> {
        self.categories.iter().find(|c| c.id == id)
    }

    fn live_diagram(&self, id: &str) -> Option<&'a Diagram> {
        self.diagrams.iter().find(|d| d.id == id && !d.is_deleted)
    }

    fn bucket_exists(&self, key: &CategoryKey) -> bool {
        match key {
            CategoryKey::Default => true,
            CategoryKey::Category(id) => self.category(id).is_some(),
        }
    }
}

/// Owns the optimistic view and turns drops into persistence work
#[derive(Debug)]
pub struct DndReconciler {
    state: DragState,
    view: CategoryView,
    synced_revision: Option<u64>,
    min_gap: f64,
}

impl Default for DndReconciler {
    fn default() -> Self {
        Self::new(position::DEFAULT_MIN_GAP)
    }
}

impl DndReconciler {
    /// `min_gap` is the smallest neighbour spacing tolerated before a
    /// drop respaces the whole list
    pub fn new(min_gap: f64) -> Self {
        Self {
            state: DragState::Idle,
            view: CategoryView::default(),
            synced_revision: None,
            min_gap,
        }
    }

    pub fn view(&self) -> &CategoryView {
        &self.view
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    /// Re-derives the view when any store changed since the last sync.
    ///
    /// Returns true when the view was rebuilt. While the stores are still
    /// loading the view is left empty.
    pub fn sync(&mut self, stores: &Stores) -> bool {
        if !stores.all_loaded() {
            self.view = CategoryView::default();
            self.synced_revision = None;
            return false;
        }
        let revision = stores.revision();
        if self.synced_revision == Some(revision) {
            return false;
        }
        self.view = derive_view(
            stores.categories.items(),
            stores.diagrams.items(),
            stores.links.items(),
        );
        self.synced_revision = Some(revision);
        true
    }

    pub fn drag_start(&mut self, active: DndId) {
        log::trace!("Drag started: {}", active);
        self.state = DragState::Dragging(active);
    }

    /// Abandons the current drag; nothing changes
    pub fn drag_cancel(&mut self) {
        self.state = DragState::Idle;
    }

    /// Ends the current drag over `over`, or over nothing
    pub fn drop_on(&mut self, over: Option<&DndId>, entities: Entities<'_>) -> DropOutcome {
        let active = match std::mem::take(&mut self.state) {
            DragState::Dragging(active) => active,
            DragState::Idle => return DropOutcome::NoOp,
        };
        match over {
            Some(over) => self.handle_drop(&active, over, entities),
            None => DropOutcome::NoOp,
        }
    }

    /// Classifies and applies one drop of `active` onto `over`
    pub fn handle_drop(
        &mut self,
        active: &DndId,
        over: &DndId,
        entities: Entities<'_>,
    ) -> DropOutcome {
        if active == over {
            return DropOutcome::NoOp;
        }
        let outcome = match (active, over) {
            (DndId::Category(CategoryKey::Category(id)), DndId::Category(target)) => {
                self.reorder_category(id, target, entities)
            }
            (DndId::Diagram(diagram), DndId::Category(target)) => {
                self.move_diagram(diagram, target, entities)
            }
            (DndId::Diagram(diagram), DndId::Diagram(target)) => {
                self.reorder_diagram(diagram, target, entities)
            }
            // The default anchor is not draggable, and categories do not
            // nest inside diagram lists
            (DndId::Category(_), _) => DropOutcome::NoOp,
        };

        match &outcome {
            DropOutcome::NoOp => log::debug!("Ignored drop of {} onto {}", active, over),
            DropOutcome::Rejected(reason) => {
                log::warn!("Rejected drop of {} onto {}: {}", active, over, reason)
            }
            DropOutcome::Applied { ops, .. } => {
                log::debug!("Dropped {} onto {} ({} writes)", active, over, ops.len())
            }
        }
        outcome
    }

    fn reorder_category(
        &mut self,
        id: &str,
        target: &CategoryKey,
        entities: Entities<'_>,
    ) -> DropOutcome {
        let target_id = match target {
            CategoryKey::Default => {
                return DropOutcome::Rejected(DropRejection::CategoryOntoDefault)
            }
            CategoryKey::Category(target_id) => target_id,
        };
        if entities.category(id).is_none() || entities.category(target_id).is_none() {
            return DropOutcome::NoOp;
        }

        let mut others: Vec<&Category> =
            entities.categories.iter().filter(|c| c.id != id).collect();
        others.sort_by(|a, b| a.position.total_cmp(&b.position));
        let Some(index) = others.iter().position(|c| &c.id == target_id) else {
            return DropOutcome::NoOp;
        };
        let neighbours: Vec<(&str, f64)> =
            others.iter().map(|c| (c.id.as_str(), c.position)).collect();
        let op = match self.place_before(id, index, &neighbours) {
            Placement::At(position) => PersistOp::UpdateCategoryPosition {
                category_id: id.to_string(),
                position,
            },
            Placement::Respace(positions) => PersistOp::ReorderCategories(positions),
        };

        let moved = CategoryKey::Category(id.to_string());
        self.view.category_ids.retain(|k| k != &moved);
        let at = self
            .view
            .category_ids
            .iter()
            .position(|k| k == target)
            .unwrap_or(self.view.category_ids.len());
        self.view.category_ids.insert(at, moved);

        DropOutcome::Applied {
            kind: DropKind::CategoryReorder,
            ops: vec![op],
        }
    }

    fn move_diagram(
        &mut self,
        diagram: &DiagramKey,
        target: &CategoryKey,
        entities: Entities<'_>,
    ) -> DropOutcome {
        if entities.live_diagram(&diagram.id).is_none() || !entities.bucket_exists(target) {
            return DropOutcome::NoOp;
        }
        if &diagram.parent == target {
            return DropOutcome::NoOp;
        }

        let ops = link_op(&diagram.id, &diagram.parent, target)
            .into_iter()
            .collect();

        self.view
            .bucket_mut(&diagram.parent)
            .retain(|k| k.id != diagram.id);
        self.view
            .bucket_mut(target)
            .push(DiagramKey::new(target.clone(), diagram.id.clone()));

        DropOutcome::Applied {
            kind: DropKind::DiagramMove,
            ops,
        }
    }

    fn reorder_diagram(
        &mut self,
        diagram: &DiagramKey,
        target: &DiagramKey,
        entities: Entities<'_>,
    ) -> DropOutcome {
        if diagram.id == target.id {
            return DropOutcome::NoOp;
        }
        if entities.live_diagram(&diagram.id).is_none()
            || entities.live_diagram(&target.id).is_none()
            || !entities.bucket_exists(&target.parent)
        {
            return DropOutcome::NoOp;
        }

        // Positions are global across buckets, so neighbours are too
        let mut others: Vec<&Diagram> = entities
            .diagrams
            .iter()
            .filter(|d| !d.is_deleted && d.id != diagram.id)
            .collect();
        others.sort_by(|a, b| a.position.total_cmp(&b.position));
        let Some(index) = others.iter().position(|d| d.id == target.id) else {
            return DropOutcome::NoOp;
        };
        let neighbours: Vec<(&str, f64)> =
            others.iter().map(|d| (d.id.as_str(), d.position)).collect();

        let mut ops: Vec<PersistOp> = link_op(&diagram.id, &diagram.parent, &target.parent)
            .into_iter()
            .collect();
        ops.push(match self.place_before(&diagram.id, index, &neighbours) {
            Placement::At(position) => PersistOp::UpdateDiagramPosition {
                diagram_id: diagram.id.clone(),
                position,
            },
            Placement::Respace(positions) => PersistOp::RespaceDiagrams(positions),
        });

        self.view
            .bucket_mut(&diagram.parent)
            .retain(|k| k.id != diagram.id);
        let list = self.view.bucket_mut(&target.parent);
        let at = list
            .iter()
            .position(|k| k.id == target.id)
            .unwrap_or(list.len());
        list.insert(at, DiagramKey::new(target.parent.clone(), diagram.id.clone()));

        DropOutcome::Applied {
            kind: DropKind::DiagramReorder,
            ops,
        }
    }

    /// Position for `id` inserted before `neighbours[index]`, where
    /// `neighbours` is the sorted list without `id` itself
    fn place_before(&self, id: &str, index: usize, neighbours: &[(&str, f64)]) -> Placement {
        let lower = if index == 0 {
            0.0
        } else {
            neighbours[index - 1].1
        };
        let upper = neighbours[index].1;

        if position::needs_respacing(lower, upper, self.min_gap) {
            let mut order: Vec<&str> = neighbours.iter().map(|(id, _)| *id).collect();
            order.insert(index, id);
            log::info!("Respacing {} items after gap fell below {}", order.len(), self.min_gap);
            Placement::Respace(position::respace(order))
        } else {
            Placement::At(position::allocate(lower, Some(upper)))
        }
    }
}

enum Placement {
    At(f64),
    Respace(Vec<(String, f64)>),
}

/// Link change needed to move a diagram from `origin` to `destination`
fn link_op(diagram_id: &str, origin: &CategoryKey, destination: &CategoryKey) -> Option<PersistOp> {
    match (origin, destination) {
        (CategoryKey::Default, CategoryKey::Default) => None,
        (CategoryKey::Default, CategoryKey::Category(to)) => Some(PersistOp::AddLink {
            diagram_id: diagram_id.to_string(),
            category_id: to.clone(),
        }),
        (CategoryKey::Category(from), CategoryKey::Category(to)) if from == to => None,
        (CategoryKey::Category(from), CategoryKey::Category(to)) => Some(PersistOp::UpdateLink {
            diagram_id: diagram_id.to_string(),
            from: from.clone(),
            to: to.clone(),
        }),
        (CategoryKey::Category(from), CategoryKey::Default) => Some(PersistOp::RemoveLink {
            diagram_id: diagram_id.to_string(),
            category_id: from.clone(),
        }),
    }
}
