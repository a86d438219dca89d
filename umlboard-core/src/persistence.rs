//! Persistence adapter for drag-and-drop outcomes
//!
//! The reconciler describes what must be written as `PersistOp` values;
//! `dispatch` performs them against the stores. Writes are fire-and-forget:
//! a failure is logged and reported back, never retried, and the
//! optimistic view is not rolled back.

use anyhow::Result;
use std::fmt;

use crate::models::{CategoryPatch, DiagramPatch};
use crate::store::Stores;

/// A single storage mutation requested by a drop
#[derive(Debug, Clone, PartialEq)]
pub enum PersistOp {
    UpdateCategoryPosition { category_id: String, position: f64 },
    /// Bulk category positions, written in one transaction
    ReorderCategories(Vec<(String, f64)>),
    AddLink { diagram_id: String, category_id: String },
    UpdateLink { diagram_id: String, from: String, to: String },
    RemoveLink { diagram_id: String, category_id: String },
    UpdateDiagramPosition { diagram_id: String, position: f64 },
    /// Bulk diagram positions, written in one transaction
    RespaceDiagrams(Vec<(String, f64)>),
}

impl fmt::Display for PersistOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistOp::UpdateCategoryPosition {
                category_id,
                position,
            } => write!(f, "move category {} to {}", category_id, position),
            PersistOp::ReorderCategories(positions) => {
                write!(f, "respace {} categories", positions.len())
            }
            PersistOp::AddLink {
                diagram_id,
                category_id,
            } => write!(f, "add diagram {} to category {}", diagram_id, category_id),
            PersistOp::UpdateLink {
                diagram_id,
                from,
                to,
            } => write!(f, "move diagram {} from category {} to {}", diagram_id, from, to),
            PersistOp::RemoveLink {
                diagram_id,
                category_id,
            } => write!(
                f,
                "remove diagram {} from category {}",
                diagram_id, category_id
            ),
            PersistOp::UpdateDiagramPosition {
                diagram_id,
                position,
            } => write!(f, "move diagram {} to {}", diagram_id, position),
            PersistOp::RespaceDiagrams(positions) => {
                write!(f, "respace {} diagrams", positions.len())
            }
        }
    }
}

/// A write that did not make it to storage
#[derive(Debug, Clone)]
pub struct PersistFailure {
    pub op: PersistOp,
    pub error: String,
}

impl fmt::Display for PersistFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failed to {}: {}", self.op, self.error)
    }
}

/// Performs one operation through the owning store
pub fn apply(stores: &mut Stores, op: &PersistOp) -> Result<()> {
    match op {
        PersistOp::UpdateCategoryPosition {
            category_id,
            position,
        } => {
            stores
                .categories
                .update(category_id, &CategoryPatch::position(*position))?;
        }
        PersistOp::ReorderCategories(positions) => stores.categories.reorder(positions)?,
        PersistOp::AddLink {
            diagram_id,
            category_id,
        } => {
            stores.links.add(diagram_id, category_id)?;
        }
        PersistOp::UpdateLink {
            diagram_id,
            from,
            to,
        } => {
            stores.links.update(diagram_id, from, to)?;
        }
        PersistOp::RemoveLink {
            diagram_id,
            category_id,
        } => stores.links.remove(diagram_id, category_id)?,
        PersistOp::UpdateDiagramPosition {
            diagram_id,
            position,
        } => {
            stores
                .diagrams
                .update(diagram_id, &DiagramPatch::position(*position))?;
        }
        PersistOp::RespaceDiagrams(positions) => stores.diagrams.reorder(positions)?,
    }
    Ok(())
}

/// Performs every operation independently; one failure does not stop the
/// rest. Returns the failures so user-facing callers can notify.
pub fn dispatch(stores: &mut Stores, ops: Vec<PersistOp>) -> Vec<PersistFailure> {
    let mut failures = Vec::new();
    for op in ops {
        match apply(stores, &op) {
            Ok(()) => log::debug!("Persisted: {}", op),
            Err(e) => {
                log::error!("Failed to {}: {:#}", op, e);
                failures.push(PersistFailure {
                    op,
                    error: format!("{:#}", e),
                });
            }
        }
    }
    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteBackend;
    use crate::store::tests::FailingBackend;
    use std::sync::Arc;

    #[test]
    fn test_dispatch_writes_through_stores() {
        let mut stores = Stores::new(Arc::new(SqliteBackend::in_memory().unwrap()));
        stores.load_all().unwrap();
        let category = stores.categories.create("c".into(), None).unwrap();
        let diagram = stores.diagrams.create("d".into(), String::new()).unwrap();

        let failures = dispatch(
            &mut stores,
            vec![
                PersistOp::AddLink {
                    diagram_id: diagram.id.clone(),
                    category_id: category.id.clone(),
                },
                PersistOp::UpdateDiagramPosition {
                    diagram_id: diagram.id.clone(),
                    position: 42.0,
                },
                PersistOp::UpdateCategoryPosition {
                    category_id: category.id.clone(),
                    position: 7.0,
                },
            ],
        );

        assert!(failures.is_empty());
        assert_eq!(stores.links.category_of(&diagram.id), Some(category.id.as_str()));
        assert_eq!(stores.diagrams.get(&diagram.id).unwrap().position, 42.0);
        assert_eq!(stores.categories.get(&category.id).unwrap().position, 7.0);
    }

    #[test]
    fn test_failures_are_reported_not_raised() {
        let mut stores = Stores::new(Arc::new(FailingBackend));
        let failures = dispatch(
            &mut stores,
            vec![
                PersistOp::AddLink {
                    diagram_id: "d".into(),
                    category_id: "c".into(),
                },
                PersistOp::ReorderCategories(vec![("c".into(), 1000.0)]),
            ],
        );
        assert_eq!(failures.len(), 2);
        assert!(failures[0].to_string().starts_with("Failed to add diagram d"));
        assert!(stores.links.items().is_empty());
    }

    #[test]
    fn test_later_ops_run_after_a_failure() {
        let mut stores = Stores::new(Arc::new(SqliteBackend::in_memory().unwrap()));
        let diagram = stores.diagrams.create("d".into(), String::new()).unwrap();

        let failures = dispatch(
            &mut stores,
            vec![
                PersistOp::RemoveLink {
                    diagram_id: diagram.id.clone(),
                    category_id: "never-linked".into(),
                },
                PersistOp::UpdateDiagramPosition {
                    diagram_id: diagram.id.clone(),
                    position: 5.0,
                },
            ],
        );
        assert_eq!(failures.len(), 1);
        assert_eq!(stores.diagrams.get(&diagram.id).unwrap().position, 5.0);
    }
}
