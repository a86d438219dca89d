//! SQLite database storage backend
//!
//! Rows live in three tables: `categories`, `uml_projects` (diagrams) and
//! the `content_categories` join table. Foreign keys cascade so deleting a
//! category or purging a diagram drops its links.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::models::{
    Category, CategoryLink, CategoryPatch, Diagram, DiagramKind, DiagramPatch, WorkspaceSnapshot,
};

use super::traits::{BackendType, DatabaseBackend, DatabaseConfig};

/// Current schema version
const SCHEMA_VERSION: i32 = 1;

const CATEGORY_COLUMNS: &str = "id, name, description, position, created_at, updated_at";
const DIAGRAM_COLUMNS: &str =
    "id, name, content, position, created_at, updated_at, is_deleted, type";

/// SQLite backend implementation
pub struct SqliteBackend {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Creates a new SQLite backend with WAL mode enabled
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::with_config(&DatabaseConfig {
            path: path.as_ref().to_path_buf(),
            backend_type: BackendType::Sqlite,
            wal_mode: true,
        })
    }

    /// Creates a backend from an explicit configuration
    pub fn with_config(config: &DatabaseConfig) -> Result<Self> {
        let path = config.path.clone();

        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open SQLite database {:?}", path))?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        }
        Self::from_connection(path, conn)
    }

    /// Opens a private in-memory database
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(PathBuf::from(":memory:"), conn)
    }

    fn from_connection(path: PathBuf, conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        let backend = Self {
            path,
            conn: Mutex::new(conn),
        };

        backend.init_schema()?;
        Ok(backend)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("SQLite connection lock poisoned"))
    }

    /// Initialize the database schema
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn()?;

        // Check current schema version
        let current_version: i32 = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .unwrap_or(0);

        if current_version == 0 {
            conn.execute_batch(include_str!("schema.sql"))?;
        } else if current_version < SCHEMA_VERSION {
            anyhow::bail!(
                "Database schema version {} is outdated, expected {}",
                current_version,
                SCHEMA_VERSION
            );
        }

        Ok(())
    }

    /// Runs `body` between BEGIN and COMMIT, rolling back on any failure
    fn in_transaction<T>(conn: &Connection, body: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        conn.execute_batch("BEGIN TRANSACTION")?;
        let result = body(conn).and_then(|value| {
            conn.execute_batch("COMMIT")?;
            Ok(value)
        });
        if result.is_err() {
            if let Err(e) = conn.execute_batch("ROLLBACK") {
                log::error!("ROLLBACK failed: {}", e);
            }
        }
        result
    }

    fn parse_timestamp(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }

    fn row_to_category(row: &Row<'_>) -> rusqlite::Result<Category> {
        let created_at: String = row.get(4)?;
        let updated_at: String = row.get(5)?;
        Ok(Category {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            position: row.get(3)?,
            created_at: Self::parse_timestamp(&created_at),
            updated_at: Self::parse_timestamp(&updated_at),
        })
    }

    fn row_to_diagram(row: &Row<'_>) -> rusqlite::Result<Diagram> {
        let created_at: String = row.get(4)?;
        let updated_at: String = row.get(5)?;
        let kind: String = row.get(7)?;
        Ok(Diagram {
            id: row.get(0)?,
            name: row.get(1)?,
            content: row.get(2)?,
            position: row.get(3)?,
            created_at: Self::parse_timestamp(&created_at),
            updated_at: Self::parse_timestamp(&updated_at),
            is_deleted: row.get(6)?,
            kind: DiagramKind::from_str_lossy(&kind),
        })
    }

    fn query_categories(conn: &Connection) -> Result<Vec<Category>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM categories ORDER BY position, id",
            CATEGORY_COLUMNS
        ))?;
        let rows = stmt.query_map([], Self::row_to_category)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read categories")
    }

    fn query_diagrams(conn: &Connection, include_deleted: bool) -> Result<Vec<Diagram>> {
        let filter = if include_deleted {
            ""
        } else {
            "WHERE is_deleted = 0"
        };
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM uml_projects {} ORDER BY position, id",
            DIAGRAM_COLUMNS, filter
        ))?;
        let rows = stmt.query_map([], Self::row_to_diagram)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read diagrams")
    }

    fn query_links(conn: &Connection) -> Result<Vec<CategoryLink>> {
        let mut stmt = conn.prepare(
            "SELECT project_id, category_id FROM content_categories ORDER BY rowid",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(CategoryLink {
                diagram_id: row.get(0)?,
                category_id: row.get(1)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read category links")
    }

    fn query_category(conn: &Connection, id: &str) -> Result<Option<Category>> {
        conn.query_row(
            &format!("SELECT {} FROM categories WHERE id = ?1", CATEGORY_COLUMNS),
            [id],
            Self::row_to_category,
        )
        .optional()
        .map_err(|e| e.into())
    }

    fn query_diagram(conn: &Connection, id: &str) -> Result<Option<Diagram>> {
        conn.query_row(
            &format!("SELECT {} FROM uml_projects WHERE id = ?1", DIAGRAM_COLUMNS),
            [id],
            Self::row_to_diagram,
        )
        .optional()
        .map_err(|e| e.into())
    }

    fn write_category(conn: &Connection, category: &Category) -> Result<()> {
        conn.execute(
            "INSERT INTO categories (id, name, description, position, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                category.id,
                category.name,
                category.description,
                category.position,
                category.created_at.to_rfc3339(),
                category.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn write_diagram(conn: &Connection, diagram: &Diagram) -> Result<()> {
        conn.execute(
            "INSERT INTO uml_projects
             (id, name, content, position, created_at, updated_at, is_deleted, type)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                diagram.id,
                diagram.name,
                diagram.content,
                diagram.position,
                diagram.created_at.to_rfc3339(),
                diagram.updated_at.to_rfc3339(),
                diagram.is_deleted,
                diagram.kind.as_str(),
            ],
        )?;
        Ok(())
    }

    /// Executes `UPDATE <table> SET <assignments>, updated_at = ? WHERE id = ?`
    fn update_columns(
        conn: &Connection,
        table: &str,
        id: &str,
        mut columns: Vec<(&'static str, Value)>,
    ) -> Result<usize> {
        columns.push(("updated_at", Value::Text(Utc::now().to_rfc3339())));
        let assignments: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, (name, _))| format!("{} = ?{}", name, i + 1))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?{}",
            table,
            assignments.join(", "),
            columns.len() + 1
        );
        let mut values: Vec<Value> = columns.into_iter().map(|(_, v)| v).collect();
        values.push(Value::Text(id.to_string()));
        Ok(conn.execute(&sql, params_from_iter(values.iter()))?)
    }
}

impl DatabaseBackend for SqliteBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Sqlite
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<WorkspaceSnapshot> {
        let conn = self.conn()?;

        Ok(WorkspaceSnapshot {
            categories: Self::query_categories(&conn)?,
            diagrams: Self::query_diagrams(&conn, true)?,
            links: Self::query_links(&conn)?,
        })
    }

    fn save(&self, snapshot: &WorkspaceSnapshot) -> Result<()> {
        let conn = self.conn()?;

        Self::in_transaction(&conn, |conn| {
            // Clear existing data; links go first because of the foreign keys
            conn.execute("DELETE FROM content_categories", [])?;
            conn.execute("DELETE FROM uml_projects", [])?;
            conn.execute("DELETE FROM categories", [])?;

            for category in &snapshot.categories {
                Self::write_category(conn, category)?;
            }
            for diagram in &snapshot.diagrams {
                Self::write_diagram(conn, diagram)?;
            }
            for link in &snapshot.links {
                conn.execute(
                    "INSERT OR IGNORE INTO content_categories (project_id, category_id)
                     VALUES (?1, ?2)",
                    params![link.diagram_id, link.category_id],
                )?;
            }
            Ok(())
        })
    }

    // Row-level overrides

    fn list_categories(&self) -> Result<Vec<Category>> {
        let conn = self.conn()?;
        Self::query_categories(&conn)
    }

    fn get_category(&self, id: &str) -> Result<Option<Category>> {
        let conn = self.conn()?;
        Self::query_category(&conn, id)
    }

    fn insert_category(&self, category: &Category) -> Result<()> {
        let conn = self.conn()?;
        Self::write_category(&conn, category)
            .with_context(|| format!("Failed to insert category {}", category.id))
    }

    fn patch_category(&self, id: &str, patch: &CategoryPatch) -> Result<Category> {
        let conn = self.conn()?;

        let mut columns = Vec::new();
        if let Some(name) = &patch.name {
            columns.push(("name", Value::Text(name.clone())));
        }
        if let Some(description) = &patch.description {
            let value = match description {
                Some(text) => Value::Text(text.clone()),
                None => Value::Null,
            };
            columns.push(("description", value));
        }
        if let Some(position) = patch.position {
            columns.push(("position", Value::Real(position)));
        }

        if Self::update_columns(&conn, "categories", id, columns)? == 0 {
            anyhow::bail!("Category not found: {}", id)
        }
        Self::query_category(&conn, id)?
            .ok_or_else(|| anyhow::anyhow!("Category not found: {}", id))
    }

    fn delete_category(&self, id: &str) -> Result<()> {
        let conn = self.conn()?;
        let rows_affected = conn.execute("DELETE FROM categories WHERE id = ?1", [id])?;
        if rows_affected == 0 {
            anyhow::bail!("Category not found: {}", id)
        }
        Ok(())
    }

    fn reorder_categories(&self, positions: &[(String, f64)]) -> Result<()> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        Self::in_transaction(&conn, |conn| {
            for (id, position) in positions {
                let rows_affected = conn.execute(
                    "UPDATE categories SET position = ?1, updated_at = ?2 WHERE id = ?3",
                    params![position, now, id],
                )?;
                if rows_affected == 0 {
                    anyhow::bail!("Category not found: {}", id)
                }
            }
            Ok(())
        })
    }

    fn list_diagrams(&self, include_deleted: bool) -> Result<Vec<Diagram>> {
        let conn = self.conn()?;
        Self::query_diagrams(&conn, include_deleted)
    }

    fn get_diagram(&self, id: &str) -> Result<Option<Diagram>> {
        let conn = self.conn()?;
        Self::query_diagram(&conn, id)
    }

    fn insert_diagram(&self, diagram: &Diagram) -> Result<()> {
        let conn = self.conn()?;
        Self::write_diagram(&conn, diagram)
            .with_context(|| format!("Failed to insert diagram {}", diagram.id))
    }

    fn patch_diagram(&self, id: &str, patch: &DiagramPatch) -> Result<Diagram> {
        let conn = self.conn()?;

        let mut columns = Vec::new();
        if let Some(name) = &patch.name {
            columns.push(("name", Value::Text(name.clone())));
        }
        if let Some(content) = &patch.content {
            columns.push(("content", Value::Text(content.clone())));
            columns.push((
                "type",
                Value::Text(DiagramKind::detect(content).as_str().to_string()),
            ));
        }
        if let Some(position) = patch.position {
            columns.push(("position", Value::Real(position)));
        }

        if Self::update_columns(&conn, "uml_projects", id, columns)? == 0 {
            anyhow::bail!("Diagram not found: {}", id)
        }
        Self::query_diagram(&conn, id)?.ok_or_else(|| anyhow::anyhow!("Diagram not found: {}", id))
    }

    fn set_diagram_deleted(&self, id: &str, deleted: bool) -> Result<()> {
        let conn = self.conn()?;
        let columns = vec![("is_deleted", Value::Integer(i64::from(deleted)))];
        if Self::update_columns(&conn, "uml_projects", id, columns)? == 0 {
            anyhow::bail!("Diagram not found: {}", id)
        }
        Ok(())
    }

    fn purge_diagram(&self, id: &str) -> Result<()> {
        let conn = self.conn()?;
        let rows_affected = conn.execute("DELETE FROM uml_projects WHERE id = ?1", [id])?;
        if rows_affected == 0 {
            anyhow::bail!("Diagram not found: {}", id)
        }
        Ok(())
    }

    fn reorder_diagrams(&self, positions: &[(String, f64)]) -> Result<()> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        Self::in_transaction(&conn, |conn| {
            for (id, position) in positions {
                let rows_affected = conn.execute(
                    "UPDATE uml_projects SET position = ?1, updated_at = ?2 WHERE id = ?3",
                    params![position, now, id],
                )?;
                if rows_affected == 0 {
                    anyhow::bail!("Diagram not found: {}", id)
                }
            }
            Ok(())
        })
    }

    fn list_links(&self) -> Result<Vec<CategoryLink>> {
        let conn = self.conn()?;
        Self::query_links(&conn)
    }

    fn add_link(&self, link: &CategoryLink) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO content_categories (project_id, category_id) VALUES (?1, ?2)",
            params![link.diagram_id, link.category_id],
        )
        .with_context(|| {
            format!(
                "Failed to link diagram {} to category {}",
                link.diagram_id, link.category_id
            )
        })?;
        Ok(())
    }

    fn remove_link(&self, link: &CategoryLink) -> Result<()> {
        let conn = self.conn()?;
        let rows_affected = conn.execute(
            "DELETE FROM content_categories WHERE project_id = ?1 AND category_id = ?2",
            params![link.diagram_id, link.category_id],
        )?;
        if rows_affected == 0 {
            anyhow::bail!(
                "Link not found: {} -> {}",
                link.diagram_id,
                link.category_id
            )
        }
        Ok(())
    }

    fn exists(&self) -> bool {
        // The schema is created on open, so an open backend always exists
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn seeded() -> SqliteBackend {
        let backend = SqliteBackend::in_memory().unwrap();
        let mut a = Category::new("A".into(), 1000.0);
        a.id = "a".into();
        let mut b = Category::new("B".into(), 2000.0);
        b.id = "b".into();
        backend.insert_category(&b).unwrap();
        backend.insert_category(&a).unwrap();

        let mut d = Diagram::new("d".into(), "@startuml\n@enduml".into(), 1000.0);
        d.id = "d".into();
        backend.insert_diagram(&d).unwrap();
        backend.add_link(&CategoryLink::new("d", "a")).unwrap();
        backend
    }

    #[test]
    fn test_sqlite_backend_create_and_load() {
        let temp_file = NamedTempFile::with_suffix(".db").unwrap();
        let backend = SqliteBackend::new(temp_file.path()).unwrap();

        backend.create_if_not_exists().unwrap();

        let snapshot = backend.load().unwrap();
        assert!(snapshot.categories.is_empty());
        assert!(snapshot.diagrams.is_empty());
    }

    #[test]
    fn test_sqlite_backend_save_and_load() {
        let temp_file = NamedTempFile::with_suffix(".db").unwrap();
        let backend = SqliteBackend::new(temp_file.path()).unwrap();

        let mut snapshot = WorkspaceSnapshot::new();
        snapshot.categories.push(Category::new("Drafts".into(), 1000.0));

        backend.save(&snapshot).unwrap();

        let loaded = backend.load().unwrap();
        assert_eq!(loaded.categories.len(), 1);
        assert_eq!(loaded.categories[0].name, "Drafts");
    }

    #[test]
    fn test_categories_listed_by_position() {
        let backend = seeded();
        let ids: Vec<String> = backend
            .list_categories()
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_patch_writes_only_given_columns() {
        let backend = seeded();
        let updated = backend
            .patch_category("a", &CategoryPatch::position(3000.0))
            .unwrap();
        assert_eq!(updated.position, 3000.0);
        assert_eq!(updated.name, "A");

        let diagram = backend
            .patch_diagram("d", &DiagramPatch::content("classDiagram\n".into()))
            .unwrap();
        assert_eq!(diagram.kind, DiagramKind::Class);
        assert_eq!(diagram.position, 1000.0);
    }

    #[test]
    fn test_patch_missing_row_fails() {
        let backend = seeded();
        assert!(backend
            .patch_category("nope", &CategoryPatch::position(1.0))
            .is_err());
    }

    #[test]
    fn test_reorder_rolls_back_on_missing_category() {
        let backend = seeded();
        let result = backend.reorder_categories(&[
            ("a".to_string(), 5000.0),
            ("missing".to_string(), 6000.0),
        ]);
        assert!(result.is_err());

        let a = backend.get_category("a").unwrap().unwrap();
        assert_eq!(a.position, 1000.0, "first update must be rolled back");
    }

    #[test]
    fn test_delete_category_cascades_links() {
        let backend = seeded();
        backend.delete_category("a").unwrap();
        assert!(backend.list_links().unwrap().is_empty());
        assert!(backend.get_diagram("d").unwrap().is_some());
    }

    #[test]
    fn test_soft_delete_and_purge() {
        let backend = seeded();
        backend.set_diagram_deleted("d", true).unwrap();
        assert!(backend.list_diagrams(false).unwrap().is_empty());
        assert_eq!(backend.list_diagrams(true).unwrap().len(), 1);

        backend.purge_diagram("d").unwrap();
        assert!(backend.list_diagrams(true).unwrap().is_empty());
        assert!(backend.list_links().unwrap().is_empty());
    }

    #[test]
    fn test_remove_missing_link_fails() {
        let backend = seeded();
        assert!(backend.remove_link(&CategoryLink::new("d", "b")).is_err());
        backend.remove_link(&CategoryLink::new("d", "a")).unwrap();
    }
}
