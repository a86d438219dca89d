pub mod board;
pub mod config;
pub mod db;
pub mod debounce;
pub mod dnd;
pub mod models;
pub mod persistence;
pub mod position;
pub mod render;
pub mod storage;
pub mod store;
pub mod view;

// Re-export commonly used types
pub use board::{Board, DropReport};
pub use config::{determine_database_path, get_config_dir, get_config_path, AppConfig};
pub use debounce::Debouncer;
pub use dnd::{DndReconciler, DragState, DropKind, DropOutcome, DropRejection, Entities};
pub use models::{
    Category, CategoryLink, CategoryPatch, Diagram, DiagramKind, DiagramPatch, DiagramSyntax,
    WorkspaceSnapshot,
};
pub use persistence::{PersistFailure, PersistOp};
pub use render::{encode_plantuml, RenderClient, RenderError, RenderResult, RenderWorker, Renderer};
pub use store::{CategoryStore, DiagramStore, LinkStore, Stores};
pub use view::{
    derive_view, view_state, CategoryKey, CategoryView, DiagramKey, DndId, KeyParseError,
    ViewState,
};
