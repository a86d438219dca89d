//! Diagram rendering collaborator
//!
//! PlantUML sources are rendered remotely by a PlantUML server. Rendering
//! happens off the UI thread through `RenderWorker`.

pub mod client;
pub mod worker;

pub use client::{encode_plantuml, RenderClient};
pub use worker::{RenderResult, RenderWorker};

use thiserror::Error;

use crate::models::DiagramSyntax;

/// Errors that can occur while rendering a diagram
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("{0} diagrams cannot be rendered by the PlantUML server")]
    Unsupported(DiagramSyntax),

    #[error("Nothing to render")]
    Empty,

    #[error("Failed to encode diagram source: {0}")]
    Encode(String),

    #[error("Render server returned HTTP {0}")]
    Status(u16),

    #[error("Render request failed: {0}")]
    Transport(String),

    #[error("Renderer stopped")]
    Stopped,
}

/// Anything that turns diagram source into SVG bytes
pub trait Renderer: Send + 'static {
    fn render_svg(&self, source: &str) -> Result<Vec<u8>, RenderError>;
}
