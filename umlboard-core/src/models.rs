use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Generates a fresh opaque identifier for a persisted entity
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Source dialect of a diagram
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagramSyntax {
    PlantUml,
    Mermaid,
}

impl DiagramSyntax {
    /// Guesses the dialect from the first meaningful line of the source
    pub fn detect(content: &str) -> Self {
        let first = first_meaningful_line(content);
        if first.starts_with('@') {
            return DiagramSyntax::PlantUml;
        }
        const MERMAID_HEADERS: &[&str] = &[
            "sequenceDiagram",
            "classDiagram",
            "stateDiagram",
            "erDiagram",
            "graph",
            "flowchart",
            "gantt",
            "mindmap",
            "journey",
            "pie",
            "gitGraph",
        ];
        if MERMAID_HEADERS.iter().any(|h| first.starts_with(h)) {
            DiagramSyntax::Mermaid
        } else {
            DiagramSyntax::PlantUml
        }
    }

    /// Placeholder source used for freshly created diagrams
    pub fn placeholder(&self) -> &'static str {
        match self {
            DiagramSyntax::PlantUml => "@startuml\n\n@enduml\n",
            DiagramSyntax::Mermaid => "graph TD\n    A --> B\n",
        }
    }

    /// File extension used when exporting the source
    pub fn extension(&self) -> &'static str {
        match self {
            DiagramSyntax::PlantUml => "puml",
            DiagramSyntax::Mermaid => "mmd",
        }
    }
}

impl fmt::Display for DiagramSyntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagramSyntax::PlantUml => write!(f, "PlantUML"),
            DiagramSyntax::Mermaid => write!(f, "Mermaid"),
        }
    }
}

/// Type discriminator of a diagram, used to pick an icon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DiagramKind {
    Sequence,
    Class,
    UseCase,
    Activity,
    State,
    Component,
    MindMap,
    Gantt,
    Flowchart,
    EntityRelationship,
    #[default]
    Other,
}

impl DiagramKind {
    /// Infers the kind from diagram source text
    pub fn detect(content: &str) -> Self {
        let first = first_meaningful_line(content);

        // Mermaid declares its kind on the first line
        match first.split_whitespace().next().unwrap_or("") {
            "sequenceDiagram" => return DiagramKind::Sequence,
            "classDiagram" | "classDiagram-v2" => return DiagramKind::Class,
            "stateDiagram" | "stateDiagram-v2" => return DiagramKind::State,
            "erDiagram" => return DiagramKind::EntityRelationship,
            "graph" | "flowchart" => return DiagramKind::Flowchart,
            "gantt" | "@startgantt" => return DiagramKind::Gantt,
            "mindmap" | "@startmindmap" => return DiagramKind::MindMap,
            _ => {}
        }

        if !first.starts_with("@startuml") {
            return DiagramKind::Other;
        }

        // PlantUML: look at the body for the first telling keyword
        for line in content.lines().map(str::trim) {
            let lower = line.to_lowercase();
            if lower.starts_with("participant ")
                || lower.starts_with("actor ") && lower.contains("->")
                || lower.contains("->") && !lower.starts_with(':') && !lower.contains("-->")
            {
                return DiagramKind::Sequence;
            }
            if lower.starts_with("class ")
                || lower.starts_with("interface ")
                || lower.starts_with("abstract ")
                || lower.starts_with("enum ")
            {
                return DiagramKind::Class;
            }
            if lower.starts_with("usecase ") || lower.starts_with('(') {
                return DiagramKind::UseCase;
            }
            if lower.starts_with("start") && lower.len() == 5 || lower.starts_with(':') {
                return DiagramKind::Activity;
            }
            if lower.starts_with("state ") || lower.starts_with("[*]") {
                return DiagramKind::State;
            }
            if lower.starts_with("component ") || lower.starts_with('[') {
                return DiagramKind::Component;
            }
            if lower.starts_with("actor ") {
                return DiagramKind::UseCase;
            }
        }
        DiagramKind::Other
    }

    /// Icon shown next to the diagram name in explorers
    pub fn icon(&self) -> &'static str {
        match self {
            DiagramKind::Sequence => "⇄",
            DiagramKind::Class => "▦",
            DiagramKind::UseCase => "◯",
            DiagramKind::Activity => "▶",
            DiagramKind::State => "◉",
            DiagramKind::Component => "▣",
            DiagramKind::MindMap => "✳",
            DiagramKind::Gantt => "▤",
            DiagramKind::Flowchart => "⬙",
            DiagramKind::EntityRelationship => "⛁",
            DiagramKind::Other => "□",
        }
    }

    /// Storage representation of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagramKind::Sequence => "sequence",
            DiagramKind::Class => "class",
            DiagramKind::UseCase => "usecase",
            DiagramKind::Activity => "activity",
            DiagramKind::State => "state",
            DiagramKind::Component => "component",
            DiagramKind::MindMap => "mindmap",
            DiagramKind::Gantt => "gantt",
            DiagramKind::Flowchart => "flowchart",
            DiagramKind::EntityRelationship => "er",
            DiagramKind::Other => "other",
        }
    }

    /// Parses the storage representation, falling back to `Other`
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "sequence" => DiagramKind::Sequence,
            "class" => DiagramKind::Class,
            "usecase" => DiagramKind::UseCase,
            "activity" => DiagramKind::Activity,
            "state" => DiagramKind::State,
            "component" => DiagramKind::Component,
            "mindmap" => DiagramKind::MindMap,
            "gantt" => DiagramKind::Gantt,
            "flowchart" => DiagramKind::Flowchart,
            "er" => DiagramKind::EntityRelationship,
            _ => DiagramKind::Other,
        }
    }
}

impl fmt::Display for DiagramKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn first_meaningful_line(content: &str) -> &str {
    content
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with("%%") && !l.starts_with('\''))
        .unwrap_or("")
}

/// A named, ordered folder for diagrams
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    /// Opaque unique identifier
    pub id: String,

    /// Display name
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Fractional ordering key, ascending
    pub position: f64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    /// Creates a new category with a fresh identifier
    pub fn new(name: String, position: f64) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            name,
            description: None,
            position,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A diagram source document (persisted as a "uml project")
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Diagram {
    /// Opaque unique identifier
    pub id: String,

    /// Display name
    pub name: String,

    /// Raw diagram source text
    pub content: String,

    /// Detected type, used only for icon selection
    #[serde(default)]
    pub kind: DiagramKind,

    /// Fractional ordering key, global across categories
    pub position: f64,

    /// Soft-delete flag; deleted diagrams live in the trash until purged
    #[serde(default)]
    pub is_deleted: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Diagram {
    /// Creates a new diagram from the given source
    pub fn new(name: String, content: String, position: f64) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            name,
            kind: DiagramKind::detect(&content),
            content,
            position,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn syntax(&self) -> DiagramSyntax {
        DiagramSyntax::detect(&self.content)
    }
}

/// Membership of a diagram in a category
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CategoryLink {
    pub diagram_id: String,
    pub category_id: String,
}

impl CategoryLink {
    pub fn new(diagram_id: impl Into<String>, category_id: impl Into<String>) -> Self {
        Self {
            diagram_id: diagram_id.into(),
            category_id: category_id.into(),
        }
    }
}

/// Partial update of a category; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryPatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub position: Option<f64>,
}

impl CategoryPatch {
    pub fn position(position: f64) -> Self {
        Self {
            position: Some(position),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.position.is_none()
    }

    /// Applies the patch and touches `updated_at`
    pub fn apply(&self, category: &mut Category) {
        if let Some(name) = &self.name {
            category.name = name.clone();
        }
        if let Some(description) = &self.description {
            category.description = description.clone();
        }
        if let Some(position) = self.position {
            category.position = position;
        }
        category.updated_at = Utc::now();
    }
}

/// Partial update of a diagram; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiagramPatch {
    pub name: Option<String>,
    pub content: Option<String>,
    pub position: Option<f64>,
}

impl DiagramPatch {
    pub fn position(position: f64) -> Self {
        Self {
            position: Some(position),
            ..Default::default()
        }
    }

    pub fn content(content: String) -> Self {
        Self {
            content: Some(content),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.content.is_none() && self.position.is_none()
    }

    /// Applies the patch, re-detecting the kind when the content changes
    pub fn apply(&self, diagram: &mut Diagram) {
        if let Some(name) = &self.name {
            diagram.name = name.clone();
        }
        if let Some(content) = &self.content {
            diagram.content = content.clone();
            diagram.kind = DiagramKind::detect(content);
        }
        if let Some(position) = self.position {
            diagram.position = position;
        }
        diagram.updated_at = Utc::now();
    }
}

/// Full contents of a workspace database
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceSnapshot {
    #[serde(default)]
    pub categories: Vec<Category>,

    #[serde(default)]
    pub diagrams: Vec<Diagram>,

    #[serde(default)]
    pub links: Vec<CategoryLink>,
}

impl WorkspaceSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Categories ordered by position
    pub fn sorted_categories(&self) -> Vec<Category> {
        let mut categories = self.categories.clone();
        categories.sort_by(|a, b| a.position.total_cmp(&b.position));
        categories
    }

    /// Diagrams ordered by position, optionally including the trash
    pub fn sorted_diagrams(&self, include_deleted: bool) -> Vec<Diagram> {
        let mut diagrams: Vec<Diagram> = self
            .diagrams
            .iter()
            .filter(|d| include_deleted || !d.is_deleted)
            .cloned()
            .collect();
        diagrams.sort_by(|a, b| a.position.total_cmp(&b.position));
        diagrams
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_plantuml_sequence() {
        let src = "@startuml\nAlice -> Bob: hello\n@enduml\n";
        assert_eq!(DiagramKind::detect(src), DiagramKind::Sequence);
        assert_eq!(DiagramSyntax::detect(src), DiagramSyntax::PlantUml);
    }

    #[test]
    fn test_detect_plantuml_class() {
        let src = "@startuml\nclass Foo {\n  +bar()\n}\n@enduml\n";
        assert_eq!(DiagramKind::detect(src), DiagramKind::Class);
    }

    #[test]
    fn test_detect_mermaid() {
        assert_eq!(DiagramKind::detect("graph TD\n A-->B"), DiagramKind::Flowchart);
        assert_eq!(DiagramKind::detect("sequenceDiagram\n A->>B: hi"), DiagramKind::Sequence);
        assert_eq!(DiagramSyntax::detect("%% comment\nerDiagram"), DiagramSyntax::Mermaid);
        assert_eq!(DiagramKind::detect("@startmindmap\n* root\n@endmindmap"), DiagramKind::MindMap);
    }

    #[test]
    fn test_detect_empty_content() {
        assert_eq!(DiagramKind::detect(""), DiagramKind::Other);
        assert_eq!(DiagramSyntax::detect(""), DiagramSyntax::PlantUml);
    }

    #[test]
    fn test_kind_storage_roundtrip_is_lossy_for_unknown() {
        assert_eq!(DiagramKind::from_str_lossy("class"), DiagramKind::Class);
        assert_eq!(DiagramKind::from_str_lossy("wat"), DiagramKind::Other);
    }

    #[test]
    fn test_patch_updates_kind_and_timestamp() {
        let mut diagram = Diagram::new(
            "d".into(),
            DiagramSyntax::PlantUml.placeholder().to_string(),
            1000.0,
        );
        let before = diagram.updated_at;
        DiagramPatch::content("sequenceDiagram\nA->>B: x".into()).apply(&mut diagram);
        assert_eq!(diagram.kind, DiagramKind::Sequence);
        assert!(diagram.updated_at >= before);
        assert_eq!(diagram.position, 1000.0);
    }

    #[test]
    fn test_category_patch_clears_description() {
        let mut category = Category::new("c".into(), 1000.0);
        category.description = Some("old".into());
        let patch = CategoryPatch {
            description: Some(None),
            ..Default::default()
        };
        patch.apply(&mut category);
        assert_eq!(category.description, None);
        assert_eq!(category.name, "c");
    }
}
