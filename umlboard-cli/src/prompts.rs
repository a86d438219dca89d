use anyhow::Result;
use inquire::{Select, Text};

use umlboard_core::{Category, DiagramSyntax};

const NO_CATEGORY: &str = "(uncategorized)";

/// Details of a diagram about to be created
pub struct NewDiagram {
    pub name: String,
    pub syntax: DiagramSyntax,
    /// Id of the chosen category, if any
    pub category_id: Option<String>,
}

/// Prompts the user for a new category
pub fn prompt_new_category() -> Result<(String, Option<String>)> {
    let name = Text::new("Category name:").prompt()?;
    let description = Text::new("Description (optional):").prompt()?;
    let description = Some(description.trim().to_string()).filter(|d| !d.is_empty());
    Ok((name, description))
}

/// Prompts the user for a new diagram
pub fn prompt_new_diagram(categories: &[Category]) -> Result<NewDiagram> {
    let name = Text::new("Diagram name:").prompt()?;

    let syntax = Select::new(
        "Syntax:",
        vec![DiagramSyntax::PlantUml, DiagramSyntax::Mermaid],
    )
    .prompt()?;

    let mut options = vec![NO_CATEGORY.to_string()];
    options.extend(categories.iter().map(|c| c.name.clone()));
    let category_id = if categories.is_empty() {
        None
    } else {
        let chosen = Select::new("Category:", options).prompt()?;
        categories
            .iter()
            .find(|c| c.name == chosen)
            .map(|c| c.id.clone())
    };

    Ok(NewDiagram {
        name,
        syntax,
        category_id,
    })
}

/// Opens the user's editor on a diagram's current source
pub fn prompt_edit_source(name: &str, current: &str, syntax: DiagramSyntax) -> Result<String> {
    let source = inquire::Editor::new(&format!("Source of {}:", name))
        .with_predefined_text(current)
        .with_file_extension(&format!(".{}", syntax.extension()))
        .prompt()?;
    Ok(source)
}
