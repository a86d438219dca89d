mod cli;
mod prompts;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};

use umlboard_core::db::{self, DatabaseBackend};
use umlboard_core::{
    determine_database_path, get_config_path, AppConfig, Board, Category, CategoryKey, CategoryPatch, Diagram,
    DiagramKey, DiagramPatch, DiagramSyntax, DndId, DropOutcome, DropReport, RenderClient,
    Renderer,
};

use crate::cli::{CategoryCommand, Cli, Command, ConfigCommand, DbCommand, DiagramCommand};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let config = AppConfig::load_or_default()?;

    // Determine which database to use
    let db_path = determine_database_path(cli.db.as_deref(), &config)?;

    match &cli.command {
        Command::Db(db_cmd) => handle_db_command(db_cmd, &db_path),
        Command::Config(config_cmd) => handle_config_command(config_cmd, config),
        Command::Category(category_cmd) => {
            handle_category_command(category_cmd, &mut open_board(&db_path, &config)?)
        }
        Command::Diagram(diagram_cmd) => {
            handle_diagram_command(diagram_cmd, &mut open_board(&db_path, &config)?)
        }
        Command::Tree { keys } => print_tree(&mut open_board(&db_path, &config)?, *keys),
        Command::Render { diagram, out } => {
            let board = open_board(&db_path, &config)?;
            render_diagram(&board, &config, diagram, out.as_deref())
        }
        Command::Encode { diagram } => {
            let board = open_board(&db_path, &config)?;
            let diagram = find_diagram(&board, diagram)?;
            let url = RenderClient::from_config(&config).svg_url(&diagram.content)?;
            println!("{}", url);
            Ok(())
        }
    }
}

fn open_board(path: &Path, config: &AppConfig) -> Result<Board> {
    let (board, load_error) = Board::open(path, config)?;
    match load_error {
        Some(e) => Err(e.context(format!("Failed to load database {:?}", path))),
        None => Ok(board),
    }
}

fn find_category(board: &Board, id_or_name: &str) -> Result<Category> {
    board
        .stores
        .categories
        .find(id_or_name)
        .cloned()
        .with_context(|| format!("Category '{}' not found", id_or_name))
}

fn find_diagram(board: &Board, id_or_name: &str) -> Result<Diagram> {
    board
        .stores
        .diagrams
        .find(id_or_name)
        .cloned()
        .with_context(|| format!("Diagram '{}' not found", id_or_name))
}

/// Parses a destination bucket: "default" or a category id/name
fn find_bucket(board: &Board, id_or_name: &str) -> Result<CategoryKey> {
    if id_or_name == "default" && board.stores.categories.find(id_or_name).is_none() {
        return Ok(CategoryKey::Default);
    }
    Ok(CategoryKey::Category(find_category(board, id_or_name)?.id))
}

/// The drag key of a diagram as currently placed in the view
fn diagram_key(board: &mut Board, diagram_id: &str) -> DiagramKey {
    let parent = board
        .view()
        .locate(diagram_id)
        .map(|(parent, _)| parent.clone())
        .unwrap_or(CategoryKey::Default);
    DiagramKey::new(parent, diagram_id)
}

fn report_drop(report: DropReport, done: &str) -> Result<()> {
    match &report.outcome {
        DropOutcome::NoOp => {
            println!("{}", "Nothing to move.".yellow());
            return Ok(());
        }
        DropOutcome::Rejected(reason) => anyhow::bail!("{}", reason),
        DropOutcome::Applied { .. } => {}
    }

    if !report.failures.is_empty() {
        for failure in &report.failures {
            eprintln!("{}", failure.to_string().red());
        }
        anyhow::bail!("The move was not fully saved");
    }
    println!("{}", done.green());
    Ok(())
}

fn confirm(question: &str, skip: bool) -> Result<bool> {
    if skip {
        return Ok(true);
    }
    let confirmed = inquire::Confirm::new(question)
        .with_default(false)
        .prompt()?;
    if !confirmed {
        println!("{}", "Cancelled.".yellow());
    }
    Ok(confirmed)
}

fn format_time(time: &chrono::DateTime<chrono::Utc>) -> String {
    time.with_timezone(&chrono::Local)
        .format("%Y-%m-%d %H:%M")
        .to_string()
}

fn handle_category_command(cmd: &CategoryCommand, board: &mut Board) -> Result<()> {
    match cmd {
        CategoryCommand::Add { name, description } => {
            let (name, description) = match name {
                Some(name) => (name.clone(), description.clone()),
                None => crate::prompts::prompt_new_category()?,
            };
            let category = board.stores.categories.create(name, description)?;
            println!("{}", "Category added successfully!".green());
            println!("ID: {}", category.id);
        }
        CategoryCommand::List => list_categories(board),
        CategoryCommand::Rename { category, name } => {
            let category = find_category(board, category)?;
            let patch = CategoryPatch {
                name: Some(name.clone()),
                ..Default::default()
            };
            board.stores.categories.update(&category.id, &patch)?;
            println!("Renamed '{}' to '{}'", category.name, name.green());
        }
        CategoryCommand::Describe {
            category,
            description,
        } => {
            let category = find_category(board, category)?;
            let patch = CategoryPatch {
                description: Some(description.clone()),
                ..Default::default()
            };
            board.stores.categories.update(&category.id, &patch)?;
            println!("{}", "Description updated.".green());
        }
        CategoryCommand::Delete { category, yes } => {
            let category = find_category(board, category)?;
            let count = board
                .view()
                .bucket(&CategoryKey::Category(category.id.clone()))
                .len();

            println!("{}", "Category to delete:".yellow());
            println!("  ID: {}", category.id);
            println!("  Name: {}", category.name);
            println!("  Diagrams: {} (they become uncategorized)", count);

            if !confirm("Are you sure you want to delete this category?", *yes)? {
                return Ok(());
            }
            board.stores.delete_category(&category.id)?;
            println!("{}", "Category deleted successfully!".green());
        }
        CategoryCommand::Move { category, before } => {
            let category = find_category(board, category)?;
            let target = find_bucket(board, before)?;
            let report = board.move_item(
                DndId::Category(CategoryKey::Category(category.id.clone())),
                &DndId::Category(target),
            );
            report_drop(report, &format!("Moved '{}'.", category.name))?;
        }
    }
    Ok(())
}

fn list_categories(board: &mut Board) {
    let categories = board.stores.categories.items().to_vec();
    if categories.is_empty() {
        println!("{}", "No categories found.".yellow());
        return;
    }

    println!(
        "{:<36} | {:<30} | {:>8} | {:>12}",
        "ID", "Name", "Diagrams", "Position"
    );
    println!("{}", "-".repeat(96));
    for category in &categories {
        let count = board
            .view()
            .bucket(&CategoryKey::Category(category.id.clone()))
            .len();
        println!(
            "{:<36} | {:<30} | {:>8} | {:>12}",
            category.id,
            truncate(&category.name, 30),
            count,
            category.position
        );
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

fn handle_diagram_command(cmd: &DiagramCommand, board: &mut Board) -> Result<()> {
    match cmd {
        DiagramCommand::Add {
            name,
            file,
            mermaid,
            category,
        } => add_diagram(board, name, file.as_deref(), *mermaid, category)?,
        DiagramCommand::List { all } => list_diagrams(board, *all),
        DiagramCommand::Show { diagram } => show_diagram(board, diagram)?,
        DiagramCommand::Rename { diagram, name } => {
            let diagram = find_diagram(board, diagram)?;
            let patch = DiagramPatch {
                name: Some(name.clone()),
                ..Default::default()
            };
            board.stores.diagrams.update(&diagram.id, &patch)?;
            println!("Renamed '{}' to '{}'", diagram.name, name.green());
        }
        DiagramCommand::Edit { diagram, file } => {
            let diagram = find_diagram(board, diagram)?;
            let content = match file {
                Some(path) => fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {:?}", path))?,
                None => crate::prompts::prompt_edit_source(
                    &diagram.name,
                    &diagram.content,
                    diagram.syntax(),
                )?,
            };
            let updated = board.stores.diagrams.update_content(&diagram.id, content)?;
            println!(
                "{} ({} {})",
                "Diagram updated.".green(),
                updated.kind.icon(),
                updated.kind
            );
        }
        DiagramCommand::Delete { diagram } => {
            let diagram = find_diagram(board, diagram)?;
            board.stores.diagrams.delete(&diagram.id)?;
            println!("Moved '{}' to the trash.", diagram.name);
        }
        DiagramCommand::Restore { diagram } => {
            let diagram = find_diagram(board, diagram)?;
            if !diagram.is_deleted {
                println!("{}", format!("'{}' is not in the trash.", diagram.name).yellow());
                return Ok(());
            }
            board.stores.diagrams.restore(&diagram.id)?;
            println!("{}", format!("Restored '{}'.", diagram.name).green());
        }
        DiagramCommand::Purge { diagram, yes } => {
            let diagram = find_diagram(board, diagram)?;
            println!("{}", "Diagram to delete permanently:".yellow());
            println!("  ID: {}", diagram.id);
            println!("  Name: {}", diagram.name);

            if !confirm("This cannot be undone. Continue?", *yes)? {
                return Ok(());
            }
            board.stores.purge_diagram(&diagram.id)?;
            println!("{}", "Diagram deleted permanently.".green());
        }
        DiagramCommand::Trash => {
            let trashed: Vec<&Diagram> = board.stores.diagrams.trashed().collect();
            if trashed.is_empty() {
                println!("{}", "The trash is empty.".yellow());
            }
            for diagram in trashed {
                println!(
                    "{:<36}  {}  (deleted {})",
                    diagram.id,
                    diagram.name,
                    format_time(&diagram.updated_at)
                );
            }
        }
        DiagramCommand::Move {
            diagram,
            to,
            before,
        } => move_diagram(board, diagram, to.as_deref(), before.as_deref())?,
    }
    Ok(())
}

fn add_diagram(
    board: &mut Board,
    name: &Option<String>,
    file: Option<&Path>,
    mermaid: bool,
    category: &Option<String>,
) -> Result<()> {
    let (name, content, category_id) = match (name, file) {
        (name, Some(path)) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {:?}", path))?;
            let name = name.clone().unwrap_or_else(|| {
                path.file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "Untitled".to_string())
            });
            (name, content, None)
        }
        (Some(name), None) => {
            let syntax = if mermaid {
                DiagramSyntax::Mermaid
            } else {
                DiagramSyntax::PlantUml
            };
            (name.clone(), syntax.placeholder().to_string(), None)
        }
        (None, None) => {
            let new = crate::prompts::prompt_new_diagram(board.stores.categories.items())?;
            (new.name, new.syntax.placeholder().to_string(), new.category_id)
        }
    };

    let category_id = match category {
        Some(category) => Some(find_category(board, category)?.id),
        None => category_id,
    };

    let diagram = board.stores.diagrams.create(name, content)?;
    println!("{}", "Diagram added successfully!".green());
    println!("ID: {}", diagram.id);

    if let Some(category_id) = category_id {
        let report = board.move_item(
            DndId::Diagram(DiagramKey::new(CategoryKey::Default, diagram.id.clone())),
            &DndId::Category(CategoryKey::Category(category_id)),
        );
        report_drop(report, "Added to category.")?;
    }
    Ok(())
}

fn list_diagrams(board: &Board, all: bool) {
    let diagrams: Vec<Diagram> = board
        .stores
        .diagrams
        .items()
        .iter()
        .filter(|d| all || !d.is_deleted)
        .cloned()
        .collect();
    if diagrams.is_empty() {
        println!("{}", "No diagrams found.".yellow());
        return;
    }

    println!(
        "{:<36} | {:<2} | {:<30} | {:<20} | {:<16}",
        "ID", "", "Name", "Category", "Updated"
    );
    println!("{}", "-".repeat(116));
    for diagram in &diagrams {
        let category = board
            .stores
            .links
            .category_of(&diagram.id)
            .and_then(|id| board.stores.categories.get(id))
            .map(|c| c.name.clone())
            .unwrap_or_else(|| "-".to_string());
        let name = if diagram.is_deleted {
            format!("{} (trash)", diagram.name)
        } else {
            diagram.name.clone()
        };
        println!(
            "{:<36} | {:<2} | {:<30} | {:<20} | {:<16}",
            diagram.id,
            diagram.kind.icon(),
            truncate(&name, 30),
            truncate(&category, 20),
            format_time(&diagram.updated_at)
        );
    }
}

fn show_diagram(board: &Board, id_or_name: &str) -> Result<()> {
    let diagram = find_diagram(board, id_or_name)?;
    let category = board
        .stores
        .links
        .category_of(&diagram.id)
        .and_then(|id| board.stores.categories.get(id))
        .map(|c| c.name.as_str())
        .unwrap_or("(uncategorized)");

    println!("{} {}", diagram.kind.icon(), diagram.name.bold());
    println!("  ID:       {}", diagram.id);
    println!("  Syntax:   {}", diagram.syntax());
    println!("  Kind:     {}", diagram.kind);
    println!("  Category: {}", category);
    println!("  Position: {}", diagram.position);
    println!("  Created:  {}", format_time(&diagram.created_at));
    println!("  Updated:  {}", format_time(&diagram.updated_at));
    if diagram.is_deleted {
        println!("  {}", "In the trash".red());
    }
    println!();
    println!("{}", diagram.content);
    Ok(())
}

fn move_diagram(
    board: &mut Board,
    id_or_name: &str,
    to: Option<&str>,
    before: Option<&str>,
) -> Result<()> {
    let diagram = find_diagram(board, id_or_name)?;
    let active = DndId::Diagram(diagram_key(board, &diagram.id));

    let over = match (to, before) {
        (_, Some(before)) => {
            let target = find_diagram(board, before)?;
            let target_key = diagram_key(board, &target.id);
            if let Some(to) = to {
                let bucket = find_bucket(board, to)?;
                if bucket != target_key.parent {
                    anyhow::bail!("'{}' is not in '{}'", target.name, to);
                }
            }
            DndId::Diagram(target_key)
        }
        (Some(to), None) => DndId::Category(find_bucket(board, to)?),
        (None, None) => anyhow::bail!("Nothing to do: pass --to and/or --before"),
    };

    let report = board.move_item(active, &over);
    report_drop(report, &format!("Moved '{}'.", diagram.name))
}

fn print_tree(board: &mut Board, keys: bool) -> Result<()> {
    let view = board.view().clone();
    let label_category = |key: &CategoryKey| -> String {
        if keys {
            return key.to_string();
        }
        match key.category_id() {
            Some(id) => board
                .stores
                .categories
                .get(id)
                .map(|c| c.name.clone())
                .unwrap_or_else(|| id.to_string()),
            None => "(uncategorized)".to_string(),
        }
    };
    let label_diagram = |key: &DiagramKey| -> String {
        if keys {
            return key.to_string();
        }
        match board.stores.diagrams.get(&key.id) {
            Some(d) => format!("{} {}", d.kind.icon(), d.name),
            None => key.id.clone(),
        }
    };

    let buckets = view
        .category_ids
        .iter()
        .chain(std::iter::once(&CategoryKey::Default));
    for bucket in buckets {
        let diagrams = view.bucket(bucket);
        if bucket.is_default() && diagrams.is_empty() {
            continue;
        }
        println!("{}", label_category(bucket).bold());
        for diagram in diagrams {
            println!("  {}", label_diagram(diagram));
        }
    }
    Ok(())
}

fn render_diagram(
    board: &Board,
    config: &AppConfig,
    id_or_name: &str,
    out: Option<&Path>,
) -> Result<()> {
    let diagram = find_diagram(board, id_or_name)?;
    let client = RenderClient::from_config(config);
    let svg = client
        .render_svg(&diagram.content)
        .with_context(|| format!("Failed to render '{}'", diagram.name))?;

    let out = out
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(format!("{}.svg", file_safe(&diagram.name))));
    fs::write(&out, svg).with_context(|| format!("Failed to write {:?}", out))?;
    println!("{} {}", "Rendered to".green(), out.display());
    Ok(())
}

fn file_safe(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

fn handle_config_command(cmd: &ConfigCommand, mut config: AppConfig) -> Result<()> {
    let path = get_config_path()?;
    match cmd {
        ConfigCommand::Path => {
            println!("{}", path.display());
            return Ok(());
        }
        ConfigCommand::Show => {
            print!("{}", config.to_yaml()?);
            return Ok(());
        }
        ConfigCommand::SetServer { url } => {
            config.plantuml_server = url.trim_end_matches('/').to_string();
        }
        ConfigCommand::SetDb { path: db } => {
            config.database_path = Some(db.clone());
        }
    }
    config.save(&path)?;
    println!("{} {}", "Configuration saved to".green(), path.display());
    Ok(())
}

fn handle_db_command(cmd: &DbCommand, db_path: &Path) -> Result<()> {
    match cmd {
        DbCommand::Path => {
            println!("{}", db_path.display());
            println!("Backend: {}", db::backend_type_for(db_path));
        }
        DbCommand::Stats => {
            let backend = db::open_or_create(db_path, None)?;
            let stats = backend.stats()?;
            println!("Database: {} ({})", db_path.display(), stats.backend_type);
            println!("  Categories: {}", stats.category_count);
            println!("  Diagrams:   {}", stats.diagram_count);
            println!("  In trash:   {}", stats.trashed_count);
            println!("  Links:      {}", stats.link_count);
        }
        DbCommand::Migrate { to } => {
            if to == db_path {
                anyhow::bail!("Source and target are the same database");
            }
            let source = db::open_or_create(db_path, None)?;
            let target = db::create_backend(to, None)?;
            let count = db::copy_between(source.as_ref(), target.as_ref())?;
            println!(
                "{} {} diagrams to {} ({})",
                "Migrated".green(),
                count,
                to.display(),
                target.backend_type()
            );
        }
        DbCommand::Export { out } => {
            let backend = db::open_or_create(db_path, None)?;
            db::export_to_json(backend.as_ref(), out)?;
            println!("{} {}", "Exported to".green(), out.display());
        }
        DbCommand::Import { from, yes } => {
            if !confirm(
                "Importing replaces everything in the current database. Continue?",
                *yes,
            )? {
                return Ok(());
            }
            let backend = db::open_or_create(db_path, None)?;
            let count = db::import_from_json(backend.as_ref(), from)?;
            println!("{} {} diagrams", "Imported".green(), count);
        }
    }
    Ok(())
}
