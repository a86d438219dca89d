use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Organize PlantUML and Mermaid diagrams into ordered categories")]
pub struct Cli {
    /// Path to the database (.db for SQLite, .yaml for YAML)
    #[clap(long, global = true)]
    pub db: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage categories
    #[clap(subcommand)]
    Category(CategoryCommand),

    /// Manage diagrams
    #[clap(subcommand)]
    Diagram(DiagramCommand),

    /// Print categories and their diagrams in display order
    Tree {
        /// Show drag-and-drop keys instead of names
        #[clap(long)]
        keys: bool,
    },

    /// Render a PlantUML diagram to SVG through the configured server
    Render {
        /// Diagram id or name
        diagram: String,

        /// Output file (defaults to <name>.svg)
        #[clap(long, short = 'o')]
        out: Option<PathBuf>,
    },

    /// Print the PlantUML server URL of a diagram
    Encode {
        /// Diagram id or name
        diagram: String,
    },

    /// Database commands
    #[clap(subcommand)]
    Db(DbCommand),

    /// Show or change the configuration file
    #[clap(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug)]
pub enum CategoryCommand {
    /// Add a category at the end of the list
    Add {
        /// Name of the category
        name: Option<String>,

        /// Description of the category
        #[clap(long)]
        description: Option<String>,
    },

    /// List categories in display order
    List,

    /// Rename a category
    Rename {
        /// Category id or name
        category: String,

        /// New name
        name: String,
    },

    /// Set or clear a category's description
    Describe {
        /// Category id or name
        category: String,

        /// New description; omit to clear it
        description: Option<String>,
    },

    /// Delete a category; its diagrams become uncategorized
    Delete {
        /// Category id or name
        category: String,

        /// Skip the confirmation prompt
        #[clap(long, short = 'y')]
        yes: bool,
    },

    /// Move a category in front of another one
    Move {
        /// Category id or name
        category: String,

        /// Category to land before
        #[clap(long)]
        before: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum DiagramCommand {
    /// Add a new diagram
    Add {
        /// Name of the diagram
        name: Option<String>,

        /// Read the source from a file instead of using a placeholder
        #[clap(long)]
        file: Option<PathBuf>,

        /// Use a Mermaid placeholder instead of PlantUML
        #[clap(long)]
        mermaid: bool,

        /// Category to put the diagram in
        #[clap(long, short = 'c')]
        category: Option<String>,
    },

    /// List diagrams in position order
    List {
        /// Include diagrams in the trash
        #[clap(long)]
        all: bool,
    },

    /// Show a diagram's details and source
    Show {
        /// Diagram id or name
        diagram: String,
    },

    /// Rename a diagram
    Rename {
        /// Diagram id or name
        diagram: String,

        /// New name
        name: String,
    },

    /// Replace a diagram's source, from a file or in an editor
    Edit {
        /// Diagram id or name
        diagram: String,

        /// File holding the new source
        #[clap(long)]
        file: Option<PathBuf>,
    },

    /// Move a diagram to the trash
    Delete {
        /// Diagram id or name
        diagram: String,
    },

    /// Bring a diagram back from the trash
    Restore {
        /// Diagram id or name
        diagram: String,
    },

    /// Permanently delete a diagram
    Purge {
        /// Diagram id or name
        diagram: String,

        /// Skip the confirmation prompt
        #[clap(long, short = 'y')]
        yes: bool,
    },

    /// List diagrams in the trash
    Trash,

    /// Move a diagram to another category, or reorder it
    Move {
        /// Diagram id or name
        diagram: String,

        /// Destination category id or name, or "default"
        #[clap(long)]
        to: Option<String>,

        /// Diagram to land before
        #[clap(long)]
        before: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum DbCommand {
    /// Print the path of the database in use
    Path,

    /// Show row counts
    Stats,

    /// Copy the whole workspace into another database
    Migrate {
        /// Target database (.db or .yaml)
        #[clap(long)]
        to: PathBuf,
    },

    /// Export the workspace as JSON
    Export {
        /// Output JSON file
        #[clap(long)]
        out: PathBuf,
    },

    /// Replace the workspace with a JSON export
    Import {
        /// JSON file to import
        #[clap(long)]
        from: PathBuf,

        /// Skip the confirmation prompt
        #[clap(long, short = 'y')]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the path of the configuration file
    Path,

    /// Print the effective configuration
    Show,

    /// Set the PlantUML server used for rendering
    SetServer {
        /// Server base URL, e.g. https://www.plantuml.com/plantuml
        url: String,
    },

    /// Set the default database
    SetDb {
        /// Database file (.db or .yaml)
        path: PathBuf,
    },
}
