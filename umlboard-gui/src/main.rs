mod app;

use anyhow::{anyhow, Result};
use std::path::PathBuf;

use umlboard_core::{determine_database_path, AppConfig, Board};

use crate::app::UmlBoardApp;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::load_or_default().unwrap_or_else(|e| {
        log::warn!("Ignoring unreadable config: {:#}", e);
        AppConfig::default()
    });

    // Optional first argument overrides the configured database
    let cli_path = std::env::args_os().nth(1).map(PathBuf::from);
    let db_path = determine_database_path(cli_path.as_deref(), &config)?;
    let (board, load_error) = Board::open(&db_path, &config)?;

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 800.0])
            .with_title("umlboard"),
        ..Default::default()
    };

    eframe::run_native(
        "umlboard",
        options,
        Box::new(move |cc| {
            Ok(Box::new(UmlBoardApp::new(
                cc, board, config, db_path, load_error,
            )))
        }),
    )
    .map_err(|e| anyhow!("GUI terminated with an error: {}", e))
}
