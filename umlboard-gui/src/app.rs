use anyhow::{Context as _, Result};
use chrono::{DateTime, Local, Utc};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use umlboard_core::{
    AppConfig, Board, CategoryKey, CategoryPatch, Debouncer, DiagramKey, DiagramPatch,
    DiagramSyntax, DndId, DragState, DropOutcome, DropReport, RenderClient, RenderWorker,
};

/// How often to repaint while a render is outstanding
const RENDER_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// File extensions offered by the import and export dialogs
const DIAGRAM_EXTENSIONS: &[&str] = &["puml", "plantuml", "pu", "iuml", "mmd", "mermaid"];

/// Indentation of diagram rows under their bucket header
const DIAGRAM_INDENT: f32 = 18.0;

/// One line of the explorer, built from the derived view each frame
enum Row {
    Bucket {
        key: CategoryKey,
        name: String,
        count: usize,
        collapsed: bool,
    },
    Diagram {
        key: DiagramKey,
        name: String,
        icon: &'static str,
    },
}

enum Preview {
    Empty,
    Svg {
        uri: String,
        bytes: egui::load::Bytes,
    },
    Failed(String),
}

#[derive(Clone)]
enum RenameTarget {
    Category(String),
    Diagram(String),
}

pub struct UmlBoardApp {
    ctx: egui::Context,
    board: Board,
    db_path: PathBuf,
    client: RenderClient,
    renderer: RenderWorker,
    message: Option<(String, bool)>, // (message, is_error)

    // Editor
    selected: Option<String>,
    editor_text: String,
    autosave: Debouncer<(String, String)>, // (diagram id, content)

    // Preview
    preview: Preview,
    rendering: bool,

    // Explorer
    collapsed: HashSet<CategoryKey>,
    drop_target: Option<DndId>,

    // Dialogs
    show_trash: bool,
    show_new_category_dialog: bool,
    new_category_name: String,
    new_category_description: String,
    show_new_diagram_dialog: bool,
    new_diagram_name: String,
    new_diagram_syntax: DiagramSyntax,
    new_diagram_category: Option<String>,
    rename_target: Option<RenameTarget>,
    rename_text: String,
    confirm_delete_category: Option<String>,
    confirm_purge: Option<String>,
}

impl UmlBoardApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        board: Board,
        config: AppConfig,
        db_path: PathBuf,
        load_error: Option<anyhow::Error>,
    ) -> Self {
        egui_extras::install_image_loaders(&cc.egui_ctx);

        let client = RenderClient::from_config(&config);
        let renderer = RenderWorker::spawn(client.clone());
        let message = load_error.map(|e| (format!("Failed to load workspace: {:#}", e), true));

        Self {
            ctx: cc.egui_ctx.clone(),
            board,
            db_path,
            client,
            renderer,
            message,
            selected: None,
            editor_text: String::new(),
            autosave: Debouncer::new(config.autosave_delay()),
            preview: Preview::Empty,
            rendering: false,
            collapsed: HashSet::new(),
            drop_target: None,
            show_trash: false,
            show_new_category_dialog: false,
            new_category_name: String::new(),
            new_category_description: String::new(),
            show_new_diagram_dialog: false,
            new_diagram_name: String::new(),
            new_diagram_syntax: DiagramSyntax::PlantUml,
            new_diagram_category: None,
            rename_target: None,
            rename_text: String::new(),
            confirm_delete_category: None,
            confirm_purge: None,
        }
    }

    fn set_error(&mut self, context: &str, error: anyhow::Error) {
        log::error!("{}: {:#}", context, error);
        self.message = Some((format!("{}: {:#}", context, error), true));
    }

    fn set_info(&mut self, message: impl Into<String>) {
        self.message = Some((message.into(), false));
    }

    fn reload(&mut self) {
        self.flush_autosave();
        match self.board.reload() {
            Ok(()) => self.set_info("Reloaded successfully"),
            Err(e) => self.set_error("Failed to reload", e),
        }

        let Some(id) = self.selected.clone() else {
            return;
        };
        match self.board.stores.diagrams.get(&id) {
            Some(diagram) if !diagram.is_deleted => {
                self.editor_text = diagram.content.clone();
                self.request_preview();
            }
            _ => self.clear_selection(),
        }
    }

    // ------------------------------------------------------------------
    // Editor and autosave
    // ------------------------------------------------------------------

    fn select_diagram(&mut self, id: &str) {
        if self.selected.as_deref() == Some(id) {
            return;
        }
        self.flush_autosave();

        let Some(diagram) = self.board.stores.diagrams.get(id) else {
            return;
        };
        self.editor_text = diagram.content.clone();
        self.selected = Some(id.to_string());
        self.request_preview();
    }

    fn clear_selection(&mut self) {
        self.selected = None;
        self.editor_text.clear();
        self.set_preview(Preview::Empty);
    }

    fn flush_autosave(&mut self) {
        if let Some((id, content)) = self.autosave.flush() {
            self.save_content(id, content);
        }
    }

    fn save_content(&mut self, id: String, content: String) {
        match self.board.stores.diagrams.update_content(&id, content) {
            Ok(_) => {
                log::debug!("Saved diagram {}", id);
                if self.selected.as_deref() == Some(id.as_str()) {
                    self.request_preview();
                }
            }
            Err(e) => self.set_error("Failed to save diagram", e),
        }
    }

    fn import_file(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .set_title("Import diagram")
            .add_filter("Diagram sources", DIAGRAM_EXTENSIONS)
            .add_filter("All files", &["*"])
            .pick_file()
        else {
            return;
        };

        match self.import_diagram(&path) {
            Ok(id) => {
                self.select_diagram(&id);
                self.set_info(format!("Imported {}", path.display()));
            }
            Err(e) => self.set_error("Import failed", e),
        }
    }

    fn import_diagram(&mut self, path: &Path) -> Result<String> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Imported".to_string());
        let diagram = self.board.stores.diagrams.create(name, content)?;
        Ok(diagram.id)
    }

    fn export_source(&mut self, name: &str) {
        let syntax = DiagramSyntax::detect(&self.editor_text);
        let Some(path) = rfd::FileDialog::new()
            .set_title("Export diagram source")
            .set_file_name(format!("{}.{}", name, syntax.extension()))
            .add_filter("Diagram sources", DIAGRAM_EXTENSIONS)
            .save_file()
        else {
            return;
        };

        match fs::write(&path, &self.editor_text) {
            Ok(()) => self.set_info(format!("Exported to {}", path.display())),
            Err(e) => self.set_error("Export failed", e.into()),
        }
    }

    fn open_in_browser(&mut self) {
        let url = match self.client.svg_url(&self.editor_text) {
            Ok(url) => url,
            Err(e) => return self.set_error("Cannot open diagram", e.into()),
        };
        if let Err(e) = open::that(&url) {
            self.set_error("Failed to open browser", e.into());
        }
    }

    fn copy_url(&mut self) {
        match self.client.svg_url(&self.editor_text) {
            Ok(url) => {
                self.ctx.copy_text(url);
                self.set_info("Copied render URL");
            }
            Err(e) => self.set_error("Cannot build URL", e.into()),
        }
    }

    // ------------------------------------------------------------------
    // Preview
    // ------------------------------------------------------------------

    fn request_preview(&mut self) {
        if self.selected.is_none() {
            return;
        }
        self.renderer.request(self.editor_text.clone());
        self.rendering = true;
    }

    fn set_preview(&mut self, preview: Preview) {
        if let Preview::Svg { uri, .. } = &self.preview {
            self.ctx.forget_image(uri);
        }
        self.preview = preview;
    }

    fn poll_preview(&mut self, ctx: &egui::Context) {
        if let Some(result) = self.renderer.poll() {
            self.rendering = false;
            let preview = match result.svg {
                Ok(bytes) => Preview::Svg {
                    uri: format!("bytes://preview-{}.svg", result.id),
                    bytes: bytes.into(),
                },
                Err(e) => {
                    log::warn!("Render {} failed: {}", result.id, e);
                    Preview::Failed(e.to_string())
                }
            };
            if self.selected.is_some() {
                self.set_preview(preview);
            }
        }
        if self.rendering {
            ctx.request_repaint_after(RENDER_POLL_INTERVAL);
        }
    }

    // ------------------------------------------------------------------
    // Drag and drop
    // ------------------------------------------------------------------

    fn is_dragging(&self) -> bool {
        matches!(self.board.drag_state(), DragState::Dragging(_))
    }

    /// Ends a drag on release, using the target found on the previous frame
    fn handle_drag_release(&mut self, ctx: &egui::Context) {
        if !self.is_dragging() {
            self.drop_target = None;
            return;
        }

        if ctx.input(|i| i.key_pressed(egui::Key::Escape)) {
            self.board.drag_cancel();
            self.drop_target = None;
            return;
        }

        let (released, any_down) = ctx.input(|i| (i.pointer.primary_released(), i.pointer.any_down()));
        if released {
            let target = self.drop_target.take();
            let report = self.board.drop_on(target.as_ref());
            self.report_drop(report);
        } else if !any_down {
            // Release happened outside the window
            self.board.drag_cancel();
            self.drop_target = None;
        } else {
            ctx.set_cursor_icon(egui::CursorIcon::Grabbing);
        }
    }

    fn report_drop(&mut self, report: DropReport) {
        match &report.outcome {
            DropOutcome::NoOp => {}
            DropOutcome::Rejected(reason) => {
                self.message = Some((reason.to_string(), true));
            }
            DropOutcome::Applied { .. } if report.failures.is_empty() => {
                self.set_info("Moved");
            }
            DropOutcome::Applied { .. } => {
                let details: Vec<String> = report.failures.iter().map(ToString::to_string).collect();
                self.message = Some((details.join("; "), true));
            }
        }
    }

    fn explorer_rows(&mut self) -> Vec<Row> {
        let view = self.board.view().clone();
        let stores = &self.board.stores;

        let mut rows = Vec::new();
        let buckets = view
            .category_ids
            .iter()
            .cloned()
            .chain(std::iter::once(CategoryKey::Default));
        for key in buckets {
            let name = match &key {
                CategoryKey::Default => "Uncategorized".to_string(),
                CategoryKey::Category(id) => stores
                    .categories
                    .get(id)
                    .map(|c| c.name.clone())
                    .unwrap_or_else(|| id.clone()),
            };
            let diagrams = view.bucket(&key);
            let collapsed = self.collapsed.contains(&key);
            rows.push(Row::Bucket {
                key: key.clone(),
                name,
                count: diagrams.len(),
                collapsed,
            });
            if collapsed {
                continue;
            }
            for diagram_key in diagrams {
                if let Some(diagram) = stores.diagrams.get(&diagram_key.id) {
                    rows.push(Row::Diagram {
                        key: diagram_key.clone(),
                        name: diagram.name.clone(),
                        icon: diagram.kind.icon(),
                    });
                }
            }
        }
        rows
    }

    fn show_row(&mut self, ui: &mut egui::Ui, row: Row) {
        let (id, label, indent, selected, draggable) = match &row {
            Row::Bucket {
                key,
                name,
                count,
                collapsed,
            } => {
                let arrow = if *collapsed { "▶" } else { "▼" };
                (
                    DndId::Category(key.clone()),
                    format!("{} {} ({})", arrow, name, count),
                    0.0,
                    false,
                    // The uncategorized anchor only accepts drops
                    !key.is_default(),
                )
            }
            Row::Diagram { key, name, icon } => (
                DndId::Diagram(key.clone()),
                format!("{} {}", icon, name),
                DIAGRAM_INDENT,
                self.selected.as_deref() == Some(key.id.as_str()),
                true,
            ),
        };

        let response = self.show_draggable(ui, &id, &label, indent, selected, draggable);

        if response.clicked() {
            match &row {
                Row::Bucket { key, .. } => {
                    if !self.collapsed.remove(key) {
                        self.collapsed.insert(key.clone());
                    }
                }
                Row::Diagram { key, .. } => self.select_diagram(&key.id),
            }
        }

        response.context_menu(|ui| match &row {
            Row::Bucket { key, name, .. } => {
                if ui.button("➕ New diagram here").clicked() {
                    self.open_new_diagram_dialog(key.category_id().map(str::to_string));
                    ui.close_menu();
                }
                if let CategoryKey::Category(category_id) = key {
                    if ui.button("✏ Rename").clicked() {
                        self.rename_target = Some(RenameTarget::Category(category_id.clone()));
                        self.rename_text = name.clone();
                        ui.close_menu();
                    }
                    if ui.button("🗑 Delete").clicked() {
                        self.confirm_delete_category = Some(category_id.clone());
                        ui.close_menu();
                    }
                }
            }
            Row::Diagram { key, name, .. } => {
                if ui.button("✏ Rename").clicked() {
                    self.rename_target = Some(RenameTarget::Diagram(key.id.clone()));
                    self.rename_text = name.clone();
                    ui.close_menu();
                }
                if ui.button("🗑 Move to trash").clicked() {
                    self.trash_diagram(&key.id);
                    ui.close_menu();
                }
            }
        });
    }

    fn show_draggable(
        &mut self,
        ui: &mut egui::Ui,
        id: &DndId,
        label: &str,
        indent: f32,
        selected: bool,
        draggable: bool,
    ) -> egui::Response {
        let dragging = match self.board.drag_state() {
            DragState::Dragging(active) => Some(active.clone()),
            DragState::Idle => None,
        };
        let is_drag_source = dragging.as_ref() == Some(id);

        ui.horizontal(|ui| {
            ui.add_space(indent);

            let text = egui::WidgetText::from(label);
            let galley = text.into_galley(
                ui,
                Some(egui::TextWrapMode::Truncate),
                ui.available_width() - 8.0,
                egui::TextStyle::Body,
            );
            let desired_size = egui::vec2(ui.available_width(), galley.size().y + 4.0);

            let sense = if draggable {
                egui::Sense::click_and_drag()
            } else {
                egui::Sense::click()
            };
            let (rect, response) = ui.allocate_exact_size(desired_size, sense);

            // Hover position is more reliable than hovered() while dragging
            let is_drop_target = dragging.is_some()
                && !is_drag_source
                && ui
                    .input(|i| i.pointer.hover_pos())
                    .is_some_and(|pos| rect.contains(pos));
            if is_drop_target {
                self.drop_target = Some(id.clone());
            }

            // Diagrams dropped on a header move into it; everything else lands before the target
            let moves_into = matches!(
                (&dragging, id),
                (Some(DndId::Diagram(_)), DndId::Category(_))
            );

            let painter = ui.painter();
            if is_drop_target && moves_into {
                painter.rect_filled(
                    rect,
                    2.0,
                    egui::Color32::from_rgba_unmultiplied(100, 200, 100, 60),
                );
                painter.rect_stroke(rect, 2.0, egui::Stroke::new(2.0, egui::Color32::GREEN));
            } else if is_drop_target {
                painter.hline(
                    rect.x_range(),
                    rect.top(),
                    egui::Stroke::new(2.0, egui::Color32::GREEN),
                );
            } else if is_drag_source {
                painter.rect_filled(
                    rect,
                    2.0,
                    egui::Color32::from_rgba_unmultiplied(100, 100, 200, 60),
                );
            } else if selected {
                painter.rect_filled(rect, 2.0, ui.visuals().selection.bg_fill);
            }

            let text_color = if selected {
                ui.visuals().selection.stroke.color
            } else if id == &DndId::Category(CategoryKey::Default) {
                ui.visuals().weak_text_color()
            } else {
                ui.visuals().text_color()
            };
            painter.galley(rect.min + egui::vec2(4.0, 2.0), galley, text_color);

            if draggable && response.drag_started() {
                self.board.drag_start(id.clone());
            }

            if is_drag_source && ui.input(|i| i.pointer.is_decidedly_dragging()) {
                if let Some(pos) = ui.input(|i| i.pointer.hover_pos()) {
                    egui::Area::new(egui::Id::new("drag_indicator"))
                        .fixed_pos(pos + egui::vec2(10.0, 10.0))
                        .order(egui::Order::Tooltip)
                        .show(ui.ctx(), |ui| {
                            egui::Frame::popup(ui.style()).show(ui, |ui| {
                                ui.label(label);
                            });
                        });
                }
            }

            response
        })
        .inner
    }

    // ------------------------------------------------------------------
    // Store actions
    // ------------------------------------------------------------------

    fn open_new_diagram_dialog(&mut self, category_id: Option<String>) {
        self.new_diagram_name.clear();
        self.new_diagram_syntax = DiagramSyntax::PlantUml;
        self.new_diagram_category = category_id;
        self.show_new_diagram_dialog = true;
    }

    fn open_new_category_dialog(&mut self) {
        self.new_category_name.clear();
        self.new_category_description.clear();
        self.show_new_category_dialog = true;
    }

    fn create_category(&mut self) -> Result<()> {
        let name = self.new_category_name.trim().to_string();
        let description = Some(self.new_category_description.trim().to_string())
            .filter(|d| !d.is_empty());
        let category = self.board.stores.categories.create(name, description)?;
        self.set_info(format!("Created category {}", category.name));
        Ok(())
    }

    fn create_diagram(&mut self) -> Result<()> {
        let name = self.new_diagram_name.trim().to_string();
        let diagram = self
            .board
            .stores
            .diagrams
            .create_placeholder(name, self.new_diagram_syntax)?;
        self.select_diagram(&diagram.id);
        self.set_info(format!("Created diagram {}", diagram.name));

        // New diagrams start uncategorized; filing them is an ordinary move
        if let Some(category_id) = self.new_diagram_category.clone() {
            let report = self.board.move_item(
                DndId::Diagram(DiagramKey::new(CategoryKey::Default, diagram.id.clone())),
                &DndId::Category(CategoryKey::Category(category_id)),
            );
            if !report.is_clean() {
                self.report_drop(report);
            }
        }
        Ok(())
    }

    fn apply_rename(&mut self, target: RenameTarget, name: String) -> Result<()> {
        match target {
            RenameTarget::Category(id) => {
                let patch = CategoryPatch {
                    name: Some(name),
                    ..Default::default()
                };
                self.board.stores.categories.update(&id, &patch)?;
            }
            RenameTarget::Diagram(id) => {
                let patch = DiagramPatch {
                    name: Some(name),
                    ..Default::default()
                };
                self.board.stores.diagrams.update(&id, &patch)?;
            }
        }
        Ok(())
    }

    fn trash_diagram(&mut self, id: &str) {
        if self.selected.as_deref() == Some(id) {
            self.flush_autosave();
            self.clear_selection();
        }
        match self.board.stores.diagrams.delete(id) {
            Ok(()) => self.set_info("Moved to trash"),
            Err(e) => self.set_error("Failed to move to trash", e),
        }
    }

    fn restore_diagram(&mut self, id: &str) {
        match self.board.stores.diagrams.restore(id) {
            Ok(()) => self.set_info("Restored"),
            Err(e) => self.set_error("Failed to restore", e),
        }
    }

    fn purge_diagram(&mut self, id: &str) {
        match self.board.stores.purge_diagram(id) {
            Ok(()) => self.set_info("Deleted permanently"),
            Err(e) => self.set_error("Failed to delete", e),
        }
    }

    fn delete_category(&mut self, id: &str) {
        match self.board.stores.delete_category(id) {
            Ok(()) => {
                self.collapsed.remove(&CategoryKey::Category(id.to_string()));
                self.set_info("Category deleted");
            }
            Err(e) => self.set_error("Failed to delete category", e),
        }
    }

    // ------------------------------------------------------------------
    // Panels
    // ------------------------------------------------------------------

    fn show_top_panel(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                ui.menu_button("☰ Menu", |ui| {
                    if ui.button("🔄 Reload").clicked() {
                        self.reload();
                        ui.close_menu();
                    }
                    ui.separator();
                    if ui.button("📁 New Category...").clicked() {
                        self.open_new_category_dialog();
                        ui.close_menu();
                    }
                    if ui.button("➕ New Diagram...").clicked() {
                        self.open_new_diagram_dialog(None);
                        ui.close_menu();
                    }
                    if ui.button("📥 Import File...").clicked() {
                        ui.close_menu();
                        self.import_file();
                    }
                    ui.separator();
                    if ui.button("🗑 Trash").clicked() {
                        self.show_trash = true;
                        ui.close_menu();
                    }
                    ui.separator();
                    if ui.button("🚪 Quit").clicked() {
                        self.flush_autosave();
                        ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                    }
                });

                ui.separator();
                ui.label(format!(
                    "Categories: {}  Diagrams: {}",
                    self.board.stores.categories.items().len(),
                    self.board.stores.diagrams.live().count()
                ))
                .on_hover_text(self.db_path.display().to_string());

                if let Some((msg, is_error)) = &self.message {
                    ui.separator();
                    let color = if *is_error {
                        egui::Color32::RED
                    } else {
                        egui::Color32::GREEN
                    };
                    ui.colored_label(color, msg);
                }

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    let trash_count = self.board.stores.diagrams.trashed().count();
                    if ui
                        .button(format!("🗑 {}", trash_count))
                        .on_hover_text("Trash")
                        .clicked()
                    {
                        self.show_trash = true;
                    }
                });
            });
        });
    }

    fn show_explorer_panel(&mut self, ctx: &egui::Context) {
        egui::SidePanel::left("explorer_panel")
            .resizable(true)
            .default_width(280.0)
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.heading("Diagrams");
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        if ui.button("➕").on_hover_text("New diagram").clicked() {
                            self.open_new_diagram_dialog(None);
                        }
                        if ui.button("📁").on_hover_text("New category").clicked() {
                            self.open_new_category_dialog();
                        }
                    });
                });
                ui.separator();

                if !self.board.stores.all_loaded() {
                    ui.spinner();
                    return;
                }

                let rows = self.explorer_rows();
                // Recomputed by the rows under the pointer
                self.drop_target = None;
                egui::ScrollArea::vertical()
                    .auto_shrink([false, false])
                    .show(ui, |ui| {
                        for row in rows {
                            self.show_row(ui, row);
                        }
                    });
            });
    }

    fn show_editor(&mut self, ui: &mut egui::Ui) {
        let Some(id) = self.selected.clone() else {
            ui.centered_and_justified(|ui| {
                ui.weak("Select a diagram, or create one from the menu");
            });
            return;
        };
        let Some(diagram) = self.board.stores.diagrams.get(&id) else {
            return;
        };
        let name = diagram.name.clone();
        let saved_at = diagram.updated_at;

        ui.horizontal(|ui| {
            ui.heading(&name);
            ui.label(format!("({})", DiagramSyntax::detect(&self.editor_text)));

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui.button("🗑").on_hover_text("Move to trash").clicked() {
                    self.trash_diagram(&id);
                }
                if ui.button("✏").on_hover_text("Rename").clicked() {
                    self.rename_target = Some(RenameTarget::Diagram(id.clone()));
                    self.rename_text = name.clone();
                }
                if ui.button("💾").on_hover_text("Export source...").clicked() {
                    self.export_source(&name);
                }
                if ui.button("📋").on_hover_text("Copy render URL").clicked() {
                    self.copy_url();
                }
                if ui.button("🌐").on_hover_text("Open in browser").clicked() {
                    self.open_in_browser();
                }
            });
        });

        if self.autosave.is_pending() {
            ui.weak("● Unsaved changes");
        } else {
            ui.weak(format!("Saved {}", format_time(&saved_at)));
        }
        ui.separator();

        // Trashed from the header above
        if self.selected.is_none() {
            return;
        }

        egui::ScrollArea::vertical()
            .auto_shrink([false, false])
            .show(ui, |ui| {
                let response = ui.add(
                    egui::TextEdit::multiline(&mut self.editor_text)
                        .code_editor()
                        .desired_width(f32::INFINITY)
                        .desired_rows(30)
                        .lock_focus(true),
                );
                if response.changed() {
                    self.autosave
                        .push((id.clone(), self.editor_text.clone()), Instant::now());
                }
            });
    }

    fn show_preview_panel(&mut self, ctx: &egui::Context) {
        egui::SidePanel::right("preview_panel")
            .resizable(true)
            .default_width(460.0)
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.heading("Preview")
                        .on_hover_text(format!("Rendered by {}", self.client.server()));
                    if self.rendering {
                        ui.spinner();
                    }
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        if ui
                            .add_enabled(self.selected.is_some(), egui::Button::new("🔄"))
                            .on_hover_text("Render again")
                            .clicked()
                        {
                            self.request_preview();
                        }
                    });
                });
                ui.separator();

                match &self.preview {
                    Preview::Empty => {
                        ui.weak("Nothing to preview");
                    }
                    Preview::Svg { uri, bytes } => {
                        egui::ScrollArea::both()
                            .auto_shrink([false, false])
                            .show(ui, |ui| {
                                ui.add(
                                    egui::Image::from_bytes(uri.clone(), bytes.clone())
                                        .max_width(ui.available_width()),
                                );
                            });
                    }
                    Preview::Failed(error) => {
                        ui.colored_label(egui::Color32::RED, error);
                    }
                }
            });
    }

    // ------------------------------------------------------------------
    // Dialogs
    // ------------------------------------------------------------------

    fn show_new_category_dialog(&mut self, ctx: &egui::Context) {
        if !self.show_new_category_dialog {
            return;
        }

        let mut close_dialog = false;
        let mut create = false;

        egui::Window::new("📁 New Category")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                egui::Grid::new("new_category_grid")
                    .num_columns(2)
                    .spacing([10.0, 8.0])
                    .show(ui, |ui| {
                        ui.label("Name:");
                        ui.add(
                            egui::TextEdit::singleline(&mut self.new_category_name)
                                .hint_text("Architecture")
                                .desired_width(260.0),
                        );
                        ui.end_row();

                        ui.label("Description:");
                        ui.add(
                            egui::TextEdit::singleline(&mut self.new_category_description)
                                .hint_text("Optional")
                                .desired_width(260.0),
                        );
                        ui.end_row();
                    });

                ui.add_space(10.0);
                ui.horizontal(|ui| {
                    let can_create = !self.new_category_name.trim().is_empty();
                    if ui
                        .add_enabled(can_create, egui::Button::new("Create"))
                        .clicked()
                    {
                        create = true;
                    }
                    if ui.button("Cancel").clicked() {
                        close_dialog = true;
                    }
                });
            });

        if create {
            if let Err(e) = self.create_category() {
                self.set_error("Failed to create category", e);
            }
            close_dialog = true;
        }
        if close_dialog {
            self.show_new_category_dialog = false;
        }
    }

    fn show_new_diagram_dialog(&mut self, ctx: &egui::Context) {
        if !self.show_new_diagram_dialog {
            return;
        }

        let mut close_dialog = false;
        let mut create = false;
        let categories: Vec<(String, String)> = self
            .board
            .stores
            .categories
            .items()
            .iter()
            .map(|c| (c.id.clone(), c.name.clone()))
            .collect();

        egui::Window::new("➕ New Diagram")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                egui::Grid::new("new_diagram_grid")
                    .num_columns(2)
                    .spacing([10.0, 8.0])
                    .show(ui, |ui| {
                        ui.label("Name:");
                        ui.add(
                            egui::TextEdit::singleline(&mut self.new_diagram_name)
                                .hint_text("Login sequence")
                                .desired_width(260.0),
                        );
                        ui.end_row();

                        ui.label("Syntax:");
                        ui.horizontal(|ui| {
                            for syntax in [DiagramSyntax::PlantUml, DiagramSyntax::Mermaid] {
                                ui.radio_value(
                                    &mut self.new_diagram_syntax,
                                    syntax,
                                    syntax.to_string(),
                                );
                            }
                        });
                        ui.end_row();

                        ui.label("Category:");
                        let selected_name = self
                            .new_diagram_category
                            .as_ref()
                            .and_then(|id| categories.iter().find(|(cid, _)| cid == id))
                            .map(|(_, name)| name.clone())
                            .unwrap_or_else(|| "Uncategorized".to_string());
                        egui::ComboBox::from_id_salt("new_diagram_category")
                            .selected_text(selected_name)
                            .show_ui(ui, |ui| {
                                ui.selectable_value(
                                    &mut self.new_diagram_category,
                                    None,
                                    "Uncategorized",
                                );
                                for (id, name) in &categories {
                                    ui.selectable_value(
                                        &mut self.new_diagram_category,
                                        Some(id.clone()),
                                        name,
                                    );
                                }
                            });
                        ui.end_row();
                    });

                ui.add_space(10.0);
                ui.horizontal(|ui| {
                    let can_create = !self.new_diagram_name.trim().is_empty();
                    if ui
                        .add_enabled(can_create, egui::Button::new("Create"))
                        .clicked()
                    {
                        create = true;
                    }
                    if ui.button("Cancel").clicked() {
                        close_dialog = true;
                    }
                });
            });

        if create {
            if let Err(e) = self.create_diagram() {
                self.set_error("Failed to create diagram", e);
            }
            close_dialog = true;
        }
        if close_dialog {
            self.show_new_diagram_dialog = false;
        }
    }

    fn show_rename_dialog(&mut self, ctx: &egui::Context) {
        let Some(target) = self.rename_target.clone() else {
            return;
        };

        let mut close_dialog = false;
        let mut apply = false;
        let title = match target {
            RenameTarget::Category(_) => "✏ Rename Category",
            RenameTarget::Diagram(_) => "✏ Rename Diagram",
        };

        egui::Window::new(title)
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                let response = ui.add(
                    egui::TextEdit::singleline(&mut self.rename_text).desired_width(260.0),
                );
                if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                    apply = true;
                }

                ui.add_space(10.0);
                ui.horizontal(|ui| {
                    let can_apply = !self.rename_text.trim().is_empty();
                    if ui.add_enabled(can_apply, egui::Button::new("Rename")).clicked() {
                        apply = true;
                    }
                    if ui.button("Cancel").clicked() {
                        close_dialog = true;
                    }
                });
            });

        if apply && !self.rename_text.trim().is_empty() {
            let name = self.rename_text.trim().to_string();
            match self.apply_rename(target, name) {
                Ok(()) => self.set_info("Renamed"),
                Err(e) => self.set_error("Failed to rename", e),
            }
            close_dialog = true;
        }
        if close_dialog {
            self.rename_target = None;
        }
    }

    fn show_delete_category_dialog(&mut self, ctx: &egui::Context) {
        let Some(id) = self.confirm_delete_category.clone() else {
            return;
        };
        let name = self
            .board
            .stores
            .categories
            .get(&id)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| id.clone());

        let mut close_dialog = false;
        let mut confirmed = false;

        egui::Window::new("🗑 Delete Category")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label(format!("Delete category \"{}\"?", name));
                ui.weak("Its diagrams move to Uncategorized.");
                ui.add_space(10.0);
                ui.horizontal(|ui| {
                    if ui.button("Delete").clicked() {
                        confirmed = true;
                    }
                    if ui.button("Cancel").clicked() {
                        close_dialog = true;
                    }
                });
            });

        if confirmed {
            self.delete_category(&id);
            close_dialog = true;
        }
        if close_dialog {
            self.confirm_delete_category = None;
        }
    }

    fn show_purge_dialog(&mut self, ctx: &egui::Context) {
        let Some(id) = self.confirm_purge.clone() else {
            return;
        };
        let name = self
            .board
            .stores
            .diagrams
            .get(&id)
            .map(|d| d.name.clone())
            .unwrap_or_else(|| id.clone());

        let mut close_dialog = false;
        let mut confirmed = false;

        egui::Window::new("❌ Delete Forever")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label(format!("Permanently delete \"{}\"?", name));
                ui.colored_label(egui::Color32::RED, "This cannot be undone.");
                ui.add_space(10.0);
                ui.horizontal(|ui| {
                    if ui.button("Delete forever").clicked() {
                        confirmed = true;
                    }
                    if ui.button("Cancel").clicked() {
                        close_dialog = true;
                    }
                });
            });

        if confirmed {
            self.purge_diagram(&id);
            close_dialog = true;
        }
        if close_dialog {
            self.confirm_purge = None;
        }
    }

    fn show_trash_window(&mut self, ctx: &egui::Context) {
        if !self.show_trash {
            return;
        }

        let trashed: Vec<(String, String, DateTime<Utc>)> = self
            .board
            .stores
            .diagrams
            .trashed()
            .map(|d| (d.id.clone(), d.name.clone(), d.updated_at))
            .collect();

        let mut open = true;
        let mut restore = None;
        let mut purge = None;

        egui::Window::new("🗑 Trash")
            .open(&mut open)
            .resizable(true)
            .default_width(420.0)
            .show(ctx, |ui| {
                if trashed.is_empty() {
                    ui.weak("The trash is empty.");
                    return;
                }
                egui::Grid::new("trash_grid")
                    .num_columns(3)
                    .striped(true)
                    .spacing([12.0, 6.0])
                    .show(ui, |ui| {
                        for (id, name, deleted_at) in &trashed {
                            ui.label(name);
                            ui.weak(format_time(deleted_at));
                            ui.horizontal(|ui| {
                                if ui.button("↩ Restore").clicked() {
                                    restore = Some(id.clone());
                                }
                                if ui.button("❌ Delete forever").clicked() {
                                    purge = Some(id.clone());
                                }
                            });
                            ui.end_row();
                        }
                    });
            });

        self.show_trash = open;
        if let Some(id) = restore {
            self.restore_diagram(&id);
        }
        if purge.is_some() {
            self.confirm_purge = purge;
        }
    }
}

fn format_time(time: &DateTime<Utc>) -> String {
    time.with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

impl eframe::App for UmlBoardApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let now = Instant::now();
        if let Some((id, content)) = self.autosave.poll(now) {
            self.save_content(id, content);
        }
        if let Some(wait) = self.autosave.time_until_due(now) {
            ctx.request_repaint_after(wait);
        }
        if ctx.input(|i| i.viewport().close_requested()) {
            self.flush_autosave();
        }

        self.poll_preview(ctx);

        // Handle drag release before the panels recompute the drop target
        self.handle_drag_release(ctx);

        self.show_top_panel(ctx);
        self.show_explorer_panel(ctx);
        self.show_preview_panel(ctx);
        egui::CentralPanel::default().show(ctx, |ui| {
            self.show_editor(ui);
        });

        self.show_new_category_dialog(ctx);
        self.show_new_diagram_dialog(ctx);
        self.show_rename_dialog(ctx);
        self.show_delete_category_dialog(ctx);
        self.show_purge_dialog(ctx);
        self.show_trash_window(ctx);
    }
}
