//! Application shell: window, image loading, selection wiring, export dialog.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, TryRecvError, channel};
use std::thread;
use std::time::{Duration, Instant};

use eframe::egui;
use image::DynamicImage;
use log::{error, info};

use crate::export::{self, ExportSpec, SizeField};
use crate::geometry::{self, DisplayRect, NaturalRect};
use crate::selection::SelectionState;

/// How long transient status messages stay visible.
const STATUS_TIMEOUT: Duration = Duration::from_secs(3);
/// Padding around the displayed image.
const IMAGE_PADDING: f32 = 20.0;
/// Radius of the selection handles.
const HANDLE_RADIUS: f32 = 6.0;

const ERROR_COLOR: egui::Color32 = egui::Color32::from_rgb(210, 80, 80);
const WARNING_COLOR: egui::Color32 = egui::Color32::from_rgb(220, 160, 40);

struct LoadedImage {
    image: Arc<DynamicImage>,
    texture: egui::TextureHandle,
    path: Option<PathBuf>,
}

impl LoadedImage {
    fn natural_size(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }

    fn native_ratio(&self) -> f32 {
        self.image.width() as f32 / self.image.height() as f32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusLevel {
    Info,
    Error,
}

struct StatusMessage {
    text: String,
    level: StatusLevel,
    /// Transient messages clear on their own after [`STATUS_TIMEOUT`].
    transient: bool,
    shown_at: Instant,
}

/// State of the export dialog while it is open. Discarded on close, rebuilt
/// from the current selection on the next open.
struct ExportDialog {
    width_text: String,
    height_text: String,
    aspect_locked: bool,
    /// Ratio captured from the mapped crop (or the full image) when the
    /// dialog opened. Recomputation always uses this, never the current
    /// field values.
    locked_ratio: f32,
    /// Which field the user touched last; re-locking recomputes the other.
    last_edited: SizeField,
    saving: bool,
}

impl ExportDialog {
    fn new(width: u32, height: u32, locked_ratio: f32) -> Self {
        Self {
            width_text: width.to_string(),
            height_text: height.to_string(),
            aspect_locked: true,
            locked_ratio,
            last_edited: SizeField::Width,
            saving: false,
        }
    }

    fn width_edited(&mut self) {
        self.last_edited = SizeField::Width;
        if self.aspect_locked {
            if let Ok(width) = export::parse_size_field(&self.width_text, SizeField::Width) {
                self.height_text =
                    geometry::height_for_width(width, self.locked_ratio).to_string();
            }
        }
    }

    fn height_edited(&mut self) {
        self.last_edited = SizeField::Height;
        if self.aspect_locked {
            if let Ok(height) = export::parse_size_field(&self.height_text, SizeField::Height) {
                self.width_text =
                    geometry::width_for_height(height, self.locked_ratio).to_string();
            }
        }
    }

    /// Turning the lock back on recomputes the dependent dimension without
    /// touching the one the user last edited.
    fn relock(&mut self) {
        match self.last_edited {
            SizeField::Width => self.width_edited(),
            SizeField::Height => self.height_edited(),
        }
    }

    /// First validation problem across both fields, if any.
    fn field_error(&self) -> Option<String> {
        if let Err(msg) = export::parse_size_field(&self.width_text, SizeField::Width) {
            return Some(msg);
        }
        if let Err(msg) = export::parse_size_field(&self.height_text, SizeField::Height) {
            return Some(msg);
        }
        None
    }

    fn spec(&self) -> Option<ExportSpec> {
        let width = export::parse_size_field(&self.width_text, SizeField::Width).ok()?;
        let height = export::parse_size_field(&self.height_text, SizeField::Height).ok()?;
        Some(ExportSpec {
            width,
            height,
            aspect_locked: self.aspect_locked,
        })
    }
}

pub struct RecropApp {
    loaded: Option<LoadedImage>,
    selection: SelectionState,
    /// Mapped crop in natural pixels, recomputed on every drag-complete.
    crop_rect: Option<NaturalRect>,
    /// Constrain the drag selection to the image's native ratio.
    selection_locked: bool,
    /// Set when the selection lock was just turned on; the snap happens in
    /// the image pass, where the display size is known.
    snap_pending: bool,
    dialog: Option<ExportDialog>,
    pending_save: Option<Receiver<anyhow::Result<PathBuf>>>,
    status: Option<StatusMessage>,
}

impl RecropApp {
    pub fn new(_cc: &eframe::CreationContext<'_>) -> Self {
        Self {
            loaded: None,
            selection: SelectionState::default(),
            crop_rect: None,
            selection_locked: false,
            snap_pending: false,
            dialog: None,
            pending_save: None,
            status: None,
        }
    }

    fn set_status(&mut self, text: impl Into<String>, level: StatusLevel, transient: bool) {
        self.status = Some(StatusMessage {
            text: text.into(),
            level,
            transient,
            shown_at: Instant::now(),
        });
    }

    fn open_image(&mut self, ctx: &egui::Context, path: PathBuf) {
        // Release the previous bitmap and texture before installing the new
        // one; repeated file picks must not accumulate.
        self.loaded = None;
        self.selection.clear();
        self.crop_rect = None;
        self.dialog = None;
        self.status = None;

        match image::open(&path) {
            Ok(img) => {
                info!("loaded {} ({}x{})", path.display(), img.width(), img.height());
                let texture = load_texture(ctx, &img);
                self.loaded = Some(LoadedImage {
                    image: Arc::new(img),
                    texture,
                    path: Some(path),
                });
            }
            Err(err) => {
                error!("failed to open {}: {err}", path.display());
                self.set_status(
                    format!("Failed to open {}: {err}", path.display()),
                    StatusLevel::Error,
                    false,
                );
            }
        }
    }

    /// Re-map the current selection into natural pixels.
    fn refresh_crop_rect(&mut self, display_size: egui::Vec2) {
        let Some(loaded) = &self.loaded else {
            return;
        };
        self.crop_rect = self.selection.rect().map(|rect| {
            let display = DisplayRect {
                x: rect.min.x * display_size.x,
                y: rect.min.y * display_size.y,
                width: rect.width() * display_size.x,
                height: rect.height() * display_size.y,
            };
            geometry::map_to_natural(
                display,
                (display_size.x, display_size.y),
                loaded.natural_size(),
            )
        });
    }

    /// Open the export dialog, prefilled from the mapped crop or the full
    /// image when there is no usable selection.
    fn open_export_dialog(&mut self) {
        let Some(loaded) = &self.loaded else {
            return;
        };
        let (width, height) = match self.crop_rect {
            Some(rect) if !rect.is_degenerate() => (rect.width, rect.height),
            _ => loaded.natural_size(),
        };
        self.dialog = Some(ExportDialog::new(
            width,
            height,
            width as f32 / height as f32,
        ));
    }

    /// Confirm the export: ask for a destination, then hand composition and
    /// encoding to a worker thread.
    fn start_export(&mut self) {
        let Some(loaded) = &self.loaded else {
            return;
        };
        let Some(spec) = self.dialog.as_ref().and_then(ExportDialog::spec) else {
            return;
        };

        let suggested = export::export_file_name(
            loaded.path.as_deref(),
            spec.width,
            spec.height,
            chrono::Utc::now().timestamp_millis(),
        );
        let Some(path) = rfd::FileDialog::new()
            .add_filter("Image", &["png", "jpg", "jpeg"])
            .set_file_name(&suggested)
            .save_file()
        else {
            return;
        };

        let image = Arc::clone(&loaded.image);
        let rect = self.crop_rect;
        let (tx, rx) = channel();
        thread::spawn(move || {
            let result = export::save_export(&image, rect, spec, &path).map(|()| path);
            let _ = tx.send(result);
        });

        if let Some(dialog) = &mut self.dialog {
            dialog.saving = true;
        }
        self.pending_save = Some(rx);
        self.set_status("Saving…", StatusLevel::Info, false);
    }

    fn poll_save(&mut self, ctx: &egui::Context) {
        let Some(rx) = &self.pending_save else {
            return;
        };
        match rx.try_recv() {
            Err(TryRecvError::Empty) => {
                ctx.request_repaint_after(Duration::from_millis(100));
            }
            Ok(Ok(path)) => {
                self.pending_save = None;
                self.dialog = None;
                self.set_status(
                    format!("Saved {}", path.display()),
                    StatusLevel::Info,
                    true,
                );
            }
            Ok(Err(err)) => {
                self.pending_save = None;
                // The dialog keeps its state so the user can retry.
                if let Some(dialog) = &mut self.dialog {
                    dialog.saving = false;
                }
                error!("export failed: {err:#}");
                self.set_status(format!("Save failed: {err:#}"), StatusLevel::Error, false);
            }
            Err(TryRecvError::Disconnected) => {
                self.pending_save = None;
                if let Some(dialog) = &mut self.dialog {
                    dialog.saving = false;
                }
                self.set_status(
                    "Save failed: export worker exited unexpectedly",
                    StatusLevel::Error,
                    false,
                );
            }
        }
    }

    fn expire_status(&mut self, ctx: &egui::Context) {
        if let Some(status) = &self.status {
            if status.transient {
                let elapsed = status.shown_at.elapsed();
                if elapsed >= STATUS_TIMEOUT {
                    self.status = None;
                } else {
                    ctx.request_repaint_after(STATUS_TIMEOUT - elapsed);
                }
            }
        }
    }

    fn top_controls(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        ui.horizontal(|ui| {
            let busy = self.pending_save.is_some();
            if ui
                .add_enabled(!busy, egui::Button::new("Open image…"))
                .clicked()
            {
                if let Some(path) = rfd::FileDialog::new()
                    .add_filter("Image", &["png", "jpg", "jpeg", "bmp"])
                    .pick_file()
                {
                    self.open_image(ctx, path);
                }
            }

            if self.loaded.is_some()
                && ui
                    .add_enabled(!busy, egui::Button::new("Export…"))
                    .clicked()
            {
                self.open_export_dialog();
            }

            if let Some(status) = &self.status {
                match status.level {
                    StatusLevel::Info => ui.label(&status.text),
                    StatusLevel::Error => ui.colored_label(ERROR_COLOR, &status.text),
                };
            }
        });

        let Some(loaded) = &self.loaded else {
            return;
        };
        let (nw, nh) = loaded.natural_size();
        ui.horizontal(|ui| {
            if let Some(path) = &loaded.path {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    ui.label(name);
                }
            }
            ui.label(format!("{nw} x {nh} px"));
            ui.separator();
            match self.crop_rect {
                Some(rect) if !rect.is_degenerate() => {
                    ui.label(format!("Selection: {} x {} px", rect.width, rect.height));
                }
                Some(_) => {
                    ui.label("Selection too small, the full image will be exported");
                }
                None => {
                    ui.label("Drag on the image to select a region");
                }
            }
        });

        ui.horizontal(|ui| {
            let response = ui.checkbox(
                &mut self.selection_locked,
                "Lock selection to image ratio",
            );
            if response.changed() {
                if self.selection_locked {
                    self.snap_pending = true;
                } else {
                    self.set_status(
                        "Free selection may distort the exported image",
                        StatusLevel::Info,
                        true,
                    );
                }
            }
        });
    }

    /// Draw the image fitted into the remaining panel space and run the
    /// selection interaction on top of it.
    fn image_view(&mut self, ui: &mut egui::Ui) {
        let Some(loaded) = &self.loaded else {
            return;
        };
        let texture_id = loaded.texture.id();
        let image_size = loaded.texture.size_vec2();
        let native_ratio = loaded.native_ratio();

        let available_size = ui.available_size();
        let max_size = available_size - egui::vec2(IMAGE_PADDING * 2.0, IMAGE_PADDING * 2.0);
        if max_size.x <= 0.0 || max_size.y <= 0.0 {
            return;
        }

        // Fit within the available space while keeping the aspect ratio.
        let scale = (max_size.x / image_size.x).min(max_size.y / image_size.y);
        let display_size = image_size * scale;
        let total_size = display_size + egui::vec2(IMAGE_PADDING * 2.0, IMAGE_PADDING * 2.0);

        let x_offset = ((available_size.x - total_size.x) / 2.0).max(0.0);
        let y_offset = ((available_size.y - total_size.y) / 2.0).max(0.0);
        let start_pos = ui.cursor().min + egui::vec2(x_offset, y_offset);
        let target_rect = egui::Rect::from_min_size(start_pos, total_size);

        let response = ui.allocate_rect(target_rect, egui::Sense::drag());
        let painter = ui.painter_at(target_rect);

        let image_rect = egui::Rect::from_min_size(
            target_rect.min + egui::vec2(IMAGE_PADDING, IMAGE_PADDING),
            display_size,
        );

        painter.image(
            texture_id,
            image_rect,
            egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
            egui::Color32::WHITE,
        );

        if self.snap_pending {
            self.snap_pending = false;
            self.selection.snap_to_ratio(native_ratio, display_size);
            self.refresh_crop_rect(display_size);
        }

        let to_screen = |rect: egui::Rect| {
            egui::Rect::from_min_max(
                image_rect.lerp_inside(rect.min.to_vec2()),
                image_rect.lerp_inside(rect.max.to_vec2()),
            )
        };
        let to_norm = |pos: egui::Pos2| {
            egui::pos2(
                (pos.x - image_rect.min.x) / display_size.x,
                (pos.y - image_rect.min.y) / display_size.y,
            )
        };

        if response.drag_started() {
            if let Some(pos) = response.interact_pointer_pos() {
                let handle = self
                    .selection
                    .rect()
                    .and_then(|rect| SelectionState::hit_test(pos, to_screen(rect)));
                self.selection.begin_drag(to_norm(pos), handle);
            }
        }

        if response.dragged() {
            if let Some(pos) = response.interact_pointer_pos() {
                let delta = response.drag_delta() / display_size;
                let ratio = self.selection_locked.then_some(native_ratio);
                self.selection.drag_to(to_norm(pos), delta, display_size, ratio);
            }
        }

        if response.drag_stopped() && self.selection.end_drag() {
            self.refresh_crop_rect(display_size);
        }

        if let Some(rect) = self.selection.rect() {
            paint_selection(&painter, image_rect, to_screen(rect));
        }
    }

    fn export_dialog_window(&mut self, ctx: &egui::Context) {
        let mut keep_open = true;
        let mut cancelled = false;
        let mut confirmed = false;

        let Some(dialog) = &mut self.dialog else {
            return;
        };
        egui::Window::new("Export image")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
            .open(&mut keep_open)
            .show(ctx, |ui| {
                let mut width_changed = false;
                let mut height_changed = false;

                egui::Grid::new("export_size")
                    .num_columns(2)
                    .spacing([8.0, 6.0])
                    .show(ui, |ui| {
                        ui.label("Width (px):");
                        width_changed = ui
                            .add(
                                egui::TextEdit::singleline(&mut dialog.width_text)
                                    .desired_width(80.0),
                            )
                            .changed();
                        ui.end_row();

                        ui.label("Height (px):");
                        height_changed = ui
                            .add(
                                egui::TextEdit::singleline(&mut dialog.height_text)
                                    .desired_width(80.0),
                            )
                            .changed();
                        ui.end_row();
                    });

                if width_changed {
                    dialog.width_edited();
                }
                if height_changed {
                    dialog.height_edited();
                }

                if ui
                    .checkbox(&mut dialog.aspect_locked, "Lock aspect ratio")
                    .changed()
                    && dialog.aspect_locked
                {
                    dialog.relock();
                }
                if !dialog.aspect_locked {
                    ui.colored_label(
                        WARNING_COLOR,
                        "Manual sizes may distort the image",
                    );
                }

                if let Some(msg) = dialog.field_error() {
                    ui.colored_label(ERROR_COLOR, msg);
                }

                ui.separator();
                ui.horizontal(|ui| {
                    if ui
                        .add_enabled(!dialog.saving, egui::Button::new("Cancel"))
                        .clicked()
                    {
                        cancelled = true;
                    }
                    let can_save = dialog.field_error().is_none() && !dialog.saving;
                    if ui
                        .add_enabled(can_save, egui::Button::new("Save…"))
                        .clicked()
                    {
                        confirmed = true;
                    }
                    if dialog.saving {
                        ui.label("Saving…");
                    }
                });
            });

        let saving = self.dialog.as_ref().is_some_and(|d| d.saving);
        if (!keep_open || cancelled) && !saving {
            // Closing discards the pending spec; nothing else changes.
            self.dialog = None;
            return;
        }
        if confirmed {
            self.start_export();
        }
    }
}

impl eframe::App for RecropApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_save(ctx);
        self.expire_status(ctx);

        // Handle dropped files.
        if self.pending_save.is_none() && !ctx.input(|i| i.raw.dropped_files.is_empty()) {
            let dropped_files = ctx.input(|i| i.raw.dropped_files.clone());
            if let Some(path) = dropped_files.first().and_then(|f| f.path.clone()) {
                self.open_image(ctx, path);
            }
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            self.top_controls(ui, ctx);
            if self.loaded.is_some() {
                ui.separator();
                self.image_view(ui);
            }
        });

        self.export_dialog_window(ctx);
    }
}

fn load_texture(ctx: &egui::Context, image: &DynamicImage) -> egui::TextureHandle {
    let size = [image.width() as _, image.height() as _];
    let image_buffer = image.to_rgba8();
    let pixels = image_buffer.as_flat_samples();
    let color_image = egui::ColorImage::from_rgba_unmultiplied(size, pixels.as_slice());
    ctx.load_texture("image", color_image, egui::TextureOptions::LINEAR)
}


/// Dim everything outside the selection, then draw its border and handles.
fn paint_selection(painter: &egui::Painter, image_rect: egui::Rect, selection: egui::Rect) {
    let overlay_color = egui::Color32::from_black_alpha(150);

    // Top
    painter.rect_filled(
        egui::Rect::from_min_max(
            image_rect.min,
            egui::pos2(image_rect.max.x, selection.min.y),
        ),
        0.0,
        overlay_color,
    );
    // Bottom
    painter.rect_filled(
        egui::Rect::from_min_max(
            egui::pos2(image_rect.min.x, selection.max.y),
            image_rect.max,
        ),
        0.0,
        overlay_color,
    );
    // Left
    painter.rect_filled(
        egui::Rect::from_min_max(
            egui::pos2(image_rect.min.x, selection.min.y),
            egui::pos2(selection.min.x, selection.max.y),
        ),
        0.0,
        overlay_color,
    );
    // Right
    painter.rect_filled(
        egui::Rect::from_min_max(
            egui::pos2(selection.max.x, selection.min.y),
            egui::pos2(image_rect.max.x, selection.max.y),
        ),
        0.0,
        overlay_color,
    );

    painter.rect_stroke(
        selection,
        0.0,
        egui::Stroke::new(1.0, egui::Color32::WHITE),
    );

    let handle_stroke = egui::Stroke::new(1.0, egui::Color32::BLACK);
    let handles = [
        selection.min,
        selection.max,
        egui::pos2(selection.min.x, selection.max.y),
        egui::pos2(selection.max.x, selection.min.y),
        selection.center_top(),
        selection.center_bottom(),
        selection.left_center(),
        selection.right_center(),
    ];
    for pos in handles {
        painter.circle(pos, HANDLE_RADIUS, egui::Color32::WHITE, handle_stroke);
    }
}
