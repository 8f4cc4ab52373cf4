use crate::scene::dimensions::PhysicalDimensions;
use crate::upload::{UploadStage, UploadState};

pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp", "tif", "tiff"];

/// What the user asked for this frame.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct UiActions {
    pub open_image: bool,
    /// Width and height in inches after a manual edit.
    pub dimensions_edited: Option<(f32, f32)>,
}

pub struct UiState {
    width_in: f32,
    height_in: f32,
    show_panel: bool,
}

impl UiState {
    pub fn new() -> Self {
        Self {
            width_in: 0.0,
            height_in: 0.0,
            show_panel: true,
        }
    }

    pub fn dimensions_in(&self) -> (f32, f32) {
        (self.width_in, self.height_in)
    }

    /// Overwrites both inputs with computed dimensions.
    pub fn set_dimensions(&mut self, dimensions: &PhysicalDimensions) {
        self.width_in = dimensions.width_inches();
        self.height_in = dimensions.height_inches();
    }

    pub fn toggle_panel(&mut self) {
        self.show_panel = !self.show_panel;
    }

    pub fn show(&mut self, ctx: &egui::Context, upload: &UploadState) -> UiActions {
        let mut actions = UiActions::default();
        if !self.show_panel {
            return actions;
        }

        egui::Window::new("Canvas")
            .default_pos(egui::pos2(12.0, 12.0))
            .resizable(false)
            .show(ctx, |ui| {
                let busy = matches!(upload, UploadState::InFlight { .. });
                if ui.button("Open image…").clicked() {
                    actions.open_image = true;
                }
                ui.separator();

                let mut edited = false;
                egui::Grid::new("dimensions").num_columns(2).show(ui, |ui| {
                    ui.label("Width (in)");
                    edited |= ui
                        .add(
                            egui::DragValue::new(&mut self.width_in)
                                .speed(0.1)
                                .range(0.0..=f32::MAX)
                                .max_decimals(2),
                        )
                        .changed();
                    ui.end_row();
                    ui.label("Height (in)");
                    edited |= ui
                        .add(
                            egui::DragValue::new(&mut self.height_in)
                                .speed(0.1)
                                .range(0.0..=f32::MAX)
                                .max_decimals(2),
                        )
                        .changed();
                    ui.end_row();
                });
                if edited {
                    actions.dimensions_edited = Some((self.width_in, self.height_in));
                }

                ui.separator();
                ui.horizontal(|ui| {
                    if busy {
                        ui.spinner();
                    }
                    let text = status_line(upload);
                    match upload {
                        UploadState::Failed { .. } => {
                            ui.colored_label(ui.visuals().error_fg_color, text);
                        }
                        _ => {
                            ui.label(text);
                        }
                    }
                });
                ui.weak("Drag: orbit · Right-drag: pan · Scroll: zoom · F1: hide");
            });
        actions
    }
}

pub fn status_line(state: &UploadState) -> String {
    match state {
        UploadState::Idle => "No image loaded".to_string(),
        UploadState::InFlight { generation, stage } => {
            let stage = match stage {
                UploadStage::Reading => "Reading",
                UploadStage::Decoding => "Decoding",
                UploadStage::Conditioning => "Preparing texture",
            };
            format!("{stage}… (upload #{generation})")
        }
        UploadState::Ready { generation } => format!("Showing upload #{generation}"),
        UploadState::Failed {
            generation,
            message,
        } => format!("Upload #{generation} failed: {message}"),
    }
}

#[cfg(test)]
mod tests {
    use super::{status_line, UiState};
    use crate::scene::dimensions::DimensionCalculator;
    use crate::upload::{UploadStage, UploadState};

    #[test]
    fn set_dimensions_reports_inches() {
        let mut ui = UiState::new();
        let dimensions = DimensionCalculator::new(1.0).from_pixels(800, 400, 20.0);
        ui.set_dimensions(&dimensions);
        let (width, height) = ui.dimensions_in();
        assert!((width - 40.0).abs() < 1e-3);
        assert!((height - 20.0).abs() < 1e-3);
    }

    #[test]
    fn status_line_names_stage_and_failure() {
        assert_eq!(status_line(&UploadState::Idle), "No image loaded");
        let decoding = UploadState::InFlight {
            generation: 3,
            stage: UploadStage::Decoding,
        };
        assert!(status_line(&decoding).starts_with("Decoding"));
        let failed = UploadState::Failed {
            generation: 4,
            message: "bad header".to_string(),
        };
        assert_eq!(status_line(&failed), "Upload #4 failed: bad header");
    }

    #[test]
    fn hidden_panel_reports_no_actions() {
        let mut ui = UiState::new();
        ui.toggle_panel();
        let ctx = egui::Context::default();
        let mut actions = None;
        let _ = ctx.run(egui::RawInput::default(), |ctx| {
            actions = Some(ui.show(ctx, &UploadState::Idle));
        });
        assert_eq!(actions, Some(super::UiActions::default()));
    }
}
