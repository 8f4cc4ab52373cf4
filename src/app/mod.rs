mod egui_host;
mod input;
mod timing;

pub use egui_host::EguiFrameOutput;

use crate::assets::texture::{RenderTexture, TextureConditioner};
use crate::assets::{load_canvas_or_fallback, load_image, resolve_asset_path};
use crate::config::PreviewConfig;
use crate::render::{CameraState, OrbitControls, RenderContext, RenderError, ScenePainter};
use crate::scene::dimensions::{DimensionCalculator, PhysicalDimensions};
use crate::scene::SceneAssembler;
use crate::ui::{UiActions, UiState, IMAGE_EXTENSIONS};
use crate::upload::{UploadPipeline, UploadSettings};
use egui_host::EguiHost;
use input::{InputAction, InputState};
use timing::{frame_duration_for_window, FrameTiming};

use glam::Vec2;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowAttributes, WindowId};

/// Scroll points per zoom step.
const SCROLL_PER_ZOOM_STEP: f32 = 50.0;

pub struct App {
    window: Option<Arc<Window>>,
    render: Option<RenderContext>,
    egui: Option<EguiHost>,
    config: PreviewConfig,
    scene: SceneAssembler,
    uploads: UploadPipeline,
    calculator: DimensionCalculator,
    background: Arc<RenderTexture>,
    front: Option<Arc<RenderTexture>>,
    dimensions: PhysicalDimensions,
    ui: UiState,
    ui_wants_keyboard: bool,
    painter: ScenePainter,
    controls: OrbitControls,
    input: InputState,
    timing: FrameTiming,
    target_frame_duration: Duration,
    next_frame_time: Instant,
}

impl App {
    fn new(config: PreviewConfig) -> Self {
        let conditioner = TextureConditioner::new(config.textures.anisotropy)
            .with_max_side(config.textures.max_texture_side);
        let calculator = DimensionCalculator::new(config.sizing.depth_inches);

        let canvas = load_canvas_or_fallback(&config.assets.canvas_texture);
        let background = Arc::new(conditioner.condition(
            &canvas,
            config.textures.background_wrap,
            Vec2::from_array(config.textures.background_repeat),
        ));

        // The startup artwork only seeds the size inputs; the box waits for
        // an upload to supply its front texture.
        let startup_path = resolve_asset_path(&config.assets.startup_artwork);
        let dimensions = match load_image(&startup_path) {
            Ok(image) => {
                let dimensions =
                    calculator.compute(&image, config.sizing.startup_pixels_per_inch);
                log::info!(
                    "Startup artwork {}x{} px -> {:.1} x {:.1} in",
                    image.width_px(),
                    image.height_px(),
                    dimensions.width_inches(),
                    dimensions.height_inches()
                );
                dimensions
            }
            Err(err) => {
                log::warn!("{}; size inputs start at zero", err);
                calculator.empty()
            }
        };

        let mut ui = UiState::new();
        ui.set_dimensions(&dimensions);
        let mut scene = SceneAssembler::new(&config);
        scene.update_box(dimensions, None, &background);

        let uploads = UploadPipeline::new(UploadSettings {
            pixels_per_inch: config.sizing.upload_pixels_per_inch,
            wrap: config.textures.artwork_wrap,
            conditioner,
            calculator,
        });

        Self {
            window: None,
            render: None,
            egui: None,
            config,
            scene,
            uploads,
            calculator,
            background,
            front: None,
            dimensions,
            ui,
            ui_wants_keyboard: false,
            painter: ScenePainter::new(),
            controls: OrbitControls::default(),
            input: InputState::default(),
            timing: FrameTiming::new("Canvas Preview", Instant::now()),
            target_frame_duration: Duration::from_millis(16),
            next_frame_time: Instant::now(),
        }
    }

    fn init_render(&mut self, window: &Arc<Window>) -> Result<(), RenderError> {
        let render = RenderContext::new(window.clone())?;
        let max_texture_side = render.max_texture_side();
        self.egui = Some(EguiHost::new(window, max_texture_side as usize));
        self.uploads.limit_texture_side(max_texture_side);
        self.render = Some(render);
        if self.scene.camera().is_none() {
            self.scene
                .mount_camera(CameraState::from_config(&self.config.camera));
        }
        Ok(())
    }

    fn handle_resize(&mut self, new_size: PhysicalSize<u32>) {
        if let Some(render) = &mut self.render {
            render.resize(new_size);
        }
    }

    fn update_target_frame_duration(&mut self, window: &Window) {
        self.target_frame_duration = frame_duration_for_window(window);
        self.next_frame_time = Instant::now() + self.target_frame_duration;
    }

    /// Publishes the newest finished upload to the scene and refits the camera
    /// to the dimensions it produced.
    fn apply_committed_upload(&mut self) -> bool {
        let Some(outcome) = self.uploads.poll() else {
            return false;
        };
        log::info!(
            "Upload #{} committed at {:.1} x {:.1} in",
            outcome.generation,
            outcome.dimensions.width_inches(),
            outcome.dimensions.height_inches()
        );
        self.dimensions = outcome.dimensions;
        self.front = Some(outcome.texture);
        self.ui.set_dimensions(&self.dimensions);
        self.scene
            .update_box(self.dimensions, self.front.as_ref(), &self.background);
        self.scene.fit_camera(&self.dimensions);
        true
    }

    fn apply_dimension_edit(&mut self, width_in: f32, height_in: f32) {
        self.dimensions = self.calculator.from_inches(width_in, height_in);
        let change = self
            .scene
            .update_box(self.dimensions, self.front.as_ref(), &self.background);
        if self.dimensions.has_area() {
            log::debug!(
                "Dimensions set to {:.2} x {:.2} in ({:?})",
                width_in,
                height_in,
                change
            );
        } else {
            log::warn!("Zero-area canvas: {:.2} x {:.2} in", width_in, height_in);
        }
    }

    fn handle_open_image_action(&mut self) {
        let path = rfd::FileDialog::new()
            .add_filter("Image", IMAGE_EXTENSIONS)
            .pick_file();
        if let Some(generation) = self.uploads.on_file_selected(path) {
            log::debug!(
                "Upload #{} queued; {} worker(s) running",
                generation,
                self.uploads.in_flight()
            );
        }
    }

    fn update_keyboard_orbit(&mut self) {
        let Some((azimuth, polar)) = self.input.orbit_angles(self.timing.frame_dt) else {
            return;
        };
        if let Some(camera) = self.scene.camera_mut() {
            self.controls.rotate_by_angles(camera, azimuth, polar);
        }
    }

    fn redraw(&mut self) {
        let Some(window) = self.window.clone() else {
            return;
        };
        self.apply_committed_upload();
        self.update_keyboard_orbit();

        let ui_start = Instant::now();
        let Some(egui) = self.egui.as_mut() else {
            return;
        };
        let mut actions = UiActions::default();
        let frame = egui.run_ui(&window, |ctx| {
            actions = self.ui.show(ctx, self.uploads.state());
            show_viewport(ctx, &mut self.scene, &mut self.painter, &self.controls);
        });
        self.ui_wants_keyboard = frame.wants_keyboard_input;
        self.timing
            .set_paint_ms(ui_start.elapsed().as_secs_f32() * 1000.0);

        if let Some(render) = &mut self.render {
            if let Err(err) = render.render(&frame) {
                log::warn!("Frame dropped: {}", err);
            }
        }
        self.timing.update(Some(&window), Instant::now());

        if let Some((width_in, height_in)) = actions.dimensions_edited {
            self.apply_dimension_edit(width_in, height_in);
        }
        if actions.open_image {
            self.handle_open_image_action();
        }
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, key: PhysicalKey, pressed: bool) {
        if key == PhysicalKey::Code(KeyCode::Escape) {
            if pressed {
                log::info!("Escape pressed, shutting down...");
                event_loop.exit();
            }
            return;
        }
        if self.ui_wants_keyboard {
            return;
        }
        if pressed && key == PhysicalKey::Code(KeyCode::F1) {
            self.ui.toggle_panel();
            return;
        }
        if let InputAction::Zoom(steps) = self.input.handle_key(key, pressed) {
            if let Some(camera) = self.scene.camera_mut() {
                self.controls.zoom(camera, steps);
            }
        }
    }
}

/// Full-window 3D view. Pointer gestures on it drive the orbit controls.
fn show_viewport(
    ctx: &egui::Context,
    scene: &mut SceneAssembler,
    painter: &mut ScenePainter,
    controls: &OrbitControls,
) {
    egui::CentralPanel::default()
        .frame(egui::Frame::NONE)
        .show(ctx, |ui| {
            let rect = ui.max_rect();
            let response = ui.allocate_rect(rect, egui::Sense::click_and_drag());
            if let Some(camera) = scene.camera_mut() {
                let delta = response.drag_delta();
                if response.dragged_by(egui::PointerButton::Primary) {
                    controls.rotate(camera, [delta.x, delta.y], rect.height());
                } else if response.dragged_by(egui::PointerButton::Secondary) {
                    controls.pan(camera, [delta.x, delta.y], rect.height());
                }
                if response.hovered() {
                    let scroll = ui.input(|input| input.smooth_scroll_delta.y);
                    if scroll != 0.0 {
                        controls.zoom(camera, scroll / SCROLL_PER_ZOOM_STEP);
                    }
                }
            }
            painter.paint(ui.ctx(), ui.painter(), rect, scene);
        });
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attrs = WindowAttributes::default()
            .with_title(self.timing.base_title())
            .with_inner_size(PhysicalSize::new(1280u32, 720u32))
            .with_resizable(true);

        let window = match event_loop.create_window(window_attrs) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                log::error!("Failed to create window: {}", err);
                event_loop.exit();
                return;
            }
        };
        log::info!(
            "Window created: {}x{}",
            window.inner_size().width,
            window.inner_size().height
        );

        if let Err(err) = self.init_render(&window) {
            log::error!("Renderer initialization failed: {}", err);
            event_loop.exit();
            return;
        }
        self.update_target_frame_duration(&window);
        window.request_redraw();
        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let consumed = match (&mut self.egui, &self.window) {
            (Some(egui), Some(window)) => egui.on_window_event(window, &event),
            _ => false,
        };

        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                event_loop.exit();
            }
            WindowEvent::Focused(focused) => {
                if !focused {
                    self.input.release_all();
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                let pressed = event.state == ElementState::Pressed;
                if !consumed || !pressed {
                    self.handle_key(event_loop, event.physical_key, pressed);
                }
            }
            WindowEvent::Resized(new_size) => {
                log::debug!("Window resized to {}x{}", new_size.width, new_size.height);
                self.handle_resize(new_size);
                if let Some(window) = self.window.clone() {
                    self.update_target_frame_duration(&window);
                }
            }
            WindowEvent::Moved(_) => {
                if let Some(window) = self.window.clone() {
                    self.update_target_frame_duration(&window);
                }
            }
            WindowEvent::RedrawRequested => {
                self.redraw();
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let now = Instant::now();
        if now >= self.next_frame_time {
            if let Some(window) = &self.window {
                window.request_redraw();
            }
            self.next_frame_time = now + self.target_frame_duration;
        }
        event_loop.set_control_flow(ControlFlow::WaitUntil(self.next_frame_time));
    }
}

pub fn run() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    log::info!("🚀 Canvas Preview");
    log::info!("   Open an image to preview it as a canvas print; ESC to exit");

    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = crate::config::load_or_default(config_path.as_deref());

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(err) => {
            log::error!("Failed to create event loop: {}", err);
            return;
        }
    };
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = App::new(config);
    if let Err(err) = event_loop.run_app(&mut app) {
        log::error!("Event loop error: {}", err);
    }

    log::info!("👋 Goodbye!");
}

#[cfg(test)]
mod tests {
    use super::App;
    use crate::assets::test_support::temp_png;
    use crate::config::{PreviewConfig, INCHES_TO_METERS};
    use crate::render::CameraState;
    use crate::upload::UploadState;
    use glam::Vec3;
    use std::time::{Duration, Instant};

    fn headless_app() -> App {
        let mut config = PreviewConfig::default();
        config.assets.canvas_texture = "missing/canvas.png".into();
        config.assets.startup_artwork = "missing/art.png".into();
        App::new(config)
    }

    fn commit_upload(app: &mut App, path: std::path::PathBuf) {
        app.uploads.on_file_selected(Some(path));
        let deadline = Instant::now() + Duration::from_secs(10);
        while !app.apply_committed_upload() {
            assert!(Instant::now() < deadline, "upload did not commit");
            assert!(!matches!(app.uploads.state(), UploadState::Failed { .. }));
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn startup_without_upload_shows_no_box() {
        let mut app = headless_app();
        assert!(app.scene.artwork().is_none());
        assert!(app.scene.spot().intensity > 0.0);
        assert_eq!(app.scene.ground().size, 100.0);
        assert!(app.scene.live_textures().is_empty());
        assert_eq!(app.ui.dimensions_in(), (0.0, 0.0));
        app.scene
            .mount_camera(CameraState::from_config(&app.config.camera));
        assert_eq!(
            app.scene.camera().map(|camera| camera.position),
            Some(Vec3::new(0.0, 0.0, 5.0))
        );
    }

    #[test]
    fn committed_upload_builds_box_and_fits_camera() {
        let mut app = headless_app();
        app.scene
            .mount_camera(CameraState::from_config(&app.config.camera));
        commit_upload(&mut app, temp_png("app-commit", 200, 600));

        let node = app.scene.artwork().expect("box after upload");
        let expected_h = 600.0 / 20.0 * INCHES_TO_METERS;
        assert!((node.dimensions.face_height_m - expected_h).abs() < 1e-6);
        let (width_in, height_in) = app.ui.dimensions_in();
        assert!((width_in - 10.0).abs() < 1e-3);
        assert!((height_in - 30.0).abs() < 1e-3);

        let camera = app.scene.camera().expect("camera mounted");
        let expected_z = expected_h / (50.0f32.to_radians() / 2.0).tan();
        assert!((camera.position.z - expected_z).abs() < 1e-4);
    }

    #[test]
    fn dimension_edit_overrides_computed_size() {
        let mut app = headless_app();
        commit_upload(&mut app, temp_png("app-edit", 80, 40));
        let front_before = app.front.as_ref().map(|texture| texture.id());

        app.apply_dimension_edit(30.0, 20.0);
        let node = app.scene.artwork().expect("box");
        assert!((node.dimensions.face_width_m - 30.0 * INCHES_TO_METERS).abs() < 1e-6);
        assert!((node.dimensions.face_height_m - 20.0 * INCHES_TO_METERS).abs() < 1e-6);
        assert_eq!(app.front.as_ref().map(|texture| texture.id()), front_before);
    }

    #[test]
    fn dimension_edit_before_upload_keeps_box_hidden() {
        let mut app = headless_app();
        app.apply_dimension_edit(12.0, 8.0);
        assert!(app.scene.artwork().is_none());
    }
}
