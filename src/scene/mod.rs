pub mod dimensions;

use crate::assets::texture::{RenderTexture, TextureId};
use crate::config::PreviewConfig;
use crate::render::camera::{fit_camera, CameraState};
use dimensions::PhysicalDimensions;
use glam::Vec3;
use std::sync::Arc;

/// Box faces in material order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Face {
    Right,
    Left,
    Top,
    Bottom,
    Front,
    Back,
}

pub const FACE_ORDER: [Face; 6] = [
    Face::Right,
    Face::Left,
    Face::Top,
    Face::Bottom,
    Face::Front,
    Face::Back,
];

impl Face {
    pub fn normal(self) -> Vec3 {
        match self {
            Face::Right => Vec3::X,
            Face::Left => Vec3::NEG_X,
            Face::Top => Vec3::Y,
            Face::Bottom => Vec3::NEG_Y,
            Face::Front => Vec3::Z,
            Face::Back => Vec3::NEG_Z,
        }
    }

    /// Texture axes as seen from outside the box: (u to the right, v up).
    /// `cross(u, v)` points along the face normal.
    pub fn tangents(self) -> (Vec3, Vec3) {
        match self {
            Face::Right => (Vec3::NEG_Z, Vec3::Y),
            Face::Left => (Vec3::Z, Vec3::Y),
            Face::Top => (Vec3::X, Vec3::NEG_Z),
            Face::Bottom => (Vec3::X, Vec3::Z),
            Face::Front => (Vec3::X, Vec3::Y),
            Face::Back => (Vec3::NEG_X, Vec3::Y),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

/// Roughness-based surface. An untextured material uses `color` alone.
#[derive(Debug, Clone)]
pub struct Material {
    pub map: Option<Arc<RenderTexture>>,
    pub color: [f32; 3],
    pub roughness: f32,
}

impl Material {
    fn map_id(&self) -> Option<TextureId> {
        self.map.as_ref().map(|texture| texture.id())
    }
}

#[derive(Debug, Clone)]
pub struct BoxNode {
    pub id: NodeId,
    pub position: Vec3,
    pub dimensions: PhysicalDimensions,
    /// One per face in [`FACE_ORDER`]. Non-front faces share one material.
    pub materials: [Arc<Material>; 6],
}

impl BoxNode {
    pub fn material(&self, face: Face) -> &Arc<Material> {
        let index = FACE_ORDER
            .iter()
            .position(|candidate| *candidate == face)
            .unwrap_or(0);
        &self.materials[index]
    }

    fn front_texture_id(&self) -> Option<TextureId> {
        self.material(Face::Front).map_id()
    }

    fn background_texture_id(&self) -> Option<TextureId> {
        self.material(Face::Back).map_id()
    }
}

#[derive(Debug, Clone)]
pub struct GroundPlane {
    pub size: f32,
    /// The plane faces +Z and sits at this depth, flush with the box back.
    pub z: f32,
    pub material: Material,
}

#[derive(Debug, Clone, Copy)]
pub struct AmbientLight {
    pub intensity: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct SpotLight {
    pub position: Vec3,
    pub angle: f32,
    pub penumbra: f32,
    pub decay: f32,
    pub intensity: f32,
    /// Linear RGB.
    pub color: [f32; 3],
    pub shadow_map_size: u32,
    pub target: Option<NodeId>,
}

/// What [`SceneAssembler::update_box`] did to the artwork node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxChange {
    Unchanged,
    Created,
    Rebuilt,
    Removed,
}

/// Owns the scene graph and applies targeted updates to it.
pub struct SceneAssembler {
    ambient: AmbientLight,
    spot: SpotLight,
    ground: GroundPlane,
    artwork: Option<BoxNode>,
    camera: Option<CameraState>,
    front_roughness: f32,
    next_node_id: u64,
}

impl SceneAssembler {
    pub fn new(config: &PreviewConfig) -> Self {
        let spot = &config.lighting.spot;
        let depth_m = config.sizing.depth_inches * crate::config::INCHES_TO_METERS;
        Self {
            ambient: AmbientLight {
                intensity: config.lighting.ambient_intensity,
            },
            spot: SpotLight {
                position: Vec3::from_array(spot.position),
                angle: spot.angle_rad,
                penumbra: spot.penumbra,
                decay: spot.decay,
                intensity: spot.intensity,
                color: srgb_bytes_to_linear(config.spot_color_rgb()),
                shadow_map_size: spot.shadow_map_size,
                target: None,
            },
            ground: GroundPlane {
                size: config.ground.size,
                z: -depth_m / 2.0,
                material: Material {
                    map: None,
                    color: [1.0, 1.0, 1.0],
                    roughness: 1.0,
                },
            },
            artwork: None,
            camera: None,
            front_roughness: config.textures.front_roughness,
            next_node_id: 1,
        }
    }

    pub fn ambient(&self) -> &AmbientLight {
        &self.ambient
    }

    pub fn spot(&self) -> &SpotLight {
        &self.spot
    }

    pub fn ground(&self) -> &GroundPlane {
        &self.ground
    }

    pub fn artwork(&self) -> Option<&BoxNode> {
        self.artwork.as_ref()
    }

    pub fn camera(&self) -> Option<&CameraState> {
        self.camera.as_ref()
    }

    pub fn camera_mut(&mut self) -> Option<&mut CameraState> {
        self.camera.as_mut()
    }

    pub fn mount_camera(&mut self, camera: CameraState) {
        self.camera = Some(camera);
    }

    /// Where the spot light is aimed. Without a mounted box it has no target
    /// and shines along its default direction toward the origin.
    pub fn spot_target_point(&self) -> Option<Vec3> {
        let target = self.spot.target?;
        self.artwork
            .as_ref()
            .filter(|node| node.id == target)
            .map(|node| node.position)
    }

    /// Brings the artwork box in line with the given dimensions and textures.
    ///
    /// Nothing is rendered for the box without a front texture. The box is
    /// rebuilt only when its dimensions or either texture changed.
    pub fn update_box(
        &mut self,
        dimensions: PhysicalDimensions,
        front_texture: Option<&Arc<RenderTexture>>,
        background_texture: &Arc<RenderTexture>,
    ) -> BoxChange {
        self.ground.z = -dimensions.depth_m / 2.0;

        let Some(front_texture) = front_texture else {
            if self.artwork.take().is_some() {
                self.spot.target = None;
                log::debug!("Artwork box removed");
                return BoxChange::Removed;
            }
            return BoxChange::Unchanged;
        };

        if let Some(node) = &self.artwork {
            if node.dimensions == dimensions
                && node.front_texture_id() == Some(front_texture.id())
                && node.background_texture_id() == Some(background_texture.id())
            {
                return BoxChange::Unchanged;
            }
        }

        let change = if self.artwork.is_some() {
            BoxChange::Rebuilt
        } else {
            BoxChange::Created
        };
        let node = self.build_box(dimensions, front_texture, background_texture);
        log::debug!(
            "Artwork box {:?}: {:.3} x {:.3} x {:.4} m",
            change,
            dimensions.face_width_m,
            dimensions.face_height_m,
            dimensions.depth_m
        );
        self.spot.target = Some(node.id);
        self.artwork = Some(node);
        change
    }

    /// Fits the mounted camera to the given face size. No-op without a camera.
    pub fn fit_camera(&mut self, dimensions: &PhysicalDimensions) -> bool {
        let Some(camera) = self.camera.as_mut() else {
            log::debug!("Camera fit skipped: no camera mounted");
            return false;
        };
        let fitted = fit_camera(camera, dimensions.face_width_m, dimensions.face_height_m);
        if fitted {
            log::info!("Camera fitted to z = {:.3} m", camera.position.z);
        } else {
            log::warn!("Camera fit skipped: fov {} out of range", camera.fov_deg);
        }
        fitted
    }

    /// Textures the current scene references.
    pub fn live_textures(&self) -> Vec<TextureId> {
        let mut ids: Vec<TextureId> = self
            .artwork
            .iter()
            .flat_map(|node| node.materials.iter().filter_map(|material| material.map_id()))
            .collect();
        ids.extend(self.ground.material.map_id());
        ids.sort();
        ids.dedup();
        ids
    }

    fn build_box(
        &mut self,
        dimensions: PhysicalDimensions,
        front_texture: &Arc<RenderTexture>,
        background_texture: &Arc<RenderTexture>,
    ) -> BoxNode {
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;

        let canvas = Arc::new(Material {
            map: Some(Arc::clone(background_texture)),
            color: [1.0, 1.0, 1.0],
            roughness: 1.0,
        });
        let front = Arc::new(Material {
            map: Some(Arc::clone(front_texture)),
            color: [1.0, 1.0, 1.0],
            roughness: self.front_roughness,
        });
        let materials = FACE_ORDER.map(|face| {
            if face == Face::Front {
                Arc::clone(&front)
            } else {
                Arc::clone(&canvas)
            }
        });

        BoxNode {
            id,
            position: Vec3::ZERO,
            dimensions,
            materials,
        }
    }
}

fn srgb_bytes_to_linear(rgb: [u8; 3]) -> [f32; 3] {
    rgb.map(|channel| egui::ecolor::linear_f32_from_gamma_u8(channel))
}

#[cfg(test)]
mod tests {
    use super::{BoxChange, Face, SceneAssembler, FACE_ORDER};
    use crate::assets::texture::{RenderTexture, TextureConditioner, WrapMode};
    use crate::assets::DecodedImage;
    use crate::config::PreviewConfig;
    use crate::render::camera::CameraState;
    use crate::scene::dimensions::DimensionCalculator;
    use glam::Vec2;
    use image::RgbaImage;
    use std::sync::Arc;

    fn texture(w: u32, h: u32) -> Arc<RenderTexture> {
        let image = DecodedImage::from_rgba("t", RgbaImage::new(w, h));
        Arc::new(TextureConditioner::new(8).condition_untiled(&image, WrapMode::ClampToEdge))
    }

    fn background() -> Arc<RenderTexture> {
        let image = DecodedImage::from_rgba("canvas", RgbaImage::new(8, 8));
        Arc::new(TextureConditioner::new(8).condition(
            &image,
            WrapMode::Repeat,
            Vec2::new(5.0, 0.5),
        ))
    }

    #[test]
    fn startup_scene_has_no_box() {
        let config = PreviewConfig::default();
        let mut scene = SceneAssembler::new(&config);
        scene.mount_camera(CameraState::from_config(&config.camera));
        let dims = DimensionCalculator::new(1.0).from_pixels(800, 600, 10.0);
        let change = scene.update_box(dims, None, &background());
        assert_eq!(change, BoxChange::Unchanged);
        assert!(scene.artwork().is_none());
        assert!(scene.spot().target.is_none());
        assert!(scene.spot_target_point().is_none());
        assert_eq!(scene.ground().size, 100.0);
        assert!(scene.ambient().intensity > 0.0);
        assert_eq!(scene.camera().unwrap().position.z, 5.0);
    }

    #[test]
    fn face_materials_follow_fixed_order() {
        let config = PreviewConfig::default();
        let mut scene = SceneAssembler::new(&config);
        let front = texture(40, 20);
        let canvas = background();
        let dims = DimensionCalculator::new(1.0).from_pixels(40, 20, 20.0);
        assert_eq!(scene.update_box(dims, Some(&front), &canvas), BoxChange::Created);

        let node = scene.artwork().unwrap();
        for (index, face) in FACE_ORDER.iter().enumerate() {
            let map = node.materials[index].map.as_ref().unwrap();
            if *face == Face::Front {
                assert_eq!(map.id(), front.id());
                assert_eq!(node.materials[index].roughness, 0.5);
            } else {
                assert_eq!(map.id(), canvas.id());
            }
        }
        assert!(Arc::ptr_eq(node.material(Face::Left), node.material(Face::Top)));
        assert_eq!(scene.spot().target, Some(node.id));
        assert_eq!(scene.spot_target_point(), Some(glam::Vec3::ZERO));
    }

    #[test]
    fn ground_sits_behind_the_box() {
        let config = PreviewConfig::default();
        let mut scene = SceneAssembler::new(&config);
        let dims = DimensionCalculator::new(2.0).from_pixels(40, 20, 20.0);
        scene.update_box(dims, Some(&texture(4, 4)), &background());
        assert!((scene.ground().z + dims.depth_m / 2.0).abs() < 1e-7);
    }

    #[test]
    fn unchanged_inputs_do_not_rebuild() {
        let config = PreviewConfig::default();
        let mut scene = SceneAssembler::new(&config);
        let front = texture(4, 4);
        let canvas = background();
        let dims = DimensionCalculator::new(1.0).from_pixels(40, 20, 20.0);
        scene.update_box(dims, Some(&front), &canvas);
        let first_id = scene.artwork().unwrap().id;
        assert_eq!(scene.update_box(dims, Some(&front), &canvas), BoxChange::Unchanged);
        assert_eq!(scene.artwork().unwrap().id, first_id);
    }

    #[test]
    fn new_dimensions_or_texture_rebuild_the_box() {
        let config = PreviewConfig::default();
        let mut scene = SceneAssembler::new(&config);
        let canvas = background();
        let calculator = DimensionCalculator::new(1.0);
        let front = texture(4, 4);
        scene.update_box(calculator.from_inches(10.0, 5.0), Some(&front), &canvas);
        let first_id = scene.artwork().unwrap().id;

        let change = scene.update_box(calculator.from_inches(12.0, 5.0), Some(&front), &canvas);
        assert_eq!(change, BoxChange::Rebuilt);
        let second_id = scene.artwork().unwrap().id;
        assert_ne!(first_id, second_id);

        let change = scene.update_box(calculator.from_inches(12.0, 5.0), Some(&texture(4, 4)), &canvas);
        assert_eq!(change, BoxChange::Rebuilt);
        assert_eq!(scene.spot().target, Some(scene.artwork().unwrap().id));
    }

    #[test]
    fn clearing_the_front_texture_removes_the_box() {
        let config = PreviewConfig::default();
        let mut scene = SceneAssembler::new(&config);
        let canvas = background();
        let dims = DimensionCalculator::new(1.0).from_inches(10.0, 5.0);
        scene.update_box(dims, Some(&texture(4, 4)), &canvas);
        assert_eq!(scene.update_box(dims, None, &canvas), BoxChange::Removed);
        assert!(scene.artwork().is_none());
        assert!(scene.spot().target.is_none());
    }

    #[test]
    fn fit_without_camera_is_a_no_op() {
        let config = PreviewConfig::default();
        let mut scene = SceneAssembler::new(&config);
        let dims = DimensionCalculator::new(1.0).from_inches(10.0, 30.0);
        assert!(!scene.fit_camera(&dims));
        assert!(scene.camera().is_none());
    }

    #[test]
    fn fit_with_camera_uses_given_dimensions() {
        let config = PreviewConfig::default();
        let mut scene = SceneAssembler::new(&config);
        scene.mount_camera(CameraState::from_config(&config.camera));
        let dims = DimensionCalculator::new(1.0).from_inches(10.0, 30.0);
        assert!(scene.fit_camera(&dims));
        let expected = dims.face_height_m / (50.0f32.to_radians() / 2.0).tan();
        assert!((scene.camera().unwrap().position.z - expected).abs() < 1e-5);
    }

    #[test]
    fn face_tangents_are_right_handed() {
        for face in FACE_ORDER {
            let (u, v) = face.tangents();
            assert!((u.cross(v) - face.normal()).length() < 1e-6);
        }
    }

    #[test]
    fn live_textures_track_the_box() {
        let config = PreviewConfig::default();
        let mut scene = SceneAssembler::new(&config);
        assert!(scene.live_textures().is_empty());
        let front = texture(4, 4);
        let canvas = background();
        scene.update_box(
            DimensionCalculator::new(1.0).from_inches(1.0, 1.0),
            Some(&front),
            &canvas,
        );
        let live = scene.live_textures();
        assert_eq!(live.len(), 2);
        assert!(live.contains(&front.id()) && live.contains(&canvas.id()));
    }
}
