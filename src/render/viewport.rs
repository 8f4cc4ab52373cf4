//! Draws the scene graph into an egui painter.
//!
//! Geometry is projected on the CPU and emitted as textured egui meshes. The
//! box is convex, so back-face culling alone resolves visibility between its
//! faces; the ground plane and its shadow are always drawn first.

use crate::assets::texture::{
    fit_within, RenderTexture, TextureId as SourceTextureId, TextureParams, WrapMode,
};
use crate::render::camera::CameraState;
use crate::scene::{BoxNode, Face, Material, SceneAssembler, SpotLight, FACE_ORDER};
use egui::epaint::{Mesh, Vertex, WHITE_UV};
use egui::{Color32, Pos2, Rect, Shape, Stroke};
use glam::{Mat4, Vec2, Vec3, Vec4, Vec4Swizzles};
use std::collections::HashMap;

const FACE_SEGMENTS: usize = 8;
const GROUND_SEGMENTS: usize = 48;
const SHADOW_LAYERS: usize = 3;
/// PCF-style kernel radius, in shadow map texels.
const SHADOW_KERNEL_TEXELS: f32 = 4.0;

pub struct Projector {
    view_proj: Mat4,
    rect: Rect,
    eye: Vec3,
}

impl Projector {
    pub fn new(camera: &CameraState, rect: Rect) -> Self {
        let aspect = rect.width() / rect.height().max(1.0);
        Self {
            view_proj: camera.view_projection(aspect),
            rect,
            eye: camera.position,
        }
    }

    /// Screen position of a world point, or `None` outside the depth range.
    pub fn project(&self, point: Vec3) -> Option<Pos2> {
        self.to_screen(self.clip(point))
    }

    pub fn clip(&self, point: Vec3) -> Vec4 {
        self.view_proj * point.extend(1.0)
    }

    /// Clip space z runs 0..w between the near and far planes.
    pub fn to_screen(&self, clip: Vec4) -> Option<Pos2> {
        if clip.w <= 1e-5 {
            return None;
        }
        let ndc = clip.xyz() / clip.w;
        if !(0.0..=1.0).contains(&ndc.z) {
            return None;
        }
        Some(Pos2::new(
            self.rect.left() + (ndc.x + 1.0) * 0.5 * self.rect.width(),
            self.rect.top() + (1.0 - ndc.y) * 0.5 * self.rect.height(),
        ))
    }

    pub fn faces_camera(&self, point: Vec3, normal: Vec3) -> bool {
        normal.dot(self.eye - point) > 0.0
    }
}

/// Per-vertex lighting: ambient plus one spot light with a soft cone edge
/// and distance decay.
pub struct Lighting {
    ambient: f32,
    spot: SpotLight,
    spot_direction: Vec3,
    eye: Vec3,
}

impl Lighting {
    pub fn new(scene: &SceneAssembler, eye: Vec3) -> Self {
        let spot = *scene.spot();
        // An untargeted spot light keeps aiming at the origin.
        let aim = scene.spot_target_point().unwrap_or(Vec3::ZERO);
        let mut spot_direction = (aim - spot.position).normalize_or_zero();
        if spot_direction == Vec3::ZERO {
            spot_direction = Vec3::NEG_Y;
        }
        Self {
            ambient: scene.ambient().intensity,
            spot,
            spot_direction,
            eye,
        }
    }

    /// Scalar spot contribution reaching `point`, ignoring surface orientation.
    pub fn spot_strength(&self, point: Vec3) -> f32 {
        let to_light = self.spot.position - point;
        let distance = to_light.length();
        if distance <= 1e-5 {
            return 0.0;
        }
        let cone = self.cone_falloff(-to_light / distance);
        let attenuation = 1.0 / distance.powf(self.spot.decay).max(0.01);
        self.spot.intensity * cone * attenuation
    }

    fn cone_falloff(&self, light_to_point: Vec3) -> f32 {
        let cos_theta = light_to_point.dot(self.spot_direction);
        let cos_outer = self.spot.angle.cos();
        let cos_inner = (self.spot.angle * (1.0 - self.spot.penumbra)).cos();
        smoothstep(cos_outer, cos_inner, cos_theta)
    }

    pub fn shade(&self, point: Vec3, normal: Vec3, albedo: Vec3, roughness: f32) -> Color32 {
        let mut rgb = albedo * self.ambient;
        let to_light = self.spot.position - point;
        let distance = to_light.length();
        if distance > 1e-5 {
            let l = to_light / distance;
            let n_dot_l = normal.dot(l).max(0.0);
            if n_dot_l > 0.0 {
                let radiance = Vec3::from_array(self.spot.color) * self.spot_strength(point);
                rgb += albedo * radiance * n_dot_l;

                let view = (self.eye - point).normalize_or_zero();
                let half = (l + view).normalize_or_zero();
                let alpha = roughness.clamp(0.05, 1.0).powi(2);
                let shininess = (2.0 / (alpha * alpha) - 2.0).clamp(1.0, 256.0);
                let specular = normal.dot(half).max(0.0).powf(shininess) * (1.0 - roughness);
                rgb += radiance * specular * 0.25;
            }
        }
        Color32::from(egui::Rgba::from_rgb(
            rgb.x.min(1.0),
            rgb.y.min(1.0),
            rgb.z.min(1.0),
        ))
    }
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    if (edge1 - edge0).abs() <= f32::EPSILON {
        return if x >= edge0 { 1.0 } else { 0.0 };
    }
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// GPU-side copies of scene textures, keyed by source texture.
#[derive(Default)]
pub struct TextureCache {
    handles: HashMap<SourceTextureId, egui::TextureHandle>,
}

impl TextureCache {
    pub fn texture_id(&mut self, ctx: &egui::Context, texture: &RenderTexture) -> egui::TextureId {
        self.handles
            .entry(texture.id())
            .or_insert_with(|| {
                let [width, height] = texture.size();
                log::debug!(
                    "Uploading texture '{}' {:?} ({}x{}, {:?})",
                    texture.label(),
                    texture.id(),
                    width,
                    height,
                    texture.params().color_space
                );
                let max_side = ctx.input(|input| input.max_texture_side);
                ctx.load_texture(
                    texture.label(),
                    to_color_image(texture, max_side),
                    texture_options(texture.params()),
                )
            })
            .id()
    }

    /// Drops (and thereby frees) every texture the scene no longer uses.
    pub fn retain_live(&mut self, live: &[SourceTextureId]) {
        self.handles.retain(|id, _| live.contains(id));
    }
}

/// egui samples linearly and has no anisotropic filter; anisotropy above 1
/// turns on trilinear mipmapping instead.
pub fn texture_options(params: TextureParams) -> egui::TextureOptions {
    let mut options = egui::TextureOptions::LINEAR;
    options.wrap_mode = match params.wrap {
        WrapMode::ClampToEdge => egui::TextureWrapMode::ClampToEdge,
        WrapMode::Repeat => egui::TextureWrapMode::Repeat,
    };
    if params.anisotropy > 1 {
        options.mipmap_mode = Some(egui::TextureFilter::Linear);
    }
    options
}

/// Conditioned textures normally fit already; anything the renderer cannot
/// hold is scaled down here rather than handed to egui.
fn to_color_image(texture: &RenderTexture, max_side: usize) -> egui::ColorImage {
    let max_side = u32::try_from(max_side).unwrap_or(u32::MAX);
    let scaled = fit_within(texture.pixels(), max_side);
    if scaled.is_some() {
        log::warn!(
            "Texture '{}' exceeds the renderer limit of {} px; scaling it down",
            texture.label(),
            max_side
        );
    }
    let pixels = scaled.as_ref().unwrap_or(texture.pixels().as_ref());
    let size = [pixels.width() as usize, pixels.height() as usize];
    egui::ColorImage::from_rgba_unmultiplied(size, pixels.as_raw())
}

/// A planar rectangle: `center ± u ± v`, facing `normal`.
#[derive(Debug, Clone, Copy)]
struct Quad {
    center: Vec3,
    u: Vec3,
    v: Vec3,
    normal: Vec3,
}

struct Surface {
    texture: egui::TextureId,
    /// `None` for untextured surfaces.
    repeat: Option<Vec2>,
    albedo: Vec3,
    roughness: f32,
}

/// A grid vertex before it is committed to a mesh.
#[derive(Debug, Clone, Copy)]
struct GridPoint {
    world: Vec3,
    clip: Vec4,
    uv: Pos2,
}

impl GridPoint {
    fn lerp(&self, other: &GridPoint, t: f32) -> GridPoint {
        GridPoint {
            world: self.world.lerp(other.world, t),
            clip: self.clip.lerp(other.clip, t),
            uv: self.uv.lerp(other.uv, t),
        }
    }
}

fn grid_mesh(
    quad: &Quad,
    segments: usize,
    warp: fn(f32) -> f32,
    surface: &Surface,
    projector: &Projector,
    lighting: &Lighting,
) -> Option<Mesh> {
    let stride = segments + 1;
    let mut mesh = Mesh::with_texture(surface.texture);
    let mut points = Vec::with_capacity(stride * stride);
    let mut visible = Vec::with_capacity(stride * stride);

    for row in 0..stride {
        let t = row as f32 / segments as f32 * 2.0 - 1.0;
        for col in 0..stride {
            let s = col as f32 / segments as f32 * 2.0 - 1.0;
            let world = quad.center + quad.u * warp(s) + quad.v * warp(t);
            let uv = match surface.repeat {
                Some(repeat) => Pos2::new(
                    (warp(s) + 1.0) * 0.5 * repeat.x,
                    (1.0 - (warp(t) + 1.0) * 0.5) * repeat.y,
                ),
                None => WHITE_UV,
            };
            let clip = projector.clip(world);
            let projected = projector.to_screen(clip);
            visible.push(projected.is_some());
            points.push(GridPoint { world, clip, uv });
            mesh.vertices.push(Vertex {
                pos: projected.unwrap_or(Pos2::ZERO),
                uv,
                color: lighting.shade(world, quad.normal, surface.albedo, surface.roughness),
            });
        }
    }

    for row in 0..segments {
        for col in 0..segments {
            let a = row * stride + col;
            let b = a + 1;
            let c = a + stride;
            let d = c + 1;
            if [a, b, c, d].iter().all(|&index| visible[index]) {
                mesh.add_triangle(a as u32, b as u32, d as u32);
                mesh.add_triangle(a as u32, d as u32, c as u32);
            } else {
                let corners = [points[a], points[b], points[d], points[c]];
                add_near_clipped(&mut mesh, &corners, quad.normal, surface, projector, lighting);
            }
        }
    }

    (!mesh.indices.is_empty()).then_some(mesh)
}

/// Adds the part of a cell in front of the near plane as a triangle fan.
///
/// A low orbit puts the camera close to the ground, so cells straddling the
/// near plane are common there.
fn add_near_clipped(
    mesh: &mut Mesh,
    corners: &[GridPoint; 4],
    normal: Vec3,
    surface: &Surface,
    projector: &Projector,
    lighting: &Lighting,
) {
    let mut polygon: Vec<GridPoint> = Vec::with_capacity(corners.len() + 2);
    for (index, current) in corners.iter().enumerate() {
        let next = &corners[(index + 1) % corners.len()];
        let (here, there) = (current.clip.z, next.clip.z);
        if here >= 0.0 {
            polygon.push(*current);
        }
        if (here >= 0.0) != (there >= 0.0) {
            let mut crossing = current.lerp(next, here / (here - there));
            // Rounding can leave the crossing a hair behind the plane.
            crossing.clip.z = crossing.clip.z.max(0.0);
            polygon.push(crossing);
        }
    }
    if polygon.len() < 3 {
        return;
    }

    let mut positions = Vec::with_capacity(polygon.len());
    for point in &polygon {
        // Beyond the far plane: leave the cell out.
        let Some(pos) = projector.to_screen(point.clip) else {
            return;
        };
        positions.push(pos);
    }

    let base = mesh.vertices.len() as u32;
    for (point, pos) in polygon.iter().zip(positions) {
        mesh.vertices.push(Vertex {
            pos,
            uv: point.uv,
            color: lighting.shade(point.world, normal, surface.albedo, surface.roughness),
        });
    }
    for index in 1..polygon.len() as u32 - 1 {
        mesh.add_triangle(base, base + index, base + index + 1);
    }
}

fn linear(value: f32) -> f32 {
    value
}

/// Packs ground vertices toward the middle, where the light pool is.
fn centre_weighted(value: f32) -> f32 {
    value * value.abs()
}

pub fn box_face_quad(node: &BoxNode, face: Face) -> (Vec3, Vec3, Vec3, Vec3) {
    let half = node.dimensions.half_extents();
    let normal = face.normal();
    let (u_dir, v_dir) = face.tangents();
    let along = |dir: Vec3| (dir.abs() * half).element_sum();
    (
        node.position + normal * along(normal),
        u_dir * along(u_dir),
        v_dir * along(v_dir),
        normal,
    )
}

fn box_corners(node: &BoxNode) -> [Vec3; 8] {
    let h = node.dimensions.half_extents();
    let mut corners = [Vec3::ZERO; 8];
    for (index, corner) in corners.iter_mut().enumerate() {
        let sign = |bit: usize| if index & bit == 0 { -1.0 } else { 1.0 };
        *corner = node.position + Vec3::new(h.x * sign(1), h.y * sign(2), h.z * sign(4));
    }
    corners
}

/// Andrew's monotone chain; counter-clockwise, without collinear points.
pub fn convex_hull(points: &[Vec2]) -> Vec<Vec2> {
    let mut sorted: Vec<Vec2> = points.to_vec();
    sorted.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    sorted.dedup();
    if sorted.len() < 3 {
        return sorted;
    }
    let cross = |o: Vec2, a: Vec2, b: Vec2| (a - o).perp_dot(b - o);

    let mut lower: Vec<Vec2> = Vec::new();
    for &point in &sorted {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], point) <= 0.0 {
            lower.pop();
        }
        lower.push(point);
    }
    let mut upper: Vec<Vec2> = Vec::new();
    for &point in sorted.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], point) <= 0.0 {
            upper.pop();
        }
        upper.push(point);
    }
    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

/// Outline of the box shadow on the plane `z = ground_z`, cast from a point
/// light at `light`.
pub fn shadow_outline(node: &BoxNode, light: Vec3, ground_z: f32) -> Vec<Vec2> {
    let mut projected = Vec::with_capacity(8);
    for corner in box_corners(node) {
        if corner.z >= light.z || light.z <= ground_z {
            return Vec::new();
        }
        let t = (ground_z - light.z) / (corner.z - light.z);
        let hit = light + (corner - light) * t;
        projected.push(hit.truncate());
    }
    convex_hull(&projected)
}

fn shadow_shapes(
    node: &BoxNode,
    ground_z: f32,
    spot: &SpotLight,
    lighting: &Lighting,
    projector: &Projector,
) -> Vec<Shape> {
    let outline = shadow_outline(node, spot.position, ground_z);
    if outline.len() < 3 {
        return Vec::new();
    }
    let centroid = outline.iter().copied().sum::<Vec2>() / outline.len() as f32;
    let centroid_world = centroid.extend(ground_z);
    let strength = lighting.spot_strength(centroid_world).min(1.0);
    if strength < 0.01 {
        return Vec::new();
    }

    let distance = centroid_world.distance(spot.position);
    let footprint = 2.0 * distance * spot.angle.tan();
    let blur = footprint / spot.shadow_map_size.max(1) as f32 * SHADOW_KERNEL_TEXELS;
    let alpha = (strength * 0.6 * 255.0 / SHADOW_LAYERS as f32) as u8;

    let mut shapes = Vec::with_capacity(SHADOW_LAYERS);
    for layer in 0..SHADOW_LAYERS {
        let expand = blur * (SHADOW_LAYERS - layer) as f32;
        let screen: Option<Vec<Pos2>> = outline
            .iter()
            .map(|&point| {
                let pushed = point + (point - centroid).normalize_or_zero() * expand;
                projector.project(pushed.extend(ground_z))
            })
            .collect();
        if let Some(points) = screen {
            shapes.push(Shape::convex_polygon(
                points,
                Color32::from_black_alpha(alpha),
                Stroke::NONE,
            ));
        }
    }
    shapes
}

#[derive(Default)]
pub struct ScenePainter {
    textures: TextureCache,
}

impl ScenePainter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn paint(
        &mut self,
        ctx: &egui::Context,
        painter: &egui::Painter,
        rect: Rect,
        scene: &SceneAssembler,
    ) {
        let Some(camera) = scene.camera() else {
            return;
        };
        let projector = Projector::new(camera, rect);
        let lighting = Lighting::new(scene, camera.position);
        let mut shapes: Vec<Shape> = Vec::new();

        let ground = scene.ground();
        let ground_quad = Quad {
            center: Vec3::new(0.0, 0.0, ground.z),
            u: Vec3::X * ground.size * 0.5,
            v: Vec3::Y * ground.size * 0.5,
            normal: Vec3::Z,
        };
        let ground_visible = projector.faces_camera(ground_quad.center, ground_quad.normal);
        if ground_visible {
            let surface = self.surface_for(ctx, &ground.material);
            shapes.extend(
                grid_mesh(
                    &ground_quad,
                    GROUND_SEGMENTS,
                    centre_weighted,
                    &surface,
                    &projector,
                    &lighting,
                )
                .map(Shape::mesh),
            );
        }

        if let Some(node) = scene.artwork() {
            if ground_visible {
                shapes.extend(shadow_shapes(
                    node,
                    ground.z,
                    scene.spot(),
                    &lighting,
                    &projector,
                ));
            }
            for face in FACE_ORDER {
                let (center, u, v, normal) = box_face_quad(node, face);
                if !projector.faces_camera(center, normal) {
                    continue;
                }
                let surface = self.surface_for(ctx, node.material(face));
                let quad = Quad {
                    center,
                    u,
                    v,
                    normal,
                };
                shapes.extend(
                    grid_mesh(&quad, FACE_SEGMENTS, linear, &surface, &projector, &lighting)
                        .map(Shape::mesh),
                );
            }
        }

        painter.extend(shapes);
        self.textures.retain_live(&scene.live_textures());
    }

    fn surface_for(&mut self, ctx: &egui::Context, material: &Material) -> Surface {
        let (texture, repeat) = match &material.map {
            Some(texture) => (
                self.textures.texture_id(ctx, texture),
                Some(texture.params().repeat),
            ),
            None => (egui::TextureId::default(), None),
        };
        Surface {
            texture,
            repeat,
            albedo: Vec3::from_array(material.color),
            roughness: material.roughness,
        }
    }
}
