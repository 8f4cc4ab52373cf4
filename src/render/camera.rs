use crate::config::CameraConfig;
use glam::{Mat4, Vec3};

const MIN_POLAR: f32 = 0.01;
const MIN_DISTANCE: f32 = 0.05;
const MAX_DISTANCE: f32 = 200.0;

/// Perspective camera looking at an orbit target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraState {
    pub position: Vec3,
    pub target: Vec3,
    /// Vertical field of view in degrees.
    pub fov_deg: f32,
    pub near: f32,
    pub far: f32,
}

impl CameraState {
    pub fn from_config(config: &CameraConfig) -> Self {
        Self {
            position: Vec3::from_array(config.position),
            target: Vec3::ZERO,
            fov_deg: config.fov_deg,
            near: config.near,
            far: config.far,
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, Vec3::Y)
    }

    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(
            self.fov_deg.to_radians(),
            aspect.max(1e-3),
            self.near,
            self.far,
        )
    }

    pub fn view_projection(&self, aspect: f32) -> Mat4 {
        self.projection_matrix(aspect) * self.view_matrix()
    }
}

/// Distance at which the larger face side exactly fills the vertical field of
/// view. `None` for a field of view outside (0, 180) degrees.
pub fn fit_distance(face_width_m: f32, face_height_m: f32, fov_deg: f32) -> Option<f32> {
    if !(fov_deg > 0.0 && fov_deg < 180.0) {
        return None;
    }
    let distance = face_width_m.max(face_height_m) / (fov_deg.to_radians() / 2.0).tan();
    distance.is_finite().then_some(distance)
}

/// Moves the camera along Z so the face fills the view; X and Y are left alone.
/// Returns false, leaving the camera untouched, when no distance can be computed.
pub fn fit_camera(camera: &mut CameraState, face_width_m: f32, face_height_m: f32) -> bool {
    match fit_distance(face_width_m, face_height_m, camera.fov_deg) {
        Some(distance) => {
            camera.position.z = distance;
            true
        }
        None => false,
    }
}

/// Orbit-style camera controller. The camera position is the source of truth;
/// each gesture re-derives the spherical coordinates around the target.
#[derive(Debug, Clone, Copy)]
pub struct OrbitControls {
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    pub pan_speed: f32,
}

impl Default for OrbitControls {
    fn default() -> Self {
        Self {
            rotate_speed: 1.0,
            zoom_speed: 1.0,
            pan_speed: 1.0,
        }
    }
}

impl OrbitControls {
    /// Rotates by screen-space drag, where a drag across the full viewport
    /// height is one full turn.
    pub fn rotate(&self, camera: &mut CameraState, delta_px: [f32; 2], viewport_height: f32) {
        let scale = std::f32::consts::TAU / viewport_height.max(1.0) * self.rotate_speed;
        self.rotate_by_angles(camera, -delta_px[0] * scale, -delta_px[1] * scale);
    }

    pub fn rotate_by_angles(&self, camera: &mut CameraState, azimuth_delta: f32, polar_delta: f32) {
        let offset = camera.position - camera.target;
        let radius = offset.length().max(MIN_DISTANCE);
        // Y-up spherical coordinates; azimuth measured from +Z.
        let mut azimuth = offset.x.atan2(offset.z);
        let mut polar = (offset.y / radius).clamp(-1.0, 1.0).acos();
        azimuth = wrap_angle(azimuth + azimuth_delta);
        polar = (polar + polar_delta).clamp(MIN_POLAR, std::f32::consts::PI - MIN_POLAR);
        let sin_polar = polar.sin();
        camera.position = camera.target
            + Vec3::new(
                radius * sin_polar * azimuth.sin(),
                radius * polar.cos(),
                radius * sin_polar * azimuth.cos(),
            );
    }

    /// Positive `steps` move toward the target.
    pub fn zoom(&self, camera: &mut CameraState, steps: f32) {
        let offset = camera.position - camera.target;
        let radius = offset.length();
        if radius <= f32::EPSILON {
            return;
        }
        let factor = 0.95f32.powf(steps * self.zoom_speed);
        let new_radius = (radius * factor).clamp(MIN_DISTANCE, MAX_DISTANCE);
        camera.position = camera.target + offset / radius * new_radius;
    }

    /// Translates camera and target together in the view plane.
    pub fn pan(&self, camera: &mut CameraState, delta_px: [f32; 2], viewport_height: f32) {
        let offset = camera.position - camera.target;
        let distance = offset.length();
        let forward = (-offset).normalize_or_zero();
        let right = forward.cross(Vec3::Y).normalize_or_zero();
        let up = right.cross(forward).normalize_or_zero();
        // World units covered by one pixel at the target's depth.
        let world_per_px = 2.0 * distance * (camera.fov_deg.to_radians() / 2.0).tan()
            / viewport_height.max(1.0)
            * self.pan_speed;
        let shift = (-right * delta_px[0] + up * delta_px[1]) * world_per_px;
        camera.position += shift;
        camera.target += shift;
    }
}

fn wrap_angle(angle: f32) -> f32 {
    const TWO_PI: f32 = std::f32::consts::PI * 2.0;
    if angle.is_finite() {
        (angle + std::f32::consts::PI).rem_euclid(TWO_PI) - std::f32::consts::PI
    } else {
        0.0
    }
}
