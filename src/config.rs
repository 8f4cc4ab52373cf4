//! Preview configuration.
//!
//! Every tunable the preview depends on lives here so nothing in the scene or
//! upload code reaches for a hidden constant. A config file is optional; any
//! field it omits keeps its default.

use crate::assets::texture::WrapMode;
use std::path::{Path, PathBuf};

/// Fixed unit conversion. Not configurable.
pub const INCHES_TO_METERS: f32 = 0.0254;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    pub sizing: SizingConfig,
    pub textures: TextureConfig,
    pub camera: CameraConfig,
    pub lighting: LightingConfig,
    pub ground: GroundConfig,
    pub assets: AssetPaths,
}

/// Pixel-to-inch divisors. Uploads and the startup artwork use different
/// divisors; both are kept explicit.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SizingConfig {
    pub upload_pixels_per_inch: f32,
    pub startup_pixels_per_inch: f32,
    pub depth_inches: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TextureConfig {
    pub anisotropy: u8,
    pub artwork_wrap: WrapMode,
    pub background_wrap: WrapMode,
    pub background_repeat: [f32; 2],
    pub front_roughness: f32,
    /// Longest texture side kept after conditioning. The renderer's own limit
    /// lowers this further once the device is known.
    pub max_texture_side: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub position: [f32; 3],
    pub fov_deg: f32,
    pub near: f32,
    pub far: f32,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LightingConfig {
    pub ambient_intensity: f32,
    pub spot: SpotLightConfig,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SpotLightConfig {
    pub position: [f32; 3],
    pub angle_rad: f32,
    pub penumbra: f32,
    pub decay: f32,
    pub intensity: f32,
    /// `#rrggbb`, display-referred.
    pub color: String,
    pub shadow_map_size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct GroundConfig {
    pub size: f32,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AssetPaths {
    pub canvas_texture: PathBuf,
    pub startup_artwork: PathBuf,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            sizing: SizingConfig::default(),
            textures: TextureConfig::default(),
            camera: CameraConfig::default(),
            lighting: LightingConfig::default(),
            ground: GroundConfig::default(),
            assets: AssetPaths::default(),
        }
    }
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            upload_pixels_per_inch: 20.0,
            startup_pixels_per_inch: 10.0,
            depth_inches: 1.0,
        }
    }
}

impl Default for TextureConfig {
    fn default() -> Self {
        Self {
            anisotropy: 8,
            artwork_wrap: WrapMode::ClampToEdge,
            background_wrap: WrapMode::Repeat,
            background_repeat: [5.0, 0.5],
            front_roughness: 0.5,
            max_texture_side: 4096,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0, 5.0],
            fov_deg: 50.0,
            near: 0.1,
            far: 2000.0,
        }
    }
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            ambient_intensity: 0.1,
            spot: SpotLightConfig::default(),
        }
    }
}

impl Default for SpotLightConfig {
    fn default() -> Self {
        Self {
            position: [0.0, 3.0, 2.0],
            angle_rad: std::f32::consts::FRAC_PI_4,
            penumbra: 1.0,
            decay: 1.0,
            intensity: 2.0,
            color: "#fcce90".to_string(),
            shadow_map_size: 1024,
        }
    }
}

impl Default for GroundConfig {
    fn default() -> Self {
        Self { size: 100.0 }
    }
}

impl Default for AssetPaths {
    fn default() -> Self {
        Self {
            canvas_texture: PathBuf::from("assets/canvas.png"),
            startup_artwork: PathBuf::from("assets/art.png"),
        }
    }
}

impl PreviewConfig {
    pub fn validate(&self) -> Result<()> {
        let sizing = &self.sizing;
        require_positive("sizing.upload_pixels_per_inch", sizing.upload_pixels_per_inch)?;
        require_positive("sizing.startup_pixels_per_inch", sizing.startup_pixels_per_inch)?;
        require_positive("sizing.depth_inches", sizing.depth_inches)?;

        let [repeat_x, repeat_y] = self.textures.background_repeat;
        require_positive("textures.background_repeat[0]", repeat_x)?;
        require_positive("textures.background_repeat[1]", repeat_y)?;
        if !(0.0..=1.0).contains(&self.textures.front_roughness) {
            return Err(ConfigError::Invalid(format!(
                "textures.front_roughness must be within [0, 1], got {}",
                self.textures.front_roughness
            )));
        }

        if self.textures.max_texture_side == 0 {
            return Err(ConfigError::Invalid(
                "textures.max_texture_side must be non-zero".to_string(),
            ));
        }

        let camera = &self.camera;
        if !(camera.fov_deg > 0.0 && camera.fov_deg < 180.0) {
            return Err(ConfigError::Invalid(format!(
                "camera.fov_deg must be within (0, 180), got {}",
                camera.fov_deg
            )));
        }
        require_positive("camera.near", camera.near)?;
        if camera.far <= camera.near {
            return Err(ConfigError::Invalid(format!(
                "camera.far ({}) must exceed camera.near ({})",
                camera.far, camera.near
            )));
        }

        let spot = &self.lighting.spot;
        parse_hex_rgb(&spot.color)?;
        if !(spot.angle_rad > 0.0 && spot.angle_rad < std::f32::consts::FRAC_PI_2) {
            return Err(ConfigError::Invalid(format!(
                "lighting.spot.angle_rad must be within (0, pi/2), got {}",
                spot.angle_rad
            )));
        }
        if !(0.0..=1.0).contains(&spot.penumbra) {
            return Err(ConfigError::Invalid(format!(
                "lighting.spot.penumbra must be within [0, 1], got {}",
                spot.penumbra
            )));
        }
        if spot.shadow_map_size == 0 {
            return Err(ConfigError::Invalid(
                "lighting.spot.shadow_map_size must be non-zero".to_string(),
            ));
        }
        require_positive("ground.size", self.ground.size)?;
        Ok(())
    }

    /// Spot light colour as display-referred bytes. Falls back to white if the
    /// config was never validated.
    pub fn spot_color_rgb(&self) -> [u8; 3] {
        parse_hex_rgb(&self.lighting.spot.color).unwrap_or([255, 255, 255])
    }
}

fn require_positive(field: &str, value: f32) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{field} must be a positive number, got {value}"
        )))
    }
}

/// Parses `#rrggbb` (leading `#` optional).
pub fn parse_hex_rgb(value: &str) -> Result<[u8; 3]> {
    let digits = value.trim().trim_start_matches('#');
    if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ConfigError::Invalid(format!(
            "expected a #rrggbb colour, got {value:?}"
        )));
    }
    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&digits[range], 16)
            .map_err(|_| ConfigError::Invalid(format!("bad colour channel in {value:?}")))
    };
    Ok([channel(0..2)?, channel(2..4)?, channel(4..6)?])
}

pub fn load_config(path: &Path) -> Result<PreviewConfig> {
    let json = std::fs::read_to_string(path)?;
    let config: PreviewConfig = serde_json::from_str(&json)?;
    config.validate()?;
    Ok(config)
}

/// Loads the config at `path` if one was given. Any failure is logged and the
/// defaults are used instead.
pub fn load_or_default(path: Option<&Path>) -> PreviewConfig {
    let Some(path) = path else {
        return PreviewConfig::default();
    };
    match load_config(path) {
        Ok(config) => {
            log::info!("Loaded preview config from {}", path.display());
            config
        }
        Err(err) => {
            log::warn!(
                "Ignoring preview config {}: {}; using defaults",
                path.display(),
                err
            );
            PreviewConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{load_config, load_or_default, parse_hex_rgb, ConfigError, PreviewConfig};
    use crate::assets::texture::WrapMode;

    fn temp_path(tag: &str) -> std::path::PathBuf {
        let nonce = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!(
            "canvas_preview_{}_{}_{}.json",
            tag,
            std::process::id(),
            nonce
        ))
    }

    #[test]
    fn defaults_are_valid() {
        let config = PreviewConfig::default();
        config.validate().unwrap();
        assert_eq!(config.sizing.upload_pixels_per_inch, 20.0);
        assert_eq!(config.sizing.startup_pixels_per_inch, 10.0);
        assert_eq!(config.textures.anisotropy, 8);
        assert_eq!(config.textures.artwork_wrap, WrapMode::ClampToEdge);
        assert_eq!(config.textures.background_wrap, WrapMode::Repeat);
        assert_eq!(config.textures.background_repeat, [5.0, 0.5]);
        assert_eq!(config.textures.max_texture_side, 4096);
        assert_eq!(config.camera.fov_deg, 50.0);
        assert_eq!(config.camera.near, 0.1);
        assert_eq!(config.camera.far, 2000.0);
        assert_eq!(config.spot_color_rgb(), [0xfc, 0xce, 0x90]);
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let path = temp_path("partial");
        std::fs::write(&path, r#"{ "sizing": { "upload_pixels_per_inch": 40.0 } }"#).unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.sizing.upload_pixels_per_inch, 40.0);
        assert_eq!(config.sizing.startup_pixels_per_inch, 10.0);
        assert_eq!(config.camera.fov_deg, 50.0);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn non_positive_divisor_is_rejected() {
        let mut config = PreviewConfig::default();
        config.sizing.upload_pixels_per_inch = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn zero_texture_side_is_rejected() {
        let mut config = PreviewConfig::default();
        config.textures.max_texture_side = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn fov_outside_open_range_is_rejected() {
        let mut config = PreviewConfig::default();
        config.camera.fov_deg = 180.0;
        assert!(config.validate().is_err());
        config.camera.fov_deg = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_file_falls_back_to_defaults() {
        let path = temp_path("invalid");
        std::fs::write(&path, r#"{ "camera": { "fov_deg": -3.0 } }"#).unwrap();
        let config = load_or_default(Some(&path));
        assert_eq!(config, PreviewConfig::default());
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn hex_colour_parsing() {
        assert_eq!(parse_hex_rgb("#fcce90").unwrap(), [252, 206, 144]);
        assert_eq!(parse_hex_rgb("FFFFFF").unwrap(), [255, 255, 255]);
        assert!(parse_hex_rgb("#fff").is_err());
        assert!(parse_hex_rgb("#gg0000").is_err());
    }
}
