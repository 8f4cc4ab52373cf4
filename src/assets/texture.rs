use crate::assets::DecodedImage;
use glam::Vec2;
use image::imageops::FilterType;
use image::RgbaImage;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_TEXTURE_ID: AtomicU64 = AtomicU64::new(1);

/// egui's texture side limit before a renderer reports its own.
pub const DEFAULT_MAX_TEXTURE_SIDE: u32 = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(u64);

impl TextureId {
    fn next() -> Self {
        Self(NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Artwork is always display-referred; egui samples it as sRGB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    Srgb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WrapMode {
    ClampToEdge,
    Repeat,
}

/// Sampling state of a conditioned texture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureParams {
    pub color_space: ColorSpace,
    pub anisotropy: u8,
    pub wrap: WrapMode,
    pub repeat: Vec2,
}

/// Pixel data plus the sampling state it should be rendered with.
///
/// Each conditioning pass yields a fresh [`TextureId`], which is what the
/// scene compares to decide whether a material needs rebuilding.
#[derive(Debug, Clone)]
pub struct RenderTexture {
    id: TextureId,
    label: String,
    pixels: Arc<RgbaImage>,
    params: TextureParams,
}

impl RenderTexture {
    pub fn id(&self) -> TextureId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn pixels(&self) -> &Arc<RgbaImage> {
        &self.pixels
    }

    pub fn params(&self) -> TextureParams {
        self.params
    }

    pub fn size(&self) -> [u32; 2] {
        [self.pixels.width(), self.pixels.height()]
    }
}

/// Applies the fixed colour-space / filtering / tiling policy to decoded images.
///
/// Images with a side longer than `max_side` are scaled down to fit, keeping
/// their aspect ratio. Physical sizes are computed from the decoded image, so
/// this never changes how large the print is.
#[derive(Debug, Clone, Copy)]
pub struct TextureConditioner {
    anisotropy: u8,
    max_side: u32,
}

impl TextureConditioner {
    pub fn new(anisotropy: u8) -> Self {
        Self {
            anisotropy: anisotropy.max(1),
            max_side: DEFAULT_MAX_TEXTURE_SIDE,
        }
    }

    pub fn with_max_side(self, max_side: u32) -> Self {
        Self {
            max_side: max_side.max(1),
            ..self
        }
    }

    pub fn max_side(&self) -> u32 {
        self.max_side
    }

    pub fn condition(&self, image: &DecodedImage, wrap: WrapMode, repeat: Vec2) -> RenderTexture {
        let pixels = match fit_within(image.pixels(), self.max_side) {
            Some(scaled) => {
                log::debug!(
                    "Scaled texture '{}' from {}x{} to {}x{}",
                    image.label(),
                    image.width_px(),
                    image.height_px(),
                    scaled.width(),
                    scaled.height()
                );
                Arc::new(scaled)
            }
            None => Arc::clone(image.pixels()),
        };
        RenderTexture {
            id: TextureId::next(),
            label: image.label().to_string(),
            pixels,
            params: TextureParams {
                color_space: ColorSpace::Srgb,
                anisotropy: self.anisotropy,
                wrap,
                repeat,
            },
        }
    }

    /// Conditioning with no tiling, as used for uploaded artwork.
    pub fn condition_untiled(&self, image: &DecodedImage, wrap: WrapMode) -> RenderTexture {
        self.condition(image, wrap, Vec2::ONE)
    }
}

/// Downscales `pixels` so neither side exceeds `max_side`. `None` when it already fits.
pub fn fit_within(pixels: &RgbaImage, max_side: u32) -> Option<RgbaImage> {
    let (width, height) = pixels.dimensions();
    let longest = width.max(height);
    if longest <= max_side {
        return None;
    }
    let scale = max_side as f64 / longest as f64;
    let scaled_width = ((width as f64 * scale).round() as u32).clamp(1, max_side);
    let scaled_height = ((height as f64 * scale).round() as u32).clamp(1, max_side);
    Some(image::imageops::resize(
        pixels,
        scaled_width,
        scaled_height,
        FilterType::Triangle,
    ))
}

#[cfg(test)]
mod tests {
    use super::{fit_within, ColorSpace, TextureConditioner, WrapMode, DEFAULT_MAX_TEXTURE_SIDE};
    use crate::assets::DecodedImage;
    use glam::Vec2;
    use image::RgbaImage;

    fn image(width: u32, height: u32) -> DecodedImage {
        DecodedImage::from_rgba("test", RgbaImage::new(width, height))
    }

    #[test]
    fn colour_space_and_anisotropy_do_not_depend_on_image_size() {
        let conditioner = TextureConditioner::new(8);
        for (w, h) in [(1, 1), (800, 400), (17, 2048)] {
            let texture = conditioner.condition_untiled(&image(w, h), WrapMode::ClampToEdge);
            assert_eq!(texture.params().color_space, ColorSpace::Srgb);
            assert_eq!(texture.params().anisotropy, 8);
            assert_eq!(texture.size(), [w, h]);
        }
    }

    #[test]
    fn untiled_conditioning_uses_unit_repeat() {
        let conditioner = TextureConditioner::new(8);
        let texture = conditioner.condition_untiled(&image(4, 4), WrapMode::ClampToEdge);
        assert_eq!(texture.params().repeat, Vec2::ONE);
        assert_eq!(texture.params().wrap, WrapMode::ClampToEdge);
    }

    #[test]
    fn background_tiling_is_preserved() {
        let conditioner = TextureConditioner::new(8);
        let texture =
            conditioner.condition(&image(64, 64), WrapMode::Repeat, Vec2::new(5.0, 0.5));
        assert_eq!(texture.params().wrap, WrapMode::Repeat);
        assert_eq!(texture.params().repeat, Vec2::new(5.0, 0.5));
    }

    #[test]
    fn conditioning_is_a_pure_function_of_its_inputs() {
        let conditioner = TextureConditioner::new(8);
        let source = image(32, 16);
        let first = conditioner.condition(&source, WrapMode::Repeat, Vec2::new(2.0, 3.0));
        let second = conditioner.condition(&source, WrapMode::Repeat, Vec2::new(2.0, 3.0));
        assert_eq!(first.params(), second.params());
        assert_eq!(first.size(), second.size());
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn oversized_images_are_scaled_to_the_side_limit() {
        let conditioner = TextureConditioner::new(8);
        let texture = conditioner.condition_untiled(&image(4032, 3024), WrapMode::ClampToEdge);
        assert_eq!(texture.size(), [DEFAULT_MAX_TEXTURE_SIDE, 1536]);
        assert_eq!(texture.params().anisotropy, 8);
    }

    #[test]
    fn side_limit_is_configurable_and_keeps_aspect() {
        let conditioner = TextureConditioner::new(1).with_max_side(500);
        let tall = conditioner.condition_untiled(&image(300, 1200), WrapMode::ClampToEdge);
        assert_eq!(tall.size(), [125, 500]);
        let small = conditioner.condition_untiled(&image(500, 20), WrapMode::ClampToEdge);
        assert_eq!(small.size(), [500, 20]);
    }

    #[test]
    fn thin_images_keep_at_least_one_pixel() {
        let scaled = fit_within(&RgbaImage::new(10_000, 1), 100).map(|p| p.dimensions());
        assert_eq!(scaled, Some((100, 1)));
    }
}
