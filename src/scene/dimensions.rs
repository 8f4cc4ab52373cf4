use crate::assets::DecodedImage;
use crate::config::INCHES_TO_METERS;

/// Size of the canvas box in scene units (meters).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicalDimensions {
    pub face_width_m: f32,
    pub face_height_m: f32,
    pub depth_m: f32,
}

impl PhysicalDimensions {
    pub fn width_inches(&self) -> f32 {
        self.face_width_m / INCHES_TO_METERS
    }

    pub fn height_inches(&self) -> f32 {
        self.face_height_m / INCHES_TO_METERS
    }

    pub fn half_extents(&self) -> glam::Vec3 {
        glam::Vec3::new(self.face_width_m, self.face_height_m, self.depth_m) * 0.5
    }

    pub fn has_area(&self) -> bool {
        self.face_width_m > 0.0 && self.face_height_m > 0.0
    }
}

/// Converts pixel sizes into physical box dimensions. Depth does not depend on
/// the image.
#[derive(Debug, Clone, Copy)]
pub struct DimensionCalculator {
    depth_inches: f32,
}

impl DimensionCalculator {
    pub fn new(depth_inches: f32) -> Self {
        Self { depth_inches }
    }

    /// No rounding or clamping: a zero-sized image gives a zero-area box.
    pub fn compute(&self, image: &DecodedImage, pixels_per_inch: f32) -> PhysicalDimensions {
        self.from_pixels(image.width_px(), image.height_px(), pixels_per_inch)
    }

    pub fn from_pixels(&self, width_px: u32, height_px: u32, pixels_per_inch: f32) -> PhysicalDimensions {
        self.from_inches(
            width_px as f32 / pixels_per_inch,
            height_px as f32 / pixels_per_inch,
        )
    }

    /// Used when the size is typed in directly.
    pub fn from_inches(&self, width_in: f32, height_in: f32) -> PhysicalDimensions {
        PhysicalDimensions {
            face_width_m: width_in * INCHES_TO_METERS,
            face_height_m: height_in * INCHES_TO_METERS,
            depth_m: self.depth_inches * INCHES_TO_METERS,
        }
    }

    /// Dimensions before any image has been measured.
    pub fn empty(&self) -> PhysicalDimensions {
        self.from_inches(0.0, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::DimensionCalculator;
    use crate::assets::DecodedImage;
    use image::RgbaImage;

    const EPS: f32 = 1e-6;

    #[test]
    fn face_size_follows_pixels_over_divisor() {
        let calculator = DimensionCalculator::new(1.0);
        for (w, h, d) in [(800u32, 400u32, 20.0f32), (200, 600, 20.0), (1, 1, 10.0), (4096, 3, 7.5)] {
            let dims = calculator.from_pixels(w, h, d);
            assert!((dims.face_width_m - (w as f32 / d) * 0.0254).abs() < EPS);
            assert!((dims.face_height_m - (h as f32 / d) * 0.0254).abs() < EPS);
        }
    }

    #[test]
    fn depth_is_independent_of_the_image() {
        let calculator = DimensionCalculator::new(1.0);
        let small = calculator.from_pixels(10, 10, 20.0);
        let large = calculator.from_pixels(5000, 2000, 20.0);
        assert_eq!(small.depth_m, large.depth_m);
        assert!((small.depth_m - 0.0254).abs() < EPS);
    }

    #[test]
    fn upload_and_startup_divisors_differ() {
        let calculator = DimensionCalculator::new(1.0);
        let image = DecodedImage::from_rgba("art", RgbaImage::new(400, 200));
        let upload = calculator.compute(&image, 20.0);
        let startup = calculator.compute(&image, 10.0);
        assert!((startup.face_width_m - 2.0 * upload.face_width_m).abs() < EPS);
        assert!((upload.width_inches() - 20.0).abs() < 1e-4);
        assert!((startup.height_inches() - 20.0).abs() < 1e-4);
    }

    #[test]
    fn zero_sized_image_is_a_zero_area_box() {
        let calculator = DimensionCalculator::new(1.0);
        let dims = calculator.from_pixels(0, 300, 20.0);
        assert_eq!(dims.face_width_m, 0.0);
        assert!(!dims.has_area());
    }
}
