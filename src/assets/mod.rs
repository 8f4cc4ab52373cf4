pub mod texture;

use image::{Rgba, RgbaImage};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A decoded image, immutable once created.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    label: String,
    width_px: u32,
    height_px: u32,
    pixels: Arc<RgbaImage>,
    content_hash: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("failed to read image at {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode image {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error("processing {path} crashed: {message}")]
    Crashed { path: String, message: String },
}

impl DecodedImage {
    pub fn from_rgba(label: impl Into<String>, pixels: RgbaImage) -> Self {
        Self {
            label: label.into(),
            width_px: pixels.width(),
            height_px: pixels.height(),
            pixels: Arc::new(pixels),
            content_hash: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn width_px(&self) -> u32 {
        self.width_px
    }

    pub fn height_px(&self) -> u32 {
        self.height_px
    }

    pub fn pixels(&self) -> &Arc<RgbaImage> {
        &self.pixels
    }

    /// Hex SHA-256 of the source bytes, when the image came from a file.
    pub fn content_hash(&self) -> Option<&str> {
        self.content_hash.as_deref()
    }
}

/// Raw file contents plus their digest.
#[derive(Debug, Clone)]
pub struct ImageBytes {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
    pub sha256: String,
}

pub fn read_image_bytes(path: &Path) -> Result<ImageBytes, AssetError> {
    let bytes = std::fs::read(path).map_err(|source| AssetError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let sha256 = hex_digest(&bytes);
    Ok(ImageBytes {
        path: path.to_path_buf(),
        bytes,
        sha256,
    })
}

pub fn decode_image_bytes(source: &ImageBytes) -> Result<DecodedImage, AssetError> {
    let decoded = image::load_from_memory(&source.bytes).map_err(|source_err| {
        AssetError::Decode {
            path: source.path.display().to_string(),
            source: source_err,
        }
    })?;
    let label = source
        .path
        .file_name()
        .and_then(|value| value.to_str())
        .unwrap_or("image")
        .to_string();
    let mut image = DecodedImage::from_rgba(label, decoded.to_rgba8());
    image.content_hash = Some(source.sha256.clone());
    Ok(image)
}

pub fn load_image(path: &Path) -> Result<DecodedImage, AssetError> {
    let bytes = read_image_bytes(path)?;
    decode_image_bytes(&bytes)
}

/// Relative asset paths are resolved against the crate directory.
pub fn resolve_asset_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(path)
    }
}

/// Loads the background canvas image, substituting a generated linen weave if
/// the file cannot be used.
pub fn load_canvas_or_fallback(path: &Path) -> DecodedImage {
    let resolved = resolve_asset_path(path);
    match load_image(&resolved) {
        Ok(image) => {
            log::info!(
                "Loaded canvas texture {} ({}x{})",
                resolved.display(),
                image.width_px(),
                image.height_px()
            );
            image
        }
        Err(err) => {
            log::warn!("{}; using generated canvas weave", err);
            generated_canvas_weave(256)
        }
    }
}

/// Off-white plain weave: alternating warp/weft threads with a little
/// per-thread variation so tiling stays visible.
pub fn generated_canvas_weave(size: u32) -> DecodedImage {
    const THREAD: u32 = 4;
    let size = size.max(THREAD * 2);
    let pixels = RgbaImage::from_fn(size, size, |x, y| {
        let warp = (x / THREAD) % 2 == (y / THREAD) % 2;
        let thread_index = if warp { x / THREAD } else { y / THREAD };
        let variation = (thread_index.wrapping_mul(2_654_435_761) >> 28) as u8;
        let edge = x % THREAD == 0 || y % THREAD == 0;
        let mut value: u8 = if warp { 236 } else { 226 };
        value = value.saturating_sub(variation);
        if edge {
            value = value.saturating_sub(10);
        }
        Rgba([value, value.saturating_sub(4), value.saturating_sub(12), 255])
    });
    DecodedImage::from_rgba("generated-canvas", pixels)
}

fn hex_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use image::RgbaImage;

    pub fn temp_png(tag: &str, width: u32, height: u32) -> std::path::PathBuf {
        let nonce = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let path = std::env::temp_dir().join(format!(
            "canvas_preview_{}_{}_{}.png",
            tag,
            std::process::id(),
            nonce
        ));
        RgbaImage::new(width, height).save(&path).unwrap();
        path
    }
}
