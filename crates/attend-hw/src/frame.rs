//! Frame type and pixel conversion: YUYV to RGB, luma, dark detection.

use std::path::Path;

/// A captured RGB frame.
#[derive(Clone)]
pub struct Frame {
    /// Interleaved RGB pixel data (width * height * 3 bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
    pub is_dark: bool,
}

impl Frame {
    /// Build a frame from a decoded RGB image.
    pub fn from_rgb_image(img: image::RgbImage, sequence: u32) -> Self {
        let (width, height) = img.dimensions();
        let data = img.into_raw();
        let is_dark = is_dark_frame(&luma(&data), DARK_FRAME_THRESHOLD);
        Self {
            data,
            width,
            height,
            timestamp: std::time::Instant::now(),
            sequence,
            is_dark,
        }
    }

    /// Average luma brightness (0.0–255.0).
    pub fn avg_brightness(&self) -> f32 {
        let y = luma(&self.data);
        if y.is_empty() {
            return 0.0;
        }
        y.iter().map(|&b| b as f32).sum::<f32>() / y.len() as f32
    }

    /// Copy into an `image` buffer, e.g. for saving a diagnostic PNG.
    pub fn to_image(&self) -> Option<image::RgbImage> {
        image::RgbImage::from_raw(self.width, self.height, self.data.clone())
    }
}

/// Fraction of near-black pixels above which a frame counts as dark.
pub const DARK_FRAME_THRESHOLD: f32 = 0.95;

/// Load a still photo (JPEG, PNG, ...) as an RGB frame.
pub fn load_photo(path: &Path) -> Result<Frame, FrameError> {
    let img = image::open(path).map_err(|e| FrameError::Decode(format!("{}: {e}", path.display())))?;
    tracing::debug!(path = %path.display(), width = img.width(), height = img.height(), "loaded photo");
    Ok(Frame::from_rgb_image(img.to_rgb8(), 0))
}

/// Decode a Motion-JPEG buffer to interleaved RGB.
pub fn mjpeg_to_rgb(buf: &[u8]) -> Result<(Vec<u8>, u32, u32), FrameError> {
    let img = image::load_from_memory_with_format(buf, image::ImageFormat::Jpeg)
        .map_err(|e| FrameError::Decode(e.to_string()))?
        .to_rgb8();
    let (w, h) = img.dimensions();
    Ok((img.into_raw(), w, h))
}

/// Convert packed YUYV (4:2:2) to interleaved RGB using BT.601 coefficients.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share U/V.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for chunk in yuyv[..expected].chunks_exact(4) {
        let (u, v) = (chunk[1], chunk[3]);
        rgb.extend_from_slice(&ycbcr_to_rgb(chunk[0], u, v));
        rgb.extend_from_slice(&ycbcr_to_rgb(chunk[2], u, v));
    }
    Ok(rgb)
}

fn ycbcr_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let clamp = |x: i32| ((x + 128) >> 8).clamp(0, 255) as u8;
    [
        clamp(298 * c + 409 * e),
        clamp(298 * c - 100 * d - 208 * e),
        clamp(298 * c + 516 * d),
    ]
}

/// Per-pixel luma of an interleaved RGB buffer.
pub fn luma(rgb: &[u8]) -> Vec<u8> {
    rgb.chunks_exact(3)
        .map(|p| ((77 * p[0] as u32 + 150 * p[1] as u32 + 29 * p[2] as u32) >> 8) as u8)
        .collect()
}

/// Returns true if more than `threshold_pct` of pixels are near black (< 32).
pub fn is_dark_frame(gray: &[u8], threshold_pct: f32) -> bool {
    if gray.is_empty() {
        return true;
    }
    let dark_count = gray.iter().filter(|&&p| p < 32).count();
    (dark_count as f32 / gray.len() as f32) > threshold_pct
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid YUYV length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("image decode failed: {0}")]
    Decode(String),
}
