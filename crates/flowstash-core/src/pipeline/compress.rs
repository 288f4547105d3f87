//! Downscale-and-recompress to progressive JPEG.

use std::time::Duration;

use image::imageops::FilterType;
use image::DynamicImage;
use jpeg_encoder::{ColorType, Encoder, EncodingError};
use thiserror::Error;
use tokio::time::timeout;

use crate::error::PipelineError;

/// Compute output dimensions that fit inside `max_w` x `max_h`, preserving
/// aspect ratio. Never upscales.
pub fn fit_within(width: u32, height: u32, max_w: u32, max_h: u32) -> (u32, u32) {
    if width <= max_w && height <= max_h {
        return (width, height);
    }
    let scale = f64::min(max_w as f64 / width as f64, max_h as f64 / height as f64);
    let w = ((width as f64 * scale).round() as u32).clamp(1, max_w);
    let h = ((height as f64 * scale).round() as u32).clamp(1, max_h);
    (w, h)
}

/// Encoding failures.
#[derive(Error, Debug)]
pub enum CompressError {
    /// JPEG frames carry 16-bit dimensions
    #[error("output {width}x{height} exceeds JPEG dimension limits")]
    Dimensions { width: u32, height: u32 },

    #[error(transparent)]
    Jpeg(#[from] EncodingError),
}

/// Resize `image` to fit the bounding box and encode it as progressive JPEG.
///
/// Alpha is dropped; transparent regions take whatever color the RGB channels
/// carry.
pub fn compress_sync(
    image: &DynamicImage,
    quality: u8,
    max_w: u32,
    max_h: u32,
) -> Result<Vec<u8>, CompressError> {
    let (w, h) = fit_within(image.width(), image.height(), max_w, max_h);
    let rgb = if (w, h) == (image.width(), image.height()) {
        image.to_rgb8()
    } else {
        image.resize_exact(w, h, FilterType::Lanczos3).to_rgb8()
    };

    let (Ok(width), Ok(height)) = (u16::try_from(w), u16::try_from(h)) else {
        return Err(CompressError::Dimensions {
            width: w,
            height: h,
        });
    };

    let mut buf = Vec::new();
    let mut encoder = Encoder::new(&mut buf, quality.clamp(1, 100));
    encoder.set_progressive(true);
    encoder.encode(rgb.as_raw(), width, height, ColorType::Rgb)?;
    Ok(buf)
}

/// Runs [`compress_sync`] on the blocking pool under a deadline.
#[derive(Debug, Clone)]
pub struct Compressor {
    timeout_ms: u64,
}

impl Compressor {
    pub fn new(timeout_ms: u64) -> Self {
        Self { timeout_ms }
    }

    pub async fn compress(
        &self,
        image: DynamicImage,
        quality: u8,
        max_w: u32,
        max_h: u32,
        url: &str,
    ) -> Result<Vec<u8>, PipelineError> {
        let result = timeout(
            Duration::from_millis(self.timeout_ms),
            tokio::task::spawn_blocking(move || compress_sync(&image, quality, max_w, max_h)),
        )
        .await;

        match result {
            Ok(Ok(Ok(bytes))) => Ok(bytes),
            Ok(Ok(Err(e))) => Err(PipelineError::Encode {
                url: url.to_string(),
                message: e.to_string(),
            }),
            Ok(Err(e)) => Err(PipelineError::Encode {
                url: url.to_string(),
                message: format!("Task join error: {}", e),
            }),
            Err(_) => Err(PipelineError::Timeout {
                url: url.to_string(),
                stage: "encode".to_string(),
                timeout_ms: self.timeout_ms,
            }),
        }
    }
}
