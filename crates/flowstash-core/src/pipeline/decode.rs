//! Image decoding with format detection, dimension limits, and timeout support.

use std::io::Cursor;
use std::time::Duration;

use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader};
use tokio::time::timeout;

use crate::config::LimitsConfig;
use crate::error::PipelineError;

/// Image decoder with configurable limits and timeout.
#[derive(Debug, Clone)]
pub struct ImageDecoder {
    timeout_ms: u64,
    max_dimension: u32,
}

/// Result of decoding an image.
#[derive(Debug)]
pub struct DecodedImage {
    /// The decoded image data
    pub image: DynamicImage,
    /// Detected image format
    pub format: ImageFormat,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Encoded size in bytes
    pub byte_size: u64,
}

impl ImageDecoder {
    /// Create a new decoder with the given limits.
    pub fn new(limits: &LimitsConfig) -> Self {
        Self {
            timeout_ms: limits.decode_timeout_ms,
            max_dimension: limits.max_image_dimension,
        }
    }

    /// Decode an in-memory image on the blocking pool, bounded by the decode
    /// timeout. `url` is only used for error context.
    pub async fn decode_from_bytes(
        &self,
        bytes: Vec<u8>,
        url: &str,
    ) -> Result<DecodedImage, PipelineError> {
        let url_owned = url.to_string();
        let max_dimension = self.max_dimension;
        let timeout_duration = Duration::from_millis(self.timeout_ms);

        let decode_result = timeout(
            timeout_duration,
            tokio::task::spawn_blocking(move || {
                Self::decode_bytes_sync(bytes, &url_owned, max_dimension)
            }),
        )
        .await;

        match decode_result {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(PipelineError::Decode {
                url: url.to_string(),
                message: format!("Task join error: {}", e),
            }),
            Err(_) => Err(PipelineError::Timeout {
                url: url.to_string(),
                stage: "decode".to_string(),
                timeout_ms: self.timeout_ms,
            }),
        }
    }

    /// Synchronous decode from bytes (runs in spawn_blocking).
    ///
    /// Dimensions are read from the header first, so an oversized image is
    /// rejected before any pixel buffer is allocated.
    fn decode_bytes_sync(
        bytes: Vec<u8>,
        url: &str,
        max_dimension: u32,
    ) -> Result<DecodedImage, PipelineError> {
        let decode_err = |message: String| PipelineError::Decode {
            url: url.to_string(),
            message,
        };

        let byte_size = bytes.len() as u64;

        let (width, height) = ImageReader::new(Cursor::new(bytes.as_slice()))
            .with_guessed_format()
            .map_err(|e| decode_err(format!("Cannot detect image format: {}", e)))?
            .into_dimensions()
            .map_err(|e| decode_err(e.to_string()))?;
        if width > max_dimension || height > max_dimension {
            return Err(PipelineError::ImageTooLarge {
                url: url.to_string(),
                width,
                height,
                max_dim: max_dimension,
            });
        }

        let mut reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| decode_err(format!("Cannot detect image format: {}", e)))?;
        let format = reader
            .format()
            .ok_or_else(|| decode_err("Unrecognized image format".to_string()))?;

        let mut limits = image::Limits::default();
        limits.max_image_width = Some(max_dimension);
        limits.max_image_height = Some(max_dimension);
        reader.limits(limits);

        let image = reader.decode().map_err(|e| decode_err(e.to_string()))?;
        let (width, height) = image.dimensions();

        Ok(DecodedImage {
            image,
            format,
            width,
            height,
            byte_size,
        })
    }
}

/// Convert an ImageFormat to a string representation.
pub fn format_to_string(format: ImageFormat) -> String {
    match format {
        ImageFormat::Jpeg => "jpeg",
        ImageFormat::Png => "png",
        ImageFormat::WebP => "webp",
        ImageFormat::Gif => "gif",
        ImageFormat::Tiff => "tiff",
        ImageFormat::Bmp => "bmp",
        ImageFormat::Avif => "avif",
        _ => "unknown",
    }
    .to_string()
}
