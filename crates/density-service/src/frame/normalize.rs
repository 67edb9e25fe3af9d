//! Decoding of uploaded images into a bounded RGB8 buffer.

use crate::error::PipelineError;
use bytes::Bytes;
use image::{imageops::FilterType, RgbImage};
use tracing::debug;

/// Decode `bytes` into an RGB8 image whose longer side is at most `max_dimension`.
///
/// The upload buffer is consumed and released as soon as decoding is done.
/// Images already within the limit are never upscaled.
pub fn normalize(bytes: Bytes, max_dimension: u32) -> Result<RgbImage, PipelineError> {
    let decoded = image::load_from_memory(&bytes)?;
    drop(bytes);

    let rgb = decoded.into_rgb8();
    let (width, height) = rgb.dimensions();

    match target_dimensions(width, height, max_dimension) {
        Some((new_width, new_height)) => {
            debug!(
                width,
                height, new_width, new_height, "downscaling image to maximum dimension"
            );
            telemetry::metrics::DENSITY_IMAGES_DOWNSCALED.inc();
            Ok(image::imageops::resize(
                &rgb,
                new_width,
                new_height,
                FilterType::Lanczos3,
            ))
        }
        None => Ok(rgb),
    }
}

/// Proportional size fitting inside `max_dimension`, or `None` when no resize is needed
pub fn target_dimensions(width: u32, height: u32, max_dimension: u32) -> Option<(u32, u32)> {
    let longer = width.max(height);
    if longer <= max_dimension || max_dimension == 0 {
        return None;
    }

    let scale = max_dimension as f64 / longer as f64;
    let fit = |side: u32| -> u32 {
        if side == longer {
            max_dimension
        } else {
            ((side as f64 * scale).round() as u32).clamp(1, max_dimension)
        }
    };

    Some((fit(width), fit(height)))
}
