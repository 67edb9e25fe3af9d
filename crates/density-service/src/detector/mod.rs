pub mod mock;
pub mod yolov8;

use anyhow::Result;
use image::RgbImage;
use serde::{Deserialize, Serialize};

/// COCO class index for "person"
pub const PERSON_CLASS_ID: usize = 0;

/// A single detector output box, in the frame of the image that was passed in
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: usize,
}

impl RawDetection {
    pub fn person(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            confidence,
            class_id: PERSON_CLASS_ID,
        }
    }

    pub fn is_person(&self) -> bool {
        self.class_id == PERSON_CLASS_ID
    }
}

/// Person detection capability consumed by the density pipeline.
///
/// Implementations are shared across concurrent requests and invoked from
/// blocking worker threads; they must serialize internally if the underlying
/// runtime is not reentrant.
pub trait PersonDetector: Send + Sync {
    /// Stable identifier (e.g., "yolov8")
    fn id(&self) -> &'static str;

    /// Run detection on `image`, keeping boxes with confidence >= `confidence_threshold`
    fn detect(&self, image: &RgbImage, confidence_threshold: f32) -> Result<Vec<RawDetection>>;

    /// Whether the detector can serve requests
    fn is_ready(&self) -> bool {
        true
    }
}
