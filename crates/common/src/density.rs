//! Crowd density contracts shared by the density service and its clients.
//!
//! This module defines the detection result returned to callers and the
//! alert payload posted to the outbound webhook.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unit reported alongside every density value
pub const DENSITY_UNIT: &str = "people/m²";

/// Person bounding box in the original image frame (pixels)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,

    /// Detection confidence (0.0 to 1.0)
    pub confidence: f32,
}

impl BoundingBox {
    /// True when the box has a positive area and fits inside `width` x `height`
    pub fn is_within(&self, width: u32, height: u32) -> bool {
        self.x1 < self.x2 && self.y1 < self.y2 && self.x2 <= width && self.y2 <= height
    }
}

/// Crowd status derived from density thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DensityStatus {
    #[default]
    Normal,
    Warning,
    Danger,
}

impl DensityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DensityStatus::Normal => "normal",
            DensityStatus::Warning => "warning",
            DensityStatus::Danger => "danger",
        }
    }

    /// Warning and danger results are candidates for an outbound alert
    pub fn is_alert_worthy(&self) -> bool {
        matches!(self, DensityStatus::Warning | DensityStatus::Danger)
    }
}

impl fmt::Display for DensityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DensityStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "normal" => Ok(DensityStatus::Normal),
            "warning" => Ok(DensityStatus::Warning),
            "danger" => Ok(DensityStatus::Danger),
            _ => Err(format!("Invalid density status: {}", s)),
        }
    }
}

/// Result of a single density detection request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// Number of people detected inside the ROI
    pub person_count: u32,

    /// People per square meter, rounded to 2 decimals
    pub density: f64,

    pub status: DensityStatus,

    /// Person boxes in the original frame, in detector emission order
    pub bounding_boxes: Vec<BoundingBox>,

    /// Width of the normalized image (pixels)
    pub image_width: u32,

    /// Height of the normalized image (pixels)
    pub image_height: u32,

    /// Real-world area covered by the ROI
    pub roi_area_m2: f64,

    pub density_warn_threshold: f64,
    pub density_danger_threshold: f64,

    /// Human-readable summary derived from status and density
    pub message: String,
}

/// Image dimensions as reported in alert payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

/// JSON body posted to the alert webhook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertPayload {
    pub timestamp: DateTime<Utc>,
    pub alert_type: DensityStatus,

    /// The service has already decided that this alert must be delivered
    pub should_notify: bool,

    pub person_count: u32,
    pub density: f64,
    pub density_unit: String,
    pub roi_area_m2: f64,
    pub warn_threshold: f64,
    pub danger_threshold: f64,
    pub message: String,
    pub image_dimensions: ImageDimensions,
    pub detection_count: usize,
}

impl AlertPayload {
    /// Build the payload for `result`, stamped with `timestamp`
    pub fn from_result(result: &DetectionResult, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            alert_type: result.status,
            should_notify: true,
            person_count: result.person_count,
            density: result.density,
            density_unit: DENSITY_UNIT.to_string(),
            roi_area_m2: result.roi_area_m2,
            warn_threshold: result.density_warn_threshold,
            danger_threshold: result.density_danger_threshold,
            message: result.message.clone(),
            image_dimensions: ImageDimensions {
                width: result.image_width,
                height: result.image_height,
            },
            detection_count: result.bounding_boxes.len(),
        }
    }
}
