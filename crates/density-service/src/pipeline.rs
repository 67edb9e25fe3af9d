//! Detection request pipeline: decode, crop, detect, remap and classify.

use crate::density::{classify, compute_density, round2, status_message};
use crate::detector::{PersonDetector, RawDetection};
use crate::error::PipelineError;
use crate::frame::{self, RoiBounds, RoiPercent};
use bytes::Bytes;
use common::density::{BoundingBox, DetectionResult};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Per-request detection parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectParams {
    pub roi_area_m2: f64,
    pub density_warn: f64,
    pub density_danger: f64,
    pub roi: RoiPercent,
    pub conf_threshold: f32,
}

impl Default for DetectParams {
    fn default() -> Self {
        Self {
            roi_area_m2: 20.0,
            density_warn: 5.0,
            density_danger: 6.5,
            roi: RoiPercent::FULL_FRAME,
            conf_threshold: 0.5,
        }
    }
}

/// Map ROI-local detections back to the full frame.
///
/// Non-person classes are discarded. Coordinates are truncated toward zero,
/// clamped to the ROI extent and offset by the ROI origin; boxes left with no
/// area are dropped.
pub fn remap_detections(raw: &[RawDetection], bounds: RoiBounds) -> Vec<BoundingBox> {
    let roi_width = i64::from(bounds.width());
    let roi_height = i64::from(bounds.height());
    let to_local = |v: f32, extent: i64| (v as i64).clamp(0, extent) as u32;

    raw.iter()
        .filter(|d| d.is_person())
        .filter_map(|d| {
            let x1 = to_local(d.x1, roi_width);
            let y1 = to_local(d.y1, roi_height);
            let x2 = to_local(d.x2, roi_width);
            let y2 = to_local(d.y2, roi_height);
            if x1 >= x2 || y1 >= y2 {
                return None;
            }

            Some(BoundingBox {
                x1: x1 + bounds.x0,
                y1: y1 + bounds.y0,
                x2: x2 + bounds.x0,
                y2: y2 + bounds.y0,
                confidence: d.confidence,
            })
        })
        .collect()
}

/// Shared, stateless detection pipeline
#[derive(Clone)]
pub struct DensityPipeline {
    detector: Option<Arc<dyn PersonDetector>>,
    max_dimension: u32,
}

impl DensityPipeline {
    pub fn new(detector: Option<Arc<dyn PersonDetector>>, max_dimension: u32) -> Self {
        Self {
            detector,
            max_dimension,
        }
    }

    /// True when a detector is present and reports ready
    pub fn is_ready(&self) -> bool {
        self.detector.as_ref().is_some_and(|d| d.is_ready())
    }

    /// Identifier of the configured detector, if any
    pub fn detector_id(&self) -> Option<&'static str> {
        self.detector.as_ref().map(|d| d.id())
    }

    /// Run the whole pipeline on an uploaded image.
    ///
    /// The CPU-bound work runs on the blocking pool; image buffers live only
    /// inside that task.
    pub async fn run(
        &self,
        bytes: Bytes,
        params: DetectParams,
    ) -> Result<DetectionResult, PipelineError> {
        let detector = match &self.detector {
            Some(detector) if detector.is_ready() => Arc::clone(detector),
            _ => return Err(PipelineError::ServiceNotReady),
        };
        let max_dimension = self.max_dimension;

        let start = Instant::now();
        let detector_id = detector.id();
        let result = tokio::task::spawn_blocking(move || {
            detect_blocking(detector.as_ref(), bytes, max_dimension, params)
        })
        .await??;

        telemetry::metrics::DENSITY_DETECTION_LATENCY
            .with_label_values(&[detector_id])
            .observe(start.elapsed().as_secs_f64());
        telemetry::metrics::DENSITY_LAST_PERSON_COUNT.set(i64::from(result.person_count));
        telemetry::metrics::DENSITY_STATUS_TOTAL
            .with_label_values(&[result.status.as_str()])
            .inc();

        info!(
            person_count = result.person_count,
            density = result.density,
            status = %result.status,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "density detection completed"
        );

        Ok(result)
    }
}

fn detect_blocking(
    detector: &dyn PersonDetector,
    bytes: Bytes,
    max_dimension: u32,
    params: DetectParams,
) -> Result<DetectionResult, PipelineError> {
    let image = frame::normalize(bytes, max_dimension)?;
    let (image_width, image_height) = image.dimensions();

    let bounding_boxes = {
        let crop = frame::extract_roi(&image, params.roi);
        debug!(
            x0 = crop.bounds.x0,
            y0 = crop.bounds.y0,
            x1 = crop.bounds.x1,
            y1 = crop.bounds.y1,
            full_frame = crop.is_full_frame(),
            "region of interest resolved"
        );

        if crop.bounds.is_empty() {
            Vec::new()
        } else {
            let raw = detector
                .detect(&crop.image, params.conf_threshold)
                .map_err(PipelineError::Detection)?;
            remap_detections(&raw, crop.bounds)
        }
    };
    drop(image);
    debug_assert!(bounding_boxes
        .iter()
        .all(|b| b.is_within(image_width, image_height)));

    let person_count = bounding_boxes.len() as u32;
    let density = compute_density(person_count, params.roi_area_m2);
    let status = classify(density, params.density_warn, params.density_danger);

    Ok(DetectionResult {
        person_count,
        density: round2(density),
        status,
        bounding_boxes,
        image_width,
        image_height,
        roi_area_m2: params.roi_area_m2,
        density_warn_threshold: params.density_warn,
        density_danger_threshold: params.density_danger,
        message: status_message(status, density),
    })
}
