/// Mock person detector for testing and demonstration purposes
use super::{PersonDetector, RawDetection};
use anyhow::{bail, Result};
use image::RgbImage;
use std::sync::Mutex;
use std::time::Duration;

/// COCO "car", emitted by the synthetic mode to exercise class filtering
const SYNTHETIC_DISTRACTOR_CLASS: usize = 2;

#[derive(Debug, Clone)]
enum MockMode {
    /// Return the same detections for every image
    Fixed(Vec<RawDetection>),
    /// Derive a deterministic set of boxes from the image size
    Synthetic,
}

/// Mock person detector
pub struct MockPersonDetector {
    mode: MockMode,
    simulated_delay: Duration,
    ready: bool,
    failure: Option<String>,
    received: Mutex<Vec<(u32, u32)>>,
}

impl MockPersonDetector {
    /// Synthetic detector producing 1-5 people per image
    pub fn new() -> Self {
        Self {
            mode: MockMode::Synthetic,
            simulated_delay: Duration::ZERO,
            ready: true,
            failure: None,
            received: Mutex::new(Vec::new()),
        }
    }

    /// Detector that returns `detections` for every image
    pub fn with_detections(detections: Vec<RawDetection>) -> Self {
        Self {
            mode: MockMode::Fixed(detections),
            ..Self::new()
        }
    }

    /// Sleep this long on every call (blocking, like real inference)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.simulated_delay = delay;
        self
    }

    /// Report not ready, as if the model failed to load
    pub fn not_ready(mut self) -> Self {
        self.ready = false;
        self
    }

    /// Fail every detection call with `message`
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Dimensions of every image passed to `detect`, in call order
    pub fn received_dimensions(&self) -> Vec<(u32, u32)> {
        self.received
            .lock()
            .map(|received| received.clone())
            .unwrap_or_default()
    }

    fn synthetic(width: u32, height: u32) -> Vec<RawDetection> {
        if width < 10 || height < 10 {
            return Vec::new();
        }

        let count = 1 + (width + height) % 5;
        let cell = width as f32 / count as f32;
        let top = height as f32 * 0.2;
        let bottom = height as f32 * 0.9;

        let mut detections: Vec<RawDetection> = (0..count)
            .map(|i| {
                let left = i as f32 * cell + cell * 0.1;
                RawDetection::person(left, top, left + cell * 0.8, bottom, 0.55 + 0.1 * (i % 4) as f32)
            })
            .collect();

        detections.push(RawDetection {
            x1: 0.0,
            y1: 0.0,
            x2: cell * 0.5,
            y2: top,
            confidence: 0.9,
            class_id: SYNTHETIC_DISTRACTOR_CLASS,
        });

        detections
    }
}

impl Default for MockPersonDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl PersonDetector for MockPersonDetector {
    fn id(&self) -> &'static str {
        "mock_person_detector"
    }

    fn detect(&self, image: &RgbImage, confidence_threshold: f32) -> Result<Vec<RawDetection>> {
        if let Ok(mut received) = self.received.lock() {
            received.push(image.dimensions());
        }

        if !self.simulated_delay.is_zero() {
            std::thread::sleep(self.simulated_delay);
        }

        if let Some(message) = &self.failure {
            bail!("{}", message);
        }

        let detections = match &self.mode {
            MockMode::Fixed(detections) => detections.clone(),
            MockMode::Synthetic => Self::synthetic(image.width(), image.height()),
        };

        Ok(detections
            .into_iter()
            .filter(|d| d.confidence >= confidence_threshold)
            .collect())
    }

    fn is_ready(&self) -> bool {
        self.ready
    }
}
