/// YOLOv8 person detector using ONNX Runtime
use super::{PersonDetector, RawDetection, PERSON_CLASS_ID};
use anyhow::{anyhow, Context, Result};
use image::{imageops::FilterType, RgbImage};
use ndarray::{Array, ArrayViewD, IxDyn};
use ort::{
    execution_providers::{CPUExecutionProvider, CUDAExecutionProvider},
    session::{builder::GraphOptimizationLevel, Session},
    value::Value,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YoloV8Config {
    /// Path to the ONNX model file
    pub model_path: String,

    /// IoU (Intersection over Union) threshold for NMS
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,

    /// Maximum number of detections per image
    #[serde(default = "default_max_detections")]
    pub max_detections: usize,

    /// Model input size (width and height)
    #[serde(default = "default_input_size")]
    pub input_size: u32,

    /// Class ids kept after decoding; `None` keeps every class
    #[serde(default = "default_classes")]
    pub classes: Option<Vec<usize>>,

    /// Execution provider preference (CPU, CUDA)
    #[serde(default = "default_execution_provider")]
    pub execution_provider: String,

    /// GPU device ID
    #[serde(default)]
    pub device_id: i32,

    /// Number of intra-operation threads
    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,
}

fn default_iou_threshold() -> f32 {
    0.45
}

fn default_max_detections() -> usize {
    300
}

fn default_input_size() -> u32 {
    640
}

fn default_classes() -> Option<Vec<usize>> {
    Some(vec![PERSON_CLASS_ID])
}

fn default_execution_provider() -> String {
    "CPU".to_string()
}

fn default_intra_threads() -> usize {
    4
}

impl Default for YoloV8Config {
    fn default() -> Self {
        Self {
            model_path: "models/yolov8n.onnx".to_string(),
            iou_threshold: default_iou_threshold(),
            max_detections: default_max_detections(),
            input_size: default_input_size(),
            classes: default_classes(),
            execution_provider: default_execution_provider(),
            device_id: 0,
            intra_threads: default_intra_threads(),
        }
    }
}

/// YOLOv8 detector holding one loaded ONNX session.
///
/// The session is behind a mutex, so concurrent requests run inference one at a time.
pub struct YoloV8Detector {
    config: YoloV8Config,
    session: Mutex<Session>,
    execution_provider: String,
}

impl YoloV8Detector {
    /// Load the model, pick an execution provider and run one warm-up inference
    pub fn load(config: YoloV8Config) -> Result<Self> {
        if !Path::new(&config.model_path).exists() {
            return Err(anyhow!("model file not found: {}", config.model_path));
        }

        let (session, execution_provider) = Self::build_session(&config)?;

        let detector = Self {
            config,
            session: Mutex::new(session),
            execution_provider,
        };

        tracing::info!("Warming up YOLOv8 detector");
        let warmup = RgbImage::new(detector.config.input_size, detector.config.input_size);
        detector
            .detect(&warmup, 0.5)
            .context("warm-up inference failed")?;

        tracing::info!(
            model = %detector.config.model_path,
            provider = %detector.execution_provider,
            input_size = detector.config.input_size,
            "YOLOv8 detector loaded"
        );

        Ok(detector)
    }

    fn build_session(config: &YoloV8Config) -> Result<(Session, String)> {
        if config.execution_provider.eq_ignore_ascii_case("CUDA") {
            tracing::info!(
                "Attempting to use CUDA execution provider (device: {})",
                config.device_id
            );
            let result = Session::builder()?
                .with_optimization_level(GraphOptimizationLevel::Level3)?
                .with_intra_threads(config.intra_threads)?
                .with_execution_providers([
                    CUDAExecutionProvider::default()
                        .with_device_id(config.device_id)
                        .build(),
                    CPUExecutionProvider::default().build(),
                ])?
                .commit_from_file(&config.model_path);

            match result {
                Ok(session) => return Ok((session, "CUDA".to_string())),
                Err(e) => tracing::warn!("Failed with CUDA, using CPU: {}", e),
            }
        }

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(config.intra_threads)?
            .commit_from_file(&config.model_path)
            .with_context(|| format!("failed to load ONNX model {}", config.model_path))?;

        Ok((session, "CPU".to_string()))
    }

    /// Resize to the model input and convert to normalized NCHW
    fn preprocess(&self, image: &RgbImage) -> Array<f32, IxDyn> {
        let size = self.config.input_size;
        let resized = image::imageops::resize(image, size, size, FilterType::Triangle);

        let mut input = Array::zeros(IxDyn(&[1, 3, size as usize, size as usize]));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for channel in 0..3 {
                input[[0, channel, y as usize, x as usize]] = pixel[channel] as f32 / 255.0;
            }
        }

        input
    }
}

/// Decode `[1, 4 + classes, predictions]` output into boxes in the source image frame
pub fn decode_output(
    config: &YoloV8Config,
    output: ArrayViewD<'_, f32>,
    width: u32,
    height: u32,
    confidence_threshold: f32,
) -> Result<Vec<RawDetection>> {
    let shape = output.shape();
    if shape.len() != 3 || shape[1] < 5 {
        return Err(anyhow!("unexpected YOLOv8 output shape {:?}", shape));
    }

    let num_classes = shape[1] - 4;
    let num_predictions = shape[2];
    let scale_x = width as f32 / config.input_size as f32;
    let scale_y = height as f32 / config.input_size as f32;

    let mut candidates = Vec::new();
    for i in 0..num_predictions {
        let (class_id, score) = (0..num_classes)
            .map(|c| (c, output[[0, 4 + c, i]]))
            .fold((0, f32::MIN), |best, current| {
                if current.1 > best.1 {
                    current
                } else {
                    best
                }
            });

        if score < confidence_threshold {
            continue;
        }
        if let Some(classes) = &config.classes {
            if !classes.contains(&class_id) {
                continue;
            }
        }

        let cx = output[[0, 0, i]];
        let cy = output[[0, 1, i]];
        let w = output[[0, 2, i]];
        let h = output[[0, 3, i]];

        let x1 = ((cx - w / 2.0) * scale_x).clamp(0.0, width as f32);
        let y1 = ((cy - h / 2.0) * scale_y).clamp(0.0, height as f32);
        let x2 = ((cx + w / 2.0) * scale_x).clamp(0.0, width as f32);
        let y2 = ((cy + h / 2.0) * scale_y).clamp(0.0, height as f32);

        if x2 <= x1 || y2 <= y1 {
            continue;
        }

        candidates.push(RawDetection {
            x1,
            y1,
            x2,
            y2,
            confidence: score,
            class_id,
        });
    }

    let mut kept = nms(candidates, config.iou_threshold);
    kept.truncate(config.max_detections);
    Ok(kept)
}

/// Intersection over Union of two corner-format boxes
pub fn iou(a: &RawDetection, b: &RawDetection) -> f32 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area_a = (a.x2 - a.x1) * (a.y2 - a.y1);
    let area_b = (b.x2 - b.x1) * (b.y2 - b.y1);
    let union = area_a + area_b - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// Greedy per-class Non-Maximum Suppression; output is sorted by confidence
pub fn nms(mut boxes: Vec<RawDetection>, iou_threshold: f32) -> Vec<RawDetection> {
    boxes.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<RawDetection> = Vec::new();
    for candidate in boxes {
        let overlaps = keep
            .iter()
            .any(|k| k.class_id == candidate.class_id && iou(k, &candidate) >= iou_threshold);
        if !overlaps {
            keep.push(candidate);
        }
    }

    keep
}

impl PersonDetector for YoloV8Detector {
    fn id(&self) -> &'static str {
        "yolov8"
    }

    fn detect(&self, image: &RgbImage, confidence_threshold: f32) -> Result<Vec<RawDetection>> {
        let (width, height) = image.dimensions();
        let input_tensor = Value::from_array(self.preprocess(image))?;

        let inference_start = Instant::now();
        let output = {
            let mut session = self
                .session
                .lock()
                .map_err(|e| anyhow!("Failed to lock session: {}", e))?;
            let outputs = session.run(ort::inputs![input_tensor])?;
            let output_value = outputs.get("output0").context("No output tensor found")?;
            let (shape, data) = output_value.try_extract_tensor::<f32>()?;
            let shape: Vec<usize> = shape.as_ref().iter().map(|&x| x as usize).collect();
            Array::from_shape_vec(IxDyn(&shape), data.to_vec())?
        };
        let inference_time = inference_start.elapsed();

        telemetry::metrics::DENSITY_INFERENCE_TIME
            .with_label_values(&[self.id(), self.execution_provider.as_str()])
            .observe(inference_time.as_secs_f64());

        decode_output(&self.config, output.view(), width, height, confidence_threshold)
    }
}
