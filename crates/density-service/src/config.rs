use anyhow::{bail, Context, Result};
use reqwest::Url;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Which person detector backs the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorBackend {
    /// YOLOv8 ONNX model through ONNX Runtime
    YoloV8,
    /// Deterministic synthetic detector, for demos and local testing
    Mock,
}

impl FromStr for DetectorBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "yolov8" | "yolo" => Ok(Self::YoloV8),
            "mock" => Ok(Self::Mock),
            other => bail!("unknown detector backend '{}'", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DensityServiceConfig {
    /// Address to bind the HTTP server to
    pub bind_addr: String,

    /// Webhook receiving crowd alerts
    pub webhook_url: Url,

    /// Master switch for outbound alerts
    pub alerts_enabled: bool,

    /// Minimum time between two alert attempts
    pub alert_cooldown: Duration,

    /// Upper bound on a single webhook delivery
    pub alert_timeout: Duration,

    pub detector_backend: DetectorBackend,

    /// Path to the YOLOv8 ONNX model
    pub model_path: String,

    /// Execution provider preference (CPU, CUDA)
    pub execution_provider: String,

    /// Longer image side is capped to this many pixels
    pub max_image_dimension: u32,

    /// In-flight HTTP request cap
    pub max_concurrent_requests: usize,

    /// Maximum accepted upload size in bytes
    pub max_upload_bytes: usize,
}

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8001";
const DEFAULT_WEBHOOK_URL: &str = "http://localhost:5678/webhook/crowd-alert";
const DEFAULT_MODEL_PATH: &str = "models/yolov8n.onnx";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("Invalid {}: '{}'", key, raw)),
        None => Ok(default),
    }
}

impl DensityServiceConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let bind_addr =
            lookup("DENSITY_SERVICE_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());

        let webhook_url = lookup("ALERT_WEBHOOK_URL")
            .unwrap_or_else(|| DEFAULT_WEBHOOK_URL.to_string());
        let webhook_url = Url::parse(&webhook_url).context("Invalid ALERT_WEBHOOK_URL")?;

        let alerts_enabled = lookup("ALERT_ENABLED")
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(true);

        let cooldown_secs: u64 = parse_var(&lookup, "ALERT_COOLDOWN_SECONDS", 60)?;
        let timeout_secs: u64 = parse_var(&lookup, "ALERT_TIMEOUT_SECONDS", 5)?;
        if timeout_secs == 0 {
            bail!("ALERT_TIMEOUT_SECONDS must be greater than zero");
        }

        let detector_backend = parse_var(&lookup, "DETECTOR_BACKEND", DetectorBackend::YoloV8)?;
        let model_path = lookup("MODEL_PATH").unwrap_or_else(|| DEFAULT_MODEL_PATH.to_string());
        let execution_provider =
            lookup("EXECUTION_PROVIDER").unwrap_or_else(|| "CPU".to_string());

        let max_image_dimension: u32 = parse_var(&lookup, "MAX_IMAGE_DIMENSION", 1280)?;
        if max_image_dimension == 0 {
            bail!("MAX_IMAGE_DIMENSION must be greater than zero");
        }

        let max_concurrent_requests: usize = parse_var(&lookup, "MAX_CONCURRENT_REQUESTS", 5)?;
        if max_concurrent_requests == 0 {
            bail!("MAX_CONCURRENT_REQUESTS must be greater than zero");
        }

        let max_upload_bytes: usize =
            parse_var(&lookup, "MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?;

        Ok(Self {
            bind_addr,
            webhook_url,
            alerts_enabled,
            alert_cooldown: Duration::from_secs(cooldown_secs),
            alert_timeout: Duration::from_secs(timeout_secs),
            detector_backend,
            model_path,
            execution_provider,
            max_image_dimension,
            max_concurrent_requests,
            max_upload_bytes,
        })
    }
}
