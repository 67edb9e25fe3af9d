use crate::alert::AlertOutcome;
use crate::density::round2;
use crate::error::ApiError;
use crate::frame::RoiPercent;
use crate::pipeline::DetectParams;
use crate::state::DensityServiceState;
use axum::{
    extract::{FromRequest, Multipart, Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::IntoResponse,
    Form, Json,
};
use bytes::Bytes;
use common::density::{DensityStatus, DetectionResult};
use serde_json::json;
use std::str::FromStr;
use tracing::{error, info, warn};

const SERVICE_NAME: &str = "density-service";
const VERSION: &str = env!("CARGO_PKG_VERSION");

fn parse_field<T>(name: &str, raw: &str) -> Result<T, ApiError>
where
    T: FromStr,
{
    raw.trim()
        .parse()
        .map_err(|_| ApiError::bad_request(format!("Invalid value for '{}': '{}'", name, raw)))
}

/// Analyze an uploaded image and report crowd density
pub async fn detect(
    State(state): State<DensityServiceState>,
    mut multipart: Multipart,
) -> Result<Json<DetectionResult>, ApiError> {
    let mut file: Option<Bytes> = None;
    let mut params = DetectParams::default();
    let mut roi = RoiPercent::FULL_FRAME;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {}", e)))?;
            file = Some(data);
            continue;
        }

        let text = field
            .text()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read field '{}': {}", name, e)))?;

        match name.as_str() {
            "roi_area_m2" => params.roi_area_m2 = parse_field(&name, &text)?,
            "density_warn" => params.density_warn = parse_field(&name, &text)?,
            "density_danger" => params.density_danger = parse_field(&name, &text)?,
            "conf_threshold" => params.conf_threshold = parse_field(&name, &text)?,
            "roi_x0" => roi.x0 = parse_field(&name, &text)?,
            "roi_y0" => roi.y0 = parse_field(&name, &text)?,
            "roi_x1" => roi.x1 = parse_field(&name, &text)?,
            "roi_y1" => roi.y1 = parse_field(&name, &text)?,
            other => warn!(field = other, "Ignoring unknown multipart field"),
        }
    }
    params.roi = roi;

    let file = file.ok_or_else(|| ApiError::bad_request("Missing required field 'file'"))?;

    match state.detect(file, params).await {
        Ok((result, alert)) => {
            telemetry::metrics::DENSITY_DETECT_REQUESTS
                .with_label_values(&["success"])
                .inc();
            info!(
                person_count = result.person_count,
                status = %result.status,
                alert = alert.as_str(),
                "Detect request served"
            );
            Ok(Json(result))
        }
        Err(e) => {
            telemetry::metrics::DENSITY_DETECT_REQUESTS
                .with_label_values(&["error"])
                .inc();
            error!("Detection failed: {}", e);
            Err(e.into())
        }
    }
}

/// Manual alert parameters, defaulting to a moderate warning
#[derive(Debug, Clone, PartialEq)]
pub struct TestAlertRequest {
    pub alert_type: DensityStatus,
    pub person_count: u32,
    pub density: f64,
    pub roi_area_m2: f64,
    pub warn_threshold: f64,
    pub danger_threshold: f64,
}

impl Default for TestAlertRequest {
    fn default() -> Self {
        Self {
            alert_type: DensityStatus::Warning,
            person_count: 25,
            density: 5.5,
            roi_area_m2: 20.0,
            warn_threshold: 5.0,
            danger_threshold: 6.5,
        }
    }
}

impl TestAlertRequest {
    fn apply(&mut self, name: &str, raw: &str) -> Result<(), ApiError> {
        match name {
            "alert_type" => {
                self.alert_type = DensityStatus::from_str(raw).map_err(ApiError::bad_request)?
            }
            "person_count" => self.person_count = parse_field(name, raw)?,
            "density" => self.density = parse_field(name, raw)?,
            "roi_area_m2" => self.roi_area_m2 = parse_field(name, raw)?,
            "warn_threshold" => self.warn_threshold = parse_field(name, raw)?,
            "danger_threshold" => self.danger_threshold = parse_field(name, raw)?,
            other => warn!(field = other, "Ignoring unknown alert field"),
        }
        Ok(())
    }
}

/// Read alert fields from a urlencoded or a multipart form body
async fn read_alert_request(
    request: Request,
    state: &DensityServiceState,
) -> Result<TestAlertRequest, ApiError> {
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"));

    let mut alert = TestAlertRequest::default();
    if is_multipart {
        let mut multipart = Multipart::from_request(request, state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e)))?
        {
            let name = field.name().unwrap_or_default().to_string();
            let text = field.text().await.map_err(|e| {
                ApiError::bad_request(format!("Failed to read field '{}': {}", name, e))
            })?;
            alert.apply(&name, &text)?;
        }
    } else {
        let Form(fields) = Form::<Vec<(String, String)>>::from_request(request, state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        for (name, value) in &fields {
            alert.apply(name, value)?;
        }
    }

    Ok(alert)
}

fn webhook_target(state: &DensityServiceState) -> String {
    if state.alerter().is_enabled() {
        state.alerter().target()
    } else {
        "disabled".to_string()
    }
}

/// Push a synthetic alert through the throttle and webhook
pub async fn test_alert(
    State(state): State<DensityServiceState>,
    request: Request,
) -> Result<impl IntoResponse, ApiError> {
    let request = read_alert_request(request, &state).await?;
    let status = request.alert_type;

    let result = DetectionResult {
        person_count: request.person_count,
        density: round2(request.density),
        status,
        bounding_boxes: Vec::new(),
        image_width: 1280,
        image_height: 720,
        roi_area_m2: request.roi_area_m2,
        density_warn_threshold: request.warn_threshold,
        density_danger_threshold: request.danger_threshold,
        message: format!("Test alert - {} level", status),
    };

    let outcome = state.alerter().force_alert(&result).await;
    let message = match &outcome {
        AlertOutcome::Sent => format!("Test {} alert sent", status),
        AlertOutcome::Disabled => "Alerts are disabled".to_string(),
        AlertOutcome::Suppressed => format!(
            "Alert suppressed, cooldown of {}s not elapsed",
            state.alerter().throttle().cooldown().as_secs()
        ),
        AlertOutcome::Failed(reason) => format!("Alert delivery failed: {}", reason),
        AlertOutcome::NotAlertWorthy => "Alert not sent".to_string(),
    };

    Ok((
        StatusCode::OK,
        Json(json!({
            "success": outcome == AlertOutcome::Sent,
            "message": message,
            "webhook_url": webhook_target(&state),
            "outcome": outcome.as_str(),
            "payload": {
                "alert_type": status,
                "person_count": result.person_count,
                "density": request.density,
                "roi_area_m2": result.roi_area_m2,
            },
        })),
    ))
}

/// Liveness plus model status
pub async fn health(State(state): State<DensityServiceState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "model_loaded": state.pipeline().is_ready(),
            "detector": state.pipeline().detector_id(),
            "service": SERVICE_NAME,
            "version": VERSION,
        })),
    )
}

pub async fn service_info(State(state): State<DensityServiceState>) -> impl IntoResponse {
    Json(json!({
        "service": SERVICE_NAME,
        "version": VERSION,
        "detector": state.pipeline().detector_id(),
        "endpoints": {
            "detect": "POST /api/detect",
            "alert": "POST /api/alert",
            "health": "GET /api/health",
            "metrics": "GET /metrics",
        },
        "alerting": {
            "enabled": state.alerter().is_enabled(),
            "webhook_url": webhook_target(&state),
            "cooldown_seconds": state.alerter().throttle().cooldown().as_secs(),
        },
    }))
}

/// Prometheus metrics endpoint
pub async fn metrics() -> impl IntoResponse {
    match telemetry::metrics::encode_metrics() {
        Ok(body) => body.into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
        }
    }
}
