/// End-to-end alert delivery against a mock webhook receiver
use anyhow::Result;
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use common::density::{DensityStatus, DetectionResult};
use density_service::{
    alert::{AlertOutcome, AlertThrottle, Alerter, ManualClock, WebhookDispatcher},
    api,
    detector::{mock::MockPersonDetector, RawDetection},
    DensityPipeline, DensityServiceConfig, DensityServiceState,
};
use image::{ImageFormat, RgbImage};
use serde_json::Value;
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

#[derive(Clone)]
struct Receiver {
    payloads: Arc<Mutex<Vec<Value>>>,
    delay: Duration,
    status: StatusCode,
}

impl Receiver {
    fn new(status: StatusCode, delay: Duration) -> Self {
        Self {
            payloads: Arc::new(Mutex::new(Vec::new())),
            delay,
            status,
        }
    }

    fn received(&self) -> Vec<Value> {
        self.payloads.lock().unwrap().clone()
    }
}

async fn receive_alert(State(receiver): State<Receiver>, Json(payload): Json<Value>) -> StatusCode {
    receiver.payloads.lock().unwrap().push(payload);
    if !receiver.delay.is_zero() {
        tokio::time::sleep(receiver.delay).await;
    }
    receiver.status
}

async fn spawn_router(router: Router) -> Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        axum::serve(listener, router.into_make_service())
            .await
            .expect("server failed");
    });
    Ok((addr, handle))
}

async fn spawn_receiver(receiver: Receiver) -> Result<(String, JoinHandle<()>)> {
    let router = Router::new()
        .route("/webhook/crowd-alert", post(receive_alert))
        .with_state(receiver);
    let (addr, handle) = spawn_router(router).await?;
    Ok((format!("http://{}/webhook/crowd-alert", addr), handle))
}

struct Harness {
    server: TestServer,
    clock: Arc<ManualClock>,
}

fn harness(webhook_url: &str, alerts_enabled: bool, timeout: Duration, people: usize) -> Harness {
    let url = webhook_url.to_string();
    let mut config = DensityServiceConfig::from_lookup(|key| match key {
        "ALERT_WEBHOOK_URL" => Some(url.clone()),
        _ => None,
    })
    .unwrap();
    config.alerts_enabled = alerts_enabled;
    config.alert_timeout = timeout;

    let detections = (0..people)
        .map(|i| RawDetection::person(i as f32 * 4.0, 0.0, i as f32 * 4.0 + 3.0, 30.0, 0.9))
        .collect();
    let pipeline = DensityPipeline::new(
        Some(Arc::new(MockPersonDetector::with_detections(detections))),
        config.max_image_dimension,
    );

    let clock = Arc::new(ManualClock::new());
    let dispatcher = WebhookDispatcher::new(config.webhook_url.clone(), config.alert_timeout).unwrap();
    let alerter = Alerter::new(
        config.alerts_enabled,
        AlertThrottle::new(config.alert_cooldown, clock.clone()),
        Arc::new(dispatcher),
    );

    let state = DensityServiceState::new(config, pipeline, alerter);
    Harness {
        server: TestServer::new(api::router(state)).unwrap(),
        clock,
    }
}

fn upload() -> MultipartForm {
    let image = RgbImage::from_pixel(160, 90, image::Rgb([10, 200, 10]));
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png).unwrap();

    MultipartForm::new()
        .add_part(
            "file",
            Part::bytes(buffer.into_inner())
                .file_name("frame.png")
                .mime_type("image/png"),
        )
        .add_text("roi_area_m2", "4")
}

#[tokio::test]
async fn test_danger_detection_posts_payload() -> Result<()> {
    let receiver = Receiver::new(StatusCode::OK, Duration::ZERO);
    let (url, _handle) = spawn_receiver(receiver.clone()).await?;
    // 30 people on 4 m² = 7.5 people/m²
    let harness = harness(&url, true, Duration::from_secs(5), 30);

    let result: DetectionResult = harness.server.post("/api/detect").multipart(upload()).await.json();
    assert_eq!(result.status, DensityStatus::Danger);

    let received = receiver.received();
    assert_eq!(received.len(), 1);
    let payload = &received[0];
    assert_eq!(payload["alert_type"], "danger");
    assert_eq!(payload["should_notify"], true);
    assert_eq!(payload["person_count"], 30);
    assert_eq!(payload["density"], 7.5);
    assert_eq!(payload["density_unit"], "people/m²");
    assert_eq!(payload["roi_area_m2"], 4.0);
    assert_eq!(payload["warn_threshold"], 5.0);
    assert_eq!(payload["danger_threshold"], 6.5);
    assert_eq!(payload["detection_count"], 30);
    assert_eq!(payload["image_dimensions"]["width"], 160);
    assert_eq!(payload["image_dimensions"]["height"], 90);
    assert!(payload["timestamp"].as_str().unwrap().contains('T'));
    assert!(payload["message"].as_str().unwrap().starts_with("Danger!"));

    Ok(())
}

#[tokio::test]
async fn test_normal_detection_does_not_alert() -> Result<()> {
    let receiver = Receiver::new(StatusCode::OK, Duration::ZERO);
    let (url, _handle) = spawn_receiver(receiver.clone()).await?;
    let harness = harness(&url, true, Duration::from_secs(5), 4);

    let result: DetectionResult = harness.server.post("/api/detect").multipart(upload()).await.json();
    assert_eq!(result.status, DensityStatus::Normal);
    assert!(receiver.received().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_cooldown_suppresses_then_reopens() -> Result<()> {
    let receiver = Receiver::new(StatusCode::OK, Duration::ZERO);
    let (url, _handle) = spawn_receiver(receiver.clone()).await?;
    let harness = harness(&url, true, Duration::from_secs(5), 30);

    harness.server.post("/api/detect").multipart(upload()).await;
    harness.clock.advance(Duration::from_secs(30));
    let suppressed: DetectionResult = harness.server.post("/api/detect").multipart(upload()).await.json();
    assert_eq!(receiver.received().len(), 1);
    // suppression never changes the result
    assert_eq!(suppressed.status, DensityStatus::Danger);
    assert_eq!(suppressed.person_count, 30);

    harness.clock.advance(Duration::from_secs(31));
    harness.server.post("/api/detect").multipart(upload()).await;
    assert_eq!(receiver.received().len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_webhook_timeout_leaves_result_unchanged() -> Result<()> {
    let slow = Receiver::new(StatusCode::OK, Duration::from_secs(3));
    let (url, _handle) = spawn_receiver(slow.clone()).await?;

    let alerting = harness(&url, true, Duration::from_millis(200), 30);
    let quiet = harness(&url, false, Duration::from_millis(200), 30);

    let with_timeout: DetectionResult = alerting.server.post("/api/detect").multipart(upload()).await.json();
    let without_alert: DetectionResult = quiet.server.post("/api/detect").multipart(upload()).await.json();

    assert_eq!(with_timeout.status, without_alert.status);
    assert_eq!(with_timeout.person_count, without_alert.person_count);
    assert_eq!(with_timeout.density, without_alert.density);
    assert_eq!(with_timeout.bounding_boxes, without_alert.bounding_boxes);
    assert_eq!(slow.received().len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_manual_alert_is_delivered_and_throttled() -> Result<()> {
    let receiver = Receiver::new(StatusCode::OK, Duration::ZERO);
    let (url, _handle) = spawn_receiver(receiver.clone()).await?;
    let harness = harness(&url, true, Duration::from_secs(5), 0);

    let body: Value = harness
        .server
        .post("/api/alert")
        .form(&[("alert_type", "warning"), ("person_count", "25"), ("density", "5.5")])
        .await
        .json();
    assert_eq!(body["success"], true);
    assert_eq!(body["outcome"], "sent");
    assert_eq!(body["webhook_url"], url.as_str());

    let received = receiver.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0]["alert_type"], "warning");
    assert_eq!(received[0]["message"], "Test alert - warning level");
    assert_eq!(received[0]["image_dimensions"]["width"], 1280);
    assert_eq!(received[0]["image_dimensions"]["height"], 720);
    assert_eq!(received[0]["detection_count"], 0);

    let second: Value = harness.server.post("/api/alert").form(&[("alert_type", "danger")]).await.json();
    assert_eq!(second["success"], false);
    assert_eq!(second["outcome"], "suppressed");
    assert_eq!(receiver.received().len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_manual_alert_rounds_density_for_webhook() -> Result<()> {
    let receiver = Receiver::new(StatusCode::OK, Duration::ZERO);
    let (url, _handle) = spawn_receiver(receiver.clone()).await?;
    let harness = harness(&url, true, Duration::from_secs(5), 0);

    let body: Value = harness
        .server
        .post("/api/alert")
        .form(&[("alert_type", "warning"), ("density", "5.5555")])
        .await
        .json();
    assert_eq!(body["outcome"], "sent");
    // the response echoes the submitted value
    assert_eq!(body["payload"]["density"], 5.5555);

    let received = receiver.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0]["density"], 5.56);

    Ok(())
}

#[tokio::test]
async fn test_webhook_error_status_is_reported() -> Result<()> {
    let receiver = Receiver::new(StatusCode::INTERNAL_SERVER_ERROR, Duration::ZERO);
    let (url, _handle) = spawn_receiver(receiver.clone()).await?;

    let clock = Arc::new(ManualClock::new());
    let dispatcher = WebhookDispatcher::new(url.parse()?, Duration::from_secs(5))?;
    let alerter = Alerter::new(
        true,
        AlertThrottle::new(Duration::from_secs(60), clock.clone()),
        Arc::new(dispatcher),
    );

    let result = DetectionResult {
        person_count: 150,
        density: 7.5,
        status: DensityStatus::Danger,
        bounding_boxes: Vec::new(),
        image_width: 640,
        image_height: 480,
        roi_area_m2: 20.0,
        density_warn_threshold: 5.0,
        density_danger_threshold: 6.5,
        message: "Danger!".to_string(),
    };

    let outcome = alerter.maybe_alert(&result).await;
    assert!(matches!(outcome, AlertOutcome::Failed(ref msg) if msg.contains("500")));
    assert_eq!(receiver.received().len(), 1);

    // the failed attempt still started a cooldown window
    assert_eq!(alerter.maybe_alert(&result).await, AlertOutcome::Suppressed);

    Ok(())
}
