use anyhow::Result;
use density_service::{
    alert::{AlertThrottle, Alerter, WebhookDispatcher},
    api,
    config::{DensityServiceConfig, DetectorBackend},
    detector::{
        mock::MockPersonDetector,
        yolov8::{YoloV8Config, YoloV8Detector},
        PersonDetector,
    },
    DensityPipeline, DensityServiceState,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_with_service("density-service", env!("CARGO_PKG_VERSION"));

    info!("Starting density service...");

    let config = DensityServiceConfig::from_env()?;
    info!(
        bind = %config.bind_addr,
        detector = ?config.detector_backend,
        alerts_enabled = config.alerts_enabled,
        cooldown_secs = config.alert_cooldown.as_secs(),
        "Density service configuration loaded"
    );

    let detector = build_detector(&config).await;
    let pipeline = DensityPipeline::new(detector, config.max_image_dimension);

    let dispatcher = WebhookDispatcher::new(config.webhook_url.clone(), config.alert_timeout)?;
    let alerter = Alerter::new(
        config.alerts_enabled,
        AlertThrottle::with_system_clock(config.alert_cooldown),
        Arc::new(dispatcher),
    );

    let bind_addr = config.bind_addr.clone();
    let state = DensityServiceState::new(config, pipeline, alerter);
    let app = api::router(state.clone());

    info!("Binding to {}", bind_addr);
    let listener = TcpListener::bind(&bind_addr).await?;
    info!("Density service listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    Ok(())
}

/// A model that fails to load leaves the service up but not ready
async fn build_detector(config: &DensityServiceConfig) -> Option<Arc<dyn PersonDetector>> {
    match config.detector_backend {
        DetectorBackend::Mock => {
            info!("Using mock person detector");
            Some(Arc::new(MockPersonDetector::new()))
        }
        DetectorBackend::YoloV8 => {
            let yolo_config = YoloV8Config {
                model_path: config.model_path.clone(),
                execution_provider: config.execution_provider.clone(),
                ..YoloV8Config::default()
            };

            match tokio::task::spawn_blocking(move || YoloV8Detector::load(yolo_config)).await {
                Ok(Ok(detector)) => Some(Arc::new(detector)),
                Ok(Err(e)) => {
                    error!("Failed to load YOLOv8 model: {:#}", e);
                    warn!("Detect requests will be rejected until the model is available");
                    None
                }
                Err(e) => {
                    error!("YOLOv8 loader task failed: {}", e);
                    None
                }
            }
        }
    }
}

async fn shutdown_signal(state: DensityServiceState) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }

    info!("Shutting down gracefully...");
    state.shutdown().await;
}
