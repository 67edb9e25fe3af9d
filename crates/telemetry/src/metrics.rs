use lazy_static::lazy_static;
use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ==== Detection Pipeline Metrics ====
    pub static ref DENSITY_DETECT_REQUESTS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "density_detect_requests_total",
                "Total number of density detection requests",
            ),
            &["outcome"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref DENSITY_DETECTION_LATENCY: HistogramVec = {
        let metric = HistogramVec::new(
            HistogramOpts::new(
                "density_detection_latency_seconds",
                "Latency of the decode, crop, detect and classify pipeline",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["detector"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref DENSITY_INFERENCE_TIME: HistogramVec = {
        let metric = HistogramVec::new(
            HistogramOpts::new(
                "density_inference_time_seconds",
                "Time spent on model inference (excluding pre/post processing)",
            )
            .buckets(vec![0.005, 0.01, 0.02, 0.05, 0.1, 0.2, 0.5, 1.0, 2.0]),
            &["detector", "execution_provider"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref DENSITY_LAST_PERSON_COUNT: IntGauge = {
        let metric = IntGauge::new(
            "density_last_person_count",
            "Person count of the most recent detection",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref DENSITY_STATUS_TOTAL: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "density_status_total",
                "Detection results by classified status",
            ),
            &["status"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref DENSITY_IMAGES_DOWNSCALED: IntCounter = {
        let metric = IntCounter::new(
            "density_images_downscaled_total",
            "Uploaded images downscaled to the maximum dimension",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    // ==== Alerting Metrics ====
    pub static ref DENSITY_ALERTS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "density_alerts_total",
                "Alert decisions by outcome (sent/failed/suppressed/disabled)",
            ),
            &["outcome"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };
}

/// Helper function to encode metrics for Prometheus scraping
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| {
        prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_metrics_accessible() {
        DENSITY_LAST_PERSON_COUNT.set(7);
        assert_eq!(DENSITY_LAST_PERSON_COUNT.get(), 7);

        let before = DENSITY_STATUS_TOTAL.with_label_values(&["danger"]).get();
        DENSITY_STATUS_TOTAL.with_label_values(&["danger"]).inc();
        assert_eq!(
            DENSITY_STATUS_TOTAL.with_label_values(&["danger"]).get(),
            before + 1
        );
    }

    #[test]
    fn test_alert_metrics_accessible() {
        let before = DENSITY_ALERTS.with_label_values(&["suppressed"]).get();
        DENSITY_ALERTS.with_label_values(&["suppressed"]).inc();
        assert_eq!(
            DENSITY_ALERTS.with_label_values(&["suppressed"]).get(),
            before + 1
        );
    }

    #[test]
    fn test_encode_metrics_succeeds() {
        DENSITY_DETECT_REQUESTS.with_label_values(&["success"]).inc();
        let encoded = encode_metrics().expect("metrics should encode");
        assert!(encoded.contains("density_detect_requests_total"));
    }
}
