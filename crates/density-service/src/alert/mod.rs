//! Outbound crowd alerts: cooldown throttling and webhook delivery.
//!
//! The [`Alerter`] never fails the caller. Every attempt ends in an
//! [`AlertOutcome`] that is logged and counted, and the detection result the
//! alert was raised for is left untouched.

pub mod dispatcher;
pub mod throttle;

pub use dispatcher::{AlertSink, WebhookDispatcher};
pub use throttle::{AlertThrottle, Clock, ManualClock, SystemClock, ThrottleDecision};

use chrono::Utc;
use common::density::{AlertPayload, DetectionResult};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum AlertOutcome {
    Disabled,
    NotAlertWorthy,
    Suppressed,
    Sent,
    Failed(String),
}

impl AlertOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertOutcome::Disabled => "disabled",
            AlertOutcome::NotAlertWorthy => "not_alert_worthy",
            AlertOutcome::Suppressed => "suppressed",
            AlertOutcome::Sent => "sent",
            AlertOutcome::Failed(_) => "failed",
        }
    }
}

pub struct Alerter {
    enabled: bool,
    throttle: AlertThrottle,
    sink: Arc<dyn AlertSink>,
}

impl Alerter {
    pub fn new(enabled: bool, throttle: AlertThrottle, sink: Arc<dyn AlertSink>) -> Self {
        Self {
            enabled,
            throttle,
            sink,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn throttle(&self) -> &AlertThrottle {
        &self.throttle
    }

    pub fn target(&self) -> String {
        self.sink.target()
    }

    /// Alert on warning and danger results, subject to the cooldown
    pub async fn maybe_alert(&self, result: &DetectionResult) -> AlertOutcome {
        if !result.status.is_alert_worthy() {
            return self.record(AlertOutcome::NotAlertWorthy);
        }
        self.attempt(result).await
    }

    /// Alert whatever the status; the enabled flag and cooldown still apply
    pub async fn force_alert(&self, result: &DetectionResult) -> AlertOutcome {
        self.attempt(result).await
    }

    async fn attempt(&self, result: &DetectionResult) -> AlertOutcome {
        if !self.enabled {
            return self.record(AlertOutcome::Disabled);
        }

        if let ThrottleDecision::Suppressed { remaining } = self.throttle.try_acquire() {
            debug!(
                remaining_secs = remaining.as_secs(),
                status = %result.status,
                "Alert suppressed by cooldown"
            );
            return self.record(AlertOutcome::Suppressed);
        }

        let payload = AlertPayload::from_result(result, Utc::now());
        let outcome = match self.sink.send(&payload).await {
            Ok(()) => {
                info!(
                    alert_type = %payload.alert_type,
                    person_count = payload.person_count,
                    density = payload.density,
                    "Crowd alert sent"
                );
                AlertOutcome::Sent
            }
            Err(e) => {
                warn!(
                    alert_type = %payload.alert_type,
                    target = %self.sink.target(),
                    "Crowd alert delivery failed: {:#}",
                    e
                );
                AlertOutcome::Failed(format!("{:#}", e))
            }
        };

        self.record(outcome)
    }

    fn record(&self, outcome: AlertOutcome) -> AlertOutcome {
        telemetry::metrics::DENSITY_ALERTS
            .with_label_values(&[outcome.as_str()])
            .inc();
        outcome
    }
}
