use crate::alert::{AlertOutcome, Alerter};
use crate::config::DensityServiceConfig;
use crate::error::PipelineError;
use crate::pipeline::{DensityPipeline, DetectParams};
use bytes::Bytes;
use common::density::DetectionResult;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct DensityServiceState {
    inner: Arc<DensityServiceStateInner>,
}

struct DensityServiceStateInner {
    config: DensityServiceConfig,
    pipeline: DensityPipeline,
    alerter: Alerter,
}

impl DensityServiceState {
    pub fn new(config: DensityServiceConfig, pipeline: DensityPipeline, alerter: Alerter) -> Self {
        Self {
            inner: Arc::new(DensityServiceStateInner {
                config,
                pipeline,
                alerter,
            }),
        }
    }

    pub fn config(&self) -> &DensityServiceConfig {
        &self.inner.config
    }

    pub fn pipeline(&self) -> &DensityPipeline {
        &self.inner.pipeline
    }

    pub fn alerter(&self) -> &Alerter {
        &self.inner.alerter
    }

    /// Run detection, then give the alerter a chance to notify.
    ///
    /// The alert outcome never alters the returned result.
    pub async fn detect(
        &self,
        bytes: Bytes,
        params: DetectParams,
    ) -> Result<(DetectionResult, AlertOutcome), PipelineError> {
        let result = self.inner.pipeline.run(bytes, params).await?;
        let outcome = self.inner.alerter.maybe_alert(&result).await;
        Ok((result, outcome))
    }

    pub async fn shutdown(&self) {
        info!(
            detector = self.inner.pipeline.detector_id().unwrap_or("none"),
            "Density service stopped"
        );
    }
}
