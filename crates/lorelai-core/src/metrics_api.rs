use crate::model::{DatasetCase, PipelineAnswer};
use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq)]
pub struct MetricResult {
    pub score: f64,
    pub details: serde_json::Value,
}

impl MetricResult {
    pub fn score(score: f64) -> Self {
        Self {
            score,
            details: serde_json::json!({}),
        }
    }
}

/// Scores the answers one question received. `answers` holds every sample
/// and is never empty.
#[async_trait]
pub trait Metric: Send + Sync {
    fn name(&self) -> &'static str;
    async fn evaluate(
        &self,
        case: &DatasetCase,
        answers: &[PipelineAnswer],
    ) -> anyhow::Result<MetricResult>;
}
