use async_trait::async_trait;
use lorelai_core::metrics_api::{Metric, MetricResult};
use lorelai_core::model::{DatasetCase, PipelineAnswer};
use std::collections::HashSet;

/// Share of retrieved sources that are among the expected ones.
pub struct RetrievalPrecisionMetric;

fn precision(expected: &HashSet<&str>, retrieved: &[String]) -> f64 {
    let retrieved: HashSet<&str> = retrieved.iter().map(String::as_str).collect();
    if retrieved.is_empty() {
        return if expected.is_empty() { 1.0 } else { 0.0 };
    }
    retrieved.intersection(expected).count() as f64 / retrieved.len() as f64
}

#[async_trait]
impl Metric for RetrievalPrecisionMetric {
    fn name(&self) -> &'static str {
        "retrieval_precision"
    }

    async fn evaluate(
        &self,
        case: &DatasetCase,
        answers: &[PipelineAnswer],
    ) -> anyhow::Result<MetricResult> {
        if answers.is_empty() {
            anyhow::bail!("no answers to score");
        }
        let expected: HashSet<&str> = case.expected_sources.iter().map(String::as_str).collect();
        let scores: Vec<f64> = answers
            .iter()
            .map(|a| precision(&expected, &a.sources))
            .collect();
        if scores.iter().any(|s| *s == 0.0) {
            tracing::debug!(case = %case.id, "retrieval returned no expected source");
        }
        Ok(MetricResult::score(
            scores.iter().sum::<f64>() / scores.len() as f64,
        ))
    }
}
