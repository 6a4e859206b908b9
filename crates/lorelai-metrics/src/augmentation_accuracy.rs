use async_trait::async_trait;
use lorelai_core::metrics_api::{Metric, MetricResult};
use lorelai_core::model::{DatasetCase, PipelineAnswer};
use std::collections::HashSet;

/// Share of the expected sources that were supplied to the model as context
/// (context recall), averaged over samples.
pub struct AugmentationAccuracyMetric;

#[async_trait]
impl Metric for AugmentationAccuracyMetric {
    fn name(&self) -> &'static str {
        "augmentation_accuracy"
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
        if expected.is_empty() {
            return Ok(MetricResult::score(1.0));
        }
        let mean = answers
            .iter()
            .map(|a| {
                let supplied: HashSet<&str> = a.sources.iter().map(String::as_str).collect();
                expected.intersection(&supplied).count() as f64 / expected.len() as f64
            })
            .sum::<f64>()
            / answers.len() as f64;
        Ok(MetricResult::score(mean))
    }
}
