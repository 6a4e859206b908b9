use async_trait::async_trait;
use lorelai_core::metrics_api::{Metric, MetricResult};
use lorelai_core::model::{DatasetCase, PipelineAnswer};

/// Mean response latency in milliseconds across samples.
pub struct LatencyMetric;

#[async_trait]
impl Metric for LatencyMetric {
    fn name(&self) -> &'static str {
        "latency_ms"
    }

    async fn evaluate(
        &self,
        _case: &DatasetCase,
        answers: &[PipelineAnswer],
    ) -> anyhow::Result<MetricResult> {
        if answers.is_empty() {
            anyhow::bail!("no answers to measure");
        }
        let total: u64 = answers.iter().map(|a| a.latency_ms).sum();
        let mean = total as f64 / answers.len() as f64;
        Ok(MetricResult {
            score: mean,
            details: serde_json::json!({
                "samples": answers.len(),
                "max_ms": answers.iter().map(|a| a.latency_ms).max(),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{answer, case};

    #[tokio::test]
    async fn averages_samples() {
        let r = LatencyMetric
            .evaluate(
                &case("x", &[]),
                &[answer("a", &[], 100), answer("a", &[], 300)],
            )
            .await
            .unwrap();
        assert_eq!(r.score, 200.0);
        assert_eq!(r.details["max_ms"], 300);
    }
}
