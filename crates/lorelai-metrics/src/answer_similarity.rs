use async_trait::async_trait;
use crate::normalize;
use lorelai_core::metrics_api::{Metric, MetricResult};
use lorelai_core::model::{DatasetCase, PipelineAnswer};

/// Sørensen–Dice similarity between each answer and the expected answer,
/// averaged over samples.
pub struct AnswerSimilarityMetric;

#[async_trait]
impl Metric for AnswerSimilarityMetric {
    fn name(&self) -> &'static str {
        "answer_similarity"
    }

    async fn evaluate(
        &self,
        case: &DatasetCase,
        answers: &[PipelineAnswer],
    ) -> anyhow::Result<MetricResult> {
        if answers.is_empty() {
            anyhow::bail!("no answers to score");
        }
        let scores: Vec<f64> = answers
            .iter()
            .map(|a| normalize::similarity(&a.text, &case.expected_answer))
            .collect();
        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        Ok(MetricResult {
            score: mean,
            details: serde_json::json!({ "per_sample": scores }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{answer, case};

    #[tokio::test]
    async fn exact_answer_scores_one() {
        let r = AnswerSimilarityMetric
            .evaluate(
                &case("Team Ledger owns billing.", &[]),
                &[answer("team ledger owns billing", &[], 10)],
            )
            .await
            .unwrap();
        assert_eq!(r.score, 1.0);
    }

    #[tokio::test]
    async fn unrelated_answer_scores_low() {
        let r = AnswerSimilarityMetric
            .evaluate(
                &case("Team Ledger owns billing.", &[]),
                &[answer("I don't know", &[], 10)],
            )
            .await
            .unwrap();
        assert!(r.score < 0.3, "score {}", r.score);
    }
}
