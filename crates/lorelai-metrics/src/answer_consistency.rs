use async_trait::async_trait;
use crate::normalize;
use lorelai_core::metrics_api::{Metric, MetricResult};
use lorelai_core::model::{DatasetCase, PipelineAnswer};

/// Mean pairwise similarity among the samples of one question. A single
/// sample is trivially consistent.
pub struct AnswerConsistencyMetric;

#[async_trait]
impl Metric for AnswerConsistencyMetric {
    fn name(&self) -> &'static str {
        "answer_consistency"
    }

    async fn evaluate(
        &self,
        _case: &DatasetCase,
        answers: &[PipelineAnswer],
    ) -> anyhow::Result<MetricResult> {
        if answers.len() < 2 {
            return Ok(MetricResult::score(1.0));
        }
        let mut total = 0.0;
        let mut pairs = 0usize;
        for (i, a) in answers.iter().enumerate() {
            for b in &answers[i + 1..] {
                total += normalize::similarity(&a.text, &b.text);
                pairs += 1;
            }
        }
        Ok(MetricResult {
            score: total / pairs as f64,
            details: serde_json::json!({ "pairs": pairs }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{answer, case};

    #[tokio::test]
    async fn single_sample_is_consistent() {
        let r = AnswerConsistencyMetric
            .evaluate(&case("", &[]), &[answer("anything", &[], 1)])
            .await
            .unwrap();
        assert_eq!(r.score, 1.0);
    }

    #[tokio::test]
    async fn diverging_samples_lower_the_score() {
        let same = [answer("Team Ledger", &[], 1), answer("team ledger", &[], 1)];
        let mixed = [
            answer("Team Ledger", &[], 1),
            answer("team ledger", &[], 1),
            answer("Platform group", &[], 1),
        ];
        let a = AnswerConsistencyMetric
            .evaluate(&case("", &[]), &same)
            .await
            .unwrap();
        let b = AnswerConsistencyMetric
            .evaluate(&case("", &[]), &mixed)
            .await
            .unwrap();
        assert_eq!(a.score, 1.0);
        assert!(b.score < a.score);
        assert_eq!(b.details["pairs"], 3);
    }
}
