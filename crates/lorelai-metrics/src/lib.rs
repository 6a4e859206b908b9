use std::sync::Arc;

use lorelai_core::metrics_api::Metric;

mod normalize;

pub mod answer_consistency;
pub mod answer_similarity;
pub mod augmentation_accuracy;
pub mod latency;
pub mod retrieval_precision;

pub fn default_metrics() -> Vec<Arc<dyn Metric>> {
    vec![
        Arc::new(latency::LatencyMetric),
        Arc::new(answer_similarity::AnswerSimilarityMetric),
        Arc::new(answer_consistency::AnswerConsistencyMetric),
        Arc::new(augmentation_accuracy::AugmentationAccuracyMetric),
        Arc::new(retrieval_precision::RetrievalPrecisionMetric),
    ]
}

#[cfg(test)]
pub(crate) mod testutil {
    use lorelai_core::model::{DatasetCase, PipelineAnswer};

    pub fn case(expected: &str, sources: &[&str]) -> DatasetCase {
        DatasetCase {
            id: "q1".into(),
            question: "Who owns billing?".into(),
            expected_answer: expected.into(),
            expected_sources: sources.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn answer(text: &str, sources: &[&str], latency_ms: u64) -> PipelineAnswer {
        PipelineAnswer {
            text: text.into(),
            sources: sources.iter().map(|s| s.to_string()).collect(),
            latency_ms,
        }
    }
}
