use crate::model::{DatasetCase, PipelineAnswer};
use async_trait::async_trait;

pub mod http;
pub mod trace;

/// The external question-answering service a benchmark measures.
#[async_trait]
pub trait RagPipeline: Send + Sync {
    async fn answer(&self, case: &DatasetCase) -> anyhow::Result<PipelineAnswer>;
    fn name(&self) -> &'static str;
    /// Short identity folded into run parameters (URL or trace path).
    fn target(&self) -> String;
}
