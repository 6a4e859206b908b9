use super::RagPipeline;
use crate::errors::LorelaiError;
use crate::model::{DatasetCase, PipelineAnswer};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, Instant};

pub struct HttpPipeline {
    client: reqwest::Client,
    url: String,
}

#[derive(Deserialize)]
struct AnswerBody {
    #[serde(alias = "answer")]
    text: String,
    #[serde(default)]
    sources: Vec<String>,
    latency_ms: Option<u64>,
}

impl HttpPipeline {
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let url = url.into();
        let parsed = reqwest::Url::parse(&url).map_err(|e| {
            LorelaiError::validation(format!("invalid pipeline_url '{}': {}", url, e))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(LorelaiError::validation(format!(
                "pipeline_url must be http(s), got '{}'",
                url
            ))
            .into());
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl RagPipeline for HttpPipeline {
    async fn answer(&self, case: &DatasetCase) -> anyhow::Result<PipelineAnswer> {
        let started = Instant::now();
        let resp = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "id": case.id, "question": case.question }))
            .send()
            .await
            .map_err(|e| LorelaiError::Integration(format!("pipeline request failed: {}", e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(LorelaiError::Integration(format!(
                "pipeline returned {}: {}",
                status, text
            ))
            .into());
        }

        let body: AnswerBody = resp
            .json()
            .await
            .map_err(|e| LorelaiError::Integration(format!("pipeline response: {}", e)))?;
        let elapsed = started.elapsed().as_millis() as u64;

        Ok(PipelineAnswer {
            text: body.text,
            sources: body.sources,
            latency_ms: body.latency_ms.unwrap_or(elapsed),
        })
    }

    fn name(&self) -> &'static str {
        "http"
    }

    fn target(&self) -> String {
        self.url.clone()
    }
}
