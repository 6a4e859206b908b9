use super::RagPipeline;
use crate::errors::LorelaiError;
use crate::model::{DatasetCase, PipelineAnswer};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Replays answers recorded earlier, keyed by question text.
///
/// Each JSONL line is `{"question", "text"|"answer", "sources", "latency_ms"}`;
/// an optional `id` lets a line match a dataset case by id instead.
#[derive(Clone)]
pub struct TracePipeline {
    by_question: Arc<HashMap<String, PipelineAnswer>>,
    by_id: Arc<HashMap<String, PipelineAnswer>>,
    path: PathBuf,
}

impl TracePipeline {
    pub fn from_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            LorelaiError::validation(format!(
                "failed to open trace file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let reader = std::io::BufReader::new(file);

        let mut by_question = HashMap::new();
        let mut by_id = HashMap::new();

        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let v: serde_json::Value = serde_json::from_str(&line).map_err(|e| {
                LorelaiError::validation(format!("trace line {}: parse error: {}", i + 1, e))
            })?;

            let question = v.get("question").and_then(|s| s.as_str());
            let text = v
                .get("text")
                .or(v.get("answer"))
                .and_then(|s| s.as_str())
                .ok_or_else(|| {
                    LorelaiError::validation(format!("trace line {}: missing text", i + 1))
                })?;
            let answer = PipelineAnswer {
                text: text.to_string(),
                sources: v
                    .get("sources")
                    .and_then(|s| s.as_array())
                    .map(|a| {
                        a.iter()
                            .filter_map(|x| x.as_str().map(String::from))
                            .collect()
                    })
                    .unwrap_or_default(),
                latency_ms: v.get("latency_ms").and_then(|n| n.as_u64()).unwrap_or(0),
            };

            if let Some(id) = v.get("id").and_then(|s| s.as_str()) {
                if by_id.insert(id.to_string(), answer.clone()).is_some() {
                    return Err(LorelaiError::validation(format!(
                        "trace line {}: duplicate id {}",
                        i + 1,
                        id
                    ))
                    .into());
                }
            }
            if let Some(q) = question {
                if by_question.insert(q.to_string(), answer).is_some() {
                    return Err(LorelaiError::validation(format!(
                        "trace line {}: duplicate question '{}'",
                        i + 1,
                        q
                    ))
                    .into());
                }
            }
        }

        if by_question.is_empty() && by_id.is_empty() {
            return Err(LorelaiError::validation(format!(
                "trace file '{}' contains no answers",
                path.display()
            ))
            .into());
        }

        Ok(Self {
            by_question: Arc::new(by_question),
            by_id: Arc::new(by_id),
            path: path.to_path_buf(),
        })
    }
}

#[async_trait]
impl RagPipeline for TracePipeline {
    async fn answer(&self, case: &DatasetCase) -> anyhow::Result<PipelineAnswer> {
        self.by_id
            .get(&case.id)
            .or_else(|| self.by_question.get(&case.question))
            .cloned()
            .ok_or_else(|| {
                LorelaiError::not_found(format!("no recorded answer for question '{}'", case.id))
                    .into()
            })
    }

    fn name(&self) -> &'static str {
        "trace"
    }

    fn target(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn case(id: &str, q: &str) -> DatasetCase {
        DatasetCase {
            id: id.into(),
            question: q.into(),
            expected_answer: String::new(),
            expected_sources: vec![],
        }
    }

    #[tokio::test]
    async fn replays_by_id_then_question() -> anyhow::Result<()> {
        let mut f = tempfile::NamedTempFile::new()?;
        writeln!(
            f,
            r#"{{"id":"q1","question":"Who owns billing?","text":"Team Ledger","sources":["doc-7"],"latency_ms":210}}"#
        )?;
        writeln!(f)?;
        writeln!(f, r#"{{"question":"Where is the runbook?","answer":"In Drive"}}"#)?;

        let trace = TracePipeline::from_path(f.path())?;
        let a = trace.answer(&case("q1", "reworded")).await?;
        assert_eq!(a.text, "Team Ledger");
        assert_eq!(a.sources, vec!["doc-7".to_string()]);
        assert_eq!(a.latency_ms, 210);

        let b = trace.answer(&case("q2", "Where is the runbook?")).await?;
        assert_eq!(b.text, "In Drive");

        assert!(trace.answer(&case("q3", "unknown")).await.is_err());
        Ok(())
    }

    #[test]
    fn duplicate_questions_are_rejected() -> anyhow::Result<()> {
        let mut f = tempfile::NamedTempFile::new()?;
        writeln!(f, r#"{{"question":"Q","text":"a"}}"#)?;
        writeln!(f, r#"{{"question":"Q","text":"b"}}"#)?;
        let err = TracePipeline::from_path(f.path()).err().unwrap();
        assert!(err.to_string().contains("duplicate question"));
        Ok(())
    }
}
