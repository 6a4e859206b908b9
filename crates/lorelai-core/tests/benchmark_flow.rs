use async_trait::async_trait;
use lorelai_core::benchmark::runner::load_results;
use lorelai_core::benchmark::{BenchmarkRunner, RunOptions, TemplateService};
use lorelai_core::errors::{classify, ErrorKind};
use lorelai_core::metrics_api::{Metric, MetricResult};
use lorelai_core::model::{DatasetCase, PipelineAnswer, RunStatus};
use lorelai_core::storage::Store;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

struct ExactMatch;

#[async_trait]
impl Metric for ExactMatch {
    fn name(&self) -> &'static str {
        "exact_match"
    }

    async fn evaluate(
        &self,
        case: &DatasetCase,
        answers: &[PipelineAnswer],
    ) -> anyhow::Result<MetricResult> {
        let hits = answers
            .iter()
            .filter(|a| a.text == case.expected_answer)
            .count();
        Ok(MetricResult::score(hits as f64 / answers.len() as f64))
    }
}

fn write(path: &Path, lines: &[&str]) {
    std::fs::write(path, lines.join("\n")).unwrap();
}

fn setup(dir: &Path) -> anyhow::Result<(Store, TemplateService)> {
    let store = Store::open(&dir.join("lorelai.db"))?;
    store.init_schema()?;
    let templates = TemplateService::new(store.clone());

    write(
        &dir.join("qa.jsonl"),
        &[
            r#"{"id":"q1","question":"Who owns billing?","expected_answer":"Team Ledger","expected_sources":["doc-7"]}"#,
            r#"{"id":"q2","question":"Where is the runbook?","expected_answer":"In Drive","expected_sources":["doc-9"]}"#,
            r#"{"id":"q3","question":"Not recorded","expected_answer":"?"}"#,
        ],
    );
    write(
        &dir.join("trace.jsonl"),
        &[
            r#"{"id":"q1","text":"Team Ledger","sources":["doc-7"],"latency_ms":120}"#,
            r#"{"id":"q2","text":"In Confluence","sources":["doc-3"],"latency_ms":80}"#,
        ],
    );

    let t = templates.create("T1", "trace replay")?;
    let dataset = dir.join("qa.jsonl");
    let trace = dir.join("trace.jsonl");
    templates.add_parameter(t.id, "dataset", "string", dataset.to_str().unwrap())?;
    templates.add_parameter(t.id, "pipeline", "string", "trace")?;
    templates.add_parameter(t.id, "trace_file", "string", trace.to_str().unwrap())?;
    templates.add_parameter(t.id, "samples", "int", "2")?;
    templates.add_parameter(t.id, "code_version", "string", "1.0")?;
    Ok((store, templates))
}

#[tokio::test]
async fn trace_run_records_means_and_failures() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let (store, _templates) = setup(dir.path())?;
    let runner = BenchmarkRunner::new(store.clone(), vec![Arc::new(ExactMatch)]);

    let summary = runner.run("T1", &RunOptions::default()).await?;
    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.questions, 3);
    assert_eq!(summary.failed_questions, 1);
    assert!((summary.metrics["exact_match"] - 0.5).abs() < 1e-9);

    let run_id = summary.run_id.expect("real run has an id");
    let (run, results) = load_results(&store, &run_id.to_string())?;
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.parameters["parameters"]["code_version"], "1.0");
    let get = |k: &str| results.iter().find(|r| r.key == k).map(|r| r.value.clone());
    assert_eq!(get("exact_match").as_deref(), Some("0.5000"));
    assert_eq!(get("questions").as_deref(), Some("3"));
    assert_eq!(get("failed_questions").as_deref(), Some("1"));
    assert!(get("error:q3").is_some());
    Ok(())
}

#[tokio::test]
async fn dry_run_writes_nothing() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let (store, _templates) = setup(dir.path())?;
    let runner = BenchmarkRunner::new(store.clone(), vec![Arc::new(ExactMatch)]);

    let opts = RunOptions {
        dry_run: true,
        ..Default::default()
    };
    let summary = runner.run("T1", &opts).await?;
    assert!(summary.dry_run);
    assert!(summary.run_id.is_none());
    assert_eq!(store.stats()?.benchmark_runs, 0);

    let err = runner.run("NonExistingTemplate", &opts).await.unwrap_err();
    assert_eq!(classify(&err), ErrorKind::NotFound);
    assert_eq!(store.stats()?.benchmark_runs, 0);
    Ok(())
}

#[tokio::test]
async fn run_where_every_question_fails_is_failed() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let (store, templates) = setup(dir.path())?;
    write(
        &dir.path().join("other.jsonl"),
        &[r#"{"id":"x1","text":"unrelated","question":"Something else"}"#],
    );
    let t = templates.find_by_name("T1")?;
    let other = dir.path().join("other.jsonl");
    templates.add_parameter(t.id, "trace_file", "string", other.to_str().unwrap())?;

    let runner = BenchmarkRunner::new(store.clone(), vec![Arc::new(ExactMatch)]);
    let summary = runner.run("T1", &RunOptions::default()).await?;
    assert_eq!(summary.status, RunStatus::Failed);
    assert_eq!(summary.failed_questions, 3);
    Ok(())
}
