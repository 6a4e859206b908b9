use crate::benchmark::{bounded_int, dataset, MAX_SAMPLES, MAX_TIMEOUT_SECS};
use crate::errors::LorelaiError;
use crate::fingerprint::{self, Fingerprint};
use crate::metrics_api::Metric;
use crate::model::{
    BenchmarkResult, BenchmarkRun, BenchmarkTemplate, DatasetCase, PipelineAnswer, RunStatus,
    TemplateParameter,
};
use crate::providers::http::HttpPipeline;
use crate::providers::trace::TracePipeline;
use crate::providers::RagPipeline;
use crate::storage::Store;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::{timeout, Duration};

pub const DEFAULT_PARALLEL: usize = 4;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub dry_run: bool,
    pub pipeline_url: Option<String>,
    pub trace_file: Option<PathBuf>,
    pub parallel: Option<usize>,
}

/// Everything a run needs, resolved and validated. Building a plan performs
/// no writes.
pub struct RunPlan {
    pub template: BenchmarkTemplate,
    pub parameters: Vec<TemplateParameter>,
    pub dataset_path: PathBuf,
    pub cases: Vec<DatasetCase>,
    pub pipeline: Arc<dyn RagPipeline>,
    pub samples: u32,
    pub timeout: Duration,
    pub fingerprint: Fingerprint,
}

impl RunPlan {
    /// Parameter snapshot stored with the run.
    pub fn snapshot(&self) -> serde_json::Value {
        let params: serde_json::Map<String, serde_json::Value> = self
            .parameters
            .iter()
            .map(|p| (p.name.clone(), serde_json::Value::String(p.value.clone())))
            .collect();
        serde_json::json!({
            "parameters": params,
            "pipeline": self.pipeline.name(),
            "pipeline_target": self.pipeline.target(),
            "dataset": self.dataset_path.display().to_string(),
            "questions": self.cases.len(),
            "samples": self.samples,
        })
    }
}

#[derive(Debug, Clone)]
pub struct QuestionOutcome {
    pub case_id: String,
    pub scores: BTreeMap<String, f64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Option<i64>,
    pub template_name: String,
    pub dry_run: bool,
    pub status: RunStatus,
    pub questions: usize,
    pub failed_questions: usize,
    pub metrics: BTreeMap<String, f64>,
    pub fingerprint: String,
    pub pipeline: String,
}

pub struct BenchmarkRunner {
    store: Store,
    metrics: Vec<Arc<dyn Metric>>,
    default_pipeline_url: Option<String>,
    pipeline_override: Option<Arc<dyn RagPipeline>>,
}

impl BenchmarkRunner {
    pub fn new(store: Store, metrics: Vec<Arc<dyn Metric>>) -> Self {
        Self {
            store,
            metrics,
            default_pipeline_url: None,
            pipeline_override: None,
        }
    }

    /// Fallback when neither the template nor the command names a URL.
    pub fn with_default_pipeline_url(mut self, url: Option<String>) -> Self {
        self.default_pipeline_url = url;
        self
    }

    /// Uses `pipeline` for every run regardless of parameters.
    pub fn with_pipeline(mut self, pipeline: Arc<dyn RagPipeline>) -> Self {
        self.pipeline_override = Some(pipeline);
        self
    }

    pub fn plan(&self, template_name: &str, opts: &RunOptions) -> anyhow::Result<RunPlan> {
        let template = self
            .store
            .find_template_by_name(template_name.trim())?
            .ok_or_else(|| LorelaiError::not_found(format!("template '{}'", template_name)))?;
        let parameters = self.store.list_parameters(template.id)?;
        let param = |name: &str| parameters.iter().find(|p| p.name == name);

        let dataset_path = param("dataset")
            .map(|p| PathBuf::from(p.value.trim()))
            .ok_or_else(|| {
                LorelaiError::validation(format!(
                    "template '{}' has no 'dataset' parameter",
                    template.name
                ))
            })?;
        let cases = dataset::load(&dataset_path)?;

        let samples = match param("samples") {
            Some(p) => {
                let n = bounded_int("samples", &p.value, (1, MAX_SAMPLES))?;
                u32::try_from(n).map_err(|_| {
                    LorelaiError::validation(format!("samples out of range: {}", n))
                })?
            }
            None => 1,
        };
        let timeout_secs = match param("timeout_seconds") {
            Some(p) => {
                let n = bounded_int("timeout_seconds", &p.value, (1, MAX_TIMEOUT_SECS))?;
                u64::try_from(n).map_err(|_| {
                    LorelaiError::validation(format!("timeout_seconds out of range: {}", n))
                })?
            }
            None => DEFAULT_TIMEOUT_SECS,
        };
        let timeout = Duration::from_secs(timeout_secs);

        let pipeline = match &self.pipeline_override {
            Some(p) => p.clone(),
            None => self.resolve_pipeline(&parameters, opts, timeout)?,
        };

        let fingerprint = fingerprint::compute(&template, &parameters);
        Ok(RunPlan {
            template,
            parameters,
            dataset_path,
            cases,
            pipeline,
            samples,
            timeout,
            fingerprint,
        })
    }

    fn resolve_pipeline(
        &self,
        parameters: &[TemplateParameter],
        opts: &RunOptions,
        timeout: Duration,
    ) -> anyhow::Result<Arc<dyn RagPipeline>> {
        let param = |name: &str| {
            parameters
                .iter()
                .find(|p| p.name == name)
                .map(|p| p.value.trim().to_string())
        };

        let trace_file = opts
            .trace_file
            .clone()
            .or_else(|| param("trace_file").map(PathBuf::from));
        let url = opts
            .pipeline_url
            .clone()
            .or_else(|| param("pipeline_url"))
            .or_else(|| self.default_pipeline_url.clone());

        let kind = if opts.trace_file.is_some() {
            "trace".to_string()
        } else if opts.pipeline_url.is_some() {
            "http".to_string()
        } else {
            param("pipeline").unwrap_or_else(|| "http".to_string())
        };

        match kind.as_str() {
            "trace" => {
                let path = trace_file.ok_or_else(|| {
                    LorelaiError::validation("pipeline 'trace' needs a trace_file")
                })?;
                Ok(Arc::new(TracePipeline::from_path(&path)?))
            }
            "http" => {
                let url = url.ok_or_else(|| {
                    LorelaiError::validation(
                        "pipeline 'http' needs pipeline_url (parameter, --pipeline-url or LORELAI_PIPELINE_URL)",
                    )
                })?;
                Ok(Arc::new(HttpPipeline::new(url, timeout)?))
            }
            other => Err(LorelaiError::validation(format!(
                "unknown pipeline '{}' (expected http|trace)",
                other
            ))
            .into()),
        }
    }

    pub async fn run(&self, template_name: &str, opts: &RunOptions) -> anyhow::Result<RunSummary> {
        let plan = self.plan(template_name, opts)?;

        if opts.dry_run {
            tracing::info!(
                event = "benchmark_dry_run",
                template = %plan.template.name,
                questions = plan.cases.len()
            );
            return Ok(RunSummary {
                run_id: None,
                template_name: plan.template.name.clone(),
                dry_run: true,
                status: RunStatus::Completed,
                questions: plan.cases.len(),
                failed_questions: 0,
                metrics: BTreeMap::new(),
                fingerprint: plan.fingerprint.hex.clone(),
                pipeline: format!("{} {}", plan.pipeline.name(), plan.pipeline.target()),
            });
        }

        let run_id =
            self.store
                .create_benchmark_run(&plan.template, &plan.fingerprint.hex, &plan.snapshot())?;
        tracing::info!(
            event = "benchmark_run_started",
            run_id,
            template = %plan.template.name,
            questions = plan.cases.len()
        );

        let outcomes = match self.execute(&plan, opts.parallel).await {
            Ok(o) => o,
            Err(e) => {
                self.store.finalize_benchmark_run(run_id, RunStatus::Failed)?;
                return Err(e);
            }
        };

        let (metrics, failed) = aggregate(&outcomes);
        let status = if failed == outcomes.len() {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };

        let mut rows: Vec<(String, String)> = metrics
            .iter()
            .map(|(k, v)| (k.clone(), format!("{:.4}", v)))
            .collect();
        rows.push(("questions".into(), outcomes.len().to_string()));
        rows.push(("failed_questions".into(), failed.to_string()));
        for o in &outcomes {
            if let Some(err) = &o.error {
                rows.push((format!("error:{}", o.case_id), err.clone()));
            }
        }

        if let Err(e) = self.store.append_results(run_id, &rows) {
            self.store.finalize_benchmark_run(run_id, RunStatus::Failed)?;
            return Err(e);
        }
        self.store.finalize_benchmark_run(run_id, status)?;
        tracing::info!(
            event = "benchmark_run_finished",
            run_id,
            status = status.as_str(),
            failed_questions = failed
        );

        Ok(RunSummary {
            run_id: Some(run_id),
            template_name: plan.template.name.clone(),
            dry_run: false,
            status,
            questions: outcomes.len(),
            failed_questions: failed,
            metrics,
            fingerprint: plan.fingerprint.hex.clone(),
            pipeline: format!("{} {}", plan.pipeline.name(), plan.pipeline.target()),
        })
    }

    async fn execute(
        &self,
        plan: &RunPlan,
        parallel: Option<usize>,
    ) -> anyhow::Result<Vec<QuestionOutcome>> {
        let sem = Arc::new(Semaphore::new(parallel.unwrap_or(DEFAULT_PARALLEL).max(1)));
        let metrics = Arc::new(self.metrics.clone());
        let mut handles = Vec::new();

        for case in plan.cases.iter().cloned() {
            let permit = sem.clone().acquire_owned().await?;
            let pipeline = plan.pipeline.clone();
            let metrics = metrics.clone();
            let samples = plan.samples;
            let limit = plan.timeout;
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                score_question(&case, pipeline.as_ref(), &metrics, samples, limit).await
            }));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (h, case) in handles.into_iter().zip(plan.cases.iter()) {
            let outcome = match h.await {
                Ok(o) => o,
                Err(e) => QuestionOutcome {
                    case_id: case.id.clone(),
                    scores: BTreeMap::new(),
                    error: Some(format!("join error: {}", e)),
                },
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }
}

async fn score_question(
    case: &DatasetCase,
    pipeline: &dyn RagPipeline,
    metrics: &[Arc<dyn Metric>],
    samples: u32,
    limit: Duration,
) -> QuestionOutcome {
    let failed = |msg: String| {
        tracing::debug!(event = "benchmark_question_failed", case = %case.id, error = %msg);
        QuestionOutcome {
            case_id: case.id.clone(),
            scores: BTreeMap::new(),
            error: Some(msg),
        }
    };

    let mut answers: Vec<PipelineAnswer> = Vec::with_capacity(samples as usize);
    for _ in 0..samples {
        match timeout(limit, pipeline.answer(case)).await {
            Ok(Ok(a)) => answers.push(a),
            Ok(Err(e)) => return failed(e.to_string()),
            Err(_) => return failed(format!("timed out after {}s", limit.as_secs())),
        }
    }

    let mut scores = BTreeMap::new();
    for m in metrics {
        match m.evaluate(case, &answers).await {
            Ok(r) => {
                scores.insert(m.name().to_string(), r.score);
            }
            Err(e) => return failed(format!("{}: {}", m.name(), e)),
        }
    }
    QuestionOutcome {
        case_id: case.id.clone(),
        scores,
        error: None,
    }
}

/// Mean of each metric over the questions that succeeded, and the number
/// that failed.
pub fn aggregate(outcomes: &[QuestionOutcome]) -> (BTreeMap<String, f64>, usize) {
    let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    let mut failed = 0;
    for o in outcomes {
        if o.error.is_some() {
            failed += 1;
            continue;
        }
        for (k, v) in &o.scores {
            let e = sums.entry(k.clone()).or_insert((0.0, 0));
            e.0 += v;
            e.1 += 1;
        }
    }
    let means = sums
        .into_iter()
        .map(|(k, (sum, n))| (k, sum / n as f64))
        .collect();
    (means, failed)
}

/// Looks up a run by the id given on the command line. Anything that is not
/// a known numeric id is reported as not found.
pub fn load_results(
    store: &Store,
    raw_id: &str,
) -> anyhow::Result<(BenchmarkRun, Vec<BenchmarkResult>)> {
    let not_found = || LorelaiError::not_found(format!("benchmark run '{}'", raw_id));
    let id: i64 = raw_id.trim().parse().map_err(|_| not_found())?;
    let run = store.get_benchmark_run(id)?.ok_or_else(not_found)?;
    let results = store.list_results(id)?;
    Ok((run, results))
}

/// Writes a run and its results as pretty JSON.
pub fn export_results(
    run: &BenchmarkRun,
    results: &[BenchmarkResult],
    out: &Path,
) -> anyhow::Result<()> {
    if let Some(parent) = out.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let doc = serde_json::json!({
        "run": run,
        "results": results,
    });
    std::fs::write(out, serde_json::to_string_pretty(&doc)?)?;
    Ok(())
}
