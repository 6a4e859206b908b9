use super::{exit_codes, Ctx};
use crate::cli::args::{BenchmarkRunArgs, BenchmarkSub, ResultsAction};
use lorelai_core::benchmark::runner::{export_results, load_results};
use lorelai_core::benchmark::{BenchmarkRunner, RunOptions, TemplateService};
use lorelai_core::model::RunStatus;
use lorelai_core::report::console;
use std::path::PathBuf;

pub async fn run(ctx: &Ctx, cmd: BenchmarkSub) -> anyhow::Result<i32> {
    match cmd {
        BenchmarkSub::Run(args) => cmd_run(ctx, args).await,
        BenchmarkSub::Results(args) => {
            let store = ctx.store_for_read()?;
            let (run, results) = load_results(&store, &args.benchmark_id)?;
            match args.action {
                ResultsAction::View if ctx.is_json() => {
                    ctx.print_json(&serde_json::json!({ "run": run, "results": results }))?;
                }
                ResultsAction::View => print!("{}", console::run_results(&run, &results)),
                ResultsAction::Export => {
                    let out = args
                        .out
                        .unwrap_or_else(|| PathBuf::from(format!("benchmark-{}.json", run.id)));
                    export_results(&run, &results, &out)?;
                    println!("Exported run #{} to {}", run.id, out.display());
                }
            }
            Ok(exit_codes::OK)
        }
        BenchmarkSub::List(args) => {
            let store = ctx.store_for_read()?;
            let template_id = match &args.template_name {
                Some(name) => Some(TemplateService::new(store.clone()).find_by_name(name)?.id),
                None => None,
            };
            let runs = store.list_benchmark_runs(template_id, args.last)?;
            if ctx.is_json() {
                ctx.print_json(&runs)?;
            } else {
                let rows: Vec<Vec<String>> = runs
                    .iter()
                    .map(|r| {
                        vec![
                            r.id.to_string(),
                            r.template_name.clone(),
                            r.template_version.to_string(),
                            r.status.as_str().to_string(),
                            r.started_at.clone(),
                        ]
                    })
                    .collect();
                print!(
                    "{}",
                    console::table(&["id", "template", "version", "status", "started_at"], &rows)
                );
            }
            Ok(exit_codes::OK)
        }
    }
}

async fn cmd_run(ctx: &Ctx, args: BenchmarkRunArgs) -> anyhow::Result<i32> {
    let store = if args.dry_run {
        ctx.store_for_read()?
    } else {
        ctx.store()?
    };
    let runner = BenchmarkRunner::new(store, lorelai_metrics::default_metrics())
        .with_default_pipeline_url(ctx.config.pipeline_url.clone());

    let opts = RunOptions {
        dry_run: args.dry_run,
        pipeline_url: args.pipeline_url,
        trace_file: args.trace_file,
        parallel: Some(args.parallel),
    };
    let summary = runner.run(&args.template_name, &opts).await?;

    if ctx.is_json() {
        ctx.print_json(&serde_json::json!({
            "run_id": summary.run_id,
            "template": summary.template_name,
            "dry_run": summary.dry_run,
            "status": summary.status,
            "questions": summary.questions,
            "failed_questions": summary.failed_questions,
            "metrics": summary.metrics,
            "fingerprint": summary.fingerprint,
        }))?;
    } else {
        print!("{}", console::run_summary(&summary));
    }

    Ok(match summary.status {
        RunStatus::Failed => exit_codes::FAILED,
        _ => exit_codes::OK,
    })
}
