use crate::benchmark::RunSummary;
use crate::model::{BenchmarkResult, BenchmarkRun, RunStatus};
use std::fmt::Write;

/// Left-aligned plain text table sized to its widest cell.
pub fn table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }
    }

    let line = |cells: Vec<&str>| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:<width$}", c, width = *w))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = String::new();
    let _ = writeln!(out, "{}", line(headers.to_vec()));
    let dashes: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    let _ = writeln!(out, "{}", line(dashes.iter().map(String::as_str).collect()));
    for row in rows {
        let _ = writeln!(out, "{}", line(row.iter().map(|s| s.as_str()).collect()));
    }
    out
}

pub fn run_summary(s: &RunSummary) -> String {
    let mut out = String::new();
    if s.dry_run {
        let _ = writeln!(out, "Dry run for template '{}': OK", s.template_name);
        let _ = writeln!(out, "  questions:   {}", s.questions);
        let _ = writeln!(out, "  pipeline:    {}", s.pipeline);
        let _ = writeln!(out, "  fingerprint: {}", s.fingerprint);
        let _ = writeln!(out, "No rows written.");
        return out;
    }

    let icon = match s.status {
        RunStatus::Completed => "✅",
        RunStatus::Failed => "❌",
        RunStatus::Running => "⏳",
    };
    let _ = writeln!(
        out,
        "{} Benchmark run #{} ({}) {}",
        icon,
        s.run_id.unwrap_or_default(),
        s.template_name,
        s.status.as_str()
    );
    let _ = writeln!(
        out,
        "  questions: {}  failed: {}",
        s.questions, s.failed_questions
    );
    let rows: Vec<Vec<String>> = s
        .metrics
        .iter()
        .map(|(k, v)| vec![k.clone(), format!("{:.4}", v)])
        .collect();
    if !rows.is_empty() {
        out.push_str(&table(&["metric", "value"], &rows));
    }
    out
}

pub fn run_results(run: &BenchmarkRun, results: &[BenchmarkResult]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Run #{}  template={} v{}  status={}",
        run.id,
        run.template_name,
        run.template_version,
        run.status.as_str()
    );
    let _ = writeln!(
        out,
        "started={}  finished={}",
        run.started_at,
        run.finished_at.as_deref().unwrap_or("-")
    );
    let rows: Vec<Vec<String>> = results
        .iter()
        .map(|r| vec![r.key.clone(), r.value.clone()])
        .collect();
    out.push_str(&table(&["key", "value"], &rows));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_pads_columns() {
        let t = table(
            &["name", "value"],
            &[vec!["code_version".into(), "1.0".into()]],
        );
        let lines: Vec<&str> = t.lines().collect();
        assert_eq!(lines[0], "name          value");
        assert_eq!(lines[1], "------------  -----");
        assert_eq!(lines[2], "code_version  1.0");
    }
}
