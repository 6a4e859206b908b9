use crate::errors::LorelaiError;
use crate::model::DatasetCase;
use std::collections::HashSet;
use std::path::Path;

/// Loads a JSONL dataset. Blank lines are skipped; ids must be unique and
/// every case needs a question.
pub fn load(path: &Path) -> anyhow::Result<Vec<DatasetCase>> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        LorelaiError::validation(format!("failed to read dataset {}: {}", path.display(), e))
    })?;
    parse(&raw).map_err(|e| {
        LorelaiError::validation(format!("dataset {}: {}", path.display(), e)).into()
    })
}

fn parse(raw: &str) -> Result<Vec<DatasetCase>, String> {
    let mut cases = Vec::new();
    let mut seen = HashSet::new();
    for (i, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let case: DatasetCase =
            serde_json::from_str(line).map_err(|e| format!("line {}: {}", i + 1, e))?;
        if case.id.trim().is_empty() {
            return Err(format!("line {}: id must not be empty", i + 1));
        }
        if case.question.trim().is_empty() {
            return Err(format!("line {}: question must not be empty", i + 1));
        }
        if !seen.insert(case.id.clone()) {
            return Err(format!("line {}: duplicate id '{}'", i + 1, case.id));
        }
        cases.push(case);
    }
    if cases.is_empty() {
        return Err("no questions".to_string());
    }
    Ok(cases)
}
