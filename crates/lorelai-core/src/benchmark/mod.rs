//! Benchmark templates and runs.

pub mod dataset;
pub mod runner;

use crate::errors::LorelaiError;
use crate::model::{BenchmarkTemplate, ParameterType, TemplateParameter};
use crate::storage::Store;

pub use runner::{BenchmarkRunner, RunOptions, RunPlan, RunSummary};

/// What happened to a parameter on `add_parameter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterChange {
    Added,
    Updated,
}

#[derive(Clone)]
pub struct TemplateService {
    store: Store,
}

impl TemplateService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn create(&self, name: &str, description: &str) -> anyhow::Result<BenchmarkTemplate> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LorelaiError::validation("template name must not be empty").into());
        }
        let t = self.store.insert_template(name, description.trim())?;
        tracing::info!(event = "template_created", template_id = t.id, name = %t.name);
        Ok(t)
    }

    pub fn show(&self, template_id: i64) -> anyhow::Result<BenchmarkTemplate> {
        self.store
            .get_template(template_id)?
            .ok_or_else(|| LorelaiError::not_found(format!("template {}", template_id)).into())
    }

    pub fn find_by_name(&self, name: &str) -> anyhow::Result<BenchmarkTemplate> {
        self.store
            .find_template_by_name(name.trim())?
            .ok_or_else(|| LorelaiError::not_found(format!("template '{}'", name)).into())
    }

    pub fn list(&self) -> anyhow::Result<Vec<BenchmarkTemplate>> {
        self.store.list_templates()
    }

    pub fn list_parameters(&self, template_id: i64) -> anyhow::Result<Vec<TemplateParameter>> {
        self.show(template_id)?;
        self.store.list_parameters(template_id)
    }

    /// Inserts or updates a typed parameter. All checks run before any write.
    pub fn add_parameter(
        &self,
        template_id: i64,
        name: &str,
        param_type: &str,
        value: &str,
    ) -> anyhow::Result<ParameterChange> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LorelaiError::validation("parameter name must not be empty").into());
        }
        let ty = ParameterType::parse(param_type)?;
        ty.check_value(value)?;
        if let Some(expected) = reserved_type(name) {
            if ty != expected {
                return Err(LorelaiError::validation(format!(
                    "parameter '{}' must be of type {}",
                    name, expected
                ))
                .into());
            }
            if let Some(range) = reserved_range(name) {
                bounded_int(name, value, range)?;
            }
        }
        self.show(template_id)?;

        let added = self.store.upsert_parameter(template_id, name, ty, value)?;
        tracing::info!(
            event = "template_parameter_set",
            template_id,
            parameter = name,
            added
        );
        Ok(if added {
            ParameterChange::Added
        } else {
            ParameterChange::Updated
        })
    }

    pub fn delete_parameter(&self, template_id: i64, name: &str) -> anyhow::Result<()> {
        self.show(template_id)?;
        if !self.store.delete_parameter(template_id, name.trim())? {
            return Err(LorelaiError::not_found(format!(
                "parameter '{}' on template {}",
                name.trim(),
                template_id
            ))
            .into());
        }
        Ok(())
    }

    /// Deletes a template. Without `cascade` a template that still has
    /// parameters or runs is left alone and a conflict is returned.
    pub fn delete(&self, template_id: i64, cascade: bool) -> anyhow::Result<()> {
        self.show(template_id)?;
        let usage = self.store.template_usage(template_id)?;
        if !cascade && (usage.parameters > 0 || usage.runs > 0) {
            return Err(LorelaiError::conflict(format!(
                "template {} has {} parameter(s) and {} run(s); pass --cascade to delete them too",
                template_id, usage.parameters, usage.runs
            ))
            .into());
        }
        self.store.delete_template_rows(template_id, cascade)?;
        tracing::info!(
            event = "template_deleted",
            template_id,
            cascade,
            parameters = usage.parameters,
            runs = usage.runs
        );
        Ok(())
    }
}

/// Types of the parameters a run interprets itself.
pub fn reserved_type(name: &str) -> Option<ParameterType> {
    match name {
        "dataset" | "pipeline" | "pipeline_url" | "trace_file" => Some(ParameterType::String),
        "samples" | "timeout_seconds" => Some(ParameterType::Int),
        _ => None,
    }
}

/// Upper bound on answers requested per question.
pub const MAX_SAMPLES: i64 = 20;
/// Upper bound on the per-request pipeline timeout.
pub const MAX_TIMEOUT_SECS: i64 = 3600;

/// Inclusive bounds of the integer parameters a run interprets.
pub fn reserved_range(name: &str) -> Option<(i64, i64)> {
    match name {
        "samples" => Some((1, MAX_SAMPLES)),
        "timeout_seconds" => Some((1, MAX_TIMEOUT_SECS)),
        _ => None,
    }
}

/// Parses `raw` as an integer inside `min..=max`.
pub fn bounded_int(name: &str, raw: &str, (min, max): (i64, i64)) -> Result<i64, LorelaiError> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|n| (min..=max).contains(n))
        .ok_or_else(|| {
            LorelaiError::validation(format!(
                "{} must be between {} and {}, got '{}'",
                name, min, max, raw
            ))
        })
}
