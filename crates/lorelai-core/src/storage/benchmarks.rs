use crate::errors::map_unique_violation;
use crate::model::{
    BenchmarkResult, BenchmarkRun, BenchmarkTemplate, ParameterType, RunStatus, TemplateParameter,
};
use crate::storage::{conversion_error, now_rfc3339};
use crate::storage::store::Store;
use rusqlite::{params, Connection, OptionalExtension, Row};

/// Rows that still reference a template.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TemplateUsage {
    pub parameters: u64,
    pub runs: u64,
}

const TEMPLATE_COLUMNS: &str = "id, name, description, version, created_at, updated_at";

const RUN_SELECT: &str = "SELECT r.id, r.template_id, t.name, r.template_version, r.status,
        r.fingerprint, r.parameters_json, r.started_at, r.finished_at
     FROM benchmark_runs r
     JOIN benchmark_templates t ON t.id = r.template_id";

impl Store {
    pub fn insert_template(
        &self,
        name: &str,
        description: &str,
    ) -> anyhow::Result<BenchmarkTemplate> {
        let conn = self.lock()?;
        let now = now_rfc3339();
        conn.execute(
            "INSERT INTO benchmark_templates(name, description, version, created_at, updated_at)
             VALUES (?1, ?2, 1, ?3, ?3)",
            params![name, description, now],
        )
        .map_err(|e| map_unique_violation(e, &format!("template '{}'", name)))?;
        Ok(BenchmarkTemplate {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            description: description.to_string(),
            version: 1,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    pub fn get_template(&self, id: i64) -> anyhow::Result<Option<BenchmarkTemplate>> {
        let conn = self.lock()?;
        let t = conn
            .query_row(
                &format!("SELECT {} FROM benchmark_templates WHERE id = ?1", TEMPLATE_COLUMNS),
                params![id],
                template_from_row,
            )
            .optional()?;
        Ok(t)
    }

    pub fn find_template_by_name(&self, name: &str) -> anyhow::Result<Option<BenchmarkTemplate>> {
        let conn = self.lock()?;
        let t = conn
            .query_row(
                &format!(
                    "SELECT {} FROM benchmark_templates WHERE name = ?1",
                    TEMPLATE_COLUMNS
                ),
                params![name],
                template_from_row,
            )
            .optional()?;
        Ok(t)
    }

    pub fn list_templates(&self) -> anyhow::Result<Vec<BenchmarkTemplate>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM benchmark_templates ORDER BY id",
            TEMPLATE_COLUMNS
        ))?;
        let rows = stmt
            .query_map([], template_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Inserts or updates a parameter and bumps the template version.
    /// Returns `true` when the parameter did not exist before.
    pub fn upsert_parameter(
        &self,
        template_id: i64,
        name: &str,
        param_type: ParameterType,
        value: &str,
    ) -> anyhow::Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let existed: bool = tx
            .query_row(
                "SELECT 1 FROM benchmark_template_parameters
                 WHERE template_id = ?1 AND parameter_name = ?2",
                params![template_id, name],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        let now = now_rfc3339();
        tx.execute(
            "INSERT INTO benchmark_template_parameters(template_id, parameter_name, parameter_type,
                                                       parameter_value, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(template_id, parameter_name) DO UPDATE SET
                parameter_type=excluded.parameter_type,
                parameter_value=excluded.parameter_value,
                updated_at=excluded.updated_at",
            params![template_id, name, param_type.as_str(), value, now],
        )?;
        bump_version(&tx, template_id, &now)?;
        tx.commit()?;
        Ok(!existed)
    }

    pub fn list_parameters(&self, template_id: i64) -> anyhow::Result<Vec<TemplateParameter>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT template_id, parameter_name, parameter_type, parameter_value
             FROM benchmark_template_parameters
             WHERE template_id = ?1 ORDER BY parameter_name",
        )?;
        let rows = stmt
            .query_map(params![template_id], |row| {
                let ty: String = row.get(2)?;
                let param_type = ParameterType::parse(&ty).map_err(|e| conversion_error(2, e))?;
                Ok(TemplateParameter {
                    template_id: row.get(0)?,
                    name: row.get(1)?,
                    param_type,
                    value: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn delete_parameter(&self, template_id: i64, name: &str) -> anyhow::Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let n = tx.execute(
            "DELETE FROM benchmark_template_parameters
             WHERE template_id = ?1 AND parameter_name = ?2",
            params![template_id, name],
        )?;
        if n > 0 {
            bump_version(&tx, template_id, &now_rfc3339())?;
        }
        tx.commit()?;
        Ok(n > 0)
    }

    pub fn template_usage(&self, template_id: i64) -> anyhow::Result<TemplateUsage> {
        let conn = self.lock()?;
        let parameters: i64 = conn.query_row(
            "SELECT COUNT(*) FROM benchmark_template_parameters WHERE template_id = ?1",
            params![template_id],
            |r| r.get(0),
        )?;
        let runs: i64 = conn.query_row(
            "SELECT COUNT(*) FROM benchmark_runs WHERE template_id = ?1",
            params![template_id],
            |r| r.get(0),
        )?;
        Ok(TemplateUsage {
            parameters: parameters as u64,
            runs: runs as u64,
        })
    }

    /// Deletes the template. With `cascade` its parameters, runs and run
    /// results go first; without it the foreign keys reject a referenced
    /// template.
    pub fn delete_template_rows(&self, template_id: i64, cascade: bool) -> anyhow::Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        if cascade {
            tx.execute(
                "DELETE FROM benchmark_run_results WHERE run_id IN
                    (SELECT id FROM benchmark_runs WHERE template_id = ?1)",
                params![template_id],
            )?;
            tx.execute(
                "DELETE FROM benchmark_runs WHERE template_id = ?1",
                params![template_id],
            )?;
            tx.execute(
                "DELETE FROM benchmark_template_parameters WHERE template_id = ?1",
                params![template_id],
            )?;
        }
        let n = tx.execute(
            "DELETE FROM benchmark_templates WHERE id = ?1",
            params![template_id],
        )?;
        tx.commit()?;
        Ok(n > 0)
    }

    // --- runs ---

    pub fn create_benchmark_run(
        &self,
        template: &BenchmarkTemplate,
        fingerprint: &str,
        parameters: &serde_json::Value,
    ) -> anyhow::Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO benchmark_runs(template_id, template_version, status, fingerprint,
                                        parameters_json, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                template.id,
                template.version,
                RunStatus::Running.as_str(),
                fingerprint,
                serde_json::to_string(parameters)?,
                now_rfc3339()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn finalize_benchmark_run(&self, run_id: i64, status: RunStatus) -> anyhow::Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE benchmark_runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.as_str(), now_rfc3339(), run_id],
        )?;
        Ok(())
    }

    pub fn append_results(&self, run_id: i64, results: &[(String, String)]) -> anyhow::Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO benchmark_run_results(run_id, result_key, result_value, recorded_at)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            let now = now_rfc3339();
            for (k, v) in results {
                stmt.execute(params![run_id, k, v, now])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_benchmark_run(&self, run_id: i64) -> anyhow::Result<Option<BenchmarkRun>> {
        let conn = self.lock()?;
        let run = conn
            .query_row(
                &format!("{} WHERE r.id = ?1", RUN_SELECT),
                params![run_id],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    pub fn list_benchmark_runs(
        &self,
        template_id: Option<i64>,
        limit: u32,
    ) -> anyhow::Result<Vec<BenchmarkRun>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE (?1 IS NULL OR r.template_id = ?1) ORDER BY r.id DESC LIMIT ?2",
            RUN_SELECT
        ))?;
        let rows = stmt
            .query_map(params![template_id, limit], run_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_results(&self, run_id: i64) -> anyhow::Result<Vec<BenchmarkResult>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT run_id, result_key, result_value, recorded_at
             FROM benchmark_run_results WHERE run_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok(BenchmarkResult {
                    run_id: row.get(0)?,
                    key: row.get(1)?,
                    value: row.get(2)?,
                    recorded_at: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn bump_version(conn: &Connection, template_id: i64, now: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE benchmark_templates SET version = version + 1, updated_at = ?1 WHERE id = ?2",
        params![now, template_id],
    )
}

fn template_from_row(row: &Row<'_>) -> rusqlite::Result<BenchmarkTemplate> {
    Ok(BenchmarkTemplate {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        version: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<BenchmarkRun> {
    let status: String = row.get(4)?;
    let params_json: String = row.get(6)?;
    Ok(BenchmarkRun {
        id: row.get(0)?,
        template_id: row.get(1)?,
        template_name: row.get(2)?,
        template_version: row.get(3)?,
        status: RunStatus::parse(&status).map_err(|e| conversion_error(4, e))?,
        fingerprint: row.get(5)?,
        parameters: serde_json::from_str(&params_json).map_err(|e| conversion_error(6, e))?,
        started_at: row.get(7)?,
        finished_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Store {
        let s = Store::memory().unwrap();
        s.init_schema().unwrap();
        s
    }

    #[test]
    fn upsert_updates_instead_of_duplicating() -> anyhow::Result<()> {
        let s = store();
        let t = s.insert_template("T1", "")?;
        assert!(s.upsert_parameter(t.id, "code_version", ParameterType::String, "1.0")?);
        assert!(!s.upsert_parameter(t.id, "code_version", ParameterType::String, "1.1")?);

        let params = s.list_parameters(t.id)?;
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].value, "1.1");

        let t = s.get_template(t.id)?.unwrap();
        assert_eq!(t.version, 3);
        Ok(())
    }

    #[test]
    fn results_reject_updates() -> anyhow::Result<()> {
        let s = store();
        let t = s.insert_template("T1", "")?;
        let run_id = s.create_benchmark_run(&t, "fp", &serde_json::json!({}))?;
        s.append_results(run_id, &[("latency_ms".into(), "120".into())])?;

        let err = s
            .with_conn(|c| {
                Ok(c.execute(
                    "UPDATE benchmark_run_results SET result_value = '1' WHERE run_id = ?1",
                    params![run_id],
                )?)
            })
            .unwrap_err();
        assert!(err.to_string().contains("append-only"));
        assert_eq!(s.list_results(run_id)?[0].value, "120");
        Ok(())
    }

    #[test]
    fn referenced_template_cannot_be_deleted_without_cascade() -> anyhow::Result<()> {
        let s = store();
        let t = s.insert_template("T1", "")?;
        s.upsert_parameter(t.id, "samples", ParameterType::Int, "2")?;
        assert!(s.delete_template_rows(t.id, false).is_err());
        assert!(s.delete_template_rows(t.id, true)?);
        assert!(s.get_template(t.id)?.is_none());
        assert!(s.list_parameters(t.id)?.is_empty());
        Ok(())
    }

    #[test]
    fn corrupt_run_rows_fail_to_load() -> anyhow::Result<()> {
        let s = store();
        let t = s.insert_template("T1", "")?;
        let run_id = s.create_benchmark_run(&t, "fp", &serde_json::json!({"samples": 2}))?;

        s.with_conn(|c| {
            Ok(c.execute(
                "UPDATE benchmark_runs SET parameters_json = '{not json' WHERE id = ?1",
                params![run_id],
            )?)
        })?;
        let err = s.get_benchmark_run(run_id).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<rusqlite::Error>(),
            Some(rusqlite::Error::FromSqlConversionFailure(6, _, _))
        ));

        s.with_conn(|c| {
            Ok(c.execute(
                "UPDATE benchmark_runs SET parameters_json = '{}', status = 'paused' WHERE id = ?1",
                params![run_id],
            )?)
        })?;
        let err = s.get_benchmark_run(run_id).unwrap_err();
        assert!(format!("{:#}", err).contains("unknown run status 'paused'"));
        Ok(())
    }
}
