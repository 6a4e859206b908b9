//! Forward-only schema migrations tracked in `schema_history`.
//!
//! Scripts are named `V<version>__<description>.sql`. Each pending script runs
//! in its own transaction together with its history row. A failed script is
//! recorded with `success = 0` and blocks every later `apply` until
//! [`Migrator::repair`] removes the entry.

use crate::fingerprint::sha256_hex;
use anyhow::Context;
use regex::Regex;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::path::Path;
use std::time::Instant;

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("invalid migration file name '{0}' (expected V<version>__<description>.sql)")]
    InvalidName(String),
    #[error("duplicate migration version V{0}")]
    DuplicateVersion(u32),
    #[error("migration V{version} failed previously; fix it and run `dragonfly migrate repair`")]
    Blocked { version: u32 },
    #[error("checksum mismatch for applied migration V{version} (history {recorded}, script {actual})")]
    ChecksumMismatch {
        version: u32,
        recorded: String,
        actual: String,
    },
    #[error("applied migration V{0} is missing from the migration set")]
    MissingScript(u32),
    #[error("pending migration V{version} is older than applied V{latest}")]
    OutOfOrder { version: u32, latest: u32 },
    #[error("migration V{version} ({description}) failed: {message}")]
    Failed {
        version: u32,
        description: String,
        message: String,
    },
}

#[derive(Debug, Clone)]
pub struct MigrationScript {
    pub version: u32,
    pub description: String,
    pub script: String,
    pub sql: String,
    pub checksum: String,
}

impl MigrationScript {
    pub fn parse(file_name: &str, sql: &str) -> Result<Self, MigrationError> {
        let re = Regex::new(r"^V(\d+)__([A-Za-z0-9_]+)\.sql$").expect("static regex");
        let caps = re
            .captures(file_name)
            .ok_or_else(|| MigrationError::InvalidName(file_name.to_string()))?;
        let version: u32 = caps[1]
            .parse()
            .map_err(|_| MigrationError::InvalidName(file_name.to_string()))?;
        if version == 0 {
            return Err(MigrationError::InvalidName(file_name.to_string()));
        }
        let normalized = sql.replace("\r\n", "\n");
        Ok(Self {
            version,
            description: caps[2].replace('_', " "),
            script: file_name.to_string(),
            checksum: sha256_hex(&normalized),
            sql: normalized,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub installed_rank: i64,
    pub version: u32,
    pub description: String,
    pub script: String,
    pub checksum: String,
    pub installed_by: String,
    pub installed_on: String,
    pub execution_time_ms: i64,
    pub success: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationState {
    Applied,
    Pending,
    Failed,
}

impl MigrationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Pending => "pending",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationInfo {
    pub version: u32,
    pub description: String,
    pub state: MigrationState,
    pub installed_on: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ApplyReport {
    pub applied: Vec<u32>,
    pub current_version: Option<u32>,
}

pub struct Migrator {
    scripts: Vec<MigrationScript>,
    installed_by: String,
}

impl Migrator {
    /// Scripts compiled into the binary.
    pub fn embedded() -> Result<Self, MigrationError> {
        let scripts = crate::storage::schema::MIGRATIONS
            .iter()
            .map(|(name, sql)| MigrationScript::parse(name, sql))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(scripts)
    }

    /// Reads every `*.sql` file of `dir`.
    pub fn from_dir(dir: &Path) -> anyhow::Result<Self> {
        let mut scripts = Vec::new();
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("failed to read migration dir {}", dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("sql") {
                continue;
            }
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            let sql = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            scripts.push(MigrationScript::parse(&name, &sql)?);
        }
        Ok(Self::new(scripts)?)
    }

    pub fn new(mut scripts: Vec<MigrationScript>) -> Result<Self, MigrationError> {
        scripts.sort_by_key(|s| s.version);
        for pair in scripts.windows(2) {
            if pair[0].version == pair[1].version {
                return Err(MigrationError::DuplicateVersion(pair[0].version));
            }
        }
        let installed_by = std::env::var("USER").unwrap_or_else(|_| "lorelai".to_string());
        Ok(Self {
            scripts,
            installed_by,
        })
    }

    pub fn with_installed_by(mut self, who: impl Into<String>) -> Self {
        self.installed_by = who.into();
        self
    }

    pub fn scripts(&self) -> &[MigrationScript] {
        &self.scripts
    }

    /// Recorded history, oldest first. Performs no writes; a database that
    /// never ran a migration has an empty history.
    pub fn history(&self, conn: &Connection) -> anyhow::Result<Vec<HistoryEntry>> {
        let has_table: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master
                           WHERE type = 'table' AND name = 'schema_history')",
            [],
            |r| r.get(0),
        )?;
        if !has_table {
            return Ok(Vec::new());
        }
        let mut stmt = conn.prepare(
            "SELECT installed_rank, version, description, script, checksum, installed_by,
                    installed_on, execution_time_ms, success
             FROM schema_history ORDER BY installed_rank ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(HistoryEntry {
                    installed_rank: row.get(0)?,
                    version: row.get(1)?,
                    description: row.get(2)?,
                    script: row.get(3)?,
                    checksum: row.get(4)?,
                    installed_by: row.get(5)?,
                    installed_on: row.get(6)?,
                    execution_time_ms: row.get(7)?,
                    success: row.get::<_, i64>(8)? != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn status(&self, conn: &Connection) -> anyhow::Result<Vec<MigrationInfo>> {
        let history = self.history(conn)?;
        let mut out = Vec::new();
        for s in &self.scripts {
            let entry = history.iter().rev().find(|h| h.version == s.version);
            let (state, installed_on) = match entry {
                Some(h) if h.success => (MigrationState::Applied, Some(h.installed_on.clone())),
                Some(h) => (MigrationState::Failed, Some(h.installed_on.clone())),
                None => (MigrationState::Pending, None),
            };
            out.push(MigrationInfo {
                version: s.version,
                description: s.description.clone(),
                state,
                installed_on,
            });
        }
        Ok(out)
    }

    pub fn validate(&self, conn: &Connection) -> anyhow::Result<()> {
        let history = self.history(conn)?;
        Ok(self.check_history(&history)?)
    }

    fn check_history(&self, history: &[HistoryEntry]) -> Result<(), MigrationError> {
        if let Some(failed) = history.iter().find(|h| !h.success) {
            return Err(MigrationError::Blocked {
                version: failed.version,
            });
        }
        for h in history {
            let script = self
                .scripts
                .iter()
                .find(|s| s.version == h.version)
                .ok_or(MigrationError::MissingScript(h.version))?;
            if script.checksum != h.checksum {
                return Err(MigrationError::ChecksumMismatch {
                    version: h.version,
                    recorded: h.checksum.clone(),
                    actual: script.checksum.clone(),
                });
            }
        }
        if let Some(latest) = history.iter().map(|h| h.version).max() {
            for s in &self.scripts {
                let applied = history.iter().any(|h| h.version == s.version);
                if !applied && s.version < latest {
                    return Err(MigrationError::OutOfOrder {
                        version: s.version,
                        latest,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn apply(&self, conn: &mut Connection) -> anyhow::Result<ApplyReport> {
        conn.execute_batch(crate::storage::schema::HISTORY_DDL)?;
        let history = self.history(conn)?;
        self.check_history(&history)?;

        let latest = history.iter().map(|h| h.version).max();
        let mut rank = history.iter().map(|h| h.installed_rank).max().unwrap_or(0);
        let mut report = ApplyReport {
            applied: Vec::new(),
            current_version: latest,
        };

        for script in self
            .scripts
            .iter()
            .filter(|s| latest.map_or(true, |l| s.version > l))
        {
            rank += 1;
            let started = Instant::now();
            let tx = conn.transaction()?;
            let outcome = tx.execute_batch(&script.sql);
            let elapsed = started.elapsed().as_millis() as i64;

            match outcome {
                Ok(()) => {
                    record(&tx, rank, script, &self.installed_by, elapsed, true)?;
                    tx.commit()?;
                    tracing::info!(
                        event = "migration_applied",
                        version = script.version,
                        description = %script.description,
                        execution_time_ms = elapsed
                    );
                    report.applied.push(script.version);
                    report.current_version = Some(script.version);
                }
                Err(e) => {
                    tx.rollback()?;
                    record(conn, rank, script, &self.installed_by, elapsed, false)?;
                    tracing::error!(
                        event = "migration_failed",
                        version = script.version,
                        error = %e
                    );
                    return Err(MigrationError::Failed {
                        version: script.version,
                        description: script.description.clone(),
                        message: e.to_string(),
                    }
                    .into());
                }
            }
        }
        Ok(report)
    }

    /// Deletes failed history entries so `apply` can retry them.
    pub fn repair(&self, conn: &Connection) -> anyhow::Result<usize> {
        conn.execute_batch(crate::storage::schema::HISTORY_DDL)?;
        let n = conn.execute("DELETE FROM schema_history WHERE success = 0", [])?;
        if n > 0 {
            tracing::warn!(event = "migration_repair", removed = n);
        }
        Ok(n)
    }
}

fn record(
    conn: &Connection,
    rank: i64,
    script: &MigrationScript,
    installed_by: &str,
    elapsed_ms: i64,
    success: bool,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO schema_history(installed_rank, version, description, script, checksum,
                                    installed_by, installed_on, execution_time_ms, success)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            rank,
            script.version,
            script.description,
            script.script,
            script.checksum,
            installed_by,
            crate::storage::now_rfc3339(),
            elapsed_ms,
            success as i64
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn migrator(scripts: &[(&str, &str)]) -> Migrator {
        let parsed = scripts
            .iter()
            .map(|(n, s)| MigrationScript::parse(n, s).unwrap())
            .collect();
        Migrator::new(parsed).unwrap().with_installed_by("test")
    }

    #[test]
    fn parses_versioned_file_names() {
        let s = MigrationScript::parse("V12__add_user_index.sql", "SELECT 1;").unwrap();
        assert_eq!(s.version, 12);
        assert_eq!(s.description, "add user index");
        assert!(MigrationScript::parse("add_user_index.sql", "").is_err());
        assert!(MigrationScript::parse("V0__zero.sql", "").is_err());
    }

    #[test]
    fn duplicate_versions_are_rejected() {
        let a = MigrationScript::parse("V1__a.sql", "SELECT 1;").unwrap();
        let b = MigrationScript::parse("V1__b.sql", "SELECT 2;").unwrap();
        assert!(matches!(
            Migrator::new(vec![a, b]),
            Err(MigrationError::DuplicateVersion(1))
        ));
    }

    #[test]
    fn embedded_scripts_apply_once() -> anyhow::Result<()> {
        let mut conn = Connection::open_in_memory()?;
        let m = Migrator::embedded()?.with_installed_by("test");

        let first = m.apply(&mut conn)?;
        assert_eq!(first.applied, vec![1, 2, 3, 4]);

        let second = m.apply(&mut conn)?;
        assert!(second.applied.is_empty());
        assert_eq!(second.current_version, Some(4));

        let states: Vec<_> = m.status(&conn)?.into_iter().map(|i| i.state).collect();
        assert!(states.iter().all(|s| *s == MigrationState::Applied));
        Ok(())
    }

    #[test]
    fn failed_script_blocks_until_repaired() -> anyhow::Result<()> {
        let mut conn = Connection::open_in_memory()?;
        let broken = migrator(&[
            ("V1__base.sql", "CREATE TABLE a (id INTEGER);"),
            ("V2__broken.sql", "CREATE TABLE b (id INTEGER); CREATE TABLE oops ("),
        ]);

        let err = broken.apply(&mut conn).unwrap_err();
        assert!(err.to_string().contains("V2"));

        // the failing transaction left no partial table behind
        let b_exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='b'",
            [],
            |r| r.get(0),
        )?;
        assert_eq!(b_exists, 0);

        let history = broken.history(&conn)?;
        assert_eq!(history.len(), 2);
        assert!(history[0].success);
        assert!(!history[1].success);

        let fixed = migrator(&[
            ("V1__base.sql", "CREATE TABLE a (id INTEGER);"),
            ("V2__broken.sql", "CREATE TABLE b (id INTEGER);"),
        ]);
        let blocked = fixed.apply(&mut conn).unwrap_err();
        assert!(matches!(
            blocked.downcast_ref::<MigrationError>(),
            Some(MigrationError::Blocked { version: 2 })
        ));

        assert_eq!(fixed.repair(&conn)?, 1);
        let report = fixed.apply(&mut conn)?;
        assert_eq!(report.applied, vec![2]);
        Ok(())
    }

    #[test]
    fn edited_script_fails_validation() -> anyhow::Result<()> {
        let mut conn = Connection::open_in_memory()?;
        migrator(&[("V1__base.sql", "CREATE TABLE a (id INTEGER);")]).apply(&mut conn)?;

        let edited = migrator(&[("V1__base.sql", "CREATE TABLE a (id INTEGER, name TEXT);")]);
        let err = edited.validate(&conn).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MigrationError>(),
            Some(MigrationError::ChecksumMismatch { version: 1, .. })
        ));
        Ok(())
    }

    #[test]
    fn late_script_below_latest_is_out_of_order() -> anyhow::Result<()> {
        let mut conn = Connection::open_in_memory()?;
        migrator(&[
            ("V1__base.sql", "CREATE TABLE a (id INTEGER);"),
            ("V3__c.sql", "CREATE TABLE c (id INTEGER);"),
        ])
        .apply(&mut conn)?;

        let with_gap = migrator(&[
            ("V1__base.sql", "CREATE TABLE a (id INTEGER);"),
            ("V2__b.sql", "CREATE TABLE b (id INTEGER);"),
            ("V3__c.sql", "CREATE TABLE c (id INTEGER);"),
        ]);
        let err = with_gap.apply(&mut conn).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MigrationError>(),
            Some(MigrationError::OutOfOrder {
                version: 2,
                latest: 3
            })
        ));
        Ok(())
    }
}
