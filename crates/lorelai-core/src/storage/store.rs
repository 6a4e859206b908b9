use crate::errors::{map_unique_violation, LorelaiError};
use crate::model::{Credential, Organisation, Provider, TokenGrant, User};
use crate::storage::migrations::{ApplyReport, MigrationState, Migrator};
use crate::storage::{conversion_error, now_rfc3339};
use anyhow::Context;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone)]
pub struct Store {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

pub struct StoreStats {
    pub organisations: u64,
    pub users: u64,
    pub templates: u64,
    pub benchmark_runs: u64,
    pub indexing_runs: u64,
}

impl Store {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite db {}", path.display()))?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an existing database without write access. Fails when the file
    /// is missing or its schema is not at the embedded version.
    pub fn open_read_only(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("failed to open sqlite db {} read-only", path.display()))?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.ensure_current(&Migrator::embedded()?)?;
        Ok(store)
    }

    /// Errors with a migration error unless every script of `migrator` is
    /// applied. Performs no writes.
    pub fn ensure_current(&self, migrator: &Migrator) -> anyhow::Result<()> {
        let conn = self.lock()?;
        let behind: Vec<String> = migrator
            .status(&conn)?
            .into_iter()
            .filter(|m| m.state != MigrationState::Applied)
            .map(|m| format!("V{} ({})", m.version, m.state.as_str()))
            .collect();
        if !behind.is_empty() {
            return Err(LorelaiError::Migration(format!(
                "database schema is not current: {}; run `dragonfly migrate apply`",
                behind.join(", ")
            ))
            .into());
        }
        Ok(())
    }

    pub fn memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory sqlite db")?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Brings the schema up to date with the embedded migrations.
    pub fn init_schema(&self) -> anyhow::Result<ApplyReport> {
        let migrator = Migrator::embedded()?;
        self.migrate_with(&migrator)
    }

    pub fn migrate_with(&self, migrator: &Migrator) -> anyhow::Result<ApplyReport> {
        let mut conn = self.lock()?;
        migrator.apply(&mut conn)
    }

    /// Runs `f` against the raw connection. Used by migration status commands
    /// and tests.
    pub fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> anyhow::Result<T>,
    ) -> anyhow::Result<T> {
        let mut conn = self.lock()?;
        f(&mut conn)
    }

    pub(crate) fn lock(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("sqlite connection mutex poisoned"))
    }

    pub fn stats(&self) -> anyhow::Result<StoreStats> {
        let conn = self.lock()?;
        let count = |table: &str| -> anyhow::Result<u64> {
            let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| {
                r.get(0)
            })?;
            Ok(n as u64)
        };
        Ok(StoreStats {
            organisations: count("organisations")?,
            users: count("users")?,
            templates: count("benchmark_templates")?,
            benchmark_runs: count("benchmark_runs")?,
            indexing_runs: count("indexing_runs")?,
        })
    }

    // --- organisations ---

    pub fn create_organisation(&self, name: &str) -> anyhow::Result<Organisation> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LorelaiError::validation("organisation name must not be empty").into());
        }
        let conn = self.lock()?;
        let created_at = now_rfc3339();
        conn.execute(
            "INSERT INTO organisations(name, created_at) VALUES (?1, ?2)",
            params![name, created_at],
        )
        .map_err(|e| map_unique_violation(e, &format!("organisation '{}'", name)))?;
        Ok(Organisation {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            created_at,
        })
    }

    pub fn get_organisation(&self, id: i64) -> anyhow::Result<Option<Organisation>> {
        let conn = self.lock()?;
        let org = conn
            .query_row(
                "SELECT id, name, created_at FROM organisations WHERE id = ?1",
                params![id],
                org_from_row,
            )
            .optional()?;
        Ok(org)
    }

    pub fn find_organisation_by_name(&self, name: &str) -> anyhow::Result<Option<Organisation>> {
        let conn = self.lock()?;
        let org = conn
            .query_row(
                "SELECT id, name, created_at FROM organisations WHERE name = ?1",
                params![name.trim()],
                org_from_row,
            )
            .optional()?;
        Ok(org)
    }

    pub fn list_organisations(&self) -> anyhow::Result<Vec<Organisation>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id, name, created_at FROM organisations ORDER BY id")?;
        let rows = stmt
            .query_map([], org_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn rename_organisation(&self, id: i64, name: &str) -> anyhow::Result<Organisation> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LorelaiError::validation("organisation name must not be empty").into());
        }
        {
            let conn = self.lock()?;
            let n = conn
                .execute(
                    "UPDATE organisations SET name = ?1 WHERE id = ?2",
                    params![name, id],
                )
                .map_err(|e| map_unique_violation(e, &format!("organisation '{}'", name)))?;
            if n == 0 {
                return Err(LorelaiError::not_found(format!("organisation {}", id)).into());
            }
        }
        self.get_organisation(id)?
            .ok_or_else(|| LorelaiError::not_found(format!("organisation {}", id)).into())
    }

    /// Removes the organisation together with its users, credentials and
    /// indexing history.
    pub fn delete_organisation(&self, id: i64) -> anyhow::Result<()> {
        let conn = self.lock()?;
        let n = conn.execute("DELETE FROM organisations WHERE id = ?1", params![id])?;
        if n == 0 {
            return Err(LorelaiError::not_found(format!("organisation {}", id)).into());
        }
        tracing::info!(event = "organisation_deleted", org_id = id);
        Ok(())
    }

    // --- users ---

    pub fn create_user(
        &self,
        org_id: Option<i64>,
        name: &str,
        email: &str,
    ) -> anyhow::Result<User> {
        let name = name.trim();
        let email = email.trim();
        if name.is_empty() {
            return Err(LorelaiError::validation("user name must not be empty").into());
        }
        if !email.contains('@') {
            return Err(LorelaiError::validation(format!("invalid email '{}'", email)).into());
        }
        if let Some(org) = org_id {
            if self.get_organisation(org)?.is_none() {
                return Err(LorelaiError::not_found(format!("organisation {}", org)).into());
            }
        }
        let conn = self.lock()?;
        let created_at = now_rfc3339();
        conn.execute(
            "INSERT INTO users(org_id, name, email, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![org_id, name, email, created_at],
        )
        .map_err(|e| map_unique_violation(e, &format!("user with email '{}'", email)))?;
        Ok(User {
            user_id: conn.last_insert_rowid(),
            org_id,
            name: name.to_string(),
            email: email.to_string(),
            created_at,
        })
    }

    pub fn get_user(&self, user_id: i64) -> anyhow::Result<Option<User>> {
        let conn = self.lock()?;
        let user = conn
            .query_row(
                "SELECT user_id, org_id, name, email, created_at FROM users WHERE user_id = ?1",
                params![user_id],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn list_users(&self, org_id: Option<i64>) -> anyhow::Result<Vec<User>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT user_id, org_id, name, email, created_at FROM users
             WHERE (?1 IS NULL OR org_id = ?1) ORDER BY user_id",
        )?;
        let rows = stmt
            .query_map(params![org_id], user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // --- credentials (accessed through CredentialVault) ---

    pub(crate) fn upsert_credential(
        &self,
        org_id: i64,
        user_id: i64,
        provider: Provider,
        grant: &TokenGrant,
        expires_at: Option<String>,
    ) -> anyhow::Result<()> {
        let conn = self.lock()?;
        let now = now_rfc3339();
        conn.execute(
            "INSERT INTO credentials(org_id, user_id, provider, access_token, refresh_token,
                                     token_type, scope, expires_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
             ON CONFLICT(org_id, user_id, provider) DO UPDATE SET
                access_token=excluded.access_token,
                refresh_token=COALESCE(excluded.refresh_token, credentials.refresh_token),
                token_type=excluded.token_type,
                scope=COALESCE(excluded.scope, credentials.scope),
                expires_at=excluded.expires_at,
                updated_at=excluded.updated_at",
            params![
                org_id,
                user_id,
                provider.as_str(),
                grant.access_token,
                grant.refresh_token,
                grant.token_type,
                grant.scope,
                expires_at,
                now
            ],
        )?;
        Ok(())
    }

    pub(crate) fn get_credential(
        &self,
        org_id: i64,
        user_id: i64,
        provider: Provider,
    ) -> anyhow::Result<Option<Credential>> {
        let conn = self.lock()?;
        let c = conn
            .query_row(
                "SELECT id, org_id, user_id, provider, access_token, refresh_token, token_type,
                        scope, expires_at, updated_at
                 FROM credentials WHERE org_id = ?1 AND user_id = ?2 AND provider = ?3",
                params![org_id, user_id, provider.as_str()],
                credential_from_row,
            )
            .optional()?;
        Ok(c)
    }

    pub(crate) fn list_credentials(&self, org_id: i64) -> anyhow::Result<Vec<Credential>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, org_id, user_id, provider, access_token, refresh_token, token_type,
                    scope, expires_at, updated_at
             FROM credentials WHERE org_id = ?1 ORDER BY provider, user_id",
        )?;
        let rows = stmt
            .query_map(params![org_id], credential_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub(crate) fn delete_credential(
        &self,
        org_id: i64,
        user_id: i64,
        provider: Provider,
    ) -> anyhow::Result<bool> {
        let conn = self.lock()?;
        let n = conn.execute(
            "DELETE FROM credentials WHERE org_id = ?1 AND user_id = ?2 AND provider = ?3",
            params![org_id, user_id, provider.as_str()],
        )?;
        Ok(n > 0)
    }
}

fn org_from_row(row: &Row<'_>) -> rusqlite::Result<Organisation> {
    Ok(Organisation {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: row.get(2)?,
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        user_id: row.get(0)?,
        org_id: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn credential_from_row(row: &Row<'_>) -> rusqlite::Result<Credential> {
    let provider: String = row.get(3)?;
    let provider = Provider::parse(&provider).map_err(|e| conversion_error(3, e))?;
    Ok(Credential {
        id: row.get(0)?,
        org_id: row.get(1)?,
        user_id: row.get(2)?,
        provider,
        access_token: row.get(4)?,
        refresh_token: row.get(5)?,
        token_type: row.get(6)?,
        scope: row.get(7)?,
        expires_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{classify, ErrorKind};

    fn store() -> Store {
        let s = Store::memory().unwrap();
        s.init_schema().unwrap();
        s
    }

    #[test]
    fn organisation_names_are_unique() {
        let s = store();
        s.create_organisation("Acme").unwrap();
        let err = s.create_organisation("Acme").unwrap_err();
        assert_eq!(classify(&err), ErrorKind::Conflict);
        assert_eq!(s.list_organisations().unwrap().len(), 1);
    }

    #[test]
    fn rename_keeps_uniqueness() {
        let s = store();
        let a = s.create_organisation("Acme").unwrap();
        s.create_organisation("Globex").unwrap();
        let err = s.rename_organisation(a.id, "Globex").unwrap_err();
        assert_eq!(classify(&err), ErrorKind::Conflict);
        let renamed = s.rename_organisation(a.id, "Acme Corp").unwrap();
        assert_eq!(renamed.name, "Acme Corp");
    }

    #[test]
    fn deleting_organisation_cascades_to_users() {
        let s = store();
        let org = s.create_organisation("Acme").unwrap();
        s.create_user(Some(org.id), "Ada", "ada@acme.test").unwrap();
        s.delete_organisation(org.id).unwrap();
        assert!(s.list_users(None).unwrap().is_empty());
    }

    #[test]
    fn user_requires_existing_organisation() {
        let s = store();
        let err = s.create_user(Some(99), "Ada", "ada@acme.test").unwrap_err();
        assert_eq!(classify(&err), ErrorKind::NotFound);
    }
}
