use lorelai_core::errors::{classify, ErrorKind};
use lorelai_core::storage::migrations::{MigrationState, Migrator};
use lorelai_core::storage::Store;
use tempfile::tempdir;

#[test]
fn test_storage_smoke_lifecycle() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let db_path = dir.path().join("nested/lorelai.db");

    // 1. Open store and apply the embedded migrations
    let store = Store::open(&db_path)?;
    let report = store.init_schema()?;
    assert_eq!(report.applied, vec![1, 2, 3, 4]);

    // 2. Reopen: nothing left to apply, every script recorded as applied
    drop(store);
    let store = Store::open(&db_path)?;
    assert!(store.init_schema()?.applied.is_empty());
    let status = store.with_conn(|c| Migrator::embedded()?.status(c))?;
    assert!(status.iter().all(|m| m.state == MigrationState::Applied));

    // 3. Tenancy rows survive reopen
    let org = store.create_organisation("Acme")?;
    store.create_user(Some(org.id), "Ada", "ada@acme.test")?;
    drop(store);

    let store = Store::open(&db_path)?;
    let stats = store.stats()?;
    assert_eq!(stats.organisations, 1);
    assert_eq!(stats.users, 1);
    Ok(())
}

#[test]
fn organisation_names_are_unique_at_the_schema_level() -> anyhow::Result<()> {
    let store = Store::memory()?;
    store.init_schema()?;
    store.create_organisation("Acme")?;

    let err = store.create_organisation("Acme").unwrap_err();
    assert_eq!(classify(&err), ErrorKind::Conflict);

    // Bypassing the store still hits the UNIQUE constraint.
    let raw = store.with_conn(|c| {
        Ok(c.execute(
            "INSERT INTO organisations(name, created_at) VALUES ('Acme', '2024-01-01T00:00:00Z')",
            [],
        )?)
    });
    assert!(raw.is_err());
    assert_eq!(store.list_organisations()?.len(), 1);
    Ok(())
}

#[test]
fn legacy_user_tokens_move_into_credentials() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let scripts = dir.path().join("migrations");
    std::fs::create_dir_all(&scripts)?;
    let embedded = Migrator::embedded()?;
    for s in embedded.scripts() {
        std::fs::write(scripts.join(&s.script), &s.sql)?;
    }

    // Apply only the baseline, then seed a user carrying tokens the old way.
    let baseline_dir = dir.path().join("baseline");
    std::fs::create_dir_all(&baseline_dir)?;
    std::fs::copy(
        scripts.join("V1__baseline.sql"),
        baseline_dir.join("V1__baseline.sql"),
    )?;

    let store = Store::memory()?;
    store.migrate_with(&Migrator::from_dir(&baseline_dir)?)?;
    store.with_conn(|c| {
        c.execute(
            "INSERT INTO organisations(name, created_at) VALUES ('Acme', '2024-01-01T00:00:00Z')",
            [],
        )?;
        c.execute(
            "INSERT INTO users(org_id, name, email, access_token, refresh_token, token_type, created_at)
             VALUES (1, 'Ada', 'ada@acme.test', 'ya29.legacy', 'r-legacy', 'Bearer', '2024-01-01T00:00:00Z')",
            [],
        )?;
        Ok(())
    })?;

    let report = store.migrate_with(&Migrator::from_dir(&scripts)?)?;
    assert_eq!(report.applied, vec![2, 3, 4]);

    let (provider, token): (String, String) = store.with_conn(|c| {
        Ok(c.query_row(
            "SELECT provider, access_token FROM credentials WHERE user_id = 1",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?)
    })?;
    assert_eq!(provider, "google_drive");
    assert_eq!(token, "ya29.legacy");
    Ok(())
}

#[test]
fn read_only_open_requires_a_current_schema_and_never_writes() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let db = dir.path().join("lorelai.db");

    let baseline_dir = dir.path().join("baseline");
    std::fs::create_dir_all(&baseline_dir)?;
    let embedded = Migrator::embedded()?;
    let v1 = &embedded.scripts()[0];
    std::fs::write(baseline_dir.join(&v1.script), &v1.sql)?;
    Store::open(&db)?.migrate_with(&Migrator::from_dir(&baseline_dir)?)?;

    let err = Store::open_read_only(&db).err().unwrap();
    assert_eq!(classify(&err), ErrorKind::Migration);
    assert!(err.to_string().contains("V2 (pending)"));

    let history: i64 = Store::open(&db)?.with_conn(|c| {
        Ok(c.query_row("SELECT COUNT(*) FROM schema_history", [], |r| r.get(0))?)
    })?;
    assert_eq!(history, 1);

    Store::open(&db)?.init_schema()?;
    let store = Store::open_read_only(&db)?;
    assert_eq!(store.list_organisations()?.len(), 0);
    assert!(store.create_organisation("Acme").is_err());
    Ok(())
}

#[test]
fn status_on_an_empty_database_creates_nothing() -> anyhow::Result<()> {
    let store = Store::memory()?;
    let infos = store.with_conn(|c| Migrator::embedded()?.status(c))?;
    assert!(infos.iter().all(|i| i.state == MigrationState::Pending));
    let tables: i64 = store.with_conn(|c| {
        Ok(c.query_row("SELECT COUNT(*) FROM sqlite_master", [], |r| r.get(0))?)
    })?;
    assert_eq!(tables, 0);
    Ok(())
}
