use super::args::*;
use lorelai_core::config::LorelaiConfig;
use lorelai_core::errors::{classify, ErrorKind, LorelaiError};
use lorelai_core::storage::migrations::MigrationError;
use lorelai_core::storage::Store;
use serde::Serialize;
use std::path::PathBuf;

pub mod benchmark;
pub mod data;
pub mod migrate;
pub mod org;
pub mod template;

pub mod exit_codes {
    pub const OK: i32 = 0;
    pub const FAILED: i32 = 1;
    pub const VALIDATION: i32 = 2;
    pub const NOT_FOUND: i32 = 3;
    pub const CONFLICT: i32 = 4;
    pub const MIGRATION: i32 = 5;
}

pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    match classify(err) {
        ErrorKind::Validation => exit_codes::VALIDATION,
        ErrorKind::NotFound => exit_codes::NOT_FOUND,
        ErrorKind::Conflict => exit_codes::CONFLICT,
        ErrorKind::Migration => exit_codes::MIGRATION,
        ErrorKind::Integration | ErrorKind::Internal => exit_codes::FAILED,
    }
}

/// `<kind>: <message>` for the first domain error in the chain.
pub fn render_error(err: &anyhow::Error) -> String {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<LorelaiError>() {
            return e.to_string();
        }
        if let Some(e) = cause.downcast_ref::<MigrationError>() {
            return format!("migration error: {}", e);
        }
    }
    format!("error: {:#}", err)
}

/// Resolved configuration shared by every command.
pub struct Ctx {
    pub config: LorelaiConfig,
    pub format: OutputFormat,
}

impl Ctx {
    pub fn load(global: &GlobalArgs) -> anyhow::Result<Self> {
        let mut config = LorelaiConfig::load(global.config.as_deref())?;
        if let Some(db) = &global.db {
            config.database_path = db.clone();
        }
        Ok(Self {
            config,
            format: global.format,
        })
    }

    pub fn db_path(&self) -> &PathBuf {
        &self.config.database_path
    }

    /// Opens the database and brings its schema up to date.
    pub fn store(&self) -> anyhow::Result<Store> {
        let store = Store::open(self.db_path())?;
        store.init_schema()?;
        Ok(store)
    }

    /// For read-only commands and dry runs. An existing database is opened
    /// read-only and must already be migrated; a missing one is not created
    /// and reads as an empty in-memory schema.
    pub fn store_for_read(&self) -> anyhow::Result<Store> {
        if self.db_path().exists() {
            return Store::open_read_only(self.db_path());
        }
        tracing::debug!(db = %self.db_path().display(), "database missing; using empty schema");
        let store = Store::memory()?;
        store.init_schema()?;
        Ok(store)
    }

    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    pub fn print_json<T: Serialize>(&self, value: &T) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    let ctx = Ctx::load(&cli.global)?;
    let level = ctx.config.log_level.clone().unwrap_or_else(|| "warn".to_string());
    lorelai_core::logging::init(&level, ctx.config.log_format);

    match cli.cmd {
        Command::Template(args) => template::run(&ctx, args.cmd),
        Command::Benchmark(args) => benchmark::run(&ctx, args.cmd).await,
        Command::Data(args) => data::run(&ctx, args.cmd),
        Command::Org(args) => org::run_org(&ctx, args.cmd),
        Command::User(args) => org::run_user(&ctx, args.cmd),
        Command::Migrate(args) => migrate::run(&ctx, args),
    }
}
