use super::{exit_codes, Ctx};
use crate::cli::args::{MigrateArgs, MigrateSub};
use lorelai_core::report::console::table;
use lorelai_core::storage::migrations::{MigrationState, Migrator};
use lorelai_core::storage::Store;

pub fn run(ctx: &Ctx, args: MigrateArgs) -> anyhow::Result<i32> {
    let migrator = match &args.dir {
        Some(dir) => Migrator::from_dir(dir)?,
        None => Migrator::embedded()?,
    };
    // Opened without init_schema: this command owns schema changes.
    let store = Store::open(ctx.db_path())?;

    match args.cmd {
        MigrateSub::Status => {
            let infos = store.with_conn(|c| migrator.status(c))?;
            if ctx.is_json() {
                ctx.print_json(&infos)?;
            } else {
                let rows: Vec<Vec<String>> = infos
                    .iter()
                    .map(|m| {
                        vec![
                            format!("V{}", m.version),
                            m.description.clone(),
                            state_label(m.state).to_string(),
                            m.installed_on.clone().unwrap_or_else(|| "-".into()),
                        ]
                    })
                    .collect();
                print!(
                    "{}",
                    table(&["version", "description", "state", "installed_on"], &rows)
                );
            }
        }
        MigrateSub::Validate => {
            store.with_conn(|c| migrator.validate(c))?;
            println!(
                "Schema history is consistent with {} script(s)",
                migrator.scripts().len()
            );
        }
        MigrateSub::Apply => {
            let report = store.migrate_with(&migrator)?;
            if report.applied.is_empty() {
                let version = report
                    .current_version
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "none".into());
                println!("Schema is up to date (version {})", version);
            } else {
                for v in &report.applied {
                    println!("Applied V{}", v);
                }
            }
        }
        MigrateSub::Repair => {
            let removed = store.with_conn(|c| migrator.repair(c))?;
            let suffix = if removed == 1 { "y" } else { "ies" };
            println!("Removed {} failed history entr{}", removed, suffix);
        }
    }
    Ok(exit_codes::OK)
}

fn state_label(state: MigrationState) -> &'static str {
    match state {
        MigrationState::Applied => "applied",
        MigrationState::Pending => "pending",
        MigrationState::Failed => "FAILED",
    }
}
