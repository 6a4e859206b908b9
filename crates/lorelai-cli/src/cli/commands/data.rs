use super::{exit_codes, Ctx};
use crate::cli::args::{DataSub, DataTransferArgs};
use lorelai_core::artifacts::{ArtifactStore, Direction, TransferPlan};

pub fn run(ctx: &Ctx, cmd: DataSub) -> anyhow::Result<i32> {
    let store = ArtifactStore::new(&ctx.config.artifact_dir);
    let (plan, args) = match cmd {
        DataSub::Upload(args) => (store.plan_upload(&args.path)?, args),
        DataSub::Download(args) => (store.plan_download(&args.path)?, args),
    };
    report(&plan, &args);
    if !args.dry_run {
        store.execute(&plan)?;
        println!("Done.");
    }
    Ok(exit_codes::OK)
}

fn report(plan: &TransferPlan, args: &DataTransferArgs) {
    let verb = match plan.direction {
        Direction::Upload => "upload",
        Direction::Download => "download",
    };
    let prefix = if args.dry_run { "[dry-run] would " } else { "" };
    println!(
        "{}{} {} file(s), {} bytes: {} -> {}",
        prefix,
        verb,
        plan.files.len(),
        plan.total_bytes(),
        plan.source.display(),
        plan.destination.display()
    );
    if args.dry_run {
        for f in &plan.files {
            println!("  {} -> {}", f.from.display(), f.to.display());
        }
    }
}
