use super::{exit_codes, Ctx};
use crate::cli::args::{OrgSub, UserSub};
use lorelai_core::report::console::table;

pub fn run_org(ctx: &Ctx, cmd: OrgSub) -> anyhow::Result<i32> {
    match cmd {
        OrgSub::Create(args) => {
            let org = ctx.store()?.create_organisation(&args.name)?;
            println!("Created organisation #{} '{}'", org.id, org.name);
        }
        OrgSub::List => {
            let orgs = ctx.store_for_read()?.list_organisations()?;
            if ctx.is_json() {
                ctx.print_json(&orgs)?;
            } else {
                let rows: Vec<Vec<String>> = orgs
                    .iter()
                    .map(|o| vec![o.id.to_string(), o.name.clone(), o.created_at.clone()])
                    .collect();
                print!("{}", table(&["id", "name", "created_at"], &rows));
            }
        }
        OrgSub::Rename(args) => {
            let org = ctx.store()?.rename_organisation(args.org_id, &args.name)?;
            println!("Renamed organisation #{} to '{}'", org.id, org.name);
        }
        OrgSub::Delete(args) => {
            ctx.store()?.delete_organisation(args.org_id)?;
            println!(
                "Deleted organisation #{} with its users, credentials and indexing history",
                args.org_id
            );
        }
    }
    Ok(exit_codes::OK)
}

pub fn run_user(ctx: &Ctx, cmd: UserSub) -> anyhow::Result<i32> {
    match cmd {
        UserSub::Add(args) => {
            let user = ctx.store()?.create_user(args.org_id, &args.name, &args.email)?;
            println!("Created user #{} <{}>", user.user_id, user.email);
        }
        UserSub::List(args) => {
            let users = ctx.store_for_read()?.list_users(args.org_id)?;
            if ctx.is_json() {
                ctx.print_json(&users)?;
            } else {
                let rows: Vec<Vec<String>> = users
                    .iter()
                    .map(|u| {
                        vec![
                            u.user_id.to_string(),
                            u.org_id.map(|id| id.to_string()).unwrap_or_else(|| "-".into()),
                            u.name.clone(),
                            u.email.clone(),
                        ]
                    })
                    .collect();
                print!("{}", table(&["user_id", "org_id", "name", "email"], &rows));
            }
        }
    }
    Ok(exit_codes::OK)
}
