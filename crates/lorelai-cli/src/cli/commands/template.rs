use super::{exit_codes, Ctx};
use crate::cli::args::TemplateSub;
use lorelai_core::benchmark::{ParameterChange, TemplateService};
use lorelai_core::report::console::table;

pub fn run(ctx: &Ctx, cmd: TemplateSub) -> anyhow::Result<i32> {
    match cmd {
        TemplateSub::Create(args) => {
            let svc = TemplateService::new(ctx.store()?);
            let t = svc.create(&args.name, &args.description)?;
            if ctx.is_json() {
                ctx.print_json(&t)?;
            } else {
                println!("Created template #{} '{}'", t.id, t.name);
            }
        }
        TemplateSub::AddParameter(args) => {
            let svc = TemplateService::new(ctx.store()?);
            let change = svc.add_parameter(
                args.template_id,
                &args.parameter_name,
                &args.parameter_type,
                &args.parameter_value,
            )?;
            let verb = match change {
                ParameterChange::Added => "Added",
                ParameterChange::Updated => "Updated",
            };
            println!(
                "{} parameter '{}' on template #{}",
                verb,
                args.parameter_name.trim(),
                args.template_id
            );
        }
        TemplateSub::DeleteParameter(args) => {
            let svc = TemplateService::new(ctx.store()?);
            svc.delete_parameter(args.template_id, &args.parameter_name)?;
            println!(
                "Deleted parameter '{}' from template #{}",
                args.parameter_name.trim(),
                args.template_id
            );
        }
        TemplateSub::Delete(args) => {
            let svc = TemplateService::new(ctx.store()?);
            svc.delete(args.template_id, args.cascade)?;
            println!("Deleted template #{}", args.template_id);
        }
        TemplateSub::List => {
            let svc = TemplateService::new(ctx.store_for_read()?);
            let templates = svc.list()?;
            if ctx.is_json() {
                ctx.print_json(&templates)?;
            } else {
                let rows: Vec<Vec<String>> = templates
                    .iter()
                    .map(|t| {
                        vec![
                            t.id.to_string(),
                            t.name.clone(),
                            t.version.to_string(),
                            t.description.clone(),
                        ]
                    })
                    .collect();
                print!("{}", table(&["id", "name", "version", "description"], &rows));
            }
        }
        TemplateSub::Show(args) => {
            let svc = TemplateService::new(ctx.store_for_read()?);
            let t = svc.show(args.template_id)?;
            if ctx.is_json() {
                ctx.print_json(&t)?;
            } else {
                println!("id:          {}", t.id);
                println!("name:        {}", t.name);
                println!("description: {}", t.description);
                println!("version:     {}", t.version);
                println!("created_at:  {}", t.created_at);
                println!("updated_at:  {}", t.updated_at);
            }
        }
        TemplateSub::ListParameters(args) => {
            let svc = TemplateService::new(ctx.store_for_read()?);
            let params = svc.list_parameters(args.template_id)?;
            if ctx.is_json() {
                ctx.print_json(&params)?;
            } else {
                let rows: Vec<Vec<String>> = params
                    .iter()
                    .map(|p| vec![p.name.clone(), p.param_type.to_string(), p.value.clone()])
                    .collect();
                print!("{}", table(&["name", "type", "value"], &rows));
            }
        }
    }
    Ok(exit_codes::OK)
}
