use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "dragonfly",
    version,
    about = "Benchmark templates, runs, artifacts and tenant admin for Lorelai"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// YAML config file (default: $LORELAI_CONFIG, then ./lorelai.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// SQLite database path (overrides config and LORELAI_DB)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Output format for read commands
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Manage benchmark templates and their parameters
    Template(TemplateArgs),
    /// Run benchmarks and inspect their results
    Benchmark(BenchmarkArgs),
    /// Move benchmark artifacts in and out of the artifact store
    Data(DataArgs),
    /// Manage organisations
    Org(OrgArgs),
    /// Manage users
    User(UserArgs),
    /// Inspect and apply schema migrations
    Migrate(MigrateArgs),
}

// --- template ---

#[derive(Args)]
pub struct TemplateArgs {
    #[command(subcommand)]
    pub cmd: TemplateSub,
}

#[derive(Subcommand)]
pub enum TemplateSub {
    Create(TemplateCreateArgs),
    AddParameter(AddParameterArgs),
    DeleteParameter(DeleteParameterArgs),
    Delete(TemplateDeleteArgs),
    List,
    Show(TemplateIdArgs),
    ListParameters(TemplateIdArgs),
}

#[derive(Args, Debug, Clone)]
pub struct TemplateCreateArgs {
    #[arg(long, alias = "template-name")]
    pub name: String,

    #[arg(long, default_value = "")]
    pub description: String,
}

#[derive(Args, Debug, Clone)]
pub struct AddParameterArgs {
    #[arg(long)]
    pub template_id: i64,

    #[arg(long)]
    pub parameter_name: String,

    /// string | int | float | bool | json
    #[arg(long)]
    pub parameter_type: String,

    #[arg(long, allow_hyphen_values = true)]
    pub parameter_value: String,
}

#[derive(Args, Debug, Clone)]
pub struct DeleteParameterArgs {
    #[arg(long)]
    pub template_id: i64,

    #[arg(long)]
    pub parameter_name: String,
}

#[derive(Args, Debug, Clone)]
pub struct TemplateDeleteArgs {
    #[arg(long)]
    pub template_id: i64,

    /// Also delete the template's parameters, runs and results
    #[arg(long)]
    pub cascade: bool,
}

#[derive(Args, Debug, Clone)]
pub struct TemplateIdArgs {
    #[arg(long)]
    pub template_id: i64,
}

// --- benchmark ---

#[derive(Args)]
pub struct BenchmarkArgs {
    #[command(subcommand)]
    pub cmd: BenchmarkSub,
}

#[derive(Subcommand)]
pub enum BenchmarkSub {
    Run(BenchmarkRunArgs),
    Results(BenchmarkResultsArgs),
    List(BenchmarkListArgs),
}

#[derive(Args, Debug, Clone)]
pub struct BenchmarkRunArgs {
    #[arg(long)]
    pub template_name: String,

    /// Validate template, dataset and pipeline without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Answering service URL (overrides the pipeline_url parameter)
    #[arg(long)]
    pub pipeline_url: Option<String>,

    /// Replay recorded answers instead of calling a service
    #[arg(long)]
    pub trace_file: Option<PathBuf>,

    /// Concurrent pipeline requests
    #[arg(long, default_value_t = 4)]
    pub parallel: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResultsAction {
    View,
    Export,
}

#[derive(Args, Debug, Clone)]
pub struct BenchmarkResultsArgs {
    #[arg(long)]
    pub benchmark_id: String,

    #[arg(long, value_enum, default_value_t = ResultsAction::View)]
    pub action: ResultsAction,

    /// Export destination (default: benchmark-<id>.json)
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct BenchmarkListArgs {
    #[arg(long)]
    pub template_name: Option<String>,

    #[arg(long, default_value_t = 20)]
    pub last: u32,
}

// --- data ---

#[derive(Args)]
pub struct DataArgs {
    #[command(subcommand)]
    pub cmd: DataSub,
}

#[derive(Subcommand)]
pub enum DataSub {
    Upload(DataTransferArgs),
    Download(DataTransferArgs),
}

#[derive(Args, Debug, Clone)]
pub struct DataTransferArgs {
    #[arg(long)]
    pub path: PathBuf,

    #[arg(long)]
    pub dry_run: bool,
}

// --- org / user ---

#[derive(Args)]
pub struct OrgArgs {
    #[command(subcommand)]
    pub cmd: OrgSub,
}

#[derive(Subcommand)]
pub enum OrgSub {
    Create(OrgCreateArgs),
    List,
    Rename(OrgRenameArgs),
    /// Delete an organisation with its users, credentials and indexing history
    Delete(OrgIdArgs),
}

#[derive(Args, Debug, Clone)]
pub struct OrgCreateArgs {
    #[arg(long)]
    pub name: String,
}

#[derive(Args, Debug, Clone)]
pub struct OrgRenameArgs {
    #[arg(long)]
    pub org_id: i64,

    #[arg(long)]
    pub name: String,
}

#[derive(Args, Debug, Clone)]
pub struct OrgIdArgs {
    #[arg(long)]
    pub org_id: i64,
}

#[derive(Args)]
pub struct UserArgs {
    #[command(subcommand)]
    pub cmd: UserSub,
}

#[derive(Subcommand)]
pub enum UserSub {
    Add(UserAddArgs),
    List(UserListArgs),
}

#[derive(Args, Debug, Clone)]
pub struct UserAddArgs {
    #[arg(long)]
    pub org_id: Option<i64>,

    #[arg(long)]
    pub name: String,

    #[arg(long)]
    pub email: String,
}

#[derive(Args, Debug, Clone)]
pub struct UserListArgs {
    #[arg(long)]
    pub org_id: Option<i64>,
}

// --- migrate ---

#[derive(Args)]
pub struct MigrateArgs {
    #[command(subcommand)]
    pub cmd: MigrateSub,

    /// Read scripts from this directory instead of the built-in set
    #[arg(long, global = true)]
    pub dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
pub enum MigrateSub {
    Apply,
    Status,
    Validate,
    /// Remove failed history entries after the cause has been fixed
    Repair,
}
