use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "migconf",
    version,
    about = "Migration conference engine: checklist templates, query validation and client sign-off"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(clap::Args, Debug, Clone)]
pub struct GlobalArgs {
    #[arg(long, global = true, env = "MIGCONF_CONFIG", default_value = "migconf.yaml")]
    pub config: PathBuf,

    /// Overrides `db` from the config file
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Reject unknown keys in the config file
    #[arg(long, global = true)]
    pub strict: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Write a sample config and template, and create the database
    Init(InitArgs),
    Template(TemplateArgs),
    Connection(ConnectionArgs),
    Conference(ConferenceArgs),
    Link(LinkArgs),
    Email(EmailArgs),
    Notify(NotifyArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct InitArgs {
    #[arg(long, default_value = "template.yaml")]
    pub template: PathBuf,

    /// Overwrite existing files
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Clone)]
pub struct TemplateArgs {
    #[command(subcommand)]
    pub cmd: TemplateSub,
}

#[derive(Subcommand, Clone)]
pub enum TemplateSub {
    /// Check a template file without storing it
    Validate(TemplateFileArgs),
    /// Check and store a template
    Import(TemplateFileArgs),
    List,
}

#[derive(clap::Args, Debug, Clone)]
pub struct TemplateFileArgs {
    #[arg(long)]
    pub file: PathBuf,

    /// text | json
    #[arg(long, default_value = "text")]
    pub format: String,
}

#[derive(Parser, Clone)]
pub struct ConnectionArgs {
    #[command(subcommand)]
    pub cmd: ConnectionSub,
}

#[derive(Subcommand, Clone)]
pub enum ConnectionSub {
    /// Register a SQLite database that checklist queries run against
    Add(ConnectionAddArgs),
    List,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ConnectionAddArgs {
    #[arg(long)]
    pub id: String,

    #[arg(long, default_value = "")]
    pub name: String,

    #[arg(long)]
    pub path: PathBuf,
}

#[derive(Parser, Clone)]
pub struct ConferenceArgs {
    #[command(subcommand)]
    pub cmd: ConferenceSub,
}

#[derive(Subcommand, Clone)]
pub enum ConferenceSub {
    Create(CreateArgs),
    /// Supply client figures for expected-value items
    Inputs(InputsArgs),
    /// Execute one item, or every item when --item is omitted
    Run(RunArgs),
    Respond(RespondArgs),
    /// Remove a human decision so the automatic status applies again
    Clear(ItemArgs),
    Status(StatusArgs),
    List,
    Delete(IdArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct CreateArgs {
    #[arg(long)]
    pub id: Option<String>,

    #[arg(long)]
    pub template: String,

    #[arg(long)]
    pub connection: String,

    #[arg(long, default_value = "")]
    pub client: String,

    /// Store as `key:store_id[:name]`; repeatable
    #[arg(long = "store")]
    pub stores: Vec<String>,

    /// YYYY-MM-DD
    #[arg(long)]
    pub period_start: Option<String>,

    /// YYYY-MM-DD
    #[arg(long)]
    pub period_end: Option<String>,

    /// Expected value as `binding=value` or `binding#store=value`; repeatable
    #[arg(long = "input")]
    pub inputs: Vec<String>,

    /// YAML or JSON map of expected values
    #[arg(long)]
    pub inputs_file: Option<PathBuf>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct InputsArgs {
    #[arg(long)]
    pub id: String,

    #[arg(long = "input")]
    pub inputs: Vec<String>,

    #[arg(long)]
    pub inputs_file: Option<PathBuf>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct RunArgs {
    #[arg(long)]
    pub id: String,

    #[arg(long)]
    pub item: Option<String>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct RespondArgs {
    #[arg(long)]
    pub id: String,

    #[arg(long)]
    pub item: String,

    /// correct | divergent
    #[arg(long)]
    pub response: String,

    #[arg(long)]
    pub observation: Option<String>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ItemArgs {
    #[arg(long)]
    pub id: String,

    #[arg(long)]
    pub item: String,
}

#[derive(clap::Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long)]
    pub id: String,

    /// text | json
    #[arg(long, default_value = "text")]
    pub format: String,
}

#[derive(clap::Args, Debug, Clone)]
pub struct IdArgs {
    #[arg(long)]
    pub id: String,
}

#[derive(Parser, Clone)]
pub struct LinkArgs {
    #[command(subcommand)]
    pub cmd: LinkSub,
}

#[derive(Subcommand, Clone)]
pub enum LinkSub {
    /// Issue a new token; the previous one stops working
    Regenerate(IdArgs),
    Resolve(ResolveArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct ResolveArgs {
    #[arg(long)]
    pub token: String,

    /// Report unknown and expired tokens the same way
    #[arg(long)]
    pub public: bool,
}

#[derive(Parser, Clone)]
pub struct EmailArgs {
    #[command(subcommand)]
    pub cmd: EmailSub,
}

#[derive(Subcommand, Clone)]
pub enum EmailSub {
    SendLink(EmailToArgs),
    Completion(EmailToArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct EmailToArgs {
    #[arg(long)]
    pub id: String,

    #[arg(long)]
    pub to: String,
}

#[derive(Parser, Clone)]
pub struct NotifyArgs {
    #[command(subcommand)]
    pub cmd: NotifySub,
}

#[derive(Subcommand, Clone)]
pub enum NotifySub {
    /// Evaluate alerts and reminders once
    Sweep,
    /// Sweep on an interval and whenever the store changes, until interrupted
    Watch,
    Alerts(AlertsArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct AlertsArgs {
    #[arg(long, default_value_t = 20)]
    pub limit: u32,
}
