#![forbid(unsafe_code)]

mod actor;
mod cmd;
mod output;

use std::env;
use std::process::ExitCode;

use clap::{CommandFactory, Parser, Subcommand};
use output::{CliError, OutputMode, render_error, resolve_output_mode};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use warden_core::error::ErrorCode;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "warden: work-item tracker and worker supervisor",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON output (shorthand for `--format json`).
    #[arg(long, global = true, hide = true)]
    json: bool,

    /// Output format: pretty, text, or json.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Override actor identity (skips env resolution).
    #[arg(long, global = true)]
    actor: Option<String>,

    /// Only log errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        resolve_output_mode(self.format, self.json)
    }

    fn actor_flag(&self) -> Option<&str> {
        self.actor.as_deref()
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Lifecycle",
        about = "Initialize a warden project",
        long_about = "Create the .warden/ state directory in the current directory.",
        after_help = "EXAMPLES:\n    # Initialize a project in the current directory\n    wd init\n\n    # Reset config.toml to defaults\n    wd init --force"
    )]
    Init(cmd::init::InitArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Create a new work item",
        long_about = "Create a new work item and record a created event.",
        after_help = "EXAMPLES:\n    # Create a task\n    wd create --title \"Fix login timeout\"\n\n    # Create an urgent bug in the api turf that blocks another item\n    wd create --title \"Token leak\" --type bug --priority 0 --turf api --blocks wd-a1b2\n\n    # Emit machine-readable output\n    wd create --title \"Fix login timeout\" --json"
    )]
    Create(cmd::create::CreateArgs),

    #[command(
        next_help_heading = "Read",
        about = "List work items",
        long_about = "List work items in creation order.",
        after_help = "EXAMPLES:\n    # List everything\n    wd list\n\n    # Open items in one turf\n    wd list --status open --turf api\n\n    # Compact filter expression\n    wd list --filter status=in_progress,assignee=sal"
    )]
    List(cmd::list::ListArgs),

    #[command(
        next_help_heading = "Read",
        about = "Show one work item",
        long_about = "Show full details and history for a single work item.",
        after_help = "EXAMPLES:\n    # Show an item\n    wd show wd-a1b2\n\n    # Emit machine-readable output\n    wd show wd-a1b2 --json"
    )]
    Show(cmd::show::ShowArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Change fields of a work item",
        long_about = "Update a work item. Status and assignee changes are recorded in its history.",
        after_help = "EXAMPLES:\n    # Start work\n    wd update wd-a1b2 --status in_progress --assignee sal\n\n    # Reprioritize\n    wd update wd-a1b2 --priority 1"
    )]
    Update(cmd::update::UpdateArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Close a work item",
        long_about = "Close a work item, releasing everything it blocks.",
        after_help = "EXAMPLES:\n    # Close an item\n    wd close wd-a1b2\n\n    # Close with a reason\n    wd close wd-a1b2 --reason \"fixed in 4f2c\""
    )]
    Close(cmd::close::CloseArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Comment on a work item",
        after_help = "EXAMPLES:\n    # Leave a note\n    wd comment wd-a1b2 \"repro needs a cold cache\""
    )]
    Comment(cmd::comment::CommentArgs),

    #[command(
        next_help_heading = "Read",
        about = "List items ready for work",
        long_about = "List open items with no open blocker, most urgent first.",
        after_help = "EXAMPLES:\n    # Everything ready\n    wd ready\n\n    # Ready work in one turf\n    wd ready --turf api"
    )]
    Ready(cmd::ready::ReadyArgs),

    #[command(
        next_help_heading = "Dependencies",
        about = "Manage and inspect blocking links",
        after_help = "EXAMPLES:\n    # A blocks B\n    wd dep add wd-aaaa --blocks wd-bbbb\n\n    # Show the dependency tree around an item\n    wd dep tree wd-bbbb"
    )]
    Dep(cmd::dep::DepArgs),

    #[command(
        next_help_heading = "Supervision",
        about = "Report and inspect worker liveness",
        after_help = "EXAMPLES:\n    # Report liveness\n    wd worker heartbeat w-1 --name sal --status active --task wd-a1b2\n\n    # List known workers\n    wd worker list"
    )]
    Worker(cmd::worker::WorkerArgs),

    #[command(
        next_help_heading = "Supervision",
        about = "Read and write worker mailboxes",
        after_help = "EXAMPLES:\n    # Assign an item to sal\n    wd hook assign sal wd-a1b2\n\n    # Consume the pending message\n    wd hook take sal"
    )]
    Hook(cmd::hook::HookArgs),

    #[command(
        next_help_heading = "Supervision",
        about = "Nudge a worker",
        long_about = "Nudge a worker at one level, or escalate wake, mailbox, restart until one works.",
        after_help = "EXAMPLES:\n    # Drop a nudge in sal's mailbox\n    wd nudge sal --level 1\n\n    # Escalate\n    wd nudge sal --escalate"
    )]
    Nudge(cmd::nudge::NudgeArgs),

    #[command(
        next_help_heading = "Supervision",
        about = "Supervise workers",
        long_about = "Watch worker heartbeats and escalate nudges for stale workers.",
        after_help = "EXAMPLES:\n    # One supervision pass\n    wd patrol --once\n\n    # Launch configured workers and supervise until interrupted\n    wd patrol"
    )]
    Patrol(cmd::patrol::PatrolArgs),

    #[command(
        next_help_heading = "Utility",
        about = "Generate shell completions",
        after_help = "EXAMPLES:\n    # Bash\n    wd completions bash > ~/.local/share/bash-completion/completions/wd"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing(verbose: bool, quiet: bool) {
    let filter = EnvFilter::try_from_env("WARDEN_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if quiet {
            "error"
        } else if verbose || env::var("DEBUG").is_ok() {
            "warden=debug,info"
        } else {
            "warden=info,warn"
        })
    });

    let format = env::var("WARDEN_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

/// Map a command failure onto the structured error shape.
fn to_cli_error(err: &anyhow::Error) -> CliError {
    if let Some(core) = err.downcast_ref::<warden_core::Error>() {
        return CliError::from(core);
    }
    if let Some(actor_err) = err.downcast_ref::<actor::ActorResolutionError>() {
        return CliError::with_details(
            actor_err.message.clone(),
            "Set --actor or WARDEN_ACTOR",
            actor_err.code,
        );
    }
    if let Some(missing) = err.downcast_ref::<cmd::NotInitialized>() {
        return CliError {
            message: missing.to_string(),
            suggestion: ErrorCode::NotInitialized.hint().map(str::to_string),
            error_code: Some(ErrorCode::NotInitialized.code().to_string()),
        };
    }
    CliError::new(format!("{err:#}"))
}

fn run(cli: &Cli, output: OutputMode) -> anyhow::Result<()> {
    let project_root = env::current_dir()?;
    let actor = cli.actor_flag();

    match &cli.command {
        Commands::Init(args) => cmd::init::run_init(args, output, &project_root),
        Commands::Create(args) => cmd::create::run_create(args, actor, output, &project_root),
        Commands::List(args) => cmd::list::run_list(args, output, &project_root),
        Commands::Show(args) => cmd::show::run_show(args, output, &project_root),
        Commands::Update(args) => cmd::update::run_update(args, actor, output, &project_root),
        Commands::Close(args) => cmd::close::run_close(args, actor, output, &project_root),
        Commands::Comment(args) => cmd::comment::run_comment(args, actor, output, &project_root),
        Commands::Ready(args) => cmd::ready::run_ready(args, output, &project_root),
        Commands::Dep(args) => cmd::dep::run_dep(args, output, &project_root),
        Commands::Worker(args) => cmd::worker::run_worker(args, output, &project_root),
        Commands::Hook(args) => cmd::hook::run_hook(args, actor, output, &project_root),
        Commands::Nudge(args) => cmd::nudge::run_nudge(args, output, &project_root),
        Commands::Patrol(args) => cmd::patrol::run_patrol(args, output, &project_root),
        Commands::Completions(args) => {
            let mut command = Cli::command();
            cmd::completions::write_completions(args, &mut command, &mut std::io::stdout().lock());
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);
    if cli.verbose {
        info!("Verbose mode enabled");
    }
    let output = cli.output_mode();

    match run(&cli, output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            debug!(error = ?err, "command failed");
            let cli_error = to_cli_error(&err);
            if render_error(output, &cli_error).is_err() {
                eprintln!("error: {}", cli_error.message);
            }
            ExitCode::FAILURE
        }
    }
}
