use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

mod app;

/// Orchestration completed (even with failed agents).
const EXIT_OK: u8 = 0;
/// Catastrophic failure: transport dead, run interrupted, internal error.
const EXIT_CATASTROPHIC: u8 = 1;
/// Refused at the boundary: bad arguments, bad config, unsafe input.
const EXIT_VALIDATION: u8 = 2;

#[derive(Parser)]
#[command(name = "conclave")]
#[command(about = "Conclave - a panel of AI review agents for your code")]
#[command(version)]
struct Cli {
    /// Path to a config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run all review agents against a repository slug or local directory
    Review(ReviewArgs),
    /// Execute a single ad-hoc prompt through the transport
    Skill(SkillArgs),
}

#[derive(Args)]
struct ReviewArgs {
    /// Repository slug (owner/name) or path to a local directory
    target: String,

    /// Directory holding <name>.agent.md definitions
    #[arg(long, default_value = "agents")]
    agents_dir: PathBuf,

    /// Review passes per agent
    #[arg(long)]
    passes: Option<usize>,

    /// Maximum concurrently running passes
    #[arg(long)]
    parallelism: Option<usize>,

    /// Output directory for reports and the executive summary
    #[arg(long, default_value = "reviews")]
    output: PathBuf,

    /// Custom instruction file; repeatable
    #[arg(long = "instructions", value_name = "FILE")]
    instructions: Vec<PathBuf>,

    /// Also load instruction files discovered inside the target (trust flag)
    #[arg(long)]
    trust_target_instructions: bool,

    /// Default model for agents that do not pin one
    #[arg(long, default_value = "claude-sonnet-4-5")]
    model: String,

    /// Reasoning effort passed to the transport (low, medium, high)
    #[arg(long)]
    effort: Option<String>,

    /// Transport base URL
    #[arg(long, default_value = "https://api.anthropic.com")]
    base_url: String,

    /// Read the API token from stdin instead of CONCLAVE_API_TOKEN
    #[arg(long)]
    token_stdin: bool,

    /// Use the structured-concurrency executor
    #[arg(long)]
    structured: bool,
}

#[derive(Args)]
struct SkillArgs {
    /// The prompt text, or a path to a file containing it
    prompt: String,

    /// Model to execute with
    #[arg(long, default_value = "claude-sonnet-4-5")]
    model: String,

    /// Transport base URL
    #[arg(long, default_value = "https://api.anthropic.com")]
    base_url: String,

    /// Read the API token from stdin instead of CONCLAVE_API_TOKEN
    #[arg(long)]
    token_stdin: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    let outcome = match cli.command {
        Command::Review(args) => app::run_review(cli.config.as_deref(), args).await,
        Command::Skill(args) => app::run_skill_command(cli.config.as_deref(), args).await,
    };

    match outcome {
        Ok(()) => ExitCode::from(EXIT_OK),
        Err(e) => {
            eprintln!("error: {e:#}");
            if app::is_validation_error(&e) {
                ExitCode::from(EXIT_VALIDATION)
            } else {
                ExitCode::from(EXIT_CATASTROPHIC)
            }
        }
    }
}
