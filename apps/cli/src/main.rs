//! Parley CLI - run a two-role agent society on a task
//!
//! With no arguments, `parley` runs the default preset on its built-in task
//! and prints the final answer.

mod config;
mod report;

use clap::Parser;
use parley_models::{Environment, ModelFactory};
use parley_society::{Preset, construct_society, run_society};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Parley - role-playing agent societies
#[derive(Parser, Debug)]
#[command(
    name = "parley",
    author,
    version,
    about = "Run a user/assistant agent society on a task",
    long_about = "Parley pairs a planning \"user\" agent with a tool-using \"assistant\" agent and runs \
                  their conversation until the assistant submits a final answer or the round limit is reached."
)]
struct Args {
    /// Society preset (deepseek, openai-compatible, mock)
    #[arg(short, long)]
    preset: Option<String>,

    /// Task to solve (defaults to the preset's example task)
    #[arg(short, long)]
    task: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Maximum number of conversation rounds
    #[arg(short, long)]
    round_limit: Option<usize>,

    /// Directory written files land in
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Environment file with provider credentials (defaults to ./.env)
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Print answer, history and usage as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let environment = Environment::load(args.env_file.as_deref())?;
    let config = config::load_config(
        &environment,
        &config::overrides(args.preset, args.log_level, args.round_limit, args.output_dir),
    )?;

    // Initialize tracing
    let level = match config.log_level.as_deref().unwrap_or("info") {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .without_time()
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let preset: Preset = match config.preset.as_deref() {
        Some(name) => name.parse()?,
        None => Preset::default(),
    };
    let task = args.task.unwrap_or_else(|| preset.default_task().to_string());

    let factory = ModelFactory::new(environment)
        .with_retry_policy(config.retry.clone())
        .with_timeout(config.request_timeout());
    let society = construct_society(preset, &task, &factory, &config)?;

    let outcome = run_society(society).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        report::print_outcome(&outcome);
    }
    Ok(())
}
