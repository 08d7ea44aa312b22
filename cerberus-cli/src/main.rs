//! Cerberus CLI - the review gate's command line
//!
//! One subcommand per pipeline stage. Exit codes follow the gate contract:
//! 0 for PASS/WARN, 1 for FAIL (or SKIP with `--fail-on-skip`), 2 for
//! configuration and invocation errors.

mod commands;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{AggregateArgs, MatrixArgs, ParseArgs, RunArgs, TriageArgs, WaveGateArgs};

/// Cerberus: multi-reviewer LLM merge gate for pull requests
#[derive(Parser, Debug)]
#[command(name = "cerberus")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Expand the reviewer roster into CI matrix tasks
    Matrix(MatrixArgs),
    /// Run one reviewer perspective against a diff
    Run(RunArgs),
    /// Parse a reviewer artifact into a verdict
    Parse(ParseArgs),
    /// Aggregate reviewer verdicts into the cerberus verdict
    Aggregate(AggregateArgs),
    /// Decide whether the next review wave should run
    WaveGate(WaveGateArgs),
    /// Evaluate the triage circuit breaker
    Triage(TriageArgs),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Matrix(args) => args.execute().await,
        Commands::Run(args) => args.execute().await,
        Commands::Parse(args) => args.execute().await,
        Commands::Aggregate(args) => args.execute().await,
        Commands::WaveGate(args) => args.execute().await,
        Commands::Triage(args) => args.execute().await,
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("cerberus: {:#}", e);
            std::process::exit(2);
        }
    }
}
