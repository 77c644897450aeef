//! proctor: headless harness for the session integrity subsystem.
//! Drives one exam session from the command line — environment signals in
//! as JSON lines on stdin, state notifications out as JSON lines on stdout.

use clap::Parser;

mod cli;
mod run;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    let filter = std::env::var("PROCTOR_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        cli::Command::Run(opts) => run::cmd_run(opts).await,
    }
}
