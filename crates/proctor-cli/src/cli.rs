//! CLI definition using clap derive.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "proctor", about = "timed-assessment session harness")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a session headless: signals on stdin, notifications on stdout
    Run(RunOpts),
}

#[derive(clap::Args)]
pub struct RunOpts {
    /// Path to the quiz JSON file
    #[arg(long)]
    pub quiz: PathBuf,

    /// Session identifier (stable across reloads of the same attempt)
    #[arg(long)]
    pub session_id: String,

    /// Time budget in seconds
    #[arg(long, default_value = "1200")]
    pub budget_secs: u64,

    /// Counting infractions before the session locks
    #[arg(long, default_value = "3")]
    pub threshold: u32,

    /// Seconds allowed to recover fullscreen before the session locks
    #[arg(long, default_value = "3")]
    pub grace_secs: u64,

    /// Count clipboard use toward the lock threshold
    #[arg(long)]
    pub count_clipboard: bool,

    /// Count context-menu use toward the lock threshold
    #[arg(long)]
    pub count_context_menu: bool,

    /// Count blocked shortcuts toward the lock threshold
    #[arg(long)]
    pub count_blocked_shortcut: bool,

    /// SQLite anchor database path
    #[arg(long, default_value = "proctor.db")]
    pub db: PathBuf,

    /// Backend base URL; submissions are discarded when absent
    #[arg(long)]
    pub backend_url: Option<String>,
}
