//! Brickwork CLI - workspace job and identity automation.
//!
//! The main entry point for the `brickwork` CLI binary.

use anyhow::Result;
use clap::Parser;

use brickwork_cli::{Cli, Commands};
use brickwork_core::observability::{LogFormat, init_logging};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.config();

    init_logging(
        if cli.log_json { LogFormat::Json } else { LogFormat::Pretty },
        "warn",
    );

    // Operations are sequential; a single-threaded runtime is enough.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        match cli.command {
            Commands::Token(args) => brickwork_cli::commands::token::execute(args, &config).await,
            Commands::Identity(args) => {
                brickwork_cli::commands::identity::execute(args, &config).await
            }
            Commands::Group(args) => brickwork_cli::commands::group::execute(args, &config).await,
            Commands::Job(args) => brickwork_cli::commands::job::execute(args, &config).await,
        }
    })
}
