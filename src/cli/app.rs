//! CLI entry point: parse, configure, dispatch.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use crate::config::Config;

use super::env::{CliArgs, Command};
use super::init::cmd_init;
use super::run::{cmd_run, RunArgs};
use super::runtime::{cancellation_token, init_logging};

pub async fn run() -> Result<ExitCode> {
    let cli = CliArgs::parse();
    init_logging(cli.verbose)?;
    info!("zentest v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Init { dir } => {
            cmd_init(&dir).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Run {
            suite,
            agentic,
            no_heal,
            env,
            headless,
            headed,
        } => {
            let config = Config::load(cli.config.as_deref()).await?;
            let cancel = cancellation_token();
            let all_passed = cmd_run(
                config,
                RunArgs {
                    suite,
                    agentic,
                    no_heal,
                    env,
                    headless,
                    headed,
                    verbose: cli.verbose,
                },
                cancel,
            )
            .await?;
            Ok(if all_passed {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}
