//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "zentest", version, about = "Plain-English end-to-end browser tests")]
pub struct CliArgs {
    /// Path to zentest.yaml (default: ./zentest.yaml, then user config dir).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output (debug logging, per-action detail).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scaffold a zentest project in a directory.
    Init {
        #[arg(default_value = ".")]
        dir: PathBuf,
    },

    /// Run a suite file, or every suite under ./tests.
    Run {
        /// Markdown suite file to run.
        suite: Option<PathBuf>,

        /// Force agentic re-derivation even when a recorded script exists.
        #[arg(long)]
        agentic: bool,

        /// Do not heal when the recorded script fails.
        #[arg(long = "no-heal")]
        no_heal: bool,

        /// Named environment from the config to run against.
        #[arg(long)]
        env: Option<String>,

        /// Force headless mode.
        #[arg(long, conflicts_with = "headed")]
        headless: bool,

        /// Force a visible browser window.
        #[arg(long)]
        headed: bool,
    },
}
