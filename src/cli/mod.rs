//! Command-line interface.

pub mod app;
pub mod env;
pub mod init;
pub mod output;
pub mod run;
pub mod runtime;

pub use env::{CliArgs, Command};
