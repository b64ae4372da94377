//! Command-line interface for boundline.
//!
//! Provides commands for running a pipeline and inspecting its configuration.

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli, Commands, ConfigArgs, RunArgs};
