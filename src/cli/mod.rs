//! CLI module for the fleetplan tool.
//!
//! This module provides the command-line interface for planning
//! instance placement from a planning input document.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat};
pub use output::OutputFormatter;
