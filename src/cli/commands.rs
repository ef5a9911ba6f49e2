//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Fleetplan - instance placement planner for multi-AZ deployments.
#[derive(Parser, Debug)]
#[command(name = "fleetplan")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the planning input file.
    #[arg(short, long, global = true, env = "FLEETPLAN_INPUT")]
    pub input: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Plan instance placement for every instance group.
    Plan {
        /// Plan a single instance group.
        #[arg(short, long)]
        group: Option<String>,
    },

    /// Validate the planning input without planning.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Print fingerprints of the input and of the plan.
    Digest,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_plan_with_group() {
        let cli = Cli::try_parse_from([
            "fleetplan", "plan", "--group", "web", "-i", "input.yaml", "--output", "json",
        ])
        .unwrap();

        assert_eq!(cli.input, Some(PathBuf::from("input.yaml")));
        assert_eq!(cli.output, OutputFormat::Json);
        assert!(matches!(cli.command, Commands::Plan { group: Some(ref g) } if g == "web"));
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["fleetplan", "validate", "-v", "--warnings"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Validate { warnings: true }));
    }
}
