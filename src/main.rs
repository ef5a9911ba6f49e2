//! Fleetplan CLI entrypoint.
//!
//! This is the main entrypoint for the fleetplan command-line tool.

use std::path::PathBuf;
use std::process::ExitCode;

use fleet_placement::cli::{Cli, Commands, OutputFormat, OutputFormatter};
use fleet_placement::config::{
    InputParser, InputValidator, PlanHasher, PlanningInput, find_input_file,
};
use fleet_placement::error::{InputError, PlacementError, Result};
use fleet_placement::planner::PlacementPlan;

use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose);

    let formatter = OutputFormatter::new(cli.output);
    match run(cli, &formatter) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Planning failed: {e}");
            eprintln!("{}", formatter.format_error(&e.to_string()));
            if e.requires_manifest_change() {
                eprintln!("Update the manifest or the static IP pools and plan again.");
            }
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Dispatches the selected command.
fn run(cli: Cli, formatter: &OutputFormatter) -> Result<()> {
    match cli.command {
        Commands::Plan { group } => cmd_plan(cli.input.as_ref(), group.as_deref(), formatter),
        Commands::Validate { warnings } => cmd_validate(cli.input.as_ref(), warnings, formatter),
        Commands::Digest => cmd_digest(cli.input.as_ref(), formatter),
    }
}

/// Plan instance placement.
fn cmd_plan(
    input_path: Option<&PathBuf>,
    group: Option<&str>,
    formatter: &OutputFormatter,
) -> Result<()> {
    let input = load_input(input_path)?;

    let plans = match group {
        Some(name) => {
            let group = input.group(name).ok_or_else(|| {
                PlacementError::Input(InputError::UnknownReference {
                    kind: String::from("instance group"),
                    name: name.to_string(),
                    referenced_by: String::from("--group"),
                })
            })?;
            vec![input.plan_group(group)?]
        }
        None => input.plan_all()?,
    };

    let changed = plans.iter().filter(|p| !p.is_noop()).count();
    info!("Planned {} instance group(s), {changed} with changes", plans.len());

    println!("{}", formatter.format_plans(&plans));
    Ok(())
}

/// Validate the planning input.
fn cmd_validate(
    input_path: Option<&PathBuf>,
    show_warnings: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let input_file = resolve_input_path(input_path)?;
    info!("Validating planning input: {}", input_file.display());

    let input = InputParser::new().load_file(&input_file)?;
    let result = InputValidator::new().check(&input);

    println!("{}", formatter.format_validation(&result, show_warnings));

    if let Some(first_error) = result.errors.first() {
        return Err(PlacementError::Input(InputError::validation(
            first_error.message.clone(),
            first_error.field.clone(),
        )));
    }

    // Show summary
    if formatter.format() == OutputFormat::Text {
        eprintln!("\nPlanning input summary:");
        eprintln!("  Availability zones: {}", input.azs.len());
        eprintln!("  Networks: {}", input.networks.len());
        eprintln!("  Instance groups: {}", input.instance_groups.len());
        eprintln!(
            "  Desired instances: {}",
            input.instance_groups.iter().map(|g| g.instances).sum::<usize>()
        );
    }
    Ok(())
}

/// Print input and plan fingerprints.
fn cmd_digest(input_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<()> {
    let input = load_input(input_path)?;
    let hasher = PlanHasher::new();

    let input_hash = hasher.hash_input(&input)?;
    let plans: Vec<PlacementPlan> = input.plan_all()?;
    let plan_hash = hasher.hash_plans(&plans)?;
    let groups = plans
        .iter()
        .map(|p| Ok((p.instance_group.clone(), hasher.hash_plan(p)?)))
        .collect::<Result<Vec<_>>>()?;

    debug!("Input fingerprint: {}", hasher.short_hash(&input_hash));
    println!("{}", formatter.format_digest(&input_hash, &plan_hash, &groups));
    Ok(())
}

// Helper Functions
// ============================================================================

/// Resolves the input file path.
fn resolve_input_path(input_path: Option<&PathBuf>) -> Result<PathBuf> {
    input_path.map_or_else(|| find_input_file("."), |path| Ok(path.clone()))
}

/// Loads and validates the planning input.
fn load_input(input_path: Option<&PathBuf>) -> Result<PlanningInput> {
    let input_file = resolve_input_path(input_path)?;
    debug!("Loading planning input from: {}", input_file.display());

    let input = InputParser::new().load_file(&input_file)?;
    InputValidator::new().validate(&input)?;
    Ok(input)
}
