//! Structural validation of planning input documents.
//!
//! This module checks names and references across the document before
//! any instance group is planned.

use crate::error::{InputError, PlacementError, Result};
use std::collections::HashSet;
use tracing::debug;

use super::parser::expand_static_ips;
use super::spec::{InstanceGroupConfig, NetworkConfig, PlanningInput};

/// Validator for planning input documents.
#[derive(Debug, Default)]
pub struct InputValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl InputValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a planning input document.
    ///
    /// # Errors
    ///
    /// Returns the first validation error found.
    pub fn validate(&self, input: &PlanningInput) -> Result<ValidationResult> {
        let result = self.check(input);

        if let Some(first_error) = result.errors.first() {
            return Err(PlacementError::Input(InputError::validation(
                first_error.message.clone(),
                first_error.field.clone(),
            )));
        }
        debug!("Planning input validation passed");
        Ok(result)
    }

    /// Collects every error and warning without failing.
    #[must_use]
    pub fn check(&self, input: &PlanningInput) -> ValidationResult {
        let mut result = ValidationResult::default();

        let azs: HashSet<&str> = unique_names(
            input.azs.iter().map(|az| az.name.as_str()),
            "azs",
            "availability zone",
            &mut result,
        );
        let networks: HashSet<&str> = unique_names(
            input.networks.iter().map(|n| n.name.as_str()),
            "networks",
            "network",
            &mut result,
        );

        for (i, network) in input.networks.iter().enumerate() {
            Self::validate_network(network, i, &azs, &mut result);
        }

        if input.instance_groups.is_empty() {
            result.warnings.push(String::from("No instance groups defined"));
        }
        unique_names(
            input.instance_groups.iter().map(|g| g.name.as_str()),
            "instance_groups",
            "instance group",
            &mut result,
        );
        for (i, group) in input.instance_groups.iter().enumerate() {
            Self::validate_group(group, i, &azs, &networks, &mut result);
        }

        result
    }

    fn validate_network(
        network: &NetworkConfig,
        index: usize,
        azs: &HashSet<&str>,
        result: &mut ValidationResult,
    ) {
        for (s, subnet) in network.subnets.iter().enumerate() {
            for (z, az) in subnet.azs.iter().enumerate() {
                if !azs.contains(az.as_str()) {
                    result.errors.push(ValidationError {
                        field: format!("networks[{index}].subnets[{s}].azs[{z}]"),
                        message: format!(
                            "Subnet {} of network '{}' references unknown availability zone '{az}'",
                            subnet.range, network.name
                        ),
                    });
                }
            }
        }
    }

    fn validate_group(
        group: &InstanceGroupConfig,
        index: usize,
        azs: &HashSet<&str>,
        networks: &HashSet<&str>,
        result: &mut ValidationResult,
    ) {
        let prefix = format!("instance_groups[{index}]");

        if let Some(group_azs) = &group.azs {
            for (z, az) in group_azs.iter().enumerate() {
                if !azs.contains(az.as_str()) {
                    result.errors.push(ValidationError {
                        field: format!("{prefix}.azs[{z}]"),
                        message: format!(
                            "Instance group '{}' references unknown availability zone '{az}'",
                            group.name
                        ),
                    });
                }
            }
        }

        if group.networks.is_empty() && group.instances > 0 {
            result.warnings.push(format!(
                "{prefix}.networks: Instance group '{}' declares no networks",
                group.name
            ));
        }

        let mut seen_networks = HashSet::new();
        for (n, network) in group.networks.iter().enumerate() {
            if !seen_networks.insert(network.name.as_str()) {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.networks[{n}].name"),
                    message: format!(
                        "Instance group '{}' attaches network '{}' twice",
                        group.name, network.name
                    ),
                });
            }
            if !networks.contains(network.name.as_str()) {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.networks[{n}].name"),
                    message: format!(
                        "Instance group '{}' references unknown network '{}'",
                        group.name, network.name
                    ),
                });
            }
            if let Some(entries) = &network.static_ips
                && let Err(e) = expand_static_ips(entries)
            {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.networks[{n}].static_ips"),
                    message: e.to_string(),
                });
            }
        }

        let mut seen_ids = HashSet::new();
        for (e, instance) in group.existing.iter().enumerate() {
            if !seen_ids.insert(instance.id.as_str()) {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.existing[{e}].id"),
                    message: format!(
                        "Duplicate instance id '{}' in instance group '{}'",
                        instance.id, group.name
                    ),
                });
            }
        }

        let ignored = group.ignored_count();
        if ignored > group.instances {
            result.warnings.push(format!(
                "{prefix}.instances: {} requested but {ignored} instance(s) are ignored",
                group.instances
            ));
        }
    }
}

/// Records duplicate and empty names and returns the set of names seen.
fn unique_names<'a>(
    names: impl Iterator<Item = &'a str>,
    field: &str,
    kind: &str,
    result: &mut ValidationResult,
) -> HashSet<&'a str> {
    let mut seen = HashSet::new();
    for (i, name) in names.enumerate() {
        if name.is_empty() {
            result.errors.push(ValidationError {
                field: format!("{field}[{i}].name"),
                message: format!("The {kind} name cannot be empty"),
            });
        } else if !seen.insert(name) {
            result.errors.push(ValidationError {
                field: format!("{field}[{i}].name"),
                message: format!("Duplicate {kind} name: {name}"),
            });
        }
    }
    seen
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}
