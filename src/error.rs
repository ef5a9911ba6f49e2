//! Error types for the placement planner.
//!
//! This module provides the error hierarchy for every stage of a planning
//! call: loading the planning input, validating static IP declarations,
//! guarding ignored instances, and reserving static IPs.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the placement planner.
#[derive(Debug, Error)]
pub enum PlacementError {
    /// The instance group declares AZs or static IPs inconsistently.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// The plan would alter an ignored instance.
    #[error("Immutability violation: {0}")]
    Immutability(#[from] ImmutabilityViolation),

    /// Static IPs cannot be reserved without overlap.
    #[error("Reservation conflict: {0}")]
    Reservation(#[from] ReservationConflict),

    /// The planning input document is malformed.
    #[error("Input error: {0}")]
    Input(#[from] InputError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while validating an instance group's AZ and static IP declarations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    /// Subnets carrying the job's static IPs declare AZs but the job declares none.
    #[error("Instance group '{job}' subnets declare availability zones and the instance group does not")]
    JobInvalidAvailabilityZone {
        /// Name of the instance group.
        job: String,
    },

    /// A static IP belongs to a subnet outside every desired AZ.
    #[error("Instance group '{job}' declares static ip '{ip}' which belongs to no desired availability zones")]
    JobStaticIpsFromInvalidAvailabilityZone {
        /// Name of the instance group.
        job: String,
        /// The offending static IP.
        ip: String,
    },

    /// Static IPs do not line up with the declared subnets.
    #[error("{message}")]
    JobNetworkInstanceIpMismatch {
        /// Description of the mismatch.
        message: String,
    },
}

/// Errors raised when a plan would change an ignored instance.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImmutabilityViolation {
    /// AZ, network membership, IPs or count of ignored instances would change.
    #[error("{message}")]
    DeploymentIgnoredInstancesModification {
        /// Description of the attempted modification.
        message: String,
    },
}

/// Errors raised while reserving static IPs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReservationConflict {
    /// Stable static IP reuse cannot be satisfied.
    #[error("{message}")]
    NetworkReservationError {
        /// Description of the conflict.
        message: String,
    },
}

/// Errors in the planning input document.
#[derive(Debug, Error)]
pub enum InputError {
    /// The input file was not found.
    #[error("Input file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The input file could not be parsed.
    #[error("Failed to parse planning input: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// An IP address, IP range or CIDR could not be parsed.
    #[error("Invalid address '{value}': {reason}")]
    InvalidAddress {
        /// The value that failed to parse.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A name references an AZ or network that is not declared.
    #[error("Unknown {kind} '{name}' referenced by {referenced_by}")]
    UnknownReference {
        /// Kind of resource (availability zone, network).
        kind: String,
        /// The missing name.
        name: String,
        /// Where the reference was found.
        referenced_by: String,
    },

    /// Validation of the document failed.
    #[error("Planning input validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },
}

/// Result type alias for planner operations.
pub type Result<T> = std::result::Result<T, PlacementError>;

impl PlacementError {
    /// Returns true if this error is retryable.
    ///
    /// Planning is a single deterministic pass; re-running it with the
    /// same inputs fails the same way.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        false
    }

    /// Returns true if the operator has to edit the manifest or static IP pools.
    #[must_use]
    pub const fn requires_manifest_change(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Reservation(_))
    }
}

impl ConfigurationError {
    /// Creates an IP mismatch error for a static IP that belongs to no subnet.
    #[must_use]
    pub fn ip_outside_subnets(job: &str, network: &str, ip: impl std::fmt::Display) -> Self {
        Self::JobNetworkInstanceIpMismatch {
            message: format!(
                "Instance group '{job}' with network '{network}' declares static ip '{ip}', which belongs to no subnet"
            ),
        }
    }

    /// Creates an IP mismatch error for static IPs that cannot be split evenly per AZ.
    #[must_use]
    pub fn uneven_static_ips(job: &str) -> Self {
        Self::JobNetworkInstanceIpMismatch {
            message: format!(
                "Failed to evenly distribute static IPs between zones for instance group '{job}': \
                 networks must declare the same number of static IPs per AZ in each network"
            ),
        }
    }
}

impl ImmutabilityViolation {
    /// Creates a modification error with the given message.
    #[must_use]
    pub fn ignored(message: impl Into<String>) -> Self {
        Self::DeploymentIgnoredInstancesModification {
            message: message.into(),
        }
    }
}

impl ReservationConflict {
    /// The conflict raised when existing reservations overlap.
    #[must_use]
    pub fn unsatisfiable() -> Self {
        Self::NetworkReservationError {
            message: String::from(
                "Failed to distribute static IPs to satisfy existing instance reservations",
            ),
        }
    }
}

impl InputError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates an invalid-address error.
    #[must_use]
    pub fn invalid_address(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            value: value.into(),
            reason: reason.into(),
        }
    }
}
