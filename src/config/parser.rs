//! Planning input parser.
//!
//! This module loads the planning input document from YAML (JSON is
//! accepted as a subset) and expands static IP range notation.

use crate::error::{InputError, PlacementError, Result};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::spec::PlanningInput;

/// Upper bound on the number of addresses a single range may expand to.
pub const MAX_RANGE_SIZE: u128 = 65_536;

/// Parser for planning input documents.
#[derive(Debug, Default)]
pub struct InputParser;

impl InputParser {
    /// Creates a new input parser.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Loads a planning input from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<PlanningInput> {
        let path = path.as_ref();
        info!("Loading planning input from: {}", path.display());

        if !path.exists() {
            return Err(PlacementError::Input(InputError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            PlacementError::Input(InputError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses a planning input from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<PlanningInput> {
        debug!("Parsing planning input");

        let input: PlanningInput = serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            PlacementError::Input(InputError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        debug!(
            "Parsed {} instance group(s), {} zone(s), {} network(s)",
            input.instance_groups.len(),
            input.azs.len(),
            input.networks.len()
        );
        Ok(input)
    }
}

/// Default input file names to search for.
pub const DEFAULT_INPUT_FILES: &[&str] = &[
    "fleetplan.yaml",
    "fleetplan.yml",
    "placement.yaml",
    "placement.yml",
];

/// Finds the input file in the given directory or its parents.
///
/// # Errors
///
/// Returns an error if no input file is found.
pub fn find_input_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_INPUT_FILES {
            let input_path = current.join(filename);
            if input_path.exists() {
                info!("Found planning input: {}", input_path.display());
                return Ok(input_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(PlacementError::Input(InputError::FileNotFound {
        path: start.join(DEFAULT_INPUT_FILES[0]),
    }))
}

/// Expands static IP entries into a sorted, duplicate-free address list.
///
/// Each entry is a single address or an inclusive range `a - b`.
///
/// # Errors
///
/// Returns `InvalidAddress` for an unparsable entry, a range mixing
/// address families, a reversed range or an oversized range.
pub fn expand_static_ips(entries: &[String]) -> std::result::Result<Vec<IpAddr>, InputError> {
    let mut ips = Vec::new();
    for entry in entries {
        match entry.split_once('-') {
            Some((start, end)) => ips.extend(expand_range(entry, start.trim(), end.trim())?),
            None => ips.push(parse_ip(entry, entry.trim())?),
        }
    }

    ips.sort_unstable();
    ips.dedup();
    Ok(ips)
}

fn parse_ip(entry: &str, value: &str) -> std::result::Result<IpAddr, InputError> {
    value
        .parse()
        .map_err(|_| InputError::invalid_address(entry, "not an IP address"))
}

fn expand_range(
    entry: &str,
    start: &str,
    end: &str,
) -> std::result::Result<Vec<IpAddr>, InputError> {
    let (start, end) = (parse_ip(entry, start)?, parse_ip(entry, end)?);

    let (low, high) = match (start, end) {
        (IpAddr::V4(a), IpAddr::V4(b)) => (u128::from(u32::from(a)), u128::from(u32::from(b))),
        (IpAddr::V6(a), IpAddr::V6(b)) => (u128::from(a), u128::from(b)),
        _ => return Err(InputError::invalid_address(entry, "range mixes IPv4 and IPv6")),
    };

    if low > high {
        return Err(InputError::invalid_address(entry, "range start is after range end"));
    }
    if high - low >= MAX_RANGE_SIZE {
        return Err(InputError::invalid_address(
            entry,
            format!("range holds more than {MAX_RANGE_SIZE} addresses"),
        ));
    }

    let v4 = start.is_ipv4();
    Ok((low..=high)
        .map(|n| {
            if v4 {
                // Bounded by u32 values above.
                IpAddr::V4(Ipv4Addr::from(n as u32))
            } else {
                IpAddr::V6(Ipv6Addr::from(n))
            }
        })
        .collect())
}
