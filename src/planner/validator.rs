//! Consistency checks between static IPs, subnets and desired zones.

use super::model::{AvailabilityZone, azs_in_use};
use super::static_ips::NetworksToStaticIps;
use crate::error::ConfigurationError;

/// Rejects static IPs whose subnets declare zones when the instance group
/// declares none.
///
/// # Errors
///
/// Returns `JobInvalidAvailabilityZone`.
pub fn validate_azs_declared(
    job_name: &str,
    networks: &NetworksToStaticIps,
    desired_azs: Option<&[AvailabilityZone]>,
) -> Result<(), ConfigurationError> {
    if azs_in_use(desired_azs) {
        return Ok(());
    }

    let zoned = networks
        .pools
        .iter()
        .flat_map(|p| &p.entries)
        .any(|e| !e.subnet_azs.is_empty());

    if zoned {
        return Err(ConfigurationError::JobInvalidAvailabilityZone {
            job: job_name.to_string(),
        });
    }
    Ok(())
}

/// Rejects static IPs whose subnets reach none of the desired zones.
///
/// # Errors
///
/// Returns `JobStaticIpsFromInvalidAvailabilityZone` naming the first
/// offending IP.
pub fn validate_ips_in_desired_azs(
    job_name: &str,
    networks: &NetworksToStaticIps,
    desired_azs: Option<&[AvailabilityZone]>,
) -> Result<(), ConfigurationError> {
    let Some(azs) = desired_azs.filter(|azs| !azs.is_empty()) else {
        return Ok(());
    };

    for entry in networks.pools.iter().flat_map(|p| &p.entries) {
        if entry.subnet_azs.is_empty() {
            continue;
        }
        let reachable = entry
            .subnet_azs
            .iter()
            .any(|name| azs.iter().any(|az| &az.name == name));
        if !reachable {
            return Err(ConfigurationError::JobStaticIpsFromInvalidAvailabilityZone {
                job: job_name.to_string(),
                ip: entry.ip.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::model::{JobNetwork, Subnet};

    fn pools(subnet_azs: &[&str], desired: Option<&[AvailabilityZone]>) -> NetworksToStaticIps {
        let network = JobNetwork {
            name: String::from("a"),
            static_ips: Some(vec!["10.0.0.10".parse().unwrap(), "10.0.0.11".parse().unwrap()]),
            subnets: vec![Subnet {
                range: "10.0.0.0/24".parse().unwrap(),
                azs: subnet_azs.iter().map(ToString::to_string).collect(),
            }],
        };
        NetworksToStaticIps::create("web", &[network], desired).unwrap()
    }

    #[test]
    fn test_azs_declared_requires_job_azs() {
        let networks = pools(&["z1"], None);
        let err = validate_azs_declared("web", &networks, None).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::JobInvalidAvailabilityZone {
                job: String::from("web")
            }
        );
        assert_eq!(
            err.to_string(),
            "Instance group 'web' subnets declare availability zones and the instance group does not"
        );
        assert!(validate_azs_declared("web", &networks, Some(&[][..])).is_err());
    }

    #[test]
    fn test_azs_declared_passes_without_subnet_azs() {
        let networks = pools(&[], None);
        assert!(validate_azs_declared("web", &networks, None).is_ok());
    }

    #[test]
    fn test_ips_in_desired_azs() {
        let desired = vec![AvailabilityZone::new("z2")];
        let networks = pools(&["z1"], Some(desired.as_slice()));
        let err =
            validate_ips_in_desired_azs("web", &networks, Some(desired.as_slice())).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Instance group 'web' declares static ip '10.0.0.10' which belongs to no desired availability zones"
        );

        let desired = vec![AvailabilityZone::new("z2"), AvailabilityZone::new("z1")];
        let networks = pools(&["z1"], Some(desired.as_slice()));
        assert!(validate_ips_in_desired_azs("web", &networks, Some(desired.as_slice())).is_ok());
    }
}
