//! Guards for ignored instances, shared by both pickers.

use std::collections::BTreeSet;

use tracing::warn;

use super::model::{AvailabilityZone, ExistingInstance, JobNetwork};
use super::static_ips::NetworksToStaticIps;
use crate::error::{ImmutabilityViolation, Result};

/// Rejects plans that would change an ignored instance's networks, delete
/// it, or drop the zone it runs in. With static pools, every static IP an
/// ignored instance holds must still be declared.
pub(crate) fn validate_ignored_instances(
    job_name: &str,
    desired_count: usize,
    existing: &[ExistingInstance],
    job_networks: &[JobNetwork],
    desired_azs: Option<&[AvailabilityZone]>,
    static_ips: Option<&NetworksToStaticIps>,
) -> Result<()> {
    let ignored: Vec<&ExistingInstance> = existing.iter().filter(|e| e.ignore).collect();
    if ignored.is_empty() {
        return Ok(());
    }

    let desired_networks: BTreeSet<&str> = job_networks.iter().map(|n| n.name.as_str()).collect();
    for instance in &ignored {
        let current: BTreeSet<&str> = instance.network_names().collect();
        if current != desired_networks {
            warn!(
                "Ignored instance '{}' is on networks {:?}, instance group wants {:?}",
                instance.id, current, desired_networks
            );
            return Err(ImmutabilityViolation::ignored(format!(
                "In instance group '{job_name}', which contains ignored vms, an attempt was made to modify the networks. This operation is not allowed."
            ))
            .into());
        }

        if let Some(pools) = static_ips {
            for (network, ip) in &instance.ips {
                if pools.pool(network).is_some_and(|p| !p.contains(ip)) {
                    warn!(
                        "Static IP {} of ignored instance '{}' was removed from network '{}'",
                        ip, instance.id, network
                    );
                    return Err(removed_static_ip(job_name).into());
                }
            }
        }
    }

    if desired_count < ignored.len() {
        return Err(ImmutabilityViolation::ignored(format!(
            "Instance Group '{job_name}' has {} ignored instance(s). {desired_count} instance(s) of that instance group were requested. Deleting ignored instances is not allowed.",
            ignored.len()
        ))
        .into());
    }

    if let Some(azs) = desired_azs.filter(|azs| !azs.is_empty()) {
        let mut missing: Vec<String> = Vec::new();
        for instance in &ignored {
            let kept = instance
                .az
                .as_ref()
                .is_some_and(|name| azs.iter().any(|az| &az.name == name));
            if !kept {
                let name = instance.az.clone().unwrap_or_default();
                if !missing.contains(&name) {
                    missing.push(name);
                }
            }
        }
        if !missing.is_empty() {
            return Err(ImmutabilityViolation::ignored(format!(
                "Instance Group '{job_name}' no longer contains AZs {missing:?} where ignored instance(s) exist."
            ))
            .into());
        }
    }

    Ok(())
}

/// The error raised when an ignored instance would lose one of its static IPs.
pub(crate) fn changed_static_ip(job_name: &str, instance: &str) -> ImmutabilityViolation {
    ImmutabilityViolation::ignored(format!(
        "In instance group '{job_name}', an attempt was made to change a static ip of ignored instance '{instance}'. This operation is not allowed."
    ))
}

/// The error raised when a static IP held by an ignored instance is gone.
pub(crate) fn removed_static_ip(job_name: &str) -> ImmutabilityViolation {
    ImmutabilityViolation::ignored(format!(
        "In instance group '{job_name}', an attempt was made to remove a static ip that is used by an ignored instance. This operation is not allowed."
    ))
}
