//! Planning input specification types.
//!
//! This module defines the structs that map to the planning input
//! document: declared zones and networks, and per instance group the
//! desired count, zones, networks and the instances that exist today.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;

use super::parser::expand_static_ips;
use crate::error::{InputError, Result};
use crate::planner::{
    AvailabilityZone, Cidr, ExistingInstance, JobNetwork, PersistentDisk, PlacementPlan, Subnet,
};

/// The root structure of a planning input document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanningInput {
    /// Zones declared by the deployment.
    #[serde(default)]
    pub azs: Vec<AvailabilityZone>,
    /// Networks declared by the deployment.
    #[serde(default)]
    pub networks: Vec<NetworkConfig>,
    /// Instance groups to plan.
    #[serde(default)]
    pub instance_groups: Vec<InstanceGroupConfig>,
}

/// A deployment network.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Network name.
    pub name: String,
    /// Subnets of the network.
    #[serde(default)]
    pub subnets: Vec<SubnetConfig>,
}

/// A subnet of a deployment network.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubnetConfig {
    /// Address range in CIDR notation.
    pub range: Cidr,
    /// Zones this subnet is reachable from.
    #[serde(default)]
    pub azs: Vec<String>,
}

/// An instance group and its current instances.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstanceGroupConfig {
    /// Instance group name.
    pub name: String,
    /// Number of desired instances.
    pub instances: usize,
    /// Desired zones. Absent means zones are not in use.
    #[serde(default)]
    pub azs: Option<Vec<String>>,
    /// Networks the group attaches to.
    #[serde(default)]
    pub networks: Vec<JobNetworkConfig>,
    /// Instances that exist today.
    #[serde(default)]
    pub existing: Vec<ExistingInstanceConfig>,
}

/// A network attachment of an instance group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobNetworkConfig {
    /// Name of a declared network.
    pub name: String,
    /// Static IPs or `"a - b"` ranges. Absent for dynamic networks.
    #[serde(default)]
    pub static_ips: Option<Vec<String>>,
}

/// An instance as recorded by the deployment state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExistingInstanceConfig {
    /// Instance id.
    pub id: String,
    /// Group the instance was created for. Defaults to the enclosing group.
    #[serde(default)]
    pub instance_group: Option<String>,
    /// Current index.
    pub index: u32,
    /// Current zone.
    #[serde(default)]
    pub az: Option<String>,
    /// Whether the operator froze this instance.
    #[serde(default)]
    pub ignore: bool,
    /// Addresses held, keyed by network name.
    #[serde(default)]
    pub ips: BTreeMap<String, IpAddr>,
    /// Attached persistent disks.
    #[serde(default)]
    pub persistent_disks: Vec<PersistentDisk>,
}

impl PlanningInput {
    /// Looks up an instance group by name.
    #[must_use]
    pub fn group(&self, name: &str) -> Option<&InstanceGroupConfig> {
        self.instance_groups.iter().find(|g| g.name == name)
    }

    /// Looks up a network by name.
    #[must_use]
    pub fn network(&self, name: &str) -> Option<&NetworkConfig> {
        self.networks.iter().find(|n| n.name == name)
    }

    /// Resolves the desired zones of a group against the declared zones.
    ///
    /// # Errors
    ///
    /// Returns `UnknownReference` for an undeclared zone.
    pub fn desired_azs(
        &self,
        group: &InstanceGroupConfig,
    ) -> Result<Option<Vec<AvailabilityZone>>> {
        let Some(names) = &group.azs else {
            return Ok(None);
        };

        names
            .iter()
            .map(|name| -> Result<AvailabilityZone> {
                let az = self.azs.iter().find(|az| &az.name == name).ok_or_else(|| {
                    InputError::UnknownReference {
                        kind: String::from("availability zone"),
                        name: name.clone(),
                        referenced_by: format!("instance group '{}'", group.name),
                    }
                })?;
                Ok(az.clone())
            })
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }

    /// Resolves a group's network attachments into job networks.
    ///
    /// # Errors
    ///
    /// Returns `UnknownReference` for an undeclared network and
    /// `InvalidAddress` for a malformed static IP entry.
    pub fn job_networks(&self, group: &InstanceGroupConfig) -> Result<Vec<JobNetwork>> {
        group
            .networks
            .iter()
            .map(|attachment| -> Result<JobNetwork> {
                let network = self.network(&attachment.name).ok_or_else(|| {
                    InputError::UnknownReference {
                        kind: String::from("network"),
                        name: attachment.name.clone(),
                        referenced_by: format!("instance group '{}'", group.name),
                    }
                })?;

                let static_ips = attachment
                    .static_ips
                    .as_deref()
                    .map(expand_static_ips)
                    .transpose()?;

                Ok(JobNetwork {
                    name: network.name.clone(),
                    static_ips,
                    subnets: network
                        .subnets
                        .iter()
                        .map(|s| Subnet {
                            range: s.range,
                            azs: s.azs.clone(),
                        })
                        .collect(),
                })
            })
            .collect()
    }

    /// Plans one instance group.
    ///
    /// # Errors
    ///
    /// Returns input errors from resolution and any planner error.
    pub fn plan_group(&self, group: &InstanceGroupConfig) -> Result<PlacementPlan> {
        let azs = self.desired_azs(group)?;
        let networks = self.job_networks(group)?;
        let existing = group.existing_instances();

        PlacementPlan::build(&group.name, group.instances, &existing, &networks, azs.as_deref())
    }

    /// Plans every instance group in document order.
    ///
    /// # Errors
    ///
    /// Returns the first error of any group.
    pub fn plan_all(&self) -> Result<Vec<PlacementPlan>> {
        self.instance_groups.iter().map(|g| self.plan_group(g)).collect()
    }
}

impl InstanceGroupConfig {
    /// Converts the recorded instances into planner instances.
    #[must_use]
    pub fn existing_instances(&self) -> Vec<ExistingInstance> {
        self.existing.iter().map(|e| e.to_instance(&self.name)).collect()
    }

    /// Number of ignored instances.
    #[must_use]
    pub fn ignored_count(&self) -> usize {
        self.existing.iter().filter(|e| e.ignore).count()
    }
}

impl ExistingInstanceConfig {
    /// Converts this record into a planner instance.
    #[must_use]
    pub fn to_instance(&self, group_name: &str) -> ExistingInstance {
        ExistingInstance {
            id: self.id.clone(),
            instance_group: self
                .instance_group
                .clone()
                .unwrap_or_else(|| group_name.to_string()),
            index: self.index,
            az: self.az.clone(),
            ignore: self.ignore,
            ips: self.ips.clone(),
            persistent_disks: self.persistent_disks.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlacementError;

    fn input() -> PlanningInput {
        PlanningInput {
            azs: vec![AvailabilityZone::new("z1"), AvailabilityZone::new("z2")],
            networks: vec![NetworkConfig {
                name: String::from("private"),
                subnets: vec![
                    SubnetConfig {
                        range: "10.0.1.0/24".parse().unwrap(),
                        azs: vec![String::from("z1")],
                    },
                    SubnetConfig {
                        range: "10.0.2.0/24".parse().unwrap(),
                        azs: vec![String::from("z2")],
                    },
                ],
            }],
            instance_groups: vec![InstanceGroupConfig {
                name: String::from("web"),
                instances: 2,
                azs: Some(vec![String::from("z1"), String::from("z2")]),
                networks: vec![JobNetworkConfig {
                    name: String::from("private"),
                    static_ips: Some(vec![String::from("10.0.1.10"), String::from("10.0.2.10")]),
                }],
                existing: vec![ExistingInstanceConfig {
                    id: String::from("web-0"),
                    instance_group: None,
                    index: 0,
                    az: Some(String::from("z2")),
                    ignore: false,
                    ips: BTreeMap::from([(String::from("private"), "10.0.2.10".parse().unwrap())]),
                    persistent_disks: vec![PersistentDisk { active: true }],
                }],
            }],
        }
    }

    #[test]
    fn test_resolve_group() {
        let input = input();
        let group = input.group("web").unwrap();

        let azs = input.desired_azs(group).unwrap().unwrap();
        assert_eq!(azs.len(), 2);

        let networks = input.job_networks(group).unwrap();
        assert_eq!(networks.len(), 1);
        assert!(networks[0].is_static());
        assert_eq!(networks[0].subnets.len(), 2);

        let existing = group.existing_instances();
        assert_eq!(existing[0].instance_group, "web");
        assert!(existing[0].has_active_disk());
    }

    #[test]
    fn test_absent_azs_are_not_in_use() {
        let mut input = input();
        input.instance_groups[0].azs = None;
        let group = &input.instance_groups[0];
        assert_eq!(input.desired_azs(group).unwrap(), None);
    }

    #[test]
    fn test_unknown_network() {
        let mut input = input();
        input.instance_groups[0].networks[0].name = String::from("public");
        let group = &input.instance_groups[0];

        let err = input.job_networks(group).unwrap_err();
        assert!(matches!(
            err,
            PlacementError::Input(InputError::UnknownReference { ref name, .. }) if name == "public"
        ));
    }

    #[test]
    fn test_plan_group() {
        let input = input();
        let plan = input.plan_group(&input.instance_groups[0]).unwrap();

        assert_eq!(plan.existing_count(), 1);
        assert_eq!(plan.new_count(), 1);
        assert_eq!(plan.plans[0].az(), Some("z2"));
        assert_eq!(plan.plans[1].az(), Some("z1"));
    }
}
