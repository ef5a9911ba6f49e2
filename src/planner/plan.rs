//! Instance plan construction.
//!
//! This module ties the pickers and the index assigner together and
//! provides the per-group plan summary used by the CLI.

use serde::Serialize;
use tracing::info;

use crate::error::Result;

use super::az_picker;
use super::index_assigner::assign_indices;
use super::model::{
    AvailabilityZone, DesiredInstance, ExistingInstance, InstancePlan, JobNetwork, Placement,
};
use super::static_ips_az_picker;

/// Plans one instance group.
///
/// Static IP placement is used when any network declares static IPs. The
/// result lists kept instances in slot order, then new instances in slot
/// order, then obsolete instances in input order.
///
/// # Errors
///
/// Returns the first configuration, immutability or reservation error
/// raised by validation or placement. No partial plan is produced.
pub fn create_instance_plans(
    desired: Vec<DesiredInstance>,
    existing: &[ExistingInstance],
    job_networks: &[JobNetwork],
    azs: Option<&[AvailabilityZone]>,
    job_name: &str,
) -> Result<Vec<InstancePlan>> {
    let placement = if job_networks.iter().any(JobNetwork::is_static) {
        static_ips_az_picker::place_and_match(job_name, desired, existing, job_networks, azs)?
    } else {
        az_picker::place_and_match(job_name, desired, existing, job_networks, azs)?
    };

    Ok(into_plans(assign_indices(placement), existing))
}

fn into_plans(placement: Placement, existing: &[ExistingInstance]) -> Vec<InstancePlan> {
    let Placement {
        mut desired_new,
        mut desired_existing,
        mut obsolete,
    } = placement;

    desired_existing.sort_by_key(|e| e.slot);
    desired_new.sort_by_key(|n| n.slot);
    obsolete.sort_by_key(|o| existing.iter().position(|e| e.id == o.id));

    let mut plans = Vec::with_capacity(desired_existing.len() + desired_new.len() + obsolete.len());
    plans.extend(desired_existing.into_iter().map(|e| InstancePlan::Existing {
        desired: e.desired,
        existing: e.existing,
        reservations: e.reservations,
    }));
    plans.extend(desired_new.into_iter().map(|n| InstancePlan::New {
        desired: n.desired,
        reservations: n.reservations,
    }));
    plans.extend(
        obsolete
            .into_iter()
            .map(|existing| InstancePlan::Obsolete { existing }),
    );
    plans
}

/// The plan of one instance group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlacementPlan {
    /// Instance group name.
    pub instance_group: String,
    /// Ordered instance plans.
    pub plans: Vec<InstancePlan>,
}

impl PlacementPlan {
    /// Plans `instances` slots of an instance group.
    ///
    /// # Errors
    ///
    /// See [`create_instance_plans`].
    pub fn build(
        instance_group: &str,
        instances: usize,
        existing: &[ExistingInstance],
        job_networks: &[JobNetwork],
        azs: Option<&[AvailabilityZone]>,
    ) -> Result<Self> {
        let desired = (0..instances)
            .map(|_| DesiredInstance::new(instance_group))
            .collect();
        let plans = create_instance_plans(desired, existing, job_networks, azs, instance_group)?;

        let plan = Self {
            instance_group: instance_group.to_string(),
            plans,
        };
        info!(
            "Planned instance group '{}': {} to create, {} to keep, {} to delete",
            plan.instance_group,
            plan.new_count(),
            plan.existing_count(),
            plan.obsolete_count()
        );
        Ok(plan)
    }

    /// Number of instances to create.
    #[must_use]
    pub fn new_count(&self) -> usize {
        self.plans.iter().filter(|p| p.is_new()).count()
    }

    /// Number of instances kept.
    #[must_use]
    pub fn existing_count(&self) -> usize {
        self.plans.iter().filter(|p| p.is_existing()).count()
    }

    /// Number of instances to delete.
    #[must_use]
    pub fn obsolete_count(&self) -> usize {
        self.plans.iter().filter(|p| p.is_obsolete()).count()
    }

    /// Returns true if nothing is created or deleted.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.new_count() == 0 && self.obsolete_count() == 0
    }
}

impl std::fmt::Display for InstancePlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self.existing() {
            Some(existing) => existing.id.as_str(),
            None => "(new)",
        };
        write!(f, "{} {}", self.action(), name)?;
        if let Some(index) = self.index() {
            write!(f, " index={index}")?;
        }
        if let Some(az) = self.az() {
            write!(f, " az={az}")?;
        }
        for reservation in self.reservations() {
            write!(f, " {reservation}")?;
        }
        Ok(())
    }
}

impl std::fmt::Display for PlacementPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.plans.is_empty() {
            return write!(f, "Instance group '{}' has no instances", self.instance_group);
        }

        writeln!(
            f,
            "Instance group '{}' ({} create, {} keep, {} delete):",
            self.instance_group,
            self.new_count(),
            self.existing_count(),
            self.obsolete_count()
        )?;
        for (i, plan) in self.plans.iter().enumerate() {
            writeln!(f, "  {i}. {plan}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::net::IpAddr;

    use super::*;
    use crate::error::{ImmutabilityViolation, PlacementError};
    use crate::planner::model::{Reservation, Subnet};

    fn desired(n: usize) -> Vec<DesiredInstance> {
        (0..n).map(|_| DesiredInstance::new("web")).collect()
    }

    fn zones(names: &[&str]) -> Vec<AvailabilityZone> {
        names.iter().map(|n| AvailabilityZone::new(*n)).collect()
    }

    fn dynamic() -> Vec<JobNetwork> {
        vec![JobNetwork::dynamic("default")]
    }

    fn ids(plans: &[InstancePlan], pred: fn(&InstancePlan) -> bool) -> Vec<String> {
        plans
            .iter()
            .filter(|p| pred(*p))
            .filter_map(|p| p.existing().map(|e| e.id.clone()))
            .collect()
    }

    fn assert_counts(plans: &[InstancePlan], desired: usize, existing: usize) {
        let new = plans.iter().filter(|p| p.is_new()).count();
        let kept = plans.iter().filter(|p| p.is_existing()).count();
        let obsolete = plans.iter().filter(|p| p.is_obsolete()).count();
        assert_eq!(new + kept, desired);
        assert_eq!(kept + obsolete, existing);
    }

    fn assert_unique_indices(plans: &[InstancePlan]) {
        let indices: Vec<u32> = plans
            .iter()
            .filter(|p| !p.is_obsolete())
            .map(|p| p.index().unwrap())
            .collect();
        let unique: BTreeSet<u32> = indices.iter().copied().collect();
        assert_eq!(unique.len(), indices.len());
    }

    #[test]
    fn test_no_azs_reuses_and_creates() {
        let existing = vec![
            ExistingInstance::new("e0", "web", 0),
            ExistingInstance::new("e1", "web", 1),
        ];
        let plans = create_instance_plans(desired(3), &existing, &dynamic(), None, "web").unwrap();

        assert_counts(&plans, 3, 2);
        assert_eq!(ids(&plans, InstancePlan::is_existing), vec!["e0", "e1"]);
        assert_eq!(plans[0].index(), Some(0));
        assert_eq!(plans[1].index(), Some(1));
        assert!(plans[2].is_new());
        assert_eq!(plans[2].index(), Some(2));
    }

    #[test]
    fn test_scale_down_keeps_lower_index() {
        let existing = vec![
            ExistingInstance::new("e1", "web", 1),
            ExistingInstance::new("e0", "web", 0),
        ];
        let plans = create_instance_plans(desired(1), &existing, &dynamic(), None, "web").unwrap();

        assert_counts(&plans, 1, 2);
        assert_eq!(ids(&plans, InstancePlan::is_existing), vec!["e0"]);
        assert_eq!(ids(&plans, InstancePlan::is_obsolete), vec!["e1"]);
    }

    #[test]
    fn test_active_disk_is_retained() {
        let azs = zones(&["az1"]);
        let existing = vec![
            ExistingInstance::new("e0", "web", 0).in_az("az1").with_disk(true),
            ExistingInstance::new("e1", "web", 1).in_az("az1").with_disk(false),
        ];
        let plans = create_instance_plans(
            desired(1),
            &existing,
            &dynamic(),
            Some(azs.as_slice()),
            "web",
        )
        .unwrap();

        assert_eq!(ids(&plans, InstancePlan::is_existing), vec!["e0"]);
        assert_eq!(ids(&plans, InstancePlan::is_obsolete), vec!["e1"]);
    }

    #[test]
    fn test_static_ips_in_one_zone() {
        let azs = zones(&["zone1"]);
        let ips: Vec<IpAddr> = ["192.168.1.10", "192.168.1.11", "192.168.1.12"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        let networks = vec![JobNetwork {
            name: String::from("a"),
            static_ips: Some(ips.clone()),
            subnets: vec![Subnet {
                range: "192.168.1.0/24".parse().unwrap(),
                azs: vec![String::from("zone1")],
            }],
        }];
        let plans =
            create_instance_plans(desired(3), &[], &networks, Some(azs.as_slice()), "web").unwrap();

        assert_eq!(plans.len(), 3);
        for (plan, expected) in plans.iter().zip(&ips) {
            assert!(plan.is_new());
            assert_eq!(plan.az(), Some("zone1"));
            assert_eq!(
                plan.reservations(),
                &[Reservation::Static {
                    network: String::from("a"),
                    ip: *expected
                }]
            );
        }
    }

    #[test]
    fn test_duplicate_indices_are_resolved() {
        let existing = vec![
            ExistingInstance::new("e0", "web", 1),
            ExistingInstance::new("e1", "web", 1),
            ExistingInstance::new("e2", "web", 1),
            ExistingInstance::new("e3", "web", 2),
        ];
        let plans = create_instance_plans(desired(6), &existing, &dynamic(), None, "web").unwrap();
        assert_unique_indices(&plans);

        let kept: BTreeSet<u32> = plans
            .iter()
            .filter(|p| p.is_existing())
            .filter_map(InstancePlan::index)
            .collect();
        let created: BTreeSet<u32> = plans
            .iter()
            .filter(|p| p.is_new())
            .filter_map(InstancePlan::index)
            .collect();
        assert_eq!(kept, BTreeSet::from([0, 1, 2, 3]));
        assert_eq!(created, BTreeSet::from([4, 5]));
    }

    #[test]
    fn test_ignored_instance_in_removed_az() {
        let azs = zones(&["az2"]);
        let existing = vec![
            ExistingInstance::new("e0", "web", 0)
                .in_az("az1")
                .ignored()
                .with_ip("default", "10.0.0.5".parse().unwrap()),
        ];
        let err = create_instance_plans(
            desired(1),
            &existing,
            &dynamic(),
            Some(azs.as_slice()),
            "web",
        )
        .unwrap_err();

        match err {
            PlacementError::Immutability(
                ImmutabilityViolation::DeploymentIgnoredInstancesModification { message },
            ) => {
                assert!(message.contains("'web'"));
                assert!(message.contains("az1"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_ignored_instance_is_unchanged() {
        let azs = zones(&["az1", "az2"]);
        let ip: IpAddr = "10.0.0.5".parse().unwrap();
        let existing = vec![
            ExistingInstance::new("e0", "web", 4).in_az("az2").ignored().with_ip("default", ip),
            ExistingInstance::new("e1", "web", 0).in_az("az1"),
        ];
        let plans = create_instance_plans(
            desired(3),
            &existing,
            &dynamic(),
            Some(azs.as_slice()),
            "web",
        )
        .unwrap();

        let ignored = plans
            .iter()
            .find(|p| p.existing().is_some_and(|e| e.id == "e0"))
            .unwrap();
        assert!(ignored.is_existing());
        assert_eq!(ignored.az(), Some("az2"));
        assert_eq!(ignored.index(), Some(4));
        assert_eq!(ignored.reservations()[0].ip(), Some(ip));
    }

    #[test]
    fn test_az_evenness() {
        let azs = zones(&["z1", "z2", "z3"]);
        let existing: Vec<ExistingInstance> = (0..4)
            .map(|i| ExistingInstance::new(format!("e{i}"), "web", i).in_az("z1"))
            .collect();
        let plans = create_instance_plans(
            desired(7),
            &existing,
            &dynamic(),
            Some(azs.as_slice()),
            "web",
        )
        .unwrap();

        assert_counts(&plans, 7, 4);
        assert_unique_indices(&plans);
        let per_zone: Vec<usize> = ["z1", "z2", "z3"]
            .iter()
            .map(|z| plans.iter().filter(|p| !p.is_obsolete() && p.az() == Some(*z)).count())
            .collect();
        let max = per_zone.iter().max().unwrap();
        let min = per_zone.iter().min().unwrap();
        assert!(max - min <= 1, "uneven distribution {per_zone:?}");
    }

    #[test]
    fn test_identical_inputs_give_identical_plans() {
        let azs = zones(&["z1", "z2"]);
        let existing = vec![
            ExistingInstance::new("e2", "web", 2).in_az("z2"),
            ExistingInstance::new("e0", "web", 0).in_az("z1").with_disk(true),
            ExistingInstance::new("e5", "web", 5).in_az("z3"),
        ];
        let first = create_instance_plans(
            desired(4),
            &existing,
            &dynamic(),
            Some(azs.as_slice()),
            "web",
        )
        .unwrap();
        let second = create_instance_plans(
            desired(4),
            &existing,
            &dynamic(),
            Some(azs.as_slice()),
            "web",
        )
        .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_output_order_and_obsolete_input_order() {
        let azs = zones(&["z1"]);
        let existing = vec![
            ExistingInstance::new("gone-b", "web", 3).in_az("z9"),
            ExistingInstance::new("keep", "web", 0).in_az("z1"),
            ExistingInstance::new("gone-a", "web", 1).in_az("z9"),
        ];
        let plans = create_instance_plans(
            desired(2),
            &existing,
            &dynamic(),
            Some(azs.as_slice()),
            "web",
        )
        .unwrap();

        let actions: Vec<&str> = plans.iter().map(InstancePlan::action).collect();
        assert_eq!(actions, vec!["keep", "create", "delete", "delete"]);
        assert_eq!(ids(&plans, InstancePlan::is_obsolete), vec!["gone-b", "gone-a"]);
        assert_eq!(plans[1].index(), Some(2));
    }

    #[test]
    fn test_static_retention_keeps_ips() {
        let azs = zones(&["z1", "z2"]);
        let networks = vec![JobNetwork {
            name: String::from("a"),
            static_ips: Some(vec!["10.0.1.5".parse().unwrap(), "10.0.2.5".parse().unwrap()]),
            subnets: vec![
                Subnet {
                    range: "10.0.1.0/24".parse().unwrap(),
                    azs: vec![String::from("z1")],
                },
                Subnet {
                    range: "10.0.2.0/24".parse().unwrap(),
                    azs: vec![String::from("z2")],
                },
            ],
        }];
        let existing = vec![
            ExistingInstance::new("e0", "web", 0)
                .in_az("z2")
                .with_ip("a", "10.0.2.5".parse().unwrap()),
        ];
        let plans = create_instance_plans(
            desired(2),
            &existing,
            &networks,
            Some(azs.as_slice()),
            "web",
        )
        .unwrap();

        assert!(plans[0].is_existing());
        assert_eq!(plans[0].az(), Some("z2"));
        assert_eq!(plans[0].reservations()[0].ip(), Some("10.0.2.5".parse().unwrap()));
        assert_eq!(plans[1].az(), Some("z1"));
    }

    #[test]
    fn test_placement_plan_summary() {
        let existing = vec![
            ExistingInstance::new("e0", "web", 0),
            ExistingInstance::new("e1", "web", 1),
        ];
        let plan = PlacementPlan::build("web", 1, &existing, &dynamic(), None).unwrap();
        assert_eq!(plan.existing_count(), 1);
        assert_eq!(plan.obsolete_count(), 1);
        assert_eq!(plan.new_count(), 0);
        assert!(!plan.is_noop());

        let text = plan.to_string();
        assert!(text.contains("Instance group 'web' (0 create, 1 keep, 1 delete)"));
        assert!(text.contains("keep e0 index=0"));
        assert!(text.contains("delete e1 index=1"));
    }
}
