//! AZ placement for instance groups without static IPs.
//!
//! Slots are matched to existing instances in three passes: ignored
//! instances first, then disk-bearing instances in their own zone, then the
//! remaining slots spread to the least populated zones, reusing an
//! instance already living there when one is left.

use std::collections::VecDeque;

use tracing::{debug, info};

use super::ignored::validate_ignored_instances;
use super::model::{
    AvailabilityZone, DesiredInstance, ExistingInstance, ExistingSlot, JobNetwork, NewSlot,
    Placement, Reservation, ZoneKey, zone_for,
};
use crate::error::Result;

/// Places desired slots across zones and matches them to existing instances.
///
/// # Errors
///
/// Returns `DeploymentIgnoredInstancesModification` if an ignored instance
/// would lose its zone, its networks, or its slot.
pub fn place_and_match(
    job_name: &str,
    desired: Vec<DesiredInstance>,
    existing: &[ExistingInstance],
    job_networks: &[JobNetwork],
    desired_azs: Option<&[AvailabilityZone]>,
) -> Result<Placement> {
    validate_ignored_instances(job_name, desired.len(), existing, job_networks, desired_azs, None)?;

    let azs: &[AvailabilityZone] = desired_azs.unwrap_or_default();
    let zones: Vec<ZoneKey> = if azs.is_empty() {
        vec![None]
    } else {
        azs.iter().map(|az| Some(az.name.clone())).collect()
    };

    let mut placement = Placement::default();
    let mut buckets: Vec<Vec<ExistingInstance>> = vec![Vec::new(); zones.len()];

    let mut sorted: Vec<&ExistingInstance> = existing.iter().collect();
    sorted.sort_by_key(|e| e.index);
    for instance in sorted {
        let bucket = if azs.is_empty() {
            Some(0)
        } else {
            zones.iter().position(|z| *z == instance.zone_key())
        };
        match bucket {
            Some(b) => buckets[b].push(instance.clone()),
            None => {
                debug!(
                    "Instance '{}' is in AZ {:?}, which is no longer desired",
                    instance.id, instance.az
                );
                placement.obsolete.push(instance.clone());
            }
        }
    }

    let mut picker = ZonePicker {
        azs,
        zones: &zones,
        networks: job_networks,
        slots: desired.into_iter().enumerate().collect(),
        tally: vec![0; zones.len()],
        placement,
    };

    // Ignored instances keep their zone.
    for b in 0..buckets.len() {
        let (ignored, rest): (Vec<_>, Vec<_>) = buckets[b].drain(..).partition(|e| e.ignore);
        buckets[b] = rest;
        for instance in ignored {
            picker.keep(b, instance);
        }
    }

    // Disk-bearing instances stay where their disks are, active disks first.
    let mut with_disks: Vec<(usize, ExistingInstance)> = Vec::new();
    for (b, bucket) in buckets.iter_mut().enumerate() {
        let (disks, rest): (Vec<_>, Vec<_>) = bucket
            .drain(..)
            .partition(ExistingInstance::has_persistent_disk);
        *bucket = rest;
        with_disks.extend(disks.into_iter().map(|e| (b, e)));
    }
    with_disks.sort_by_key(|(_, e)| (!e.has_active_disk(), e.index));
    for (b, instance) in with_disks {
        if picker.slots.is_empty() {
            buckets[b].push(instance);
        } else {
            picker.keep(b, instance);
        }
    }
    for bucket in &mut buckets {
        bucket.sort_by_key(|e| e.index);
    }

    // Remaining slots go to the least populated zone.
    while !picker.slots.is_empty() {
        let b = (0..zones.len())
            .min_by_key(|&b| (picker.tally[b], std::cmp::Reverse(buckets[b].len())))
            .unwrap_or(0);
        if buckets[b].is_empty() {
            picker.create(b);
        } else {
            let instance = buckets[b].remove(0);
            picker.keep(b, instance);
        }
    }

    let mut leftover: Vec<ExistingInstance> = buckets.into_iter().flatten().collect();
    leftover.sort_by_key(|e| e.index);
    picker.placement.obsolete.extend(leftover);

    info!(
        "Placed instance group '{}': {} kept, {} new, {} obsolete",
        job_name,
        picker.placement.desired_existing.len(),
        picker.placement.desired_new.len(),
        picker.placement.obsolete.len()
    );

    Ok(picker.placement)
}

struct ZonePicker<'a> {
    azs: &'a [AvailabilityZone],
    zones: &'a [ZoneKey],
    networks: &'a [JobNetwork],
    slots: VecDeque<(usize, DesiredInstance)>,
    tally: Vec<usize>,
    placement: Placement,
}

impl ZonePicker<'_> {
    fn next_slot(&mut self, zone: usize) -> Option<(usize, DesiredInstance)> {
        let (slot, mut desired) = self.slots.pop_front()?;
        desired.az = zone_for(&self.zones[zone], self.azs);
        self.tally[zone] += 1;
        Some((slot, desired))
    }

    fn keep(&mut self, zone: usize, existing: ExistingInstance) {
        let Some((slot, desired)) = self.next_slot(zone) else {
            self.placement.obsolete.push(existing);
            return;
        };
        debug!(
            "Keeping instance '{}' (index {}) in AZ {:?}",
            existing.id,
            existing.index,
            desired.az_name()
        );
        let reservations = self
            .networks
            .iter()
            .map(|n| Reservation::Dynamic {
                network: n.name.clone(),
                ip: existing.ips.get(&n.name).copied(),
            })
            .collect();
        self.placement.desired_existing.push(ExistingSlot {
            slot,
            desired,
            existing,
            reservations,
        });
    }

    fn create(&mut self, zone: usize) {
        let Some((slot, desired)) = self.next_slot(zone) else {
            return;
        };
        debug!("New instance in AZ {:?}", desired.az_name());
        let reservations = self
            .networks
            .iter()
            .map(|n| Reservation::Dynamic {
                network: n.name.clone(),
                ip: None,
            })
            .collect();
        self.placement.desired_new.push(NewSlot {
            slot,
            desired,
            reservations,
        });
    }
}
