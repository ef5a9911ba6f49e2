//! AZ placement for instance groups with static IPs.
//!
//! The zone of every instance follows from the subnets of the static IPs it
//! is given. Existing instances holding declared IPs keep them and claim
//! first, instances holding none are reused with fresh IPs in their own
//! zone when possible, and new instances take what remains.

use std::collections::VecDeque;

use tracing::{debug, info, warn};

use super::ignored::{changed_static_ip, removed_static_ip, validate_ignored_instances};
use super::model::{
    AvailabilityZone, DesiredInstance, ExistingInstance, ExistingSlot, JobNetwork, NewSlot,
    Placement, Reservation, zone_for,
};
use super::static_ips::{EntryState, NetworksToStaticIps};
use super::validator::{validate_azs_declared, validate_ips_in_desired_azs};
use crate::error::{ConfigurationError, ImmutabilityViolation, ReservationConflict, Result};

/// Places desired slots according to the zones their static IPs imply.
///
/// # Errors
///
/// Returns a configuration error if the static IPs and zones are
/// inconsistent, `DeploymentIgnoredInstancesModification` if an ignored
/// instance would change, and `NetworkReservationError` if existing
/// instances cannot all keep a static IP in their zone.
pub fn place_and_match(
    job_name: &str,
    desired: Vec<DesiredInstance>,
    existing: &[ExistingInstance],
    job_networks: &[JobNetwork],
    desired_azs: Option<&[AvailabilityZone]>,
) -> Result<Placement> {
    let networks = NetworksToStaticIps::create(job_name, job_networks, desired_azs)?;
    validate_azs_declared(job_name, &networks, desired_azs)?;
    validate_ips_in_desired_azs(job_name, &networks, desired_azs)?;
    validate_ignored_instances(
        job_name,
        desired.len(),
        existing,
        job_networks,
        desired_azs,
        Some(&networks),
    )?;
    networks.validate_even_distribution(job_name)?;

    let zone_count = networks.zones.len();
    let mut picker = StaticPicker {
        job_name,
        azs: desired_azs.unwrap_or_default(),
        job_networks,
        networks,
        slots: desired.into_iter().enumerate().collect(),
        tally: vec![0; zone_count],
        placement: Placement::default(),
        deferred: Vec::new(),
    };

    let mut sorted: Vec<&ExistingInstance> = existing.iter().collect();
    sorted.sort_by_key(|e| (!e.ignore, e.index));

    let mut without_ips = Vec::new();
    for instance in sorted {
        let held: Vec<(usize, usize)> = picker
            .networks
            .pools
            .iter()
            .enumerate()
            .filter_map(|(p, pool)| pool.held_by(instance).map(|entry| (p, entry)))
            .collect();
        if held.is_empty() {
            without_ips.push(instance);
        } else {
            picker.keep_with_ips(instance, &held)?;
        }
    }
    picker.fill_deferred()?;

    for instance in without_ips {
        picker.reuse_with_new_ips(instance)?;
    }

    if picker.placement.obsolete.iter().any(|e| e.ignore) {
        return Err(removed_static_ip(job_name).into());
    }

    picker.create_new()?;

    for slot in &mut picker.placement.desired_existing {
        sort_reservations(&mut slot.reservations, job_networks);
    }

    info!(
        "Placed instance group '{}' by static IPs: {} kept, {} new, {} obsolete",
        job_name,
        picker.placement.desired_existing.len(),
        picker.placement.desired_new.len(),
        picker.placement.obsolete.len()
    );

    Ok(picker.placement)
}

/// A kept instance waiting for an IP on one pool.
struct Deferred {
    slot: usize,
    pool: usize,
    zone: usize,
}

struct StaticPicker<'a> {
    job_name: &'a str,
    azs: &'a [AvailabilityZone],
    job_networks: &'a [JobNetwork],
    networks: NetworksToStaticIps,
    slots: VecDeque<(usize, DesiredInstance)>,
    tally: Vec<usize>,
    placement: Placement,
    deferred: Vec<Deferred>,
}

impl StaticPicker<'_> {
    fn next_slot(&mut self, zone: usize) -> Option<(usize, DesiredInstance)> {
        let (slot, mut desired) = self.slots.pop_front()?;
        desired.az = self
            .networks
            .zones
            .get(zone)
            .and_then(|key| zone_for(key, self.azs));
        if let Some(count) = self.tally.get_mut(zone) {
            *count += 1;
        }
        Some((slot, desired))
    }

    fn current_zone(&self, instance: &ExistingInstance) -> Option<usize> {
        if self.azs.is_empty() {
            self.networks.zone_index(&None)
        } else {
            self.networks.zone_index(&instance.zone_key())
        }
    }

    fn least_loaded(&self, candidates: &[usize]) -> Option<usize> {
        candidates
            .iter()
            .copied()
            .min_by_key(|&z| self.tally.get(z).copied().unwrap_or(usize::MAX))
    }

    fn dynamic_reservations(&self, instance: Option<&ExistingInstance>) -> Vec<Reservation> {
        self.job_networks
            .iter()
            .filter(|n| !n.is_static())
            .map(|n| Reservation::Dynamic {
                network: n.name.clone(),
                ip: instance.and_then(|e| e.ips.get(&n.name).copied()),
            })
            .collect()
    }

    /// Keeps an instance that holds at least one declared static IP.
    fn keep_with_ips(
        &mut self,
        instance: &ExistingInstance,
        held: &[(usize, usize)],
    ) -> Result<()> {
        if self.slots.is_empty() {
            debug!(
                "No slot left for instance '{}', releasing its static IPs",
                instance.id
            );
            for &(p, entry) in held {
                let pool = &mut self.networks.pools[p];
                if pool.entries[entry].is_free() {
                    pool.set_state(entry, EntryState::Removed);
                }
            }
            self.placement.obsolete.push(instance.clone());
            return Ok(());
        }

        let shared = held
            .iter()
            .map(|&(p, entry)| &self.networks.pools[p].entries[entry])
            .find(|e| !e.is_free());
        if let Some(entry) = shared {
            warn!(
                "Static IP {} of instance '{}' is already reserved by another instance",
                entry.ip, instance.id
            );
            if instance.ignore {
                return Err(changed_static_ip(self.job_name, &instance.id).into());
            }
            return Err(ReservationConflict::unsatisfiable().into());
        }

        let zone_sets: Vec<&[usize]> = held
            .iter()
            .map(|&(p, entry)| self.networks.pools[p].entries[entry].zones.as_slice())
            .collect();
        let mut candidates: Vec<usize> = (0..self.networks.zones.len())
            .filter(|z| zone_sets.iter().all(|set| set.contains(z)))
            .collect();
        if candidates.is_empty() {
            candidates = (0..self.networks.zones.len())
                .filter(|z| zone_sets.iter().any(|set| set.contains(z)))
                .collect();
        }

        let current = self.current_zone(instance);
        let zone = match current.filter(|z| candidates.contains(z)) {
            Some(z) => z,
            None if candidates.len() == 1 => candidates[0],
            None => self
                .least_loaded(&candidates)
                .ok_or_else(ReservationConflict::unsatisfiable)?,
        };

        if instance.ignore && !self.azs.is_empty() && current != Some(zone) {
            warn!(
                "Ignored instance '{}' would move from AZ {:?} to {:?}",
                instance.id, instance.az, self.networks.zones[zone]
            );
            return Err(ImmutabilityViolation::ignored(format!(
                "In instance group '{}', an attempt was made to move ignored instance '{}' to another availability zone. This operation is not allowed.",
                self.job_name, instance.id
            ))
            .into());
        }

        let Some((slot, desired)) = self.next_slot(zone) else {
            return Ok(());
        };

        let mut reservations = self.dynamic_reservations(Some(instance));
        for p in 0..self.networks.pools.len() {
            let pool = &mut self.networks.pools[p];
            match held.iter().find(|(hp, _)| *hp == p).map(|&(_, entry)| entry) {
                Some(entry) if pool.entries[entry].zones.contains(&zone) => {
                    pool.set_state(entry, EntryState::Claimed);
                    debug!(
                        "Instance '{}' keeps static IP {} on network '{}'",
                        instance.id, pool.entries[entry].ip, pool.network
                    );
                    reservations.push(Reservation::Static {
                        network: pool.network.clone(),
                        ip: pool.entries[entry].ip,
                    });
                }
                held_entry => {
                    if instance.ignore {
                        warn!(
                            "Ignored instance '{}' cannot keep its static IP on network '{}' in AZ {:?}",
                            instance.id, pool.network, self.networks.zones[zone]
                        );
                        return Err(changed_static_ip(self.job_name, &instance.id).into());
                    }
                    if let Some(entry) = held_entry {
                        // Held but unreachable from the chosen zone; nobody else may take it.
                        pool.set_state(entry, EntryState::Claimed);
                    }
                    self.deferred.push(Deferred { slot, pool: p, zone });
                }
            }
        }

        debug!(
            "Keeping instance '{}' (index {}) in AZ {:?}",
            instance.id,
            instance.index,
            desired.az_name()
        );
        self.placement.desired_existing.push(ExistingSlot {
            slot,
            desired,
            existing: instance.clone(),
            reservations,
        });
        Ok(())
    }

    /// Gives kept instances an IP on every pool they hold none of.
    fn fill_deferred(&mut self) -> Result<()> {
        for deferred in std::mem::take(&mut self.deferred) {
            let pool = &mut self.networks.pools[deferred.pool];
            let Some(entry) = pool.first_free_in(deferred.zone) else {
                warn!(
                    "No free static IP on network '{}' in AZ {:?} for an existing instance",
                    pool.network, self.networks.zones[deferred.zone]
                );
                return Err(ReservationConflict::unsatisfiable().into());
            };
            pool.set_state(entry, EntryState::Claimed);
            let reservation = Reservation::Static {
                network: pool.network.clone(),
                ip: pool.entries[entry].ip,
            };
            if let Some(kept) = self
                .placement
                .desired_existing
                .iter_mut()
                .find(|e| e.slot == deferred.slot)
            {
                debug!("Instance '{}' gets static IP {}", kept.existing.id, reservation);
                kept.reservations.push(reservation);
            }
        }
        Ok(())
    }

    /// Reuses an instance holding no declared IP if its zone still has a free
    /// IP on every pool.
    fn reuse_with_new_ips(&mut self, instance: &ExistingInstance) -> Result<()> {
        if instance.ignore {
            return Err(changed_static_ip(self.job_name, &instance.id).into());
        }
        let Some(zone) = self.current_zone(instance).filter(|_| !self.slots.is_empty()) else {
            self.placement.obsolete.push(instance.clone());
            return Ok(());
        };

        let entries: Option<Vec<usize>> = self
            .networks
            .pools
            .iter()
            .map(|pool| pool.first_free_in(zone))
            .collect();
        let Some(entries) = entries else {
            debug!(
                "No free static IPs in AZ {:?} for instance '{}'",
                instance.az, instance.id
            );
            self.placement.obsolete.push(instance.clone());
            return Ok(());
        };

        let Some((slot, desired)) = self.next_slot(zone) else {
            self.placement.obsolete.push(instance.clone());
            return Ok(());
        };

        let mut reservations = self.dynamic_reservations(Some(instance));
        for (pool, entry) in self.networks.pools.iter_mut().zip(entries) {
            pool.set_state(entry, EntryState::Claimed);
            reservations.push(Reservation::Static {
                network: pool.network.clone(),
                ip: pool.entries[entry].ip,
            });
        }

        debug!(
            "Reusing instance '{}' in AZ {:?} with new static IPs",
            instance.id,
            desired.az_name()
        );
        self.placement.desired_existing.push(ExistingSlot {
            slot,
            desired,
            existing: instance.clone(),
            reservations,
        });
        Ok(())
    }

    /// Creates the remaining slots, spreading them over the zones.
    fn create_new(&mut self) -> Result<()> {
        let count = self.slots.len();
        if count == 0 {
            return Ok(());
        }

        let mut pins = self
            .networks
            .distribute_new(&self.tally, count)
            .ok_or_else(|| ConfigurationError::uneven_static_ips(self.job_name))?;

        for _ in 0..count {
            let zone = pins
                .first()
                .and_then(|first| first.first())
                .map(|&(_, zone)| zone)
                .ok_or_else(ReservationConflict::unsatisfiable)?;

            let mut reservations = self.dynamic_reservations(None);
            for (pool, pinned) in self.networks.pools.iter_mut().zip(pins.iter_mut()) {
                let pos = pinned
                    .iter()
                    .position(|&(_, z)| z == zone)
                    .ok_or_else(ReservationConflict::unsatisfiable)?;
                let (entry, _) = pinned.remove(pos);
                pool.set_state(entry, EntryState::Claimed);
                reservations.push(Reservation::Static {
                    network: pool.network.clone(),
                    ip: pool.entries[entry].ip,
                });
            }
            sort_reservations(&mut reservations, self.job_networks);

            let Some((slot, desired)) = self.next_slot(zone) else {
                break;
            };
            debug!(
                "New instance in AZ {:?} with {:?}",
                desired.az_name(),
                reservations.iter().map(ToString::to_string).collect::<Vec<_>>()
            );
            self.placement.desired_new.push(NewSlot {
                slot,
                desired,
                reservations,
            });
        }
        Ok(())
    }
}

/// Orders reservations like the job's networks.
fn sort_reservations(reservations: &mut [Reservation], job_networks: &[JobNetwork]) {
    reservations.sort_by_key(|r| job_networks.iter().position(|n| n.name == r.network()));
}
