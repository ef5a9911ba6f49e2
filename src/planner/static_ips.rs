//! Per-network static IP pools.
//!
//! Each static IP is resolved to the subnet that contains it and to the
//! desired zones that subnet reaches. Pools track which IPs have been
//! claimed during one planning pass.

use std::net::IpAddr;

use tracing::debug;

use super::model::{AvailabilityZone, ExistingInstance, JobNetwork, ZoneKey};
use crate::error::ConfigurationError;

/// Claim state of a pool entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryState {
    Free,
    Claimed,
    Removed,
}

/// One static IP and the zones that can use it.
#[derive(Debug, Clone)]
pub struct StaticIpEntry {
    /// The address.
    pub ip: IpAddr,
    /// Zones declared by the subnet containing the address.
    pub subnet_azs: Vec<String>,
    /// Desired zones, as indices into [`NetworksToStaticIps::zones`], that can use the address.
    pub zones: Vec<usize>,
    pub(crate) state: EntryState,
}

impl StaticIpEntry {
    pub(crate) fn is_free(&self) -> bool {
        self.state == EntryState::Free
    }
}

/// The static IPs one instance group declares on one network, ascending.
#[derive(Debug, Clone)]
pub struct StaticIpPool {
    /// Network name.
    pub network: String,
    /// Entries sorted by address.
    pub entries: Vec<StaticIpEntry>,
}

impl StaticIpPool {
    /// Returns true if the pool declares `ip`.
    #[must_use]
    pub fn contains(&self, ip: &IpAddr) -> bool {
        self.position(ip).is_some()
    }

    fn position(&self, ip: &IpAddr) -> Option<usize> {
        self.entries.binary_search_by(|e| e.ip.cmp(ip)).ok()
    }

    /// Entry the instance currently holds, claimed or not, preferring the
    /// address recorded under this network's name.
    pub(crate) fn held_by(&self, instance: &ExistingInstance) -> Option<usize> {
        instance
            .ips
            .get(&self.network)
            .and_then(|ip| self.position(ip))
            .or_else(|| instance.ips.values().find_map(|ip| self.position(ip)))
    }

    /// Smallest unclaimed entry usable from `zone`.
    pub(crate) fn first_free_in(&self, zone: usize) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.is_free() && e.zones.contains(&zone))
    }

    pub(crate) fn free_entries(&self) -> Vec<usize> {
        (0..self.entries.len())
            .filter(|&i| self.entries[i].is_free())
            .collect()
    }

    pub(crate) fn set_state(&mut self, entry: usize, state: EntryState) {
        if let Some(e) = self.entries.get_mut(entry) {
            e.state = state;
        }
    }
}

/// Static IP pools of every static network of one instance group.
#[derive(Debug, Clone)]
pub struct NetworksToStaticIps {
    /// Distribution zones: the desired zones in order, or the single
    /// "no zone" bucket when AZs are not in use.
    pub zones: Vec<ZoneKey>,
    /// One pool per static network, in job network order.
    pub pools: Vec<StaticIpPool>,
}

impl NetworksToStaticIps {
    /// Resolves every static IP of the job's networks to its subnet.
    ///
    /// A subnet with no zones is usable from every distribution zone.
    ///
    /// # Errors
    ///
    /// Returns `JobNetworkInstanceIpMismatch` if a static IP belongs to no subnet.
    pub fn create(
        job_name: &str,
        job_networks: &[JobNetwork],
        desired_azs: Option<&[AvailabilityZone]>,
    ) -> Result<Self, ConfigurationError> {
        let zones: Vec<ZoneKey> = match desired_azs {
            Some(azs) if !azs.is_empty() => azs.iter().map(|az| Some(az.name.clone())).collect(),
            _ => vec![None],
        };

        let mut pools = Vec::new();
        for network in job_networks.iter().filter(|n| n.is_static()) {
            let mut ips = network.static_ips.clone().unwrap_or_default();
            ips.sort_unstable();
            ips.dedup();

            let mut entries = Vec::with_capacity(ips.len());
            for ip in ips {
                let subnet = network.subnet_for(&ip).ok_or_else(|| {
                    ConfigurationError::ip_outside_subnets(job_name, &network.name, ip)
                })?;

                let usable: Vec<usize> = if subnet.azs.is_empty() {
                    (0..zones.len()).collect()
                } else {
                    zones
                        .iter()
                        .enumerate()
                        .filter(|(_, z)| z.as_ref().is_some_and(|name| subnet.azs.contains(name)))
                        .map(|(i, _)| i)
                        .collect()
                };

                entries.push(StaticIpEntry {
                    ip,
                    subnet_azs: subnet.azs.clone(),
                    zones: usable,
                    state: EntryState::Free,
                });
            }

            pools.push(StaticIpPool {
                network: network.name.clone(),
                entries,
            });
        }

        Ok(Self { zones, pools })
    }

    /// Pool of the named network.
    #[must_use]
    pub fn pool(&self, network: &str) -> Option<&StaticIpPool> {
        self.pools.iter().find(|p| p.network == network)
    }

    /// Index of a zone key in the distribution zones.
    pub(crate) fn zone_index(&self, key: &ZoneKey) -> Option<usize> {
        self.zones.iter().position(|z| z == key)
    }

    /// Checks that all pools can be split into the same number of IPs per zone.
    ///
    /// # Errors
    ///
    /// Returns `JobNetworkInstanceIpMismatch` if no common split exists.
    pub fn validate_even_distribution(&self, job_name: &str) -> Result<(), ConfigurationError> {
        if self.pools.len() < 2 {
            return Ok(());
        }

        let size = self.pools[0].entries.len();
        let same_size = self.pools.iter().all(|p| p.entries.len() == size);
        let zero = vec![0_usize; self.zones.len()];
        if same_size && self.spread(&self.free_candidates(), &zero, size).is_some() {
            Ok(())
        } else {
            Err(ConfigurationError::uneven_static_ips(job_name))
        }
    }

    /// Chooses how many of `count` new instances go to each zone and pins
    /// one free IP per network to every new instance's zone.
    ///
    /// Instances are added one at a time to the zone with the lowest total
    /// (`tally` plus new) that every pool can still supply; ties favor
    /// earlier zones. Returns, per pool, the entries pinned to each zone, or
    /// `None` if the pools run out.
    pub(crate) fn distribute_new(
        &self,
        tally: &[usize],
        count: usize,
    ) -> Option<Vec<Vec<(usize, usize)>>> {
        let free: Vec<Vec<usize>> = self.pools.iter().map(StaticIpPool::free_entries).collect();
        let candidates = self.free_candidates();
        let counts = self.spread(&candidates, tally, count)?;
        debug!("Distributing {} new instance(s) per zone as {:?}", count, counts);

        let places: Vec<usize> = counts
            .iter()
            .enumerate()
            .flat_map(|(zone, &n)| std::iter::repeat_n(zone, n))
            .collect();

        let mut pins = Vec::with_capacity(candidates.len());
        for (pool_candidates, entries) in candidates.iter().zip(&free) {
            let mut matching = ZoneMatching::new(pool_candidates);
            if !places.iter().all(|&zone| matching.push(zone)) {
                return None;
            }
            pins.push(
                matching
                    .zones_by_item()
                    .zip(entries)
                    .filter_map(|(zone, &entry)| zone.map(|z| (entry, z)))
                    .collect(),
            );
        }
        Some(pins)
    }

    /// Candidate zones of every free entry, per pool.
    fn free_candidates(&self) -> Vec<Vec<Vec<usize>>> {
        self.pools
            .iter()
            .map(|pool| {
                pool.entries
                    .iter()
                    .filter(|e| e.is_free())
                    .map(|e| e.zones.clone())
                    .collect()
            })
            .collect()
    }

    /// Per-zone counts of `count` places that every pool can fill at once,
    /// grown one place at a time into the least loaded zone that fits.
    fn spread(
        &self,
        candidates: &[Vec<Vec<usize>>],
        tally: &[usize],
        count: usize,
    ) -> Option<Vec<usize>> {
        let mut matchings: Vec<ZoneMatching<'_>> = candidates
            .iter()
            .map(|c| ZoneMatching::new(c.as_slice()))
            .collect();
        let mut counts = vec![0_usize; self.zones.len()];
        let mut order: Vec<usize> = (0..self.zones.len()).collect();

        for _ in 0..count {
            order.sort_by_key(|&z| (counts[z] + tally.get(z).copied().unwrap_or(0), z));
            let zone = order
                .iter()
                .copied()
                .find(|&zone| push_all(&mut matchings, zone))?;
            counts[zone] += 1;
        }
        Some(counts)
    }
}

/// Adds a place in `zone` to every matching, or to none of them.
fn push_all(matchings: &mut [ZoneMatching<'_>], zone: usize) -> bool {
    match (0..matchings.len()).find(|&i| !matchings[i].push(zone)) {
        None => true,
        Some(failed) => {
            for matching in &mut matchings[..failed] {
                matching.pop();
            }
            false
        }
    }
}

/// Bipartite matching of pool entries to zone places, grown one place at a
/// time by augmenting paths. Items and places are tried in order.
struct ZoneMatching<'a> {
    candidates: &'a [Vec<usize>],
    places: Vec<usize>,
    owner: Vec<Option<usize>>,
}

impl<'a> ZoneMatching<'a> {
    fn new(candidates: &'a [Vec<usize>]) -> Self {
        Self {
            candidates,
            places: Vec::new(),
            owner: vec![None; candidates.len()],
        }
    }

    /// Adds a place in `zone`, rerouting earlier items if needed. Leaves the
    /// matching unchanged and returns false if no item can take it.
    fn push(&mut self, zone: usize) -> bool {
        self.places.push(zone);
        let place = self.places.len() - 1;
        let mut visited = vec![false; self.candidates.len()];
        if self.augment(place, &mut visited) {
            true
        } else {
            self.places.pop();
            false
        }
    }

    /// Removes the most recently added place.
    fn pop(&mut self) {
        let Some(last) = self.places.len().checked_sub(1) else {
            return;
        };
        self.places.pop();
        for owner in &mut self.owner {
            if *owner == Some(last) {
                *owner = None;
            }
        }
    }

    fn augment(&mut self, place: usize, visited: &mut [bool]) -> bool {
        let zone = self.places[place];
        let unowned = (0..self.candidates.len())
            .find(|&item| self.owner[item].is_none() && self.candidates[item].contains(&zone));
        if let Some(item) = unowned {
            visited[item] = true;
            self.owner[item] = Some(place);
            return true;
        }

        for item in 0..self.candidates.len() {
            if visited[item] || !self.candidates[item].contains(&zone) {
                continue;
            }
            visited[item] = true;
            if let Some(other) = self.owner[item]
                && self.augment(other, visited)
            {
                self.owner[item] = Some(place);
                return true;
            }
        }
        false
    }

    /// Zone each item was placed in, in item order.
    fn zones_by_item(&self) -> impl Iterator<Item = Option<usize>> + '_ {
        self.owner.iter().map(|p| p.map(|place| self.places[place]))
    }
}
