//! Data model shared by the pickers, the index assigner and the orchestrator.
//!
//! Every value here is created and consumed within one planning call.

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::InputError;

/// Bucket key for AZ distribution. `None` is the "no AZ" bucket used when
/// AZs are not in use or a subnet declares none.
pub type ZoneKey = Option<String>;

/// A named failure-isolation domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityZone {
    /// Zone name, unique within a deployment.
    pub name: String,
    /// Opaque cloud settings passed through to collaborators.
    #[serde(default)]
    pub cloud_properties: serde_json::Value,
}

impl AvailabilityZone {
    /// Creates a zone with empty cloud properties.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cloud_properties: serde_json::Value::Object(serde_json::Map::new()),
        }
    }
}

/// A slot required by the current manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DesiredInstance {
    /// Name of the instance group this slot belongs to.
    pub instance_group: String,
    /// Zone resolved by the picker.
    pub az: Option<AvailabilityZone>,
    /// Index resolved by the index assigner.
    pub index: Option<u32>,
}

impl DesiredInstance {
    /// Creates an unplaced slot for the given instance group.
    #[must_use]
    pub fn new(instance_group: impl Into<String>) -> Self {
        Self {
            instance_group: instance_group.into(),
            az: None,
            index: None,
        }
    }

    /// Name of the resolved zone, if any.
    #[must_use]
    pub fn az_name(&self) -> Option<&str> {
        self.az.as_ref().map(|az| az.name.as_str())
    }
}

/// A persistent disk attached to an existing instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PersistentDisk {
    /// Whether the disk is the instance's active disk.
    #[serde(default)]
    pub active: bool,
}

/// A previously created instance record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExistingInstance {
    /// Unique instance identifier.
    pub id: String,
    /// Instance group the instance was created for.
    pub instance_group: String,
    /// Index the instance currently holds.
    pub index: u32,
    /// Zone the instance currently runs in.
    pub az: Option<String>,
    /// Excluded from automatic lifecycle changes.
    pub ignore: bool,
    /// Current address per network name.
    pub ips: BTreeMap<String, IpAddr>,
    /// Attached persistent disks.
    pub persistent_disks: Vec<PersistentDisk>,
}

impl ExistingInstance {
    /// Creates an instance with no zone, IPs or disks.
    #[must_use]
    pub fn new(id: impl Into<String>, instance_group: impl Into<String>, index: u32) -> Self {
        Self {
            id: id.into(),
            instance_group: instance_group.into(),
            index,
            az: None,
            ignore: false,
            ips: BTreeMap::new(),
            persistent_disks: Vec::new(),
        }
    }

    /// Sets the current zone.
    #[must_use]
    pub fn in_az(mut self, az: impl Into<String>) -> Self {
        self.az = Some(az.into());
        self
    }

    /// Marks the instance as ignored.
    #[must_use]
    pub const fn ignored(mut self) -> Self {
        self.ignore = true;
        self
    }

    /// Records an address on a network.
    #[must_use]
    pub fn with_ip(mut self, network: impl Into<String>, ip: IpAddr) -> Self {
        self.ips.insert(network.into(), ip);
        self
    }

    /// Attaches a persistent disk.
    #[must_use]
    pub fn with_disk(mut self, active: bool) -> Self {
        self.persistent_disks.push(PersistentDisk { active });
        self
    }

    /// Returns true if any persistent disk is attached.
    #[must_use]
    pub fn has_persistent_disk(&self) -> bool {
        !self.persistent_disks.is_empty()
    }

    /// Returns true if an active persistent disk is attached.
    #[must_use]
    pub fn has_active_disk(&self) -> bool {
        self.persistent_disks.iter().any(|d| d.active)
    }

    /// Network names the instance holds addresses on, sorted.
    pub fn network_names(&self) -> impl Iterator<Item = &str> {
        self.ips.keys().map(String::as_str)
    }

    /// Bucket key of the current zone.
    #[must_use]
    pub fn zone_key(&self) -> ZoneKey {
        self.az.clone()
    }
}

/// An IPv4 or IPv6 network in CIDR notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cidr {
    addr: IpAddr,
    prefix_len: u8,
}

impl Cidr {
    /// Network address as written.
    #[must_use]
    pub const fn addr(&self) -> IpAddr {
        self.addr
    }

    /// Prefix length in bits.
    #[must_use]
    pub const fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Returns true if `ip` lies inside this network.
    #[must_use]
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (self.addr, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = u32::MAX
                    .checked_shl(32 - u32::from(self.prefix_len))
                    .unwrap_or(0);
                u32::from(net) & mask == u32::from(*ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = u128::MAX
                    .checked_shl(128 - u32::from(self.prefix_len))
                    .unwrap_or(0);
                u128::from(net) & mask == u128::from(*ip) & mask
            }
            _ => false,
        }
    }
}

impl FromStr for Cidr {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (addr, prefix) = s
            .split_once('/')
            .ok_or_else(|| InputError::invalid_address(s, "missing prefix length"))?;

        let addr: IpAddr = addr
            .trim()
            .parse()
            .map_err(|_| InputError::invalid_address(s, "invalid network address"))?;
        let prefix_len: u8 = prefix
            .trim()
            .parse()
            .map_err(|_| InputError::invalid_address(s, "invalid prefix length"))?;

        let max = if addr.is_ipv4() { 32 } else { 128 };
        if prefix_len > max {
            return Err(InputError::invalid_address(
                s,
                format!("prefix length must be at most {max}"),
            ));
        }

        Ok(Self { addr, prefix_len })
    }
}

impl TryFrom<String> for Cidr {
    type Error = InputError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Cidr> for String {
    fn from(cidr: Cidr) -> Self {
        cidr.to_string()
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

/// An address range reachable from a set of zones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subnet {
    /// Address range.
    pub range: Cidr,
    /// Zones that can reach the range. Empty means zone-agnostic.
    pub azs: Vec<String>,
}

/// A network as attached to one instance group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobNetwork {
    /// Network name.
    pub name: String,
    /// Static IPs the instance group declares on this network, ascending.
    pub static_ips: Option<Vec<IpAddr>>,
    /// Subnets of the network.
    pub subnets: Vec<Subnet>,
}

impl JobNetwork {
    /// Creates a dynamic network with no subnets.
    #[must_use]
    pub fn dynamic(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            static_ips: None,
            subnets: Vec::new(),
        }
    }

    /// Returns true if the instance group declares static IPs on this network.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.static_ips.as_ref().is_some_and(|ips| !ips.is_empty())
    }

    /// First subnet whose range contains `ip`.
    #[must_use]
    pub fn subnet_for(&self, ip: &IpAddr) -> Option<&Subnet> {
        self.subnets.iter().find(|s| s.range.contains(ip))
    }
}

/// An address reservation on one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reservation {
    /// A static IP from the instance group's pool.
    Static {
        /// Network name.
        network: String,
        /// Reserved address.
        ip: IpAddr,
    },
    /// A pool-allocated address resolved downstream. An existing instance
    /// keeps its current address.
    Dynamic {
        /// Network name.
        network: String,
        /// Current address, if the instance already has one.
        ip: Option<IpAddr>,
    },
}

impl Reservation {
    /// Network the reservation is on.
    #[must_use]
    pub fn network(&self) -> &str {
        match self {
            Self::Static { network, .. } | Self::Dynamic { network, .. } => network,
        }
    }

    /// Reserved or current address, if known.
    #[must_use]
    pub const fn ip(&self) -> Option<IpAddr> {
        match self {
            Self::Static { ip, .. } => Some(*ip),
            Self::Dynamic { ip, .. } => *ip,
        }
    }

    /// Returns true for static reservations.
    #[must_use]
    pub const fn is_static(&self) -> bool {
        matches!(self, Self::Static { .. })
    }
}

impl fmt::Display for Reservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static { network, ip } => write!(f, "{network}={ip}"),
            Self::Dynamic { network, ip: Some(ip) } => write!(f, "{network}~{ip}"),
            Self::Dynamic { network, ip: None } => write!(f, "{network}~dynamic"),
        }
    }
}

/// The planned outcome for one slot or one existing instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum InstancePlan {
    /// Create a fresh instance for a slot.
    New {
        /// The slot, with zone and index resolved.
        desired: DesiredInstance,
        /// One reservation per job network.
        reservations: Vec<Reservation>,
    },
    /// Keep an existing instance for a slot.
    Existing {
        /// The slot, with zone and index resolved.
        desired: DesiredInstance,
        /// The instance kept.
        existing: ExistingInstance,
        /// One reservation per job network.
        reservations: Vec<Reservation>,
    },
    /// Tear down an unmatched instance.
    Obsolete {
        /// The instance removed.
        existing: ExistingInstance,
    },
}

impl InstancePlan {
    /// Returns true for `New`.
    #[must_use]
    pub const fn is_new(&self) -> bool {
        matches!(self, Self::New { .. })
    }

    /// Returns true for `Existing`.
    #[must_use]
    pub const fn is_existing(&self) -> bool {
        matches!(self, Self::Existing { .. })
    }

    /// Returns true for `Obsolete`.
    #[must_use]
    pub const fn is_obsolete(&self) -> bool {
        matches!(self, Self::Obsolete { .. })
    }

    /// The desired slot, absent for obsolete plans.
    #[must_use]
    pub const fn desired(&self) -> Option<&DesiredInstance> {
        match self {
            Self::New { desired, .. } | Self::Existing { desired, .. } => Some(desired),
            Self::Obsolete { .. } => None,
        }
    }

    /// The existing instance, absent for new plans.
    #[must_use]
    pub const fn existing(&self) -> Option<&ExistingInstance> {
        match self {
            Self::Existing { existing, .. } | Self::Obsolete { existing } => Some(existing),
            Self::New { .. } => None,
        }
    }

    /// Resolved zone name. Obsolete plans report the instance's current zone.
    #[must_use]
    pub fn az(&self) -> Option<&str> {
        match self {
            Self::New { desired, .. } | Self::Existing { desired, .. } => desired.az_name(),
            Self::Obsolete { existing } => existing.az.as_deref(),
        }
    }

    /// Resolved index. Obsolete plans report the instance's current index.
    #[must_use]
    pub const fn index(&self) -> Option<u32> {
        match self {
            Self::New { desired, .. } | Self::Existing { desired, .. } => desired.index,
            Self::Obsolete { existing } => Some(existing.index),
        }
    }

    /// Reservations of the plan; empty for obsolete plans.
    #[must_use]
    pub fn reservations(&self) -> &[Reservation] {
        match self {
            Self::New { reservations, .. } | Self::Existing { reservations, .. } => reservations,
            Self::Obsolete { .. } => &[],
        }
    }

    /// Short action label.
    #[must_use]
    pub const fn action(&self) -> &'static str {
        match self {
            Self::New { .. } => "create",
            Self::Existing { .. } => "keep",
            Self::Obsolete { .. } => "delete",
        }
    }
}

/// A new slot as placed by a picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSlot {
    /// Position of the slot in the desired list.
    pub slot: usize,
    /// The slot, with zone resolved.
    pub desired: DesiredInstance,
    /// One reservation per job network.
    pub reservations: Vec<Reservation>,
}

/// A slot matched to an existing instance by a picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingSlot {
    /// Position of the slot in the desired list.
    pub slot: usize,
    /// The slot, with zone resolved.
    pub desired: DesiredInstance,
    /// The instance kept.
    pub existing: ExistingInstance,
    /// One reservation per job network.
    pub reservations: Vec<Reservation>,
}

/// The three buckets a picker produces and the index assigner completes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Placement {
    /// Slots with no matching instance.
    pub desired_new: Vec<NewSlot>,
    /// Slots matched to an existing instance.
    pub desired_existing: Vec<ExistingSlot>,
    /// Instances with no slot.
    pub obsolete: Vec<ExistingInstance>,
}

/// Resolves a bucket key to the declared zone.
pub(crate) fn zone_for(key: &ZoneKey, azs: &[AvailabilityZone]) -> Option<AvailabilityZone> {
    key.as_ref()
        .and_then(|name| azs.iter().find(|az| &az.name == name))
        .cloned()
}

/// Returns true if AZ distribution applies: a non-empty desired list.
pub(crate) fn azs_in_use(desired_azs: Option<&[AvailabilityZone]>) -> bool {
    desired_azs.is_some_and(|azs| !azs.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_cidr_contains_v4() {
        let cidr: Cidr = "192.168.1.0/24".parse().unwrap();
        assert!(cidr.contains(&ip("192.168.1.10")));
        assert!(cidr.contains(&ip("192.168.1.255")));
        assert!(!cidr.contains(&ip("192.168.2.1")));
        assert!(!cidr.contains(&ip("::1")));
    }

    #[test]
    fn test_cidr_contains_v6_and_zero_prefix() {
        let cidr: Cidr = "fd00:1::/64".parse().unwrap();
        assert!(cidr.contains(&ip("fd00:1::42")));
        assert!(!cidr.contains(&ip("fd00:2::42")));

        let all: Cidr = "0.0.0.0/0".parse().unwrap();
        assert!(all.contains(&ip("10.1.2.3")));
    }

    #[test]
    fn test_cidr_rejects_bad_input() {
        assert!("10.0.0.0".parse::<Cidr>().is_err());
        assert!("10.0.0.0/33".parse::<Cidr>().is_err());
        assert!("nope/24".parse::<Cidr>().is_err());
    }

    #[test]
    fn test_network_is_static() {
        let mut network = JobNetwork::dynamic("a");
        assert!(!network.is_static());
        network.static_ips = Some(vec![]);
        assert!(!network.is_static());
        network.static_ips = Some(vec![ip("10.0.0.1")]);
        assert!(network.is_static());
    }

    #[test]
    fn test_subnet_for_picks_first_match() {
        let network = JobNetwork {
            name: String::from("a"),
            static_ips: None,
            subnets: vec![
                Subnet {
                    range: "10.0.0.0/16".parse().unwrap(),
                    azs: vec![String::from("z1")],
                },
                Subnet {
                    range: "10.0.1.0/24".parse().unwrap(),
                    azs: vec![String::from("z2")],
                },
            ],
        };
        let subnet = network.subnet_for(&ip("10.0.1.5")).unwrap();
        assert_eq!(subnet.azs, vec![String::from("z1")]);
        assert!(network.subnet_for(&ip("10.1.0.1")).is_none());
    }

    #[test]
    fn test_instance_plan_accessors() {
        let existing = ExistingInstance::new("i-1", "web", 3).in_az("z1");
        let plan = InstancePlan::Obsolete {
            existing: existing.clone(),
        };
        assert!(plan.is_obsolete());
        assert_eq!(plan.az(), Some("z1"));
        assert_eq!(plan.index(), Some(3));
        assert!(plan.reservations().is_empty());
        assert!(plan.desired().is_none());

        let mut desired = DesiredInstance::new("web");
        desired.az = Some(AvailabilityZone::new("z2"));
        desired.index = Some(0);
        let plan = InstancePlan::Existing {
            desired,
            existing,
            reservations: vec![],
        };
        assert_eq!(plan.az(), Some("z2"));
        assert_eq!(plan.index(), Some(0));
        assert_eq!(plan.action(), "keep");
    }

    #[test]
    fn test_reservation_display() {
        let r = Reservation::Static {
            network: String::from("a"),
            ip: ip("10.0.0.1"),
        };
        assert_eq!(r.to_string(), "a=10.0.0.1");
        let r = Reservation::Dynamic {
            network: String::from("b"),
            ip: None,
        };
        assert_eq!(r.to_string(), "b~dynamic");
    }
}
