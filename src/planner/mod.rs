//! Placement planning for instance groups.
//!
//! A plan is built in two stages. A picker assigns each desired slot a
//! zone and matches it to an existing instance where one can be reused,
//! then the index assigner gives every slot a unique index.
//!
//! Groups with at least one static network go through
//! [`static_ips_az_picker`], all others through [`az_picker`].

pub mod az_picker;
pub mod index_assigner;
pub mod model;
pub mod static_ips;
pub mod static_ips_az_picker;
pub mod validator;

mod ignored;
mod plan;

pub use index_assigner::assign_indices;
pub use model::{
    AvailabilityZone, Cidr, DesiredInstance, ExistingInstance, ExistingSlot, InstancePlan,
    JobNetwork, NewSlot, PersistentDisk, Placement, Reservation, Subnet, ZoneKey,
};
pub use plan::{PlacementPlan, create_instance_plans};
pub use static_ips::NetworksToStaticIps;
