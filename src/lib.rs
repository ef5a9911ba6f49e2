// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![warn(dead_code)]                   // Unused code is reported
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![warn(unused_imports)]              // Unused imports are reported
#![warn(unused_variables)]            // Unused variables are reported
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Fleet Placement
//!
//! A deterministic placement and reservation planner for instance groups
//! spread over availability zones.
//!
//! ## Overview
//!
//! Given the desired size of an instance group, its zones and networks, and
//! the instances that exist today, the planner decides:
//!
//! - Which existing instances are kept and which become obsolete
//! - Which new instances are created and in which zone
//! - Which index every instance holds
//! - Which static IP every instance reserves on each network
//!
//! ## Architecture
//!
//! Planning is a single pure pass per instance group:
//!
//! 1. **Validation**: Static IPs are checked against subnets and zones,
//!    and ignored instances against the new manifest
//! 2. **Placement**: A picker assigns zones and matches existing instances,
//!    keeping static IPs and persistent disks where it can
//! 3. **Indexing**: Every slot receives a unique index, reusing the
//!    current index of kept instances
//!
//! ## Modules
//!
//! - [`planner`]: Pickers, index assignment and the plan orchestrator
//! - [`config`]: Planning input parsing, validation and fingerprints
//! - [`error`]: Error hierarchy
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! azs:
//!   - name: z1
//!   - name: z2
//! networks:
//!   - name: private
//!     subnets:
//!       - range: 10.0.1.0/24
//!         azs: [z1]
//!       - range: 10.0.2.0/24
//!         azs: [z2]
//! instance_groups:
//!   - name: web
//!     instances: 2
//!     azs: [z1, z2]
//!     networks:
//!       - name: private
//!         static_ips: [10.0.1.10, 10.0.2.10]
//!     existing:
//!       - id: web-0
//!         index: 0
//!         az: z2
//!         ips: {private: 10.0.2.10}
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod error;
pub mod planner;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{InputParser, InputValidator, PlanHasher, PlanningInput};
pub use error::{PlacementError, Result};
pub use planner::{
    AvailabilityZone, DesiredInstance, ExistingInstance, InstancePlan, JobNetwork, PlacementPlan,
    Reservation, create_instance_plans,
};
