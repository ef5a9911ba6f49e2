//! Planning input module.
//!
//! This module handles everything around the input document:
//! - Parsing and deserializing the planning input
//! - Structural validation of names and references
//! - Computing fingerprints of inputs and plans

mod spec;
mod parser;
mod validator;
mod hash;

pub use spec::{
    ExistingInstanceConfig, InstanceGroupConfig, JobNetworkConfig, NetworkConfig, PlanningInput,
    SubnetConfig,
};
pub use parser::{DEFAULT_INPUT_FILES, InputParser, expand_static_ips, find_input_file};
pub use validator::{InputValidator, ValidationError, ValidationResult};
pub use hash::PlanHasher;
