//! Fingerprints of planning inputs and plans.
//!
//! This module provides deterministic hashing over the canonical JSON
//! form of a document or plan, so repeated planning runs can be compared.

use serde::Serialize;
use sha2::{Digest, Sha256};

use super::spec::PlanningInput;
use crate::error::{InputError, PlacementError, Result};
use crate::planner::PlacementPlan;

/// Hasher for computing input and plan fingerprints.
#[derive(Debug, Default)]
pub struct PlanHasher;

impl PlanHasher {
    /// Creates a new plan hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes the fingerprint of a planning input.
    ///
    /// # Errors
    ///
    /// Returns an error if the input cannot be serialized.
    pub fn hash_input(&self, input: &PlanningInput) -> Result<String> {
        Self::hash_json(input)
    }

    /// Computes the fingerprint of a single group plan.
    ///
    /// # Errors
    ///
    /// Returns an error if the plan cannot be serialized.
    pub fn hash_plan(&self, plan: &PlacementPlan) -> Result<String> {
        Self::hash_json(plan)
    }

    /// Computes one fingerprint over all group plans, in order.
    ///
    /// # Errors
    ///
    /// Returns an error if a plan cannot be serialized.
    pub fn hash_plans(&self, plans: &[PlacementPlan]) -> Result<String> {
        let mut hasher = Sha256::new();
        for plan in plans {
            hasher.update(self.hash_plan(plan)?.as_bytes());
        }
        Ok(hex::encode(hasher.finalize()))
    }

    fn hash_json(value: &impl Serialize) -> Result<String> {
        let bytes = serde_json::to_vec(value).map_err(|e| {
            PlacementError::Input(InputError::ParseError {
                message: format!("Failed to serialize for hashing: {e}"),
                location: None,
            })
        })?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }

    /// Compares two hashes to determine if they are equal.
    #[must_use]
    pub fn hashes_match(hash1: &str, hash2: &str) -> bool {
        if hash1.len() != hash2.len() {
            return false;
        }

        hash1
            .bytes()
            .zip(hash2.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}
