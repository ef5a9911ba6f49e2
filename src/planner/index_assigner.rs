//! Stable slot index assignment.
//!
//! Existing instances keep their index unless it collides with another
//! kept instance. Indices held by obsolete instances are never handed out
//! in the same pass.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, warn};

use super::model::Placement;

/// Ascending stream of indices not present in `reserved`.
struct AvailableIndices {
    reserved: BTreeSet<u32>,
    next: Option<u32>,
}

impl AvailableIndices {
    const fn new(reserved: BTreeSet<u32>) -> Self {
        Self {
            reserved,
            next: Some(0),
        }
    }

    /// Next free index for `instance`, logging when the index space is exhausted.
    fn take_index(&mut self, instance: &str) -> Option<u32> {
        let index = self.next();
        if index.is_none() {
            warn!("No free index left for instance '{instance}', leaving it unindexed");
        }
        index
    }
}

impl Iterator for AvailableIndices {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        let mut candidate = self.next?;
        while self.reserved.contains(&candidate) {
            let Some(following) = candidate.checked_add(1) else {
                self.next = None;
                return None;
            };
            candidate = following;
        }
        self.next = candidate.checked_add(1);
        Some(candidate)
    }
}

/// Assigns every new and kept slot a unique index.
///
/// For each index shared by several kept instances, one keeps it: an
/// ignored instance first, then one whose instance group matches the slot's,
/// then the earliest. The others and all new slots take the smallest free
/// indices in order of appearance.
#[must_use]
pub fn assign_indices(mut placement: Placement) -> Placement {
    let reserved: BTreeSet<u32> = placement
        .desired_existing
        .iter()
        .map(|e| e.existing.index)
        .chain(placement.obsolete.iter().map(|o| o.index))
        .collect();
    let mut available = AvailableIndices::new(reserved);

    let mut keepers: HashMap<u32, usize> = HashMap::new();
    for (pos, entry) in placement.desired_existing.iter().enumerate() {
        let index = entry.existing.index;
        let rank = keeper_rank(
            entry.existing.ignore,
            &entry.existing.instance_group,
            &entry.desired.instance_group,
        );
        keepers
            .entry(index)
            .and_modify(|current| {
                let held = &placement.desired_existing[*current];
                let held_rank = keeper_rank(
                    held.existing.ignore,
                    &held.existing.instance_group,
                    &held.desired.instance_group,
                );
                if rank < held_rank {
                    *current = pos;
                }
            })
            .or_insert(pos);
    }

    for (pos, entry) in placement.desired_existing.iter_mut().enumerate() {
        let index = entry.existing.index;
        if keepers.get(&index) == Some(&pos) {
            entry.desired.index = Some(index);
        } else {
            let reassigned = available.take_index(&entry.existing.id);
            debug!(
                "Index {} of instance '{}' is taken, reassigned to {:?}",
                index, entry.existing.id, reassigned
            );
            entry.desired.index = reassigned;
        }
    }

    for entry in &mut placement.desired_new {
        entry.desired.index = available.take_index("(new)");
    }

    placement
}

/// Lower ranks win an index collision.
fn keeper_rank(ignore: bool, existing_group: &str, desired_group: &str) -> u8 {
    match (ignore, existing_group == desired_group) {
        (true, _) => 0,
        (false, true) => 1,
        (false, false) => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::model::{DesiredInstance, ExistingInstance, ExistingSlot, NewSlot};

    fn placement(existing: &[(u32, &str)], obsolete: &[u32], new: usize) -> Placement {
        Placement {
            desired_existing: existing
                .iter()
                .enumerate()
                .map(|(slot, (index, group))| ExistingSlot {
                    slot,
                    desired: DesiredInstance::new("web"),
                    existing: ExistingInstance::new(format!("e{slot}"), *group, *index),
                    reservations: vec![],
                })
                .collect(),
            desired_new: (0..new)
                .map(|i| NewSlot {
                    slot: existing.len() + i,
                    desired: DesiredInstance::new("web"),
                    reservations: vec![],
                })
                .collect(),
            obsolete: obsolete
                .iter()
                .enumerate()
                .map(|(i, index)| ExistingInstance::new(format!("o{i}"), "web", *index))
                .collect(),
        }
    }

    fn existing_indices(p: &Placement) -> Vec<u32> {
        let mut v: Vec<u32> = p
            .desired_existing
            .iter()
            .filter_map(|e| e.desired.index)
            .collect();
        v.sort_unstable();
        v
    }

    fn new_indices(p: &Placement) -> Vec<u32> {
        p.desired_new.iter().filter_map(|e| e.desired.index).collect()
    }

    #[test]
    fn test_duplicate_skips_obsolete_indices() {
        let result = assign_indices(placement(&[(1, "web"), (1, "web")], &[0, 3], 0));
        assert_eq!(existing_indices(&result), vec![1, 2]);
        assert_eq!(result.obsolete[0].index, 0);
        assert_eq!(result.obsolete[1].index, 3);
    }

    #[test]
    fn test_new_indices_skip_reserved() {
        let result = assign_indices(placement(&[(2, "web"), (2, "web")], &[0, 4], 3));
        assert_eq!(existing_indices(&result), vec![1, 2]);
        assert_eq!(new_indices(&result), vec![3, 5, 6]);
    }

    #[test]
    fn test_many_duplicates() {
        let result = assign_indices(placement(
            &[(1, "web"), (1, "web"), (1, "web"), (2, "web")],
            &[],
            2,
        ));
        assert_eq!(existing_indices(&result), vec![0, 1, 2, 3]);
        assert_eq!(new_indices(&result), vec![4, 5]);
    }

    #[test]
    fn test_obsolete_duplicates_are_untouched() {
        let result = assign_indices(placement(&[], &[0, 0], 1));
        assert_eq!(new_indices(&result), vec![1]);
        assert_eq!(result.obsolete[0].index, 0);
        assert_eq!(result.obsolete[1].index, 0);
    }

    #[test]
    fn test_new_fill_gaps_below_existing() {
        let result = assign_indices(placement(&[(9, "web")], &[], 2));
        assert_eq!(existing_indices(&result), vec![9]);
        assert_eq!(new_indices(&result), vec![0, 1]);
    }

    #[test]
    fn test_matching_group_keeps_index() {
        let result = assign_indices(placement(&[(0, "renamed"), (0, "web")], &[], 0));
        assert_eq!(result.desired_existing[0].desired.index, Some(1));
        assert_eq!(result.desired_existing[1].desired.index, Some(0));
    }

    #[test]
    fn test_ignored_instance_keeps_index() {
        let mut p = placement(&[(0, "web"), (0, "web")], &[], 0);
        p.desired_existing[1].existing.ignore = true;
        let result = assign_indices(p);
        assert_eq!(result.desired_existing[0].desired.index, Some(1));
        assert_eq!(result.desired_existing[1].desired.index, Some(0));
    }

    #[test]
    fn test_available_indices_reach_the_last_index() {
        let mut available = AvailableIndices {
            reserved: BTreeSet::from([u32::MAX - 1]),
            next: Some(u32::MAX - 2),
        };
        assert_eq!(available.take_index("a"), Some(u32::MAX - 2));
        assert_eq!(available.take_index("b"), Some(u32::MAX));
        assert_eq!(available.take_index("c"), None);
        assert_eq!(available.next(), None);
    }
}
