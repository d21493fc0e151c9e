//! Membership difference between two states of a view.
//!
//! Recomputing a view rebuilds its sequence from scratch; a `ChangeSet`
//! tells which objects left and which entered, so that only membership
//! changes reach the callbacks. Pure reordering produces an empty set.

use hashbrown::HashSet;
use livedb_core::ObjectId;

/// Objects that entered and left a view.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Objects that entered, in their order in the new state
    pub added: Vec<ObjectId>,
    /// Objects that left, in their order in the old state
    pub removed: Vec<ObjectId>,
}

impl ChangeSet {
    /// Computes the membership difference between `old` and `new`.
    pub fn diff(old: &[ObjectId], new: &[ObjectId]) -> Self {
        let old_set: HashSet<ObjectId> = old.iter().copied().collect();
        let new_set: HashSet<ObjectId> = new.iter().copied().collect();
        Self {
            added: new.iter().copied().filter(|id| !old_set.contains(id)).collect(),
            removed: old.iter().copied().filter(|id| !new_set.contains(id)).collect(),
        }
    }

    /// Returns true if membership did not change.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_diff_membership() {
        let cs = ChangeSet::diff(&[1, 2, 3], &[3, 4, 2]);
        assert_eq!(cs.added, vec![4]);
        assert_eq!(cs.removed, vec![1]);
        assert!(!cs.is_empty());
    }

    #[test]
    fn test_diff_reorder_is_empty() {
        let cs = ChangeSet::diff(&[1, 2, 3], &[3, 1, 2]);
        assert!(cs.is_empty());
    }

    proptest! {
        #[test]
        fn prop_diff_applied_gives_new_membership(
            old in prop::collection::hash_set(0u64..50, 0..20),
            new in prop::collection::hash_set(0u64..50, 0..20),
        ) {
            let old: Vec<ObjectId> = old.into_iter().collect();
            let new: Vec<ObjectId> = new.into_iter().collect();
            let cs = ChangeSet::diff(&old, &new);

            let mut result: HashSet<ObjectId> = old.iter().copied().collect();
            for id in &cs.removed {
                prop_assert!(result.remove(id));
            }
            for id in &cs.added {
                prop_assert!(result.insert(*id));
            }
            let expected: HashSet<ObjectId> = new.iter().copied().collect();
            prop_assert_eq!(result, expected);
        }
    }
}
