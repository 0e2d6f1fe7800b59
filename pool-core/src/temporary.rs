//! Temporary Composites (spec §4.8).
//!
//! Ad-hoc motor/measurement groups created to back a one-off move or
//! acquire. Each carries an age counter advanced by the housekeeping
//! thread; groups inactive past `tmpElement_MaxInactTime` are garbage
//! collected through the normal delete path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::ids::ElementId;

/// Per-temporary-group bookkeeping, held alongside (not inside) the
/// `MotorGroupData`/`MeasurementGroupData` record so aging doesn't need a
/// registry write lock on every housekeeping tick.
struct Age {
    ticks_inactive: AtomicU64,
}

/// Tracks every temporary group's inactivity age and resolves "explicit
/// creation with the same member set returns the existing group" (spec
/// §4.8).
#[derive(Default)]
pub struct TemporaryRegistry {
    ages: HashMap<ElementId, Age>,
}

impl TemporaryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, group_id: ElementId) {
        self.ages.insert(
            group_id,
            Age {
                ticks_inactive: AtomicU64::new(0),
            },
        );
    }

    pub fn untrack(&mut self, group_id: ElementId) {
        self.ages.remove(&group_id);
    }

    /// Mark a group as just used, resetting its inactivity counter.
    pub fn touch(&self, group_id: ElementId) {
        if let Some(age) = self.ages.get(&group_id) {
            age.ticks_inactive.store(0, Ordering::Relaxed);
        }
    }

    /// Advance every tracked group's inactivity counter by one housekeeping
    /// tick, returning the ids that have now exceeded `max_inactive_ticks`
    /// and should be deleted through the normal delete path.
    pub fn advance_and_collect(&self, max_inactive_ticks: u64) -> Vec<ElementId> {
        let mut expired = Vec::new();
        for (&id, age) in &self.ages {
            let ticks = age.ticks_inactive.fetch_add(1, Ordering::Relaxed) + 1;
            if ticks >= max_inactive_ticks {
                expired.push(id);
            }
        }
        expired
    }
}

/// Whether `candidate` names the same member set as an existing temporary
/// group, so "explicit creation with the same member set returns the
/// existing group" can be implemented (spec §4.8, §9's two distinct
/// operations: unordered vs. exact-order comparison).
///
/// `exact_order = false` compares the two sets of members ignoring order
/// (used when matching an ad-hoc request against an existing temporary);
/// `exact_order = true` additionally requires identical positional order
/// (used where the original source's second call site relied on order, per
/// spec §9).
pub fn matches_user_members(
    existing: &[ElementId],
    candidate: &[ElementId],
    exact_order: bool,
) -> bool {
    if exact_order {
        return existing == candidate;
    }
    if existing.len() != candidate.len() {
        return false;
    }
    let mut existing_sorted = existing.to_vec();
    let mut candidate_sorted = candidate.to_vec();
    existing_sorted.sort();
    candidate_sorted.sort();
    existing_sorted == candidate_sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{IdAllocator, IdSpace};

    #[test]
    fn unordered_match_ignores_order() {
        let alloc = IdAllocator::new();
        let a = alloc.allocate(IdSpace::Public);
        let b = alloc.allocate(IdSpace::Public);
        assert!(matches_user_members(&[a, b], &[b, a], false));
        assert!(!matches_user_members(&[a, b], &[b, a], true));
    }

    #[test]
    fn aging_collects_after_threshold() {
        let mut reg = TemporaryRegistry::new();
        let alloc = IdAllocator::new();
        let g = alloc.allocate(IdSpace::Ghost);
        reg.track(g);
        assert!(reg.advance_and_collect(3).is_empty());
        assert!(reg.advance_and_collect(3).is_empty());
        assert_eq!(reg.advance_and_collect(3), vec![g]);
    }

    #[test]
    fn touch_resets_age() {
        let mut reg = TemporaryRegistry::new();
        let alloc = IdAllocator::new();
        let g = alloc.allocate(IdSpace::Ghost);
        reg.track(g);
        reg.advance_and_collect(3);
        reg.advance_and_collect(3);
        reg.touch(g);
        assert!(reg.advance_and_collect(3).is_empty());
    }
}
