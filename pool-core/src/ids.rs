//! Element identifiers and the three independent allocator spaces.
//!
//! Every element in the pool gets a process-unique [`ElementId`]. Ids are
//! never reused within a process and are stable for the lifetime of the
//! element they name. There are three disjoint allocation spaces so that
//! ghost (internal, never externally addressable) elements and purely
//! internal bookkeeping ids never collide with publicly visible ones.

use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

/// A process-unique, never-reused identifier for a pool element.
///
/// `ElementId` intentionally has no "invalid" representation of its own;
/// callers that need to express "no element" use `Option<ElementId>`, which
/// the niche-optimized `NonZeroU64` makes free of size overhead. This rules
/// out the class of bugs where a sentinel integer collides with a real id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ElementId(NonZeroU64);

impl ElementId {
    fn from_raw(raw: u64) -> Self {
        Self(NonZeroU64::new(raw).expect("allocator never yields 0"))
    }

    /// The raw integer value, for persistence and logging only.
    pub fn raw(self) -> u64 {
        self.0.get()
    }
}

impl std::fmt::Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which of the three independent counters an id was minted from.
///
/// Public ids are the only ones ever handed to external callers (the
/// middleware, the CLI). Ghost ids back implicitly-created composites (the
/// hidden motor group behind a pseudo-motor) and are never resolvable by
/// name lookups from outside the crate. Internal ids are reserved for
/// bookkeeping objects that are not elements at all (currently unused, kept
/// for forward compatibility with reload-orchestrator scratch state).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdSpace {
    Public,
    Ghost,
    Internal,
}

/// Three independent monotonic counters, one per [`IdSpace`].
///
/// Counters are offset at construction so that ids minted from different
/// spaces can never numerically collide, which makes accidental
/// cross-space comparisons fail loudly in debug builds instead of silently
/// aliasing two unrelated elements.
#[derive(Debug)]
pub struct IdAllocator {
    public: AtomicU64,
    ghost: AtomicU64,
    internal: AtomicU64,
}

const PUBLIC_BASE: u64 = 1;
const GHOST_BASE: u64 = 1 << 40;
const INTERNAL_BASE: u64 = 1 << 48;

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdAllocator {
    pub fn new() -> Self {
        Self {
            public: AtomicU64::new(PUBLIC_BASE),
            ghost: AtomicU64::new(GHOST_BASE),
            internal: AtomicU64::new(INTERNAL_BASE),
        }
    }

    /// Mint the next id in the given space.
    pub fn allocate(&self, space: IdSpace) -> ElementId {
        let counter = match space {
            IdSpace::Public => &self.public,
            IdSpace::Ghost => &self.ghost,
            IdSpace::Internal => &self.internal,
        };
        let raw = counter.fetch_add(1, Ordering::SeqCst);
        ElementId::from_raw(raw)
    }

    /// Lock a specific id so it is never minted again, used at startup to
    /// re-adopt ids that were persisted by the external configuration
    /// store. The counter for `space` is advanced past `raw` if necessary.
    pub fn reserve(&self, space: IdSpace, raw: u64) -> ElementId {
        let counter = match space {
            IdSpace::Public => &self.public,
            IdSpace::Ghost => &self.ghost,
            IdSpace::Internal => &self.internal,
        };
        counter.fetch_max(raw + 1, Ordering::SeqCst);
        ElementId::from_raw(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocations_within_a_space_never_repeat() {
        let alloc = IdAllocator::new();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            let id = alloc.allocate(IdSpace::Public);
            assert!(seen.insert(id), "id {id} minted twice");
        }
    }

    #[test]
    fn public_and_ghost_spaces_never_collide() {
        let alloc = IdAllocator::new();
        let public_ids: Vec<_> = (0..100).map(|_| alloc.allocate(IdSpace::Public)).collect();
        let ghost_ids: Vec<_> = (0..100).map(|_| alloc.allocate(IdSpace::Ghost)).collect();
        for p in &public_ids {
            assert!(!ghost_ids.contains(p));
        }
    }

    #[test]
    fn reserve_advances_the_counter_past_the_reserved_id() {
        let alloc = IdAllocator::new();
        let reserved = alloc.reserve(IdSpace::Public, 500);
        assert_eq!(reserved.raw(), 500);
        let next = alloc.allocate(IdSpace::Public);
        assert!(next.raw() > 500);
    }
}
