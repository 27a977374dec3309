//! Mutation Guard
//!
//! Collapses overlapping adds of the same `(product, tier)` pair. The first caller holds an
//! [`InFlight`] token for the duration of its add; anyone arriving while it is held gets `None`
//! and must treat the call as a no-op. Dropping the token releases the key, so success, failure,
//! panic and cancellation all clean up the same way.

use std::sync::{Mutex, MutexGuard, PoisonError};

use rustc_hash::FxHashSet;

use crate::{bundles::BundleKind, products::ProductUuid};

/// Identity of a logical add.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GuardKey {
    /// Product being added
    pub product: ProductUuid,

    /// Tier being added, `None` for plain lines
    pub kind: Option<BundleKind>,
}

impl GuardKey {
    /// Key for a product and tier.
    #[must_use]
    pub fn new(product: ProductUuid, kind: Option<BundleKind>) -> Self {
        Self { product, kind }
    }
}

/// Set of adds currently in flight.
#[derive(Debug, Default)]
pub struct MutationGuard {
    in_flight: Mutex<FxHashSet<GuardKey>>,
}

impl MutationGuard {
    /// Create an empty guard.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key`, or `None` when an add for it is already running.
    pub fn try_acquire(&self, key: GuardKey) -> Option<InFlight<'_>> {
        if self.keys().insert(key) {
            Some(InFlight { guard: self, key })
        } else {
            None
        }
    }

    /// Whether an add for `key` is running.
    #[must_use]
    pub fn is_in_flight(&self, key: GuardKey) -> bool {
        self.keys().contains(&key)
    }

    fn keys(&self) -> MutexGuard<'_, FxHashSet<GuardKey>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Token held while an add runs; releases its key on drop.
#[derive(Debug)]
#[must_use = "dropping the token immediately releases the key"]
pub struct InFlight<'g> {
    guard: &'g MutationGuard,
    key: GuardKey,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.guard.keys().remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    #[test]
    fn second_claim_for_same_key_is_refused() {
        let guard = MutationGuard::new();
        let key = GuardKey::new(ProductUuid::new(), Some(BundleKind::Double));

        let first = guard.try_acquire(key);

        assert!(first.is_some());
        assert!(guard.try_acquire(key).is_none());
        assert!(guard.is_in_flight(key));
    }

    #[test]
    fn different_tiers_do_not_collide() {
        let guard = MutationGuard::new();
        let product = ProductUuid::new();

        let _double = guard.try_acquire(GuardKey::new(product, Some(BundleKind::Double)));
        let triple = guard.try_acquire(GuardKey::new(product, Some(BundleKind::Triple)));

        assert!(triple.is_some());
        assert!(guard.is_in_flight(GuardKey::new(product, Some(BundleKind::Double))));
        assert!(guard.is_in_flight(GuardKey::new(product, Some(BundleKind::Triple))));
    }

    #[test]
    fn dropping_the_token_releases_the_key() {
        let guard = MutationGuard::new();
        let key = GuardKey::new(ProductUuid::new(), None);

        drop(guard.try_acquire(key));

        assert!(!guard.is_in_flight(key));
        assert!(guard.try_acquire(key).is_some());
    }

    #[test]
    fn panicking_holder_still_releases_the_key() {
        let guard = MutationGuard::new();
        let key = GuardKey::new(ProductUuid::new(), Some(BundleKind::Single));

        let result = catch_unwind(AssertUnwindSafe(|| {
            let _token = guard.try_acquire(key);
            panic!("add failed");
        }));

        assert!(result.is_err());
        assert!(!guard.is_in_flight(key));
    }
}
