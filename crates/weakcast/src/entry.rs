#![forbid(unsafe_code)]

//! One weak slot in the registry's subscriber collection.
//!
//! # Design
//!
//! A [`WeakEntry`] pairs a non-owning handle to a subscriber with an identity
//! token and that subscriber type's dispatch table. The token is the thin
//! address of the subscriber's allocation; it is compared, never
//! dereferenced, so `unregister` can match entries without upgrading the
//! weak handle.
//!
//! # Invariants
//!
//! 1. Liveness is derived from `Weak::strong_count`, never stored; it
//!    transitions true → false at most once and never back.
//! 2. A dead entry matches no token (it is only a removal candidate).
//! 3. Entries are immutable after construction.

use std::any::TypeId;
use std::sync::{Arc, Weak};

use crate::capability::{AnySubscriber, CapabilityTable, DispatchFn, Subscriber};

/// A non-owning registry slot for one registered subscriber.
pub(crate) struct WeakEntry {
    /// Allocation address of the subscriber; equality only.
    token: usize,
    target: Weak<AnySubscriber>,
    table: Arc<CapabilityTable>,
}

impl WeakEntry {
    pub(crate) fn new<S: Subscriber>(subscriber: &Arc<S>, table: Arc<CapabilityTable>) -> Self {
        let erased: Arc<AnySubscriber> = subscriber.clone();
        Self {
            token: token_of(subscriber),
            target: Arc::downgrade(&erased),
            table,
        }
    }

    /// Whether the subscriber is still reachable elsewhere in the program.
    pub(crate) fn is_alive(&self) -> bool {
        self.target.strong_count() > 0
    }

    /// Upgrades to a strong reference, or `None` once the subscriber died.
    pub(crate) fn target(&self) -> Option<Arc<AnySubscriber>> {
        self.target.upgrade()
    }

    /// Identity comparison for `unregister`; always false once dead.
    pub(crate) fn matches(&self, token: usize) -> bool {
        self.is_alive() && self.token == token
    }

    pub(crate) fn supports(&self, capability: TypeId) -> bool {
        self.table.supports(capability)
    }

    pub(crate) fn dispatch_for(&self, capability: TypeId) -> Option<DispatchFn> {
        self.table.dispatch_for(capability)
    }
}

/// Identity token of a subscriber: the thin address of its allocation.
///
/// Works for unsized `S` too (metadata is discarded), so a caller holding
/// `Arc<dyn Trait>` can unregister what it registered as `Arc<Concrete>`.
pub(crate) fn token_of<S: ?Sized>(subscriber: &Arc<S>) -> usize {
    Arc::as_ptr(subscriber) as *const () as usize
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{CapabilitySet, table_of};

    struct Dummy;
    impl Subscriber for Dummy {
        fn capabilities(_set: &mut CapabilitySet<Self>) {}
    }

    fn entry_for(subscriber: &Arc<Dummy>) -> WeakEntry {
        WeakEntry::new(subscriber, Arc::new(table_of::<Dummy>()))
    }

    #[test]
    fn alive_while_subscriber_held() {
        let subscriber = Arc::new(Dummy);
        let entry = entry_for(&subscriber);

        assert!(entry.is_alive());
        assert!(entry.target().is_some());
        assert!(entry.matches(token_of(&subscriber)));
    }

    #[test]
    fn dies_when_last_strong_ref_drops() {
        let subscriber = Arc::new(Dummy);
        let token = token_of(&subscriber);
        let entry = entry_for(&subscriber);
        drop(subscriber);

        assert!(!entry.is_alive());
        assert!(entry.target().is_none());
        // Dead entries match nothing, not even their old token.
        assert!(!entry.matches(token));
    }

    #[test]
    fn token_distinguishes_subscribers() {
        let a = Arc::new(Dummy);
        let b = Arc::new(Dummy);
        let entry = entry_for(&a);

        assert!(entry.matches(token_of(&a)));
        assert!(!entry.matches(token_of(&b)));
    }

    #[test]
    fn clones_of_one_arc_share_a_token() {
        let a = Arc::new(Dummy);
        let alias = Arc::clone(&a);

        assert_eq!(token_of(&a), token_of(&alias));
    }

    #[test]
    fn two_entries_for_one_subscriber_are_independent() {
        let subscriber = Arc::new(Dummy);
        let first = entry_for(&subscriber);
        let second = entry_for(&subscriber);
        let token = token_of(&subscriber);

        assert!(first.matches(token));
        assert!(second.matches(token));
    }
}
