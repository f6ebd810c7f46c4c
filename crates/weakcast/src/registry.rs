#![forbid(unsafe_code)]

//! The listener registry: weak registration, snapshot broadcast.
//!
//! # Design
//!
//! [`ListenerRegistry`] owns an insertion-ordered vector of weak entries and
//! nothing else owns the subscribers. A single coarse mutex guards the
//! vector, the sweep scheduler, and a per-subscriber-type dispatch-table
//! cache. The lock is held only for O(n) vector/map work — never across a
//! listener callback.
//!
//! `broadcast` copies the live, capability-matching entries under the lock,
//! releases it, then invokes each callback against the copy. That snapshot
//! discipline is what makes reentrancy safe: a callback may register,
//! unregister, or broadcast on the same registry without deadlocking or
//! corrupting the in-flight iteration.
//!
//! # Invariants
//!
//! 1. Dispatch order within one broadcast is registration order among the
//!    entries that were alive and capability-matching at snapshot time.
//! 2. Registering the same subscriber twice yields two entries and two
//!    invocations per broadcast.
//! 3. A subscriber registered from inside a callback joins the next
//!    broadcast, never the in-flight one.
//! 4. No lock is held while a callback runs; a slow listener stalls only
//!    the current broadcast call.
//!
//! # Failure Modes
//!
//! - A panicking listener is caught per invocation, reported via `tracing`,
//!   and the rest of the snapshot still runs; `broadcast` returns normally.
//! - A poisoned registry lock is unreachable in practice: the bookkeeping
//!   done under the lock is panic-free and callbacks run outside it.

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard};

use ahash::AHashMap;
use web_time::Duration;

use crate::capability::{
    AnySubscriber, Capability, CapabilityTable, DispatchFn, Subscriber, table_of,
};
use crate::entry::{WeakEntry, token_of};
use crate::sweep::{DEFAULT_SWEEP_COOLDOWN, SweepScheduler};

/// Process-wide broadcast registry for weakly-held subscribers.
///
/// Construct one per application and share it (typically behind an `Arc`);
/// there is no global instance. All operations are synchronous and safe to
/// call from multiple threads.
pub struct ListenerRegistry {
    state: Mutex<State>,
}

struct State {
    entries: Vec<WeakEntry>,
    sweep: SweepScheduler,
    /// Subscriber `TypeId` → cached dispatch table (built on first register).
    tables: AHashMap<TypeId, Arc<CapabilityTable>>,
}

impl State {
    fn table_for<S: Subscriber>(&mut self) -> Arc<CapabilityTable> {
        Arc::clone(self.tables.entry(TypeId::of::<S>()).or_insert_with(|| {
            let table = table_of::<S>();
            if table.is_empty() {
                tracing::warn!(
                    message = "subscriber declares no capabilities",
                    subscriber = type_name::<S>(),
                );
            }
            Arc::new(table)
        }))
    }

    fn sweep_dead(&mut self) {
        let before = self.entries.len();
        self.entries.retain(WeakEntry::is_alive);
        let removed = before - self.entries.len();
        if removed > 0 {
            tracing::trace!(
                message = "registry.sweep",
                removed,
                remaining = self.entries.len(),
            );
        }
    }
}

impl ListenerRegistry {
    /// Registry with the default 30-second sweep cooldown.
    #[must_use]
    pub fn new() -> Self {
        Self::with_sweep_cooldown(DEFAULT_SWEEP_COOLDOWN)
    }

    /// Registry with a custom sweep cooldown.
    #[must_use]
    pub fn with_sweep_cooldown(cooldown: Duration) -> Self {
        Self::with_sweep_scheduler(SweepScheduler::new(cooldown))
    }

    /// Registry driven by an explicit scheduler (lab clocks for tests).
    #[must_use]
    pub fn with_sweep_scheduler(sweep: SweepScheduler) -> Self {
        Self {
            state: Mutex::new(State {
                entries: Vec::new(),
                sweep,
                tables: AHashMap::new(),
            }),
        }
    }

    /// Appends a weak entry for `subscriber`.
    ///
    /// The subscriber will receive future broadcasts for every capability it
    /// declares; no ordering is guaranteed relative to broadcasts already in
    /// flight. Registering twice is allowed and yields two invocations per
    /// broadcast. Registration does not keep the subscriber alive.
    pub fn register<S: Subscriber>(&self, subscriber: &Arc<S>) {
        let mut state = self.lock();
        let table = state.table_for::<S>();
        state.entries.push(WeakEntry::new(subscriber, table));
        tracing::trace!(
            message = "registry.register",
            subscriber = type_name::<S>(),
            entries = state.entries.len(),
        );
        if state.sweep.should_sweep(false) {
            state.sweep_dead();
        }
    }

    /// Removes every entry that matches `subscriber` by identity, plus any
    /// entry that is already dead.
    ///
    /// Counts as a forced sweep. Idempotent; accepts unsized handles, so an
    /// `Arc<dyn …>` alias of the registered `Arc<Concrete>` matches.
    pub fn unregister<S: ?Sized>(&self, subscriber: &Arc<S>) {
        let token = token_of(subscriber);
        let mut state = self.lock();
        let before = state.entries.len();
        state
            .entries
            .retain(|entry| entry.is_alive() && !entry.matches(token));
        let _ = state.sweep.should_sweep(true);
        tracing::trace!(
            message = "registry.unregister",
            removed = before - state.entries.len(),
            remaining = state.entries.len(),
        );
    }

    /// Snapshot of the live subscribers declaring capability `C`, in
    /// registration order.
    ///
    /// Pure query: invokes nothing. The returned strong references keep the
    /// subscribers alive only as long as the caller holds the vector.
    #[must_use]
    pub fn get_live<C: Capability>(&self) -> Vec<Arc<AnySubscriber>> {
        let capability = TypeId::of::<C>();
        let mut state = self.lock();
        if state.sweep.should_sweep(false) {
            state.sweep_dead();
        }
        state
            .entries
            .iter()
            .filter(|entry| entry.supports(capability))
            .filter_map(WeakEntry::target)
            .collect()
    }

    /// Invokes the `C` callback of every live subscriber declaring `C`,
    /// passing `payload` to each, in registration order.
    ///
    /// The subscriber set is snapshotted under the lock and the callbacks
    /// run outside it, so callbacks may re-enter the registry. A panicking
    /// listener is logged and does not stop the rest of the snapshot; this
    /// method always returns normally.
    pub fn broadcast<C: Capability>(&self, payload: &C::Payload) {
        let capability = TypeId::of::<C>();
        let snapshot: Vec<(Arc<AnySubscriber>, DispatchFn)> = {
            let state = self.lock();
            state
                .entries
                .iter()
                .filter_map(|entry| {
                    let dispatch = entry.dispatch_for(capability)?;
                    Some((entry.target()?, dispatch))
                })
                .collect()
        };
        tracing::trace!(
            message = "registry.broadcast",
            capability = type_name::<C>(),
            listeners = snapshot.len(),
        );

        let erased: &AnySubscriber = payload;
        for (target, dispatch) in &snapshot {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| dispatch(target.as_ref(), erased)))
            {
                tracing::error!(
                    message = "listener panicked during broadcast",
                    capability = type_name::<C>(),
                    panic = %panic_message(panic.as_ref()),
                );
            }
        }
    }

    /// Zero-argument broadcast for capabilities with `Payload = ()`.
    pub fn notify<C: Capability<Payload = ()>>(&self) {
        self.broadcast::<C>(&());
    }

    /// Drops every entry. For explicit shutdown and test isolation; live
    /// subscribers themselves are unaffected.
    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    /// Number of entries currently held, dead ones included until the next
    /// sweep. Diagnostic only.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.lock().entries.len()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("registry lock")
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("entries", &self.entry_count())
            .finish()
    }
}

/// Best-effort text of a caught panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
