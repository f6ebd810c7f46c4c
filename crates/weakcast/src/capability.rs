#![forbid(unsafe_code)]

//! Capability contract: typed event topics and their dispatch tables.
//!
//! # Design
//!
//! A *capability* is a marker type naming one event kind and fixing its
//! payload type. A subscriber opts into a capability by implementing
//! [`Listen<C>`] — a trait with exactly one method, so the "one callback
//! member, arity 0 or 1" rule of the event protocol is enforced by the type
//! system rather than checked at first use. Zero-argument events use
//! `Payload = ()`.
//!
//! Because the registry stores subscribers type-erased (`dyn Any`), each
//! subscriber type carries a [`CapabilityTable`]: capability `TypeId` →
//! monomorphized thunk that downcasts the erased subscriber and payload back
//! to their concrete types and calls [`Listen::on_event`]. The table is
//! built from the type's [`Subscriber::capabilities`] declaration and cached
//! by the registry for the process lifetime (capability shapes cannot change
//! at runtime).
//!
//! # Failure Modes
//!
//! - A subscriber type declaring zero capabilities is registerable but can
//!   never be invoked; the registry logs this at `warn` level.
//! - A thunk applied to a mismatched subscriber or payload type (unreachable
//!   through the typed API) skips the listener under `debug_assert!`.

use std::any::{Any, TypeId};
use std::marker::PhantomData;

use ahash::AHashMap;

/// Type-erased, thread-safe subscriber reference as stored by the registry.
pub type AnySubscriber = dyn Any + Send + Sync;

/// One event kind ("topic") and its payload type.
///
/// Implemented on marker types, typically uninhabited enums:
///
/// ```
/// use weakcast::Capability;
///
/// enum ThemeChanged {}
/// impl Capability for ThemeChanged {
///     type Payload = String;
/// }
/// ```
pub trait Capability: 'static {
    /// Payload delivered with each broadcast; `()` for zero-argument events.
    type Payload: Any + Send + Sync;
}

/// The single callback a subscriber implements per capability it opts into.
pub trait Listen<C: Capability>: Send + Sync {
    /// Handles one broadcast of capability `C`.
    ///
    /// Called synchronously from the broadcaster's thread, outside the
    /// registry lock. Must be fast and non-blocking; a panic here is caught,
    /// logged, and does not affect other listeners.
    fn on_event(&self, payload: &C::Payload);
}

/// Declares which capabilities a subscriber type handles.
///
/// The declaration replaces runtime interface discovery: the registry calls
/// [`Subscriber::capabilities`] once per concrete type and caches the
/// resulting dispatch table.
pub trait Subscriber: Any + Send + Sync {
    /// Declare every capability this type listens to via
    /// [`CapabilitySet::declare`].
    fn capabilities(set: &mut CapabilitySet<Self>)
    where
        Self: Sized;
}

/// Erased dispatch thunk: (subscriber, payload) → one `on_event` call.
pub(crate) type DispatchFn = fn(&AnySubscriber, &AnySubscriber);

/// Capability `TypeId` → dispatch thunk for one subscriber type.
pub(crate) struct CapabilityTable {
    dispatch: AHashMap<TypeId, DispatchFn>,
}

impl CapabilityTable {
    pub(crate) fn supports(&self, capability: TypeId) -> bool {
        self.dispatch.contains_key(&capability)
    }

    pub(crate) fn dispatch_for(&self, capability: TypeId) -> Option<DispatchFn> {
        self.dispatch.get(&capability).copied()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.dispatch.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.dispatch.len()
    }
}

/// Builder handed to [`Subscriber::capabilities`].
///
/// The `S` parameter pins declarations to the subscriber type being
/// registered: `declare::<C>()` only compiles when `S: Listen<C>`.
pub struct CapabilitySet<S: ?Sized> {
    dispatch: AHashMap<TypeId, DispatchFn>,
    _subscriber: PhantomData<fn(&S)>,
}

impl<S: Subscriber> CapabilitySet<S> {
    pub(crate) fn new() -> Self {
        Self {
            dispatch: AHashMap::new(),
            _subscriber: PhantomData,
        }
    }

    /// Declares that `S` listens to capability `C`.
    ///
    /// Idempotent: declaring the same capability twice overwrites the entry
    /// with the same thunk.
    pub fn declare<C: Capability>(&mut self)
    where
        S: Listen<C>,
    {
        self.dispatch.insert(TypeId::of::<C>(), dispatch_as::<S, C>);
    }

    pub(crate) fn into_table(self) -> CapabilityTable {
        CapabilityTable {
            dispatch: self.dispatch,
        }
    }
}

/// Monomorphized thunk stored in a [`CapabilityTable`].
fn dispatch_as<S, C>(target: &AnySubscriber, payload: &AnySubscriber)
where
    S: Subscriber + Listen<C>,
    C: Capability,
{
    let Some(subscriber) = target.downcast_ref::<S>() else {
        debug_assert!(false, "dispatch table applied to a foreign subscriber type");
        return;
    };
    let Some(payload) = payload.downcast_ref::<C::Payload>() else {
        debug_assert!(false, "payload type does not match capability");
        return;
    };
    subscriber.on_event(payload);
}

/// Builds the dispatch table for subscriber type `S` from its declaration.
pub(crate) fn table_of<S: Subscriber>() -> CapabilityTable {
    let mut set = CapabilitySet::new();
    S::capabilities(&mut set);
    set.into_table()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
