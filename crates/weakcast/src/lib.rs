#![forbid(unsafe_code)]

//! Typed, weak-referenced event broadcast registry.
//!
//! `weakcast` lets arbitrary objects subscribe to coarse-grained system
//! events (display-scale changes, theme changes, idle ticks, …) without the
//! publisher knowing subscriber types, and without subscription keeping a
//! subscriber alive.
//!
//! - [`Capability`]: a marker type per event kind, carrying the payload type.
//! - [`Listen`]: the single callback a subscriber implements per capability.
//! - [`Subscriber`]: declares which capabilities a type handles.
//! - [`ListenerRegistry`]: holds weak entries and dispatches broadcasts.
//!
//! # Architecture
//!
//! The registry stores each subscriber behind a `Weak<dyn Any + Send + Sync>`
//! plus a per-type dispatch table mapping capability `TypeId`s to
//! monomorphized callback thunks. A single coarse mutex guards the entry
//! vector; broadcasts snapshot the live entries under the lock and invoke
//! callbacks **outside** it, so a callback may re-enter the registry freely.
//! Dead entries are discarded by a cooldown-gated sweep ([`SweepScheduler`]).
//!
//! # Invariants
//!
//! 1. Registration never extends a subscriber's lifetime.
//! 2. Listeners are invoked in registration order within one broadcast.
//! 3. Registering the same subscriber twice yields two invocations per
//!    broadcast (no implicit deduplication).
//! 4. A panicking listener is logged and skipped; the rest of the snapshot
//!    still runs and `broadcast` returns normally.
//! 5. A subscriber registered from inside a callback is not invoked by the
//!    in-flight broadcast, only by subsequent ones.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use weakcast::{Capability, CapabilitySet, Listen, ListenerRegistry, Subscriber};
//!
//! /// Display scale changed; payload is the new scale factor.
//! enum ScaleChanged {}
//! impl Capability for ScaleChanged {
//!     type Payload = f64;
//! }
//!
//! struct StatusBar;
//!
//! impl Listen<ScaleChanged> for StatusBar {
//!     fn on_event(&self, scale: &f64) {
//!         let _ = scale;
//!     }
//! }
//!
//! impl Subscriber for StatusBar {
//!     fn capabilities(set: &mut CapabilitySet<Self>) {
//!         set.declare::<ScaleChanged>();
//!     }
//! }
//!
//! let registry = ListenerRegistry::new();
//! let bar = Arc::new(StatusBar);
//! registry.register(&bar);
//! registry.broadcast::<ScaleChanged>(&1.5);
//! registry.unregister(&bar);
//! assert!(registry.get_live::<ScaleChanged>().is_empty());
//! ```

pub mod capability;
mod entry;
pub mod registry;
pub mod sweep;

pub use capability::{AnySubscriber, Capability, CapabilitySet, Listen, Subscriber};
pub use registry::ListenerRegistry;
pub use sweep::{DEFAULT_SWEEP_COOLDOWN, LabClock, SweepScheduler};
