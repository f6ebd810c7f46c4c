//! E2E integration test: one shared `ListenerRegistry` under concurrent
//! broadcaster and register/unregister churn workloads.
//!
//! Validates:
//! 1. No deadlocks — broadcasts run callbacks outside the registry lock
//!    while other threads mutate the entry collection.
//! 2. Exact delivery — every persistent listener sees every broadcast
//!    exactly once, regardless of concurrent churn.
//! 3. Sweep safety — a zero cooldown makes every operation sweep, so dead
//!    churn entries are reclaimed while broadcasts are in flight.
//! 4. Order stability — after the churn settles, the live set is exactly
//!    the persistent listeners, in registration order.
//!
//! Test scenario: 4 broadcaster threads fire 250 broadcasts each while 2
//! churn threads register short-lived listeners and remove them again, half
//! by `unregister`, half by simply dropping the strong reference.

#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use weakcast::{Capability, CapabilitySet, Listen, ListenerRegistry, Subscriber};

enum Pulse {}
impl Capability for Pulse {
    type Payload = u64;
}

#[derive(Default)]
struct Counting {
    hits: AtomicUsize,
}

impl Listen<Pulse> for Counting {
    fn on_event(&self, _: &u64) {
        self.hits.fetch_add(1, Ordering::SeqCst);
    }
}

impl Subscriber for Counting {
    fn capabilities(set: &mut CapabilitySet<Self>) {
        set.declare::<Pulse>();
    }
}

const BROADCASTERS: usize = 4;
const BROADCASTS_PER_THREAD: usize = 250;
const CHURNERS: usize = 2;
const CHURN_ITERATIONS: usize = 100;

fn thin_addr<T: ?Sized>(arc: &Arc<T>) -> usize {
    Arc::as_ptr(arc) as *const () as usize
}

#[test]
fn concurrent_churn_and_broadcast() {
    let registry = Arc::new(ListenerRegistry::with_sweep_cooldown(Duration::ZERO));

    let persistent: Vec<Arc<Counting>> = (0..3).map(|_| Arc::new(Counting::default())).collect();
    for listener in &persistent {
        registry.register(listener);
    }

    let barrier = Arc::new(Barrier::new(BROADCASTERS + CHURNERS));
    let mut handles = Vec::new();

    for t in 0..BROADCASTERS {
        let registry = Arc::clone(&registry);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            for i in 0..BROADCASTS_PER_THREAD {
                registry.broadcast::<Pulse>(&((t * BROADCASTS_PER_THREAD + i) as u64));
            }
        }));
    }

    for _ in 0..CHURNERS {
        let registry = Arc::clone(&registry);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            for i in 0..CHURN_ITERATIONS {
                let fleeting = Arc::new(Counting::default());
                registry.register(&fleeting);
                if i % 2 == 0 {
                    registry.unregister(&fleeting);
                }
                // Odd iterations drop the only strong reference instead;
                // the zero-cooldown sweeps reclaim the dead entry.
            }
        }));
    }

    for handle in handles {
        handle.join().expect("worker thread panicked");
    }

    // Only the persistent listeners remain, in registration order.
    let live = registry.get_live::<Pulse>();
    assert_eq!(live.len(), persistent.len());
    for (got, want) in live.iter().zip(&persistent) {
        assert_eq!(thin_addr(got), thin_addr(want));
    }

    // Every broadcast reached every persistent listener exactly once.
    let expected = BROADCASTERS * BROADCASTS_PER_THREAD;
    for listener in &persistent {
        assert_eq!(listener.hits.load(Ordering::SeqCst), expected);
    }
}

#[test]
fn broadcast_while_unregistering_the_invoked_listener() {
    // A listener that unregisters itself from inside its own callback.
    struct SelfRemover {
        registry: std::sync::Mutex<Option<Arc<ListenerRegistry>>>,
        this: std::sync::Mutex<Option<Arc<SelfRemover>>>,
        hits: AtomicUsize,
    }

    impl Listen<Pulse> for SelfRemover {
        fn on_event(&self, _: &u64) {
            self.hits.fetch_add(1, Ordering::SeqCst);
            let registry = self.registry.lock().unwrap().take();
            let this = self.this.lock().unwrap().take();
            if let (Some(registry), Some(this)) = (registry, this) {
                registry.unregister(&this);
            }
        }
    }

    impl Subscriber for SelfRemover {
        fn capabilities(set: &mut CapabilitySet<Self>) {
            set.declare::<Pulse>();
        }
    }

    let registry = Arc::new(ListenerRegistry::new());
    let remover = Arc::new(SelfRemover {
        registry: std::sync::Mutex::new(Some(Arc::clone(&registry))),
        this: std::sync::Mutex::new(None),
        hits: AtomicUsize::new(0),
    });
    *remover.this.lock().unwrap() = Some(Arc::clone(&remover));
    registry.register(&remover);

    registry.broadcast::<Pulse>(&1);
    registry.broadcast::<Pulse>(&2);

    // Invoked once, then gone: no deadlock, no second delivery.
    assert_eq!(remover.hits.load(Ordering::SeqCst), 1);
    assert!(registry.get_live::<Pulse>().is_empty());
}
