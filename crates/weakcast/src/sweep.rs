#![forbid(unsafe_code)]

//! Cooldown-gated sweep policy.
//!
//! # Design
//!
//! Registration and broadcasting can happen every frame, so scanning the
//! whole entry collection for dead subscribers on each call would be wasted
//! work; never scanning would leak dead entries indefinitely.
//! [`SweepScheduler`] amortizes the O(n) scan: a non-forced sweep runs at
//! most once per cooldown window, while deliberate, rare operations
//! (unregister) force one unconditionally.
//!
//! Time comes from `web_time::Instant` behind a [`LabClock`]-capable source
//! so cooldown behavior is testable without sleeping.
//!
//! # Invariants
//!
//! 1. `should_sweep(true)` always returns true.
//! 2. Whenever `should_sweep` returns true, "now" is recorded as the new
//!    last-sweep instant.
//! 3. A fresh scheduler treats the first non-forced call as due (no sweep
//!    has ever run).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use web_time::{Duration, Instant};

/// Default pause between non-forced sweeps.
pub const DEFAULT_SWEEP_COOLDOWN: Duration = Duration::from_secs(30);

/// Time source: real wall clock, or a manually advanced clock for tests.
#[derive(Debug, Clone)]
enum TimeSource {
    Real,
    Lab(LabClock),
}

/// A manually-advanceable clock for deterministic tests.
///
/// Clones share the same timeline; advancing one advances all.
#[derive(Debug, Clone)]
pub struct LabClock {
    epoch: Instant,
    offset_us: Arc<AtomicU64>,
}

impl LabClock {
    /// Create a lab clock starting at `Instant::now()`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            offset_us: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Advance the clock by `delta`.
    pub fn advance(&self, delta: Duration) {
        let us = delta.as_micros().min(u64::MAX as u128) as u64;
        self.offset_us.fetch_add(us, Ordering::Release);
    }

    /// Current lab time.
    #[must_use]
    pub fn now(&self) -> Instant {
        let offset = Duration::from_micros(self.offset_us.load(Ordering::Acquire));
        self.epoch + offset
    }
}

impl Default for LabClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Decides when a full dead-entry scan is worth its O(n) cost.
#[derive(Debug)]
pub struct SweepScheduler {
    cooldown: Duration,
    last_sweep: Option<Instant>,
    time_source: TimeSource,
}

impl SweepScheduler {
    /// Scheduler on the real clock with the given cooldown.
    #[must_use]
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_sweep: None,
            time_source: TimeSource::Real,
        }
    }

    /// Scheduler driven by a [`LabClock`] for deterministic tests.
    #[must_use]
    pub fn with_clock(cooldown: Duration, clock: LabClock) -> Self {
        Self {
            cooldown,
            last_sweep: None,
            time_source: TimeSource::Lab(clock),
        }
    }

    fn now(&self) -> Instant {
        match &self.time_source {
            TimeSource::Real => Instant::now(),
            TimeSource::Lab(clock) => clock.now(),
        }
    }

    /// Whether a sweep should run now.
    ///
    /// True if `force`, or if at least one cooldown has elapsed since the
    /// last sweep. Side effect: records "now" as the last-sweep instant
    /// whenever it returns true.
    pub fn should_sweep(&mut self, force: bool) -> bool {
        let now = self.now();
        let due = force
            || match self.last_sweep {
                None => true,
                Some(last) => now.duration_since(last) >= self.cooldown,
            };
        if due {
            self.last_sweep = Some(now);
        }
        due
    }

    #[must_use]
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }
}

impl Default for SweepScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_SWEEP_COOLDOWN)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
