//! Deterministic Environment implementation with virtual time.
//!
//! `SimEnv` replaces system time and the OS RNG with a mutex-guarded
//! virtual clock and a seeded ChaCha20 generator. Sleeping advances the
//! clock instead of waiting, then yields once to the scheduler, so tasks
//! driven by sleep loops interleave the same way on every run of a
//! current-thread runtime.
//!
//! # Virtual time semantics
//!
//! A sleep advances the clock by its full duration the moment it is first
//! polled. Concurrent sleepers therefore accumulate time rather than
//! overlap it. That is the behavior poll-loop tests want (a bounded wait
//! visibly consumes its budget) and the wrong tool for measuring parallel
//! latency.

use std::{
    future::Future,
    sync::{Arc, Mutex},
    time::Duration,
};

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

use deaddrop_core::Environment;

/// Wall-clock origin reported at virtual time zero: 2023-11-14T22:13:20Z.
const WALL_BASE_MILLIS: u64 = 1_700_000_000_000;

/// A point on the virtual clock.
///
/// Only meaningful relative to other instants from the same environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SimInstant(Duration);

impl std::ops::Sub for SimInstant {
    type Output = Duration;

    fn sub(self, earlier: Self) -> Duration {
        self.0.saturating_sub(earlier.0)
    }
}

struct SimState {
    elapsed: Duration,
    rng: ChaCha20Rng,
}

/// Deterministic environment for simulation tests.
///
/// Clones share one clock and one RNG stream, so a cluster of components
/// built from the same `SimEnv` observes a single consistent timeline.
#[derive(Clone)]
pub struct SimEnv {
    state: Arc<Mutex<SimState>>,
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl SimEnv {
    /// Environment with the default seed.
    #[must_use]
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Environment with an explicit RNG seed.
    ///
    /// Runs with the same seed and the same schedule produce identical
    /// keys, nonces, and timings.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        let state = SimState { elapsed: Duration::ZERO, rng: ChaCha20Rng::seed_from_u64(seed) };
        Self { state: Arc::new(Mutex::new(state)) }
    }

    /// Total virtual time consumed so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.state.lock().expect("Mutex poisoned").elapsed
    }
}

impl Environment for SimEnv {
    type Instant = SimInstant;

    #[allow(clippy::expect_used)]
    fn now(&self) -> Self::Instant {
        SimInstant(self.state.lock().expect("Mutex poisoned").elapsed)
    }

    #[allow(clippy::expect_used)]
    fn wall_clock_millis(&self) -> u64 {
        let state = self.state.lock().expect("Mutex poisoned");
        WALL_BASE_MILLIS + state.elapsed.as_millis() as u64
    }

    #[allow(clippy::expect_used)]
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        let state = Arc::clone(&self.state);
        async move {
            state.lock().expect("Mutex poisoned").elapsed += duration;
            // One yield per sleep keeps sibling tasks interleaving
            // deterministically under a current-thread runtime.
            tokio::task::yield_now().await;
        }
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        self.state.lock().expect("Mutex poisoned").rng.fill_bytes(buffer);
    }
}
