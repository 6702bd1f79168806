//! OS-backed [`Environment`] for production sessions.
//!
//! Monotonic time comes from `std::time::Instant`, wall-clock stamps from
//! `SystemTime`, sleeps from tokio's timer, and randomness from the OS
//! entropy source via getrandom. Nothing here is reproducible; tests that
//! need replayable runs use the harness environment instead.

use std::time::Duration;

use deaddrop_core::Environment;

/// Environment wired to the operating system.
///
/// A zero-sized handle; construct it wherever a session or relay needs
/// one. The getrandom entropy this exposes feeds content keys, nonces,
/// and RSA generation, so it must stay the OS CSPRNG.
///
/// # Panics
///
/// Operations panic if the OS RNG fails or the system clock reads before
/// the Unix epoch. Neither is recoverable for a client that has to seal
/// envelopes with fresh key material.
#[derive(Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    #[allow(clippy::disallowed_methods)]
    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    #[allow(clippy::disallowed_methods)]
    #[allow(clippy::expect_used)]
    fn wall_clock_millis(&self) -> u64 {
        let since_epoch = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("invariant: system clock is after Unix epoch (1970-01-01)");
        since_epoch.as_millis() as u64
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer)
            .expect("invariant: OS RNG failure is unrecoverable, sealing requires fresh entropy");
    }
}
