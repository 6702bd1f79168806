//! Injected time and randomness.
//!
//! Client and relay code never touch the system clock or the OS RNG
//! directly; they go through an [`Environment`]. Production wires this to
//! real resources, the test harness wires it to a virtual clock and a
//! seeded generator, and everything built on top replays identically.

use std::time::Duration;

use rand_core::{CryptoRng, RngCore};

/// Time, randomness, and sleeping, as a capability handle.
///
/// Implementations are cheap to clone and shared freely across tasks.
///
/// # Contract
///
/// - [`now`] is monotonic: within one environment, later calls never
///   read earlier than prior ones
/// - [`random_bytes`] draws from a CSPRNG; in production that means OS
///   entropy, in simulation a seeded stream that replays exactly
/// - Every method is infallible short of environment breakage (OS
///   entropy exhaustion, a misconfigured simulation)
///
/// [`now`]: Environment::now
/// [`random_bytes`]: Environment::random_bytes
pub trait Environment: Clone + Send + Sync + 'static {
    /// The instant type [`now`](Environment::now) produces.
    ///
    /// `std::time::Instant` in production; simulated clocks define their
    /// own. Only differences between instants are meaningful, so the
    /// bound asks for subtraction, not arithmetic in general.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current monotonic time, for measuring deadlines and waits.
    fn now(&self) -> Self::Instant;

    /// Wall-clock time as Unix milliseconds (UTC).
    ///
    /// Envelope `created_at` stamps come from here. Unlike [`now`], this is
    /// allowed to jump (NTP adjustments in production, configured base time
    /// in simulation); nothing orders on it across processes.
    ///
    /// [`now`]: Environment::now
    fn wall_clock_millis(&self) -> u64;

    /// Suspend the calling task for `duration`.
    ///
    /// The single async entry point of the trait. Worker and wait loops
    /// use it; planning and merge logic never block.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fill `buffer` from this environment's entropy source.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    ///
    /// Convenience for session tokens and test ids.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// Borrow this environment's entropy as a [`CryptoRngCore`] handle.
    ///
    /// Key generation and OAEP wrapping take `&mut impl CryptoRngCore`;
    /// this adapter lets them draw from the same source as
    /// [`random_bytes`], so a seeded environment stays deterministic end
    /// to end.
    ///
    /// [`CryptoRngCore`]: rand_core::CryptoRngCore
    /// [`random_bytes`]: Environment::random_bytes
    fn rng(&self) -> EnvRng<'_, Self> {
        EnvRng(self)
    }
}

/// [`CryptoRngCore`](rand_core::CryptoRngCore) adapter over an
/// [`Environment`]'s entropy source.
pub struct EnvRng<'a, E>(&'a E);

impl<E: Environment> RngCore for EnvRng<'_, E> {
    fn next_u32(&mut self) -> u32 {
        let mut bytes = [0u8; 4];
        self.0.random_bytes(&mut bytes);
        u32::from_be_bytes(bytes)
    }

    fn next_u64(&mut self) -> u64 {
        let mut bytes = [0u8; 8];
        self.0.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.0.random_bytes(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.0.random_bytes(dest);
        Ok(())
    }
}

// The Environment contract requires random_bytes to be cryptographically
// secure, so the marker holds for every conforming implementation.
impl<E: Environment> CryptoRng for EnvRng<'_, E> {}
