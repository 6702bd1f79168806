//! Fault injection for storage-dependent code paths.
//!
//! [`ChaoticStorage`] wraps any backend and refuses a configurable share
//! of operations. Refusal happens before delegation, so a faulted
//! operation never has a partial effect on the wrapped backend. Faults
//! surface as [`StorageError::Io`], the transient class that relay
//! callers map to a retryable error.

use std::sync::{Arc, Mutex};

use deaddrop_proto::{Envelope, EnvelopeDraft, EnvelopeId, Identity, UserId};

use super::{Storage, StorageError};

/// Modulus of the fault generator; draws are uniform in `[0, LCG_MODULUS)`.
const LCG_MODULUS: u64 = 1 << 32;

/// Generator state and attempt bookkeeping, behind one lock.
struct FaultState {
    lcg: u64,
    operations: usize,
}

impl FaultState {
    /// Next value of the Numerical Recipes LCG.
    fn draw(&mut self) -> u64 {
        self.lcg = self.lcg.wrapping_mul(1_664_525).wrapping_add(1_013_904_223) % LCG_MODULUS;
        self.lcg
    }
}

/// Storage decorator that deterministically refuses operations.
///
/// Every operation advances the seeded generator exactly once, pass or
/// fault, so one seed yields one fault pattern no matter which operations
/// the caller mixes in between.
#[derive(Clone)]
pub struct ChaoticStorage<S: Storage> {
    inner: S,
    /// Draws below this fault; scaled from the configured failure rate.
    threshold: u64,
    state: Arc<Mutex<FaultState>>,
}

impl<S: Storage> ChaoticStorage<S> {
    /// Wrap `inner`, faulting a `failure_rate` share of operations.
    ///
    /// Uses a fixed seed; tests that need distinct patterns use
    /// [`with_seed`](ChaoticStorage::with_seed).
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is outside `0.0..=1.0`.
    pub fn new(inner: S, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, 0xD1CE)
    }

    /// Wrap `inner` with an explicit seed for the fault pattern.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is outside `0.0..=1.0`.
    pub fn with_seed(inner: S, failure_rate: f64, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&failure_rate),
            "failure rate must lie in 0.0..=1.0, got {failure_rate}"
        );

        Self {
            inner,
            threshold: (failure_rate * LCG_MODULUS as f64) as u64,
            state: Arc::new(Mutex::new(FaultState { lcg: seed, operations: 0 })),
        }
    }

    /// The wrapped backend, bypassing fault injection.
    ///
    /// Audits of durable state read through here; reading through the
    /// wrapper would inject faults into the audit itself.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Operations attempted so far, faulted ones included.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn operation_count(&self) -> usize {
        self.state.lock().expect("Mutex poisoned").operations
    }

    /// Count the operation and decide whether to refuse it.
    #[allow(clippy::expect_used)]
    fn gate(&self) -> Result<(), StorageError> {
        let mut state = self.state.lock().expect("Mutex poisoned");
        state.operations += 1;
        if state.draw() < self.threshold {
            return Err(StorageError::Io("injected storage fault".to_string()));
        }
        Ok(())
    }
}

impl<S: Storage> Storage for ChaoticStorage<S> {
    fn append(&self, draft: &EnvelopeDraft, created_at: u64) -> Result<EnvelopeId, StorageError> {
        self.gate()?;
        self.inner.append(draft, created_at)
    }

    fn newest(&self, limit: usize) -> Result<Vec<Envelope>, StorageError> {
        self.gate()?;
        self.inner.newest(limit)
    }

    fn after(&self, cursor: EnvelopeId) -> Result<Vec<Envelope>, StorageError> {
        self.gate()?;
        self.inner.after(cursor)
    }

    fn last_id(&self) -> Result<EnvelopeId, StorageError> {
        self.gate()?;
        self.inner.last_id()
    }

    fn envelope_count(&self) -> Result<usize, StorageError> {
        self.gate()?;
        self.inner.envelope_count()
    }

    fn upsert_identity(&self, identity: &Identity) -> Result<(), StorageError> {
        self.gate()?;
        self.inner.upsert_identity(identity)
    }

    fn identities(&self) -> Result<Vec<Identity>, StorageError> {
        self.gate()?;
        self.inner.identities()
    }

    fn publish_key(&self, user_id: UserId, public_key: &str) -> Result<Identity, StorageError> {
        self.gate()?;
        self.inner.publish_key(user_id, public_key)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use deaddrop_proto::Audience;

    use super::*;
    use crate::storage::MemoryStorage;

    fn create_test_draft(sender_id: u64) -> EnvelopeDraft {
        EnvelopeDraft {
            sender_id,
            sender_display_name: format!("user-{sender_id}"),
            recipient_id: None,
            audience: Audience::Broadcast,
            ciphertext: vec![0x44; 16],
            wrapped_key: vec![0x55; 16],
            nonce: vec![0x66; 12],
        }
    }

    /// Outcome pattern of `attempts` appends against a fresh wrapper.
    fn fault_pattern(seed: u64, rate: f64, attempts: usize) -> Vec<bool> {
        let chaotic = ChaoticStorage::with_seed(MemoryStorage::new(), rate, seed);
        (0..attempts).map(|_| chaotic.append(&create_test_draft(1), 500).is_ok()).collect()
    }

    #[test]
    fn test_zero_rate_passes_everything_through() {
        let chaotic = ChaoticStorage::new(MemoryStorage::new(), 0.0);

        for expected in 1..=50 {
            assert_eq!(chaotic.append(&create_test_draft(1), 500).unwrap(), expected);
        }

        assert_eq!(chaotic.envelope_count().unwrap(), 50);
        assert_eq!(chaotic.operation_count(), 51);
    }

    #[test]
    fn test_full_rate_refuses_without_touching_the_backend() {
        let chaotic = ChaoticStorage::new(MemoryStorage::new(), 1.0);

        assert!(chaotic.append(&create_test_draft(1), 500).is_err());
        assert!(chaotic.newest(4).is_err());
        assert!(chaotic.publish_key(1, "key").is_err());

        assert_eq!(chaotic.operation_count(), 3);
        assert_eq!(chaotic.inner().envelope_count().unwrap(), 0);
    }

    #[test]
    fn test_faults_are_transient_io_errors() {
        let chaotic = ChaoticStorage::new(MemoryStorage::new(), 1.0);

        let err = chaotic.last_id().unwrap_err();
        assert!(matches!(err, StorageError::Io(_)));
    }

    #[test]
    fn test_same_seed_repeats_the_fault_pattern() {
        let first = fault_pattern(9, 0.4, 64);
        assert_eq!(first, fault_pattern(9, 0.4, 64));
        assert_ne!(first, fault_pattern(10, 0.4, 64));

        // A mixed rate produces both outcomes.
        assert!(first.iter().any(|ok| *ok));
        assert!(first.iter().any(|ok| !*ok));
    }

    #[test]
    fn test_clones_share_one_fault_stream() {
        let chaotic = ChaoticStorage::with_seed(MemoryStorage::new(), 0.5, 3);
        let other = chaotic.clone();

        for _ in 0..10 {
            let _ = chaotic.last_id();
            let _ = other.last_id();
        }

        assert_eq!(chaotic.operation_count(), 20);
        assert_eq!(other.operation_count(), 20);
    }

    #[test]
    #[should_panic(expected = "failure rate must lie in 0.0..=1.0")]
    fn test_out_of_range_rate_is_rejected() {
        let _chaotic = ChaoticStorage::new(MemoryStorage::new(), 1.5);
    }
}
