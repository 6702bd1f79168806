//! Per-scope synchronization state machine.
//!
//! The relay offers exactly one read primitive: "records with id greater
//! than X". Everything conversation-shaped is rebuilt client-side by this
//! machine. It is sans-IO: the poll worker fetches batches and feeds them
//! in; the machine decides what becomes visible and where the cursor
//! stands. That split keeps every ordering and dedup rule testable without
//! a runtime.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──start_loading()──▶ Loading ──ingest_history()──▶ Steady
//!                                                            │
//!   stop() from any phase ──▶ Stopped ◀─────────────────────┘
//! ```
//!
//! Loading replaces the visible set (history snapshot wins); Steady unions
//! poll batches into it. Both paths run the same merge: admit by scope,
//! decrypt, drop what this key cannot open, dedup by id, order by
//! `created_at`.
//!
//! # Invariants
//!
//! - The cursor never decreases, and always equals the highest RAW batch
//!   id ever ingested. Undecryptable and out-of-scope envelopes still
//!   advance it; otherwise they would be refetched forever.
//! - Ingest calls in `Stopped` are discarded. A worker being cancelled
//!   while a poll is in flight hands its result to a machine that no
//!   longer accepts it.
//! - `visible()` holds at most one entry per envelope id, sorted by
//!   `created_at` ascending with a stable order for ties.

use std::{collections::HashSet, sync::Arc, time::Duration};

use deaddrop_crypto::{KeyPair, open};
use deaddrop_proto::{Envelope, EnvelopeId, UserId};

use crate::visibility::{Scope, ScopeFilter};

/// Tuning for the poll worker driving a [`Synchronizer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Delay between poll requests once history has loaded.
    pub poll_interval: Duration,
    /// How many records the initial history snapshot asks for.
    pub history_limit: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { poll_interval: Duration::from_secs(5), history_limit: 50 }
    }
}

/// Where a synchronizer is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Created, nothing fetched yet.
    Idle,
    /// History snapshot requested, not yet ingested.
    Loading,
    /// Incremental polling.
    Steady,
    /// Scope closed; all further ingests are discarded.
    Stopped,
}

/// One decrypted envelope as a view model.
///
/// Derived state, rebuilt from ciphertext on every sync cycle and never
/// persisted anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedView {
    /// Store id of the underlying envelope.
    pub id: EnvelopeId,
    /// Author of the message.
    pub sender_id: UserId,
    /// Author's display name at send time.
    pub sender_display_name: String,
    /// Decrypted message body.
    pub plaintext: String,
    /// Store-assigned append timestamp, Unix milliseconds.
    pub created_at: u64,
    /// True when the viewing identity authored the message.
    pub is_own: bool,
}

enum MergeMode {
    Replace,
    Union,
}

/// Sans-IO sync state machine for one scope.
pub struct Synchronizer {
    own_id: UserId,
    keys: Arc<KeyPair>,
    filter: ScopeFilter,
    phase: SyncPhase,
    cursor: EnvelopeId,
    visible: Vec<DecryptedView>,
}

impl Synchronizer {
    /// Machine for `scope` as seen by `own_id`, starting idle with a zero
    /// cursor.
    pub fn new(own_id: UserId, keys: Arc<KeyPair>, scope: Scope) -> Self {
        Self {
            own_id,
            keys,
            filter: ScopeFilter::new(own_id, scope),
            phase: SyncPhase::Idle,
            cursor: 0,
            visible: Vec::new(),
        }
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// Highest raw envelope id ever ingested; 0 before the first batch.
    pub fn cursor(&self) -> EnvelopeId {
        self.cursor
    }

    /// The scope this machine synchronizes.
    pub fn scope(&self) -> Scope {
        self.filter.scope()
    }

    /// Decrypted entries, ordered by `created_at` ascending.
    pub fn visible(&self) -> &[DecryptedView] {
        &self.visible
    }

    /// Snapshot of the visible set for publication to watchers.
    pub fn snapshot(&self) -> Vec<DecryptedView> {
        self.visible.clone()
    }

    /// Mark the history fetch as issued.
    pub fn start_loading(&mut self) {
        if self.phase == SyncPhase::Stopped {
            return;
        }
        self.phase = SyncPhase::Loading;
    }

    /// Ingest the history snapshot, replacing the visible set.
    ///
    /// Returns true when the visible set changed. Discarded in `Stopped`.
    pub fn ingest_history(&mut self, batch: &[Envelope]) -> bool {
        if self.phase == SyncPhase::Stopped {
            tracing::debug!(scope = ?self.scope(), "history batch discarded after stop");
            return false;
        }

        let changed = self.merge(batch, &MergeMode::Replace);
        self.phase = SyncPhase::Steady;
        changed
    }

    /// Ingest a poll batch, merging it into the visible set.
    ///
    /// Returns true when the visible set changed. Discarded unless the
    /// machine is in `Steady`; a poll result racing the history snapshot
    /// would otherwise leak records in ahead of the replace.
    pub fn ingest_poll(&mut self, batch: &[Envelope]) -> bool {
        if self.phase != SyncPhase::Steady {
            tracing::debug!(scope = ?self.scope(), phase = ?self.phase, "poll batch discarded");
            return false;
        }

        self.merge(batch, &MergeMode::Union)
    }

    /// Close the scope; every later ingest is discarded.
    pub fn stop(&mut self) {
        self.phase = SyncPhase::Stopped;
    }

    fn merge(&mut self, batch: &[Envelope], mode: &MergeMode) -> bool {
        let raw_max = batch.iter().map(|envelope| envelope.id).max();

        let changed = match mode {
            MergeMode::Replace => {
                let mut seen = HashSet::new();
                let mut next: Vec<DecryptedView> = batch
                    .iter()
                    .filter(|envelope| self.filter.admits(envelope))
                    .filter_map(|envelope| self.decrypt_one(envelope))
                    .filter(|view| seen.insert(view.id))
                    .collect();
                next.sort_by_key(|view| view.created_at);

                let changed = next != self.visible;
                self.visible = next;
                changed
            }
            MergeMode::Union => {
                let mut seen: HashSet<EnvelopeId> =
                    self.visible.iter().map(|view| view.id).collect();
                let mut appended = false;

                for envelope in batch {
                    if !self.filter.admits(envelope) {
                        continue;
                    }
                    let Some(view) = self.decrypt_one(envelope) else {
                        continue;
                    };
                    if seen.insert(view.id) {
                        self.visible.push(view);
                        appended = true;
                    }
                }

                if appended {
                    self.visible.sort_by_key(|view| view.created_at);
                }
                appended
            }
        };

        if let Some(max) = raw_max {
            self.cursor = self.cursor.max(max);
        }

        changed
    }

    fn decrypt_one(&self, envelope: &Envelope) -> Option<DecryptedView> {
        let plaintext_bytes =
            match open(&envelope.ciphertext, &envelope.nonce, &envelope.wrapped_key, &self.keys) {
                Ok(bytes) => bytes,
                Err(err) => {
                    // Expected for copies wrapped for other recipients
                    tracing::trace!(envelope_id = envelope.id, %err, "envelope not readable");
                    return None;
                }
            };

        match String::from_utf8(plaintext_bytes) {
            Ok(plaintext) => Some(DecryptedView {
                id: envelope.id,
                sender_id: envelope.sender_id,
                sender_display_name: envelope.sender_display_name.clone(),
                plaintext,
                created_at: envelope.created_at,
                is_own: envelope.sender_id == self.own_id,
            }),
            Err(_) => {
                tracing::warn!(envelope_id = envelope.id, "envelope decrypted to invalid UTF-8");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::OnceLock;

    use deaddrop_crypto::SealedContent;
    use deaddrop_proto::{Audience, EnvelopeDraft};
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;
    use crate::outbound::{SenderProfile, broadcast_copy, plan_direct};

    const ALICE: UserId = 1;
    const BOB: UserId = 2;

    static ALICE_KEYS: OnceLock<Arc<KeyPair>> = OnceLock::new();
    static BOB_KEYS: OnceLock<Arc<KeyPair>> = OnceLock::new();

    fn alice_keys() -> Arc<KeyPair> {
        Arc::clone(ALICE_KEYS.get_or_init(|| {
            Arc::new(KeyPair::generate(&mut ChaCha20Rng::seed_from_u64(101), 2048).unwrap())
        }))
    }

    fn bob_keys() -> Arc<KeyPair> {
        Arc::clone(BOB_KEYS.get_or_init(|| {
            Arc::new(KeyPair::generate(&mut ChaCha20Rng::seed_from_u64(202), 2048).unwrap())
        }))
    }

    fn profile(user_id: UserId) -> SenderProfile {
        let name = if user_id == ALICE { "alice" } else { "bob" };
        SenderProfile { user_id, display_name: name.to_owned() }
    }

    fn seal_broadcast(
        sender: UserId,
        recipient: UserId,
        text: &str,
        id: EnvelopeId,
        created_at: u64,
    ) -> Envelope {
        let mut rng = ChaCha20Rng::seed_from_u64(id);
        let sealed = SealedContent::seal(text.as_bytes(), &mut rng).unwrap();
        let keys = if recipient == ALICE { alice_keys() } else { bob_keys() };
        let draft =
            broadcast_copy(&profile(sender), &sealed, recipient, &keys.recipient_key(), &mut rng)
                .unwrap();
        draft.into_envelope(id, created_at)
    }

    fn direct_pair(
        sender: UserId,
        recipient: UserId,
        text: &str,
        first_id: EnvelopeId,
        created_at: u64,
    ) -> (Envelope, Envelope) {
        let mut rng = ChaCha20Rng::seed_from_u64(first_id);
        let (sender_keys, recipient_keys) =
            if sender == ALICE { (alice_keys(), bob_keys()) } else { (bob_keys(), alice_keys()) };
        let plan = plan_direct(
            &profile(sender),
            recipient,
            &recipient_keys.recipient_key(),
            &sender_keys.recipient_key(),
            text.as_bytes(),
            &mut rng,
        )
        .unwrap();
        (
            plan.recipient_copy.into_envelope(first_id, created_at),
            plan.self_copy.into_envelope(first_id + 1, created_at),
        )
    }

    fn broadcast_sync(viewer: UserId) -> Synchronizer {
        let keys = if viewer == ALICE { alice_keys() } else { bob_keys() };
        let mut sync = Synchronizer::new(viewer, keys, Scope::Broadcast);
        sync.start_loading();
        sync
    }

    #[test]
    fn starts_idle_with_zero_cursor() {
        let sync = Synchronizer::new(ALICE, alice_keys(), Scope::Broadcast);
        assert_eq!(sync.phase(), SyncPhase::Idle);
        assert_eq!(sync.cursor(), 0);
        assert!(sync.visible().is_empty());
    }

    #[test]
    fn history_replaces_and_reaches_steady() {
        let mut sync = broadcast_sync(ALICE);
        assert_eq!(sync.phase(), SyncPhase::Loading);

        let batch = vec![
            seal_broadcast(BOB, ALICE, "one", 1, 100),
            seal_broadcast(BOB, ALICE, "two", 2, 200),
        ];
        let changed = sync.ingest_history(&batch);

        assert!(changed);
        assert_eq!(sync.phase(), SyncPhase::Steady);
        assert_eq!(sync.cursor(), 2);
        let texts: Vec<&str> = sync.visible().iter().map(|v| v.plaintext.as_str()).collect();
        assert_eq!(texts, vec!["one", "two"]);
    }

    #[test]
    fn history_orders_by_created_at_not_id() {
        let mut sync = broadcast_sync(ALICE);

        // Envelope with the higher id carries the earlier timestamp
        let batch = vec![
            seal_broadcast(BOB, ALICE, "late", 5, 900),
            seal_broadcast(BOB, ALICE, "early", 6, 100),
        ];
        sync.ingest_history(&batch);

        let texts: Vec<&str> = sync.visible().iter().map(|v| v.plaintext.as_str()).collect();
        assert_eq!(texts, vec!["early", "late"]);
        assert_eq!(sync.cursor(), 6);
    }

    #[test]
    fn poll_unions_without_duplicates() {
        let mut sync = broadcast_sync(ALICE);
        let first = seal_broadcast(BOB, ALICE, "first", 1, 100);
        sync.ingest_history(&[first.clone()]);

        // Poll overlaps the history snapshot
        let second = seal_broadcast(BOB, ALICE, "second", 2, 200);
        let changed = sync.ingest_poll(&[first, second]);

        assert!(changed);
        assert_eq!(sync.visible().len(), 2);
        assert_eq!(sync.cursor(), 2);
    }

    #[test]
    fn repeated_empty_polls_change_nothing() {
        let mut sync = broadcast_sync(ALICE);
        sync.ingest_history(&[seal_broadcast(BOB, ALICE, "only", 1, 100)]);
        let before: Vec<DecryptedView> = sync.snapshot();

        assert!(!sync.ingest_poll(&[]));
        assert!(!sync.ingest_poll(&[]));

        assert_eq!(sync.snapshot(), before);
        assert_eq!(sync.cursor(), 1);
    }

    #[test]
    fn replaying_the_same_batch_is_idempotent() {
        let mut sync = broadcast_sync(ALICE);
        let batch = vec![seal_broadcast(BOB, ALICE, "again", 3, 100)];
        sync.ingest_history(&batch);
        let before = sync.snapshot();

        assert!(!sync.ingest_poll(&batch));
        assert_eq!(sync.snapshot(), before);
        assert_eq!(sync.cursor(), 3);
    }

    #[test]
    fn cursor_advances_past_unreadable_envelopes() {
        let mut sync = broadcast_sync(ALICE);
        // Both fan-out copies arrive; only Alice's own copy decrypts
        let batch = vec![
            seal_broadcast(BOB, ALICE, "readable", 1, 100),
            seal_broadcast(BOB, BOB, "for bob only", 2, 100),
        ];
        sync.ingest_history(&batch);

        assert_eq!(sync.visible().len(), 1);
        assert_eq!(sync.cursor(), 2);
    }

    #[test]
    fn cursor_never_regresses() {
        let mut sync = broadcast_sync(ALICE);
        sync.ingest_history(&[seal_broadcast(BOB, ALICE, "high", 9, 100)]);
        assert_eq!(sync.cursor(), 9);

        // A batch with only lower ids cannot pull the cursor back
        sync.ingest_poll(&[seal_broadcast(BOB, ALICE, "low", 4, 50)]);
        assert_eq!(sync.cursor(), 9);
    }

    #[test]
    fn tampered_envelope_dropped_in_isolation() {
        let mut sync = broadcast_sync(ALICE);
        let good = seal_broadcast(BOB, ALICE, "good", 1, 100);
        let mut bad = seal_broadcast(BOB, ALICE, "bad", 2, 200);
        bad.ciphertext[0] ^= 0xFF;

        sync.ingest_history(&[good, bad]);

        let texts: Vec<&str> = sync.visible().iter().map(|v| v.plaintext.as_str()).collect();
        assert_eq!(texts, vec!["good"]);
        // The corrupt record still advances the cursor
        assert_eq!(sync.cursor(), 2);
    }

    #[test]
    fn is_own_follows_the_sender() {
        let mut sync = broadcast_sync(ALICE);
        sync.ingest_history(&[
            seal_broadcast(ALICE, ALICE, "mine", 1, 100),
            seal_broadcast(BOB, ALICE, "theirs", 2, 200),
        ]);

        let flags: Vec<bool> = sync.visible().iter().map(|v| v.is_own).collect();
        assert_eq!(flags, vec![true, false]);
    }

    #[test]
    fn direct_send_shows_one_copy_per_viewer() {
        let (to_bob, to_self) = direct_pair(ALICE, BOB, "secret", 1, 100);

        let mut alice_view = Synchronizer::new(ALICE, alice_keys(), Scope::direct(BOB));
        alice_view.start_loading();
        alice_view.ingest_history(&[to_bob.clone(), to_self.clone()]);

        assert_eq!(alice_view.visible().len(), 1);
        assert!(alice_view.visible()[0].is_own);
        assert_eq!(alice_view.visible()[0].plaintext, "secret");

        let mut bob_view = Synchronizer::new(BOB, bob_keys(), Scope::direct(ALICE));
        bob_view.start_loading();
        bob_view.ingest_history(&[to_bob, to_self]);

        assert_eq!(bob_view.visible().len(), 1);
        assert!(!bob_view.visible()[0].is_own);
        assert_eq!(bob_view.visible()[0].plaintext, "secret");
    }

    #[test]
    fn direct_copies_stay_out_of_broadcast_scope() {
        let (to_bob, to_self) = direct_pair(ALICE, BOB, "secret", 1, 100);

        let mut broadcast_view = broadcast_sync(ALICE);
        broadcast_view.ingest_history(&[to_bob, to_self]);

        assert!(broadcast_view.visible().is_empty());
        // Direct traffic still moves the broadcast cursor forward
        assert_eq!(broadcast_view.cursor(), 2);
    }

    #[test]
    fn stopped_machine_discards_everything() {
        let mut sync = broadcast_sync(ALICE);
        sync.ingest_history(&[seal_broadcast(BOB, ALICE, "kept", 1, 100)]);
        sync.stop();

        assert!(!sync.ingest_poll(&[seal_broadcast(BOB, ALICE, "late", 2, 200)]));
        assert!(!sync.ingest_history(&[seal_broadcast(BOB, ALICE, "later", 3, 300)]));

        assert_eq!(sync.phase(), SyncPhase::Stopped);
        assert_eq!(sync.visible().len(), 1);
        assert_eq!(sync.cursor(), 1);
    }

    #[test]
    fn poll_before_history_is_discarded() {
        let mut sync = broadcast_sync(ALICE);

        assert!(!sync.ingest_poll(&[seal_broadcast(BOB, ALICE, "early", 1, 100)]));
        assert!(sync.visible().is_empty());
        assert_eq!(sync.cursor(), 0);
    }

    #[test]
    fn invalid_utf8_plaintext_dropped() {
        let mut rng = ChaCha20Rng::seed_from_u64(77);
        let sealed = SealedContent::seal(&[0xFF, 0xFE, 0x80], &mut rng).unwrap();
        let draft = broadcast_copy(
            &profile(BOB),
            &sealed,
            ALICE,
            &alice_keys().recipient_key(),
            &mut rng,
        )
        .unwrap();
        let envelope = draft.into_envelope(1, 100);

        let mut sync = broadcast_sync(ALICE);
        sync.ingest_history(&[envelope]);

        assert!(sync.visible().is_empty());
        assert_eq!(sync.cursor(), 1);
    }

    #[test]
    fn stable_order_for_equal_timestamps() {
        let mut sync = broadcast_sync(ALICE);
        sync.ingest_history(&[
            seal_broadcast(BOB, ALICE, "a", 1, 500),
            seal_broadcast(BOB, ALICE, "b", 2, 500),
        ]);
        sync.ingest_poll(&[seal_broadcast(BOB, ALICE, "c", 3, 500)]);

        let texts: Vec<&str> = sync.visible().iter().map(|v| v.plaintext.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    mod properties {
        use proptest::prelude::*;

        use super::*;

        fn batch_strategy() -> impl Strategy<Value = Vec<(EnvelopeId, u64)>> {
            prop::collection::vec((1u64..64, 0u64..1_000), 0..12)
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(24))]

            #[test]
            fn cursor_equals_max_observed_id(
                history in batch_strategy(),
                poll in batch_strategy(),
            ) {
                let mut sync = broadcast_sync(ALICE);

                let history_batch: Vec<Envelope> = history
                    .iter()
                    .map(|(id, ts)| seal_broadcast(BOB, ALICE, "h", *id, *ts))
                    .collect();
                let poll_batch: Vec<Envelope> = poll
                    .iter()
                    .map(|(id, ts)| seal_broadcast(BOB, ALICE, "p", *id, *ts))
                    .collect();

                sync.ingest_history(&history_batch);
                sync.ingest_poll(&poll_batch);

                let max_seen = history_batch
                    .iter()
                    .chain(poll_batch.iter())
                    .map(|envelope| envelope.id)
                    .max()
                    .unwrap_or(0);
                prop_assert_eq!(sync.cursor(), max_seen);
            }

            #[test]
            fn visible_set_is_deduped_and_sorted(
                history in batch_strategy(),
                poll in batch_strategy(),
            ) {
                let mut sync = broadcast_sync(ALICE);

                let history_batch: Vec<Envelope> = history
                    .iter()
                    .map(|(id, ts)| seal_broadcast(BOB, ALICE, "h", *id, *ts))
                    .collect();
                let poll_batch: Vec<Envelope> = poll
                    .iter()
                    .map(|(id, ts)| seal_broadcast(BOB, ALICE, "p", *id, *ts))
                    .collect();

                sync.ingest_history(&history_batch);
                sync.ingest_poll(&poll_batch);

                let ids: Vec<EnvelopeId> = sync.visible().iter().map(|v| v.id).collect();
                let mut deduped = ids.clone();
                deduped.sort_unstable();
                deduped.dedup();
                prop_assert_eq!(ids.len(), deduped.len());

                let stamps: Vec<u64> = sync.visible().iter().map(|v| v.created_at).collect();
                let mut sorted = stamps.clone();
                sorted.sort_unstable();
                prop_assert_eq!(stamps, sorted);
            }
        }
    }
}
