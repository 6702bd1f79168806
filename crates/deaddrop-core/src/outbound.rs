//! Send planning: turning plaintext into appendable envelope drafts.
//!
//! Planning is pure; executing the resulting drafts against a store is the
//! session runtime's job. A direct send plans both of its copies up front
//! so the executor only sequences appends. A broadcast seals once here and
//! wraps per recipient at execution time, which lets the executor fan the
//! per-recipient work out concurrently while every copy still shares one
//! ciphertext.

use deaddrop_crypto::{CryptoError, RecipientKey, SealedContent, is_usable_public_key};
use deaddrop_proto::{Audience, EnvelopeDraft, Identity, UserId};
use rand_core::CryptoRngCore;

/// Message author metadata stamped on every copy of a send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderProfile {
    /// Author's user id.
    pub user_id: UserId,
    /// Display name denormalized onto each envelope.
    pub display_name: String,
}

/// The two copies of a direct send.
///
/// The recipient's copy is appended first; the self copy second. If the
/// first append fails nothing persisted and the send failed cleanly, so
/// only a failure between the two produces a partial send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectPlan {
    /// Copy wrapped for the recipient.
    pub recipient_copy: EnvelopeDraft,
    /// Copy wrapped for the sender's own key, making sent history readable.
    pub self_copy: EnvelopeDraft,
}

/// Per-recipient outcome of a broadcast fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeliveryReport {
    /// Recipients whose copy was durably appended.
    pub delivered: Vec<UserId>,
    /// Recipients skipped before wrapping because their published key
    /// failed the usability check.
    pub skipped: Vec<UserId>,
    /// Recipients whose wrap or append failed outright.
    pub failed: Vec<DeliveryFailure>,
}

/// One failed fan-out target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    /// The recipient whose copy failed.
    pub user_id: UserId,
    /// What the wrap or append reported.
    pub reason: String,
}

impl DeliveryReport {
    /// Every intended recipient got a copy.
    pub fn complete(&self) -> bool {
        self.skipped.is_empty() && self.failed.is_empty()
    }

    /// At least one copy was appended; the send counts as successful.
    pub fn any_delivered(&self) -> bool {
        !self.delivered.is_empty()
    }
}

/// Split an audience by published-key usability.
///
/// Returns the identities worth wrapping for and the user ids to skip.
/// Skipping happens here, before any RSA work, so one participant with a
/// placeholder key cannot stall or sink a broadcast.
pub fn partition_audience(identities: &[Identity]) -> (Vec<&Identity>, Vec<UserId>) {
    let mut usable = Vec::with_capacity(identities.len());
    let mut skipped = Vec::new();

    for identity in identities {
        if is_usable_public_key(&identity.public_key) {
            usable.push(identity);
        } else {
            skipped.push(identity.user_id);
        }
    }

    (usable, skipped)
}

/// Plan both copies of a direct send.
///
/// Seals the plaintext once and wraps the content key twice: for the
/// recipient and for the sender. Both drafts share ciphertext and nonce.
pub fn plan_direct<R: CryptoRngCore>(
    sender: &SenderProfile,
    recipient_id: UserId,
    recipient_key: &RecipientKey,
    sender_key: &RecipientKey,
    plaintext: &[u8],
    rng: &mut R,
) -> Result<DirectPlan, CryptoError> {
    let sealed = SealedContent::seal(plaintext, rng)?;
    let for_recipient = sealed.wrap_for(recipient_key, rng)?;
    let for_sender = sealed.wrap_for(sender_key, rng)?;

    Ok(DirectPlan {
        recipient_copy: draft(sender, &sealed, Audience::Direct, recipient_id, for_recipient),
        self_copy: draft(sender, &sealed, Audience::Direct, sender.user_id, for_sender),
    })
}

/// Wrap shared sealed content for one broadcast recipient.
///
/// Called once per fan-out target; failures are isolated to that target
/// and reported in the [`DeliveryReport`], never aborting siblings.
pub fn broadcast_copy<R: CryptoRngCore>(
    sender: &SenderProfile,
    sealed: &SealedContent,
    recipient_id: UserId,
    recipient_key: &RecipientKey,
    rng: &mut R,
) -> Result<EnvelopeDraft, CryptoError> {
    let wrapped_key = sealed.wrap_for(recipient_key, rng)?;
    Ok(draft(sender, sealed, Audience::Broadcast, recipient_id, wrapped_key))
}

fn draft(
    sender: &SenderProfile,
    sealed: &SealedContent,
    audience: Audience,
    recipient_id: UserId,
    wrapped_key: Vec<u8>,
) -> EnvelopeDraft {
    EnvelopeDraft {
        sender_id: sender.user_id,
        sender_display_name: sender.display_name.clone(),
        recipient_id: Some(recipient_id),
        audience,
        ciphertext: sealed.ciphertext().to_vec(),
        wrapped_key,
        nonce: sealed.nonce().to_vec(),
    }
}
