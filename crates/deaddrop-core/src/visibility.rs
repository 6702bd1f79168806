//! Scope membership for stored envelopes.
//!
//! The relay hands back envelopes by id range, not by conversation, so
//! every view rebuilds itself by filtering. This module is the single
//! definition of "belongs to this view": the synchronizer applies it to
//! every batch, and nothing else reimplements the rules.
//!
//! Metadata admission is necessary but not sufficient; an admitted
//! envelope still has to decrypt under the viewer's private key before it
//! becomes visible. The two checks agree by construction everywhere except
//! the sender's own direct copies, where decryptability is what narrows
//! "admitted for every peer" down to "readable by the owner only".

use deaddrop_proto::{Audience, Envelope, UserId};

/// What a synchronizer is looking at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// The shared broadcast timeline.
    Broadcast,
    /// The two-party conversation with one peer.
    Direct {
        /// The other party.
        peer: UserId,
    },
}

impl Scope {
    /// Conversation scope with `peer`.
    pub fn direct(peer: UserId) -> Self {
        Self::Direct { peer }
    }
}

/// Decides which stored envelopes belong to a scope, from one identity's
/// point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeFilter {
    own_id: UserId,
    scope: Scope,
}

impl ScopeFilter {
    /// Filter for `scope` as seen by `own_id`.
    pub fn new(own_id: UserId, scope: Scope) -> Self {
        Self { own_id, scope }
    }

    /// The scope this filter admits into.
    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Does this envelope belong to the scope?
    ///
    /// Broadcast scope admits every broadcast-audience copy regardless of
    /// which recipient it was wrapped for. Direct scope with peer `P`,
    /// viewed by `S`, admits direct-audience copies where
    /// `(sender, recipient)` is `(P, S)`, `(S, P)`, or `(S, S)`; the last
    /// arm is the sender's own readable copy, which carries no record of
    /// which conversation produced it and therefore appears in all of the
    /// owner's direct views. Legacy records (no recipient) count as
    /// broadcast copies and additionally surface in the direct view of
    /// their sender's conversation.
    pub fn admits(&self, envelope: &Envelope) -> bool {
        match self.scope {
            Scope::Broadcast => envelope.audience == Audience::Broadcast,
            Scope::Direct { peer } => match envelope.audience {
                Audience::Broadcast => {
                    envelope.recipient_id.is_none() && envelope.sender_id == peer
                }
                Audience::Direct => {
                    let sender = envelope.sender_id;
                    let recipient = envelope.recipient_id;

                    (sender == peer && recipient == Some(self.own_id))
                        || (sender == self.own_id && recipient == Some(peer))
                        || (sender == self.own_id && recipient == Some(self.own_id))
                }
            },
        }
    }
}
