//! Login, sends, and scope lifecycle for one signed-in identity.
//!
//! A [`Session`] owns the private key, the sender profile, and the shared
//! public-key cache. Send planning stays in `deaddrop-core`; this module
//! sequences the resulting appends against the relay store and spawns the
//! per-scope sync workers.
//!
//! # Send execution
//!
//! Direct sends append their two planned copies in order, recipient copy
//! first, so a clean failure persists nothing and only a failure between
//! the appends yields a partial send. Broadcasts seal once, then wrap and
//! append concurrently with one task per recipient and an all-complete
//! join; per-recipient failures land in the [`DeliveryReport`] instead of
//! aborting siblings.

use std::{collections::HashMap, sync::Arc};

use tokio::task::JoinSet;

use deaddrop_core::{
    DeliveryFailure, DeliveryReport, Environment, KeyManager, KeyStore, PublicKeyDirectory,
    RelayStore, Scope, SendError, SenderProfile, SyncConfig, Synchronizer, broadcast_copy,
    partition_audience, plan_direct,
};
use deaddrop_crypto::{KeyPair, SealedContent, is_usable_public_key};
use deaddrop_proto::{EnvelopeId, Identity, UserId};

use crate::{error::SessionError, poller::SyncHandle};

/// One signed-in identity bound to a relay store.
///
/// The store, environment, and key pair handle are cheap to clone and are
/// shared with every worker and fan-out task the session spawns. Dropping
/// the session does not stop running scope workers; close their handles.
pub struct Session<T, E, K> {
    store: T,
    env: E,
    keyring: KeyManager<K>,
    profile: SenderProfile,
    keys: Arc<KeyPair>,
    directory: PublicKeyDirectory,
    sync_config: SyncConfig,
}

impl<T: RelayStore, E: Environment, K: KeyStore> Session<T, E, K> {
    /// Sign in: load or generate the key pair, publish the identity.
    ///
    /// Publishing is unconditional. For a first login it registers the
    /// user; for a returning user it refreshes the display name; for a
    /// user whose local key was lost and regenerated it overwrites the
    /// stale published key, and the raw-value comparison in every peer's
    /// [`PublicKeyDirectory`] invalidates their cached import.
    pub async fn login(
        store: T,
        env: E,
        keyring: KeyManager<K>,
        user_id: UserId,
        display_name: &str,
    ) -> Result<Self, SessionError> {
        let (keys, origin) = {
            let mut rng = env.rng();
            keyring.load_or_generate(user_id, &mut rng)?
        };

        let identity = Identity {
            user_id,
            display_name: display_name.to_owned(),
            public_key: keys.export_public_b64()?,
        };
        store.publish_identity(identity).await?;
        tracing::info!(user_id, ?origin, "session established");

        Ok(Self {
            store,
            env,
            keyring,
            profile: SenderProfile { user_id, display_name: display_name.to_owned() },
            keys: Arc::new(keys),
            directory: PublicKeyDirectory::new(),
            sync_config: SyncConfig::default(),
        })
    }

    /// Replace the sync tuning used by scopes opened after this call.
    #[must_use]
    pub fn with_sync_config(mut self, config: SyncConfig) -> Self {
        self.sync_config = config;
        self
    }

    /// The signed-in user.
    pub fn user_id(&self) -> UserId {
        self.profile.user_id
    }

    /// Author metadata stamped on this session's sends.
    pub fn profile(&self) -> &SenderProfile {
        &self.profile
    }

    /// The public half of the current key pair, as published.
    pub fn public_key(&self) -> Result<String, SessionError> {
        Ok(self.keys.export_public_b64()?)
    }

    /// Send a direct message, returning the id of the recipient's copy.
    ///
    /// Appends the recipient copy first and the self copy second. Failure
    /// before the first append persists nothing; failure between the two
    /// surfaces as [`SendError::PartialAppend`] with the recipient copy
    /// already durable.
    pub async fn send_direct(
        &self,
        recipient_id: UserId,
        plaintext: &str,
    ) -> Result<EnvelopeId, SendError> {
        let identities = self.store.identities().await?;
        let recipient = identities
            .iter()
            .find(|identity| identity.user_id == recipient_id)
            .ok_or(SendError::UnknownRecipient { user_id: recipient_id })?;
        if !is_usable_public_key(&recipient.public_key) {
            return Err(SendError::UnusableKey { user_id: recipient_id });
        }

        let recipient_key = self.directory.resolve(recipient_id, &recipient.public_key)?;
        let sender_key = self.keys.recipient_key();
        let plan = {
            let mut rng = self.env.rng();
            plan_direct(
                &self.profile,
                recipient_id,
                &recipient_key,
                &sender_key,
                plaintext.as_bytes(),
                &mut rng,
            )?
        };

        let delivered = self.store.append(plan.recipient_copy).await?;
        match self.store.append(plan.self_copy).await {
            Ok(_) => {
                tracing::debug!(recipient_id, envelope_id = delivered, "direct send persisted");
                Ok(delivered)
            }
            Err(err) => {
                tracing::error!(recipient_id, %err, "self copy failed after recipient copy");
                Err(SendError::PartialAppend { reason: err.to_string() })
            }
        }
    }

    /// Fan a broadcast out to every registered identity, self included.
    ///
    /// Seals the plaintext once, then wraps and appends concurrently per
    /// recipient. The join never short-circuits: every task finishes and
    /// reports. Succeeds when at least one copy persisted; the returned
    /// report distinguishes that from full delivery.
    pub async fn send_broadcast(&self, plaintext: &str) -> Result<DeliveryReport, SendError> {
        let identities = self.store.identities().await?;
        let (audience, skipped) = partition_audience(&identities);
        for user_id in &skipped {
            tracing::warn!(user_id, "skipping broadcast recipient with unusable key");
        }

        let sealed = {
            let mut rng = self.env.rng();
            Arc::new(SealedContent::seal(plaintext.as_bytes(), &mut rng)?)
        };

        let mut report = DeliveryReport { skipped, ..DeliveryReport::default() };
        let mut tasks = JoinSet::new();
        let mut targets: HashMap<tokio::task::Id, UserId> = HashMap::new();

        for identity in audience {
            let key = match self.directory.resolve(identity.user_id, &identity.public_key) {
                Ok(key) => key,
                Err(err) => {
                    report.failed.push(DeliveryFailure {
                        user_id: identity.user_id,
                        reason: err.to_string(),
                    });
                    continue;
                }
            };

            let store = self.store.clone();
            let env = self.env.clone();
            let profile = self.profile.clone();
            let sealed = Arc::clone(&sealed);
            let user_id = identity.user_id;
            let task = tasks.spawn(async move {
                let draft = {
                    let mut rng = env.rng();
                    broadcast_copy(&profile, &sealed, user_id, &key, &mut rng)
                };
                match draft {
                    Ok(draft) => store.append(draft).await.map_err(|err| err.to_string()),
                    Err(err) => Err(err.to_string()),
                }
            });
            targets.insert(task.id(), user_id);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((task_id, Ok(envelope_id))) => {
                    if let Some(user_id) = targets.remove(&task_id) {
                        tracing::debug!(user_id, envelope_id, "broadcast copy persisted");
                        report.delivered.push(user_id);
                    }
                }
                Ok((task_id, Err(reason))) => {
                    if let Some(user_id) = targets.remove(&task_id) {
                        tracing::warn!(user_id, %reason, "broadcast copy failed");
                        report.failed.push(DeliveryFailure { user_id, reason });
                    }
                }
                Err(join_err) => {
                    if let Some(user_id) = targets.remove(&join_err.id()) {
                        report.failed
                            .push(DeliveryFailure { user_id, reason: join_err.to_string() });
                    }
                }
            }
        }

        // Task completion order is scheduling-dependent; report in id order.
        report.delivered.sort_unstable();
        report.failed.sort_by_key(|failure| failure.user_id);

        if report.any_delivered() {
            Ok(report)
        } else {
            Err(SendError::Broadcast { report })
        }
    }

    /// Generate a fresh key pair and publish the replacement public half.
    ///
    /// The new pair is persisted locally before publication, so a rotation
    /// refused by the relay can be retried without losing material. Scopes
    /// opened before the rotation keep decrypting with the pair they
    /// captured; reopen them to pick up the new one.
    pub async fn rotate_key(&mut self) -> Result<(), SessionError> {
        let fresh = {
            let mut rng = self.env.rng();
            self.keyring.generate(&mut rng)?
        };
        self.keyring.persist(self.profile.user_id, &fresh)?;

        let public_key = fresh.export_public_b64()?;
        self.store.publish_key(self.profile.user_id, &public_key).await?;
        self.keys = Arc::new(fresh);
        tracing::info!(user_id = self.profile.user_id, "key pair rotated");
        Ok(())
    }

    /// Start synchronizing one scope.
    ///
    /// Every call spawns an independent worker with its own state machine;
    /// two handles for the same scope never share state. Close the handle
    /// to stop its worker deterministically.
    pub fn open_scope(&self, scope: Scope) -> SyncHandle {
        let machine = Synchronizer::new(self.profile.user_id, Arc::clone(&self.keys), scope);
        SyncHandle::spawn(self.store.clone(), self.env.clone(), machine, self.sync_config.clone())
    }

    /// End the session, honoring the keyring's clear-on-logout setting.
    pub fn logout(self) -> Result<(), SessionError> {
        self.keyring.end_session(self.profile.user_id)?;
        Ok(())
    }
}
