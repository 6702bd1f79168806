//! Test cluster: an in-process relay plus session factories.
//!
//! Wires a [`Relay`] over [`MemoryStorage`] to a shared [`SimEnv`] so
//! scenario tests can log several identities in against one store and
//! drive them deterministically. Helpers return `String` errors; scenario
//! tests unwrap them, and the message says which step fell over.

use deaddrop_client::{Session, SyncHandle};
use deaddrop_core::{DecryptedView, KeyManager, MemoryKeyStore, RelayStore};
use deaddrop_proto::{Identity, UserId};
use deaddrop_server::{MemoryStorage, Relay};

use crate::SimEnv;

/// Session type every cluster participant uses.
pub type ClusterSession = Session<Relay<MemoryStorage, SimEnv>, SimEnv, MemoryKeyStore>;

/// One relay, one virtual timeline, any number of sessions.
pub struct TestCluster {
    env: SimEnv,
    relay: Relay<MemoryStorage, SimEnv>,
}

impl Default for TestCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl TestCluster {
    /// Cluster with the default seed.
    #[must_use]
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Cluster with an explicit RNG seed for the shared environment.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        let env = SimEnv::with_seed(seed);
        let relay = Relay::new(MemoryStorage::new(), env.clone());
        Self { env, relay }
    }

    /// The shared simulation environment.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// The relay every session talks to.
    pub fn relay(&self) -> &Relay<MemoryStorage, SimEnv> {
        &self.relay
    }

    /// Log a user in with a fresh in-memory key store.
    pub async fn login(
        &self,
        user_id: UserId,
        display_name: &str,
    ) -> Result<ClusterSession, String> {
        let session = Session::login(
            self.relay.clone(),
            self.env.clone(),
            KeyManager::new(MemoryKeyStore::new()),
            user_id,
            display_name,
        )
        .await
        .map_err(|e| format!("login failed for user {user_id}: {e}"))?;
        tracing::debug!(user_id, "cluster session ready");
        Ok(session)
    }

    /// Register an identity whose published key is an unusable placeholder.
    ///
    /// Models a participant that signed up but never completed key
    /// provisioning. Sends must skip it rather than fail on it.
    pub async fn publish_placeholder(
        &self,
        user_id: UserId,
        display_name: &str,
    ) -> Result<Identity, String> {
        self.relay
            .publish_identity(Identity {
                user_id,
                display_name: display_name.to_owned(),
                public_key: "placeholder".to_owned(),
            })
            .await
            .map_err(|e| format!("placeholder registration failed for user {user_id}: {e}"))
    }
}

/// Wait until a scope's visible set satisfies `ready`, then return it.
///
/// Checks the current snapshot first, so a condition that already holds
/// returns without waiting. A worker that exits before the condition
/// holds is an error, not a hang.
pub async fn snapshot_when<F>(
    handle: &SyncHandle,
    mut ready: F,
) -> Result<Vec<DecryptedView>, String>
where
    F: FnMut(&[DecryptedView]) -> bool,
{
    let mut updates = handle.subscribe();
    loop {
        {
            let current = updates.borrow_and_update();
            if ready(&current) {
                return Ok(current.clone());
            }
        }
        updates
            .changed()
            .await
            .map_err(|_| "sync worker exited before the condition held".to_owned())?;
    }
}
