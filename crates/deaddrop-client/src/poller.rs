//! Cancellable poll workers bridging the relay store to scope machines.
//!
//! One worker per open scope: load history once, then poll on a fixed
//! interval, feeding every batch to that scope's [`Synchronizer`] and
//! publishing snapshots through a watch channel. Cancellation is an
//! explicit signal checked before every fetch and every sleep, so a poll
//! still in flight when the scope closes is dropped, never merged. Each
//! worker owns its machine outright; a stale worker cannot touch the
//! visible set of any scope opened after it.

use tokio::{sync::watch, task::JoinHandle};

use deaddrop_core::{
    DecryptedView, Environment, RelayStore, Scope, StoreError, SyncConfig, SyncPhase, Synchronizer,
};
use deaddrop_proto::{Envelope, EnvelopeId};

/// Running sync worker for one scope.
///
/// Snapshots update only while the worker runs; read them with
/// [`SyncHandle::snapshot`] or await changes on a [`SyncHandle::subscribe`]
/// receiver. Dropping the handle without closing it also stops the worker,
/// just without waiting for the exit.
pub struct SyncHandle {
    scope: Scope,
    cancel: watch::Sender<bool>,
    snapshots: watch::Receiver<Vec<DecryptedView>>,
    worker: JoinHandle<()>,
}

impl SyncHandle {
    /// Spawn the worker that drives `machine` against `store`.
    pub(crate) fn spawn<T: RelayStore, E: Environment>(
        store: T,
        env: E,
        machine: Synchronizer,
        config: SyncConfig,
    ) -> Self {
        let scope = machine.scope();
        let (cancel, cancel_rx) = watch::channel(false);
        let (snapshot_tx, snapshots) = watch::channel(Vec::new());
        let worker = tokio::spawn(run(store, env, machine, config, snapshot_tx, cancel_rx));
        Self { scope, cancel, snapshots, worker }
    }

    /// The scope this worker synchronizes.
    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Current visible set, ascending by `created_at`.
    pub fn snapshot(&self) -> Vec<DecryptedView> {
        self.snapshots.borrow().clone()
    }

    /// A receiver that wakes on every visible-set change.
    pub fn subscribe(&self) -> watch::Receiver<Vec<DecryptedView>> {
        self.snapshots.clone()
    }

    /// Stop the worker and wait for it to exit.
    ///
    /// The worker observes the signal at its next cancellation check and
    /// exits without merging any in-flight poll result.
    pub async fn close(self) {
        let _ = self.cancel.send(true);
        if let Err(err) = self.worker.await {
            tracing::error!(scope = ?self.scope, %err, "sync worker did not exit cleanly");
        }
    }
}

/// Worker loop: one fetch per iteration, cancellation checked on both
/// sides of it.
///
/// The first select races cancellation against the fetch; `biased` makes
/// the race deterministic and drops the fetch future whenever the signal
/// is already set. Transient store failures log and retry on the next
/// interval; rejections log louder but keep the worker alive, since a
/// scope with a broken store should stay quiet rather than tear down the
/// caller's subscriptions.
async fn run<T: RelayStore, E: Environment>(
    store: T,
    env: E,
    mut machine: Synchronizer,
    config: SyncConfig,
    snapshots: watch::Sender<Vec<DecryptedView>>,
    mut cancel: watch::Receiver<bool>,
) {
    machine.start_loading();
    tracing::debug!(scope = ?machine.scope(), "sync worker started");

    loop {
        let loading = matches!(machine.phase(), SyncPhase::Loading);
        let fetched = tokio::select! {
            biased;
            _ = cancel.changed() => break,
            fetched = fetch(&store, loading, machine.cursor(), &config) => fetched,
        };

        match fetched {
            Ok(batch) => {
                let changed = if loading {
                    machine.ingest_history(&batch)
                } else {
                    machine.ingest_poll(&batch)
                };
                // Send fails only when every receiver is gone, which means
                // the handle and all subscriptions were dropped.
                if changed && snapshots.send(machine.snapshot()).is_err() {
                    break;
                }
            }
            Err(err) if err.is_transient() => {
                tracing::warn!(scope = ?machine.scope(), %err, "sync fetch failed, retrying");
            }
            Err(err) => {
                tracing::error!(scope = ?machine.scope(), %err, "sync fetch rejected");
            }
        }

        tokio::select! {
            biased;
            _ = cancel.changed() => break,
            () = env.sleep(config.poll_interval) => {}
        }
    }

    machine.stop();
    tracing::debug!(scope = ?machine.scope(), "sync worker stopped");
}

async fn fetch<T: RelayStore>(
    store: &T,
    loading: bool,
    cursor: EnvelopeId,
    config: &SyncConfig,
) -> Result<Vec<Envelope>, StoreError> {
    if loading {
        store.recent(config.history_limit).await
    } else {
        store.poll(cursor).await
    }
}
