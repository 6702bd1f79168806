//! Core Client Logic
//!
//! Key lifecycle, send planning, and scope synchronization for the deaddrop
//! messaging client. Everything here is sans-IO: the crate decides what to
//! encrypt, what to append, and what becomes visible, while the client
//! crate owns the runtime that moves bytes and spawns workers.
//!
//! # Architecture
//!
//! Time and randomness come from the [`Environment`] trait so every
//! decision replays deterministically under a simulated environment. The
//! relay is reached through the async [`RelayStore`] trait; in-process and
//! networked implementations are interchangeable.
//!
//! # Components
//!
//! - [`KeyManager`]: Private key generation, persistence, legacy migration
//! - [`PublicKeyDirectory`]: Cache of imported recipient keys
//! - [`Synchronizer`]: Per-scope merge of history and poll batches
//! - [`ScopeFilter`]: Metadata admission predicate for a scope
//! - [`plan_direct`] / [`broadcast_copy`]: Envelope construction for sends
//! - [`RelayStore`]: The relay operations the client depends on

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod directory;
pub mod env;
mod error;
mod keyring;
mod outbound;
mod store;
mod sync;
mod visibility;

pub use directory::PublicKeyDirectory;
pub use env::{EnvRng, Environment};
pub use error::{KeyringError, SendError, StoreError};
pub use keyring::{FileKeyStore, KeyConfig, KeyManager, KeyOrigin, KeyStore, MemoryKeyStore};
pub use outbound::{
    DeliveryFailure, DeliveryReport, DirectPlan, SenderProfile, broadcast_copy, partition_audience,
    plan_direct,
};
pub use store::RelayStore;
pub use sync::{DecryptedView, SyncConfig, SyncPhase, Synchronizer};
pub use visibility::{Scope, ScopeFilter};
