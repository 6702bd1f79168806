//! Deaddrop Session Runtime
//!
//! Async shell around the sans-IO core: this crate owns the tokio tasks
//! that move envelopes while `deaddrop-core` decides what they mean. A
//! [`Session`] signs an identity in against any [`RelayStore`], sends
//! direct and broadcast messages, rotates keys, and opens cancellable
//! per-scope sync workers.
//!
//! # Components
//!
//! - [`Session`]: Login, sends, key rotation, scope lifecycle
//! - [`SyncHandle`]: Running sync worker with snapshot subscriptions
//! - [`SystemEnv`]: Production [`Environment`] on system time and OS RNG
//! - [`SessionError`]: Key and store failures at the session edges
//!
//! # Cancellation
//!
//! Scope workers are cooperative. Cancellation is an explicit watch
//! signal checked before every fetch and every sleep, so closing a scope
//! is deterministic and a stale poll result is dropped instead of merged.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod poller;
mod session;
mod system_env;

pub use deaddrop_core::{
    DecryptedView, Environment, KeyConfig, KeyManager, RelayStore, Scope, SendError, SyncConfig,
};
pub use error::SessionError;
pub use poller::SyncHandle;
pub use session::Session;
pub use system_env::SystemEnv;
