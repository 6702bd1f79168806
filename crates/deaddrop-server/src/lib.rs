//! Deaddrop relay server.
//!
//! A blind store-and-forward service: clients append opaque envelope
//! copies and poll for new ones; the relay persists them and hands them
//! back in id order. It never holds a decryption key and never interprets
//! ciphertext, so a relay compromise yields nothing readable.
//!
//! # Architecture
//!
//! The relay is a thin service layer over a synchronous [`Storage`]
//! abstraction. All waiting (the blocking poll) happens in the relay;
//! backends stay simple ordered maps. Time comes from an injected
//! environment so the whole server runs under deterministic simulation.
//!
//! # Components
//!
//! - [`Relay`]: implements the client-facing store trait in-process
//! - [`storage`]: pluggable persistence (in-memory, redb, fault-injecting)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod relay;
pub mod storage;

pub use relay::{Relay, RelayConfig};
pub use storage::{ChaoticStorage, MemoryStorage, RedbStorage, Storage, StorageError};
