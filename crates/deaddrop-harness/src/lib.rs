//! Deterministic simulation harness for deaddrop scenario testing.
//!
//! Everything nondeterministic in the stack is injected: time and
//! randomness through [`SimEnv`], storage through the server crate's
//! backends. With a current-thread runtime that makes full client/relay
//! scenarios reproducible down to the generated key material.
//!
//! # Scenario Testing
//!
//! [`TestCluster`] wires sessions to one in-process relay on a shared
//! virtual timeline. The integration tests under `tests/` drive complete
//! flows: broadcast fan-out, direct dual copies, key rotation, and fault
//! injection via the server's chaotic storage wrapper.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cluster;
pub mod sim_env;

pub use cluster::{ClusterSession, TestCluster, snapshot_when};
pub use sim_env::{SimEnv, SimInstant};
