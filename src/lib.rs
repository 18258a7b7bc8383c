//! Self-updating service agent with signed-release verification.
//!
//! aegis-agent replaces its own binary with a newer release fetched from an
//! untrusted source, after verifying a detached ECDSA P-384 signature
//! against a pinned public key. The on-disk swap is atomic: at every
//! observable moment the target path resolves to either the old or the new
//! complete binary, never to a partial write.
//!
//! The crate is organized around two seams:
//!
//! - [`loader::CandidateLoader`] supplies candidate bytes from a file, an
//!   HTTP source, or memory, interchangeably.
//! - [`update::SecureUpdater`] verifies and installs them, failing closed
//!   on any load, decoding, key, or verification error before the
//!   filesystem is touched.
//!
//! A small HTTP surface ([`server`]) exposes status, release checks, and
//! the update trigger; [`agent::Agent`] wires everything together from
//! [`config::AgentConfig`].

pub mod agent;
pub mod config;
pub mod error;
pub mod loader;
pub mod release;
pub mod server;
pub mod update;

pub use agent::Agent;
pub use config::AgentConfig;
pub use error::{Error, Result};
pub use update::{SecureUpdater, UpdateError, UpdateOptions, UpdateReceipt};
