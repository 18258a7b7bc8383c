//! Secure self-update pipeline.
//!
//! This module authenticates a candidate binary against a pinned public key
//! and, only if authentic, replaces the target binary on disk:
//!
//! 1. load the candidate bytes through a [`CandidateLoader`]
//! 2. decode the detached signature from its hex armor
//! 3. parse the pinned PEM public key
//! 4. verify the signature over the candidate's SHA-256 checksum
//! 5. atomically swap the verified bytes into place
//!
//! Steps 1-4 are side-effect free and fail closed; only step 5 mutates the
//! filesystem, and it is all-or-nothing. Nothing is retried internally;
//! retry policy belongs to the caller.

pub mod replace;
pub mod verify;

pub use replace::remove_stale_backup;

use crate::loader::{CandidateLoader, LoadError};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Why an update application failed.
///
/// Every variant is terminal for a single [`SecureUpdater::apply`] call.
/// All variants except the replacement pair guarantee that no filesystem
/// mutation of the target occurred.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// The candidate bytes could not be obtained.
    #[error("failed to load candidate binary: {0}")]
    Load(#[from] LoadError),

    /// The configured signature could not be decoded from its transport
    /// encoding.
    #[error("invalid signature encoding: {0}")]
    SignatureEncoding(String),

    /// The configured public key could not be parsed into a usable key.
    #[error("invalid public key: {0}")]
    PublicKey(String),

    /// The signature does not match the candidate content under the pinned
    /// key.
    #[error("signature verification failed")]
    Verification,

    /// Writing or renaming the verified binary failed; the prior binary was
    /// restored.
    #[error("failed to replace {target}: {source}")]
    Replacement {
        /// The update target path.
        target: PathBuf,
        /// Underlying filesystem error.
        source: std::io::Error,
    },

    /// Replacement failed and the prior binary could not be moved back; it
    /// remains at the backup path.
    #[error("failed to replace {target} ({source}); prior binary not restored: {restore}")]
    ReplacementUnrestored {
        /// The update target path.
        target: PathBuf,
        /// Underlying filesystem error.
        source: std::io::Error,
        /// Error from the restore attempt.
        restore: std::io::Error,
    },
}

impl UpdateError {
    /// Stable machine-readable reason, used in HTTP payloads and log fields.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Load(_) => "load_failed",
            Self::SignatureEncoding(_) => "invalid_signature_encoding",
            Self::PublicKey(_) => "invalid_public_key",
            Self::Verification => "signature_verification_failed",
            Self::Replacement { .. } | Self::ReplacementUnrestored { .. } => "replacement_failed",
        }
    }

    /// Whether the target may have been touched when this error was raised.
    #[must_use]
    pub fn mutated_filesystem(&self) -> bool {
        matches!(
            self,
            Self::Replacement { .. } | Self::ReplacementUnrestored { .. }
        )
    }
}

/// Configuration for a [`SecureUpdater`].
///
/// Key and signature material are opaque text here; decoding happens inside
/// [`SecureUpdater::apply`] so that a malformed value surfaces as a tagged
/// update failure.
#[derive(Debug, Clone)]
pub struct UpdateOptions {
    /// PEM-encoded ECDSA P-384 public key pinned for verification.
    pub public_key_pem: String,
    /// Hex-encoded detached DER signature over the candidate's SHA-256
    /// checksum.
    pub signature_hex: String,
    /// Path of the binary to replace.
    pub target: PathBuf,
}

/// Outcome of a successful update application.
#[derive(Debug, Clone)]
pub struct UpdateReceipt {
    /// Bytes written to the target.
    pub bytes_written: u64,
    /// Hex SHA-256 checksum of the installed binary.
    pub checksum: String,
}

/// Authenticates candidate binaries and atomically installs them.
///
/// One updater instance guards one target path; concurrent `apply` calls on
/// the same instance serialize their replacement phase, so two successful
/// verifications can never interleave their writes.
pub struct SecureUpdater<L> {
    loader: L,
    options: UpdateOptions,
    swap_lock: Mutex<()>,
}

impl<L: CandidateLoader> SecureUpdater<L> {
    /// Create an updater over the given loader and options.
    #[must_use]
    pub fn new(loader: L, options: UpdateOptions) -> Self {
        Self {
            loader,
            options,
            swap_lock: Mutex::new(()),
        }
    }

    /// The path this updater replaces.
    #[must_use]
    pub fn target(&self) -> &Path {
        &self.options.target
    }

    /// Authenticate the candidate and replace the target binary.
    ///
    /// Load, decode, and verification failures abort with zero filesystem
    /// side effects. The on-disk swap only begins after verification
    /// succeeds; all await points precede it, so a cancelled call can never
    /// abandon a swap midway.
    ///
    /// # Errors
    ///
    /// Returns an [`UpdateError`] naming the failed stage; see its variants
    /// for the guarantees each one carries.
    pub async fn apply(&self) -> Result<UpdateReceipt, UpdateError> {
        let candidate = self.loader.read().await?;
        debug!("loaded candidate ({} bytes)", candidate.len());

        let signature = verify::decode_signature(&self.options.signature_hex)?;
        let public_key = verify::parse_public_key(&self.options.public_key_pem)?;
        let checksum = verify::verify_candidate(&public_key, &signature, &candidate)?;

        let _guard = self.swap_lock.lock().await;
        replace::install(&self.options.target, &candidate)?;

        let receipt = UpdateReceipt {
            bytes_written: candidate.len() as u64,
            checksum: hex::encode(checksum),
        };
        info!(
            "installed verified update at {} ({} bytes, sha256 {})",
            self.options.target.display(),
            receipt.bytes_written,
            receipt.checksum
        );
        Ok(receipt)
    }
}
