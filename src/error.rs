//! Error types for aegis-agent.

use thiserror::Error;

/// Convenience result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for aegis-agent.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be loaded or is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem or socket I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The release manifest could not be fetched or parsed.
    #[error("release check failed: {0}")]
    Release(String),

    /// An update application failed. Carries the full taxonomy of
    /// [`crate::update::UpdateError`].
    #[error(transparent)]
    Update(#[from] crate::update::UpdateError),
}
