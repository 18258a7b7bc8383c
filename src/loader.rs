//! Candidate binary loaders.
//!
//! The updater obtains the proposed replacement binary through the
//! [`CandidateLoader`] capability: produce the complete candidate bytes, or
//! fail. File-based, network-based, and in-memory sources are
//! interchangeable behind it, so verification logic never depends on where
//! the bytes came from.

use crate::config::SourceConfig;
use bytes::Bytes;
use std::future::Future;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

/// Errors produced while obtaining a candidate binary.
///
/// A loader never signals an empty result as success; every failure mode is
/// a distinct error.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The configured source does not exist or cannot be reached.
    #[error("candidate source unavailable: {0}")]
    Unavailable(String),

    /// Reading from a local source failed.
    #[error("failed to read candidate: {0}")]
    Read(#[from] std::io::Error),

    /// Fetching from a remote source failed.
    #[error("failed to fetch candidate: {0}")]
    Fetch(#[from] reqwest::Error),

    /// The source returned fewer bytes than it advertised.
    #[error("candidate truncated: expected {expected} bytes, got {got}")]
    Truncated {
        /// Bytes the source advertised.
        expected: u64,
        /// Bytes actually received.
        got: u64,
    },
}

/// Capability to produce the complete bytes of a candidate binary.
pub trait CandidateLoader: Send + Sync {
    /// Produce the full candidate byte sequence, or fail.
    ///
    /// The returned bytes are the complete, exact content of the candidate;
    /// partial reads are never surfaced.
    fn read(&self) -> impl Future<Output = Result<Bytes, LoadError>> + Send;
}

/// Loads the candidate from a local file.
#[derive(Debug, Clone)]
pub struct FileLoader {
    path: PathBuf,
}

impl FileLoader {
    /// Create a loader for the given path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CandidateLoader for FileLoader {
    async fn read(&self) -> Result<Bytes, LoadError> {
        debug!("reading candidate from {}", self.path.display());
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(LoadError::Unavailable(self.path.display().to_string()))
            }
            Err(e) => Err(LoadError::Read(e)),
        }
    }
}

/// Fetches the candidate over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpLoader {
    client: reqwest::Client,
    url: String,
}

impl HttpLoader {
    /// Create a loader for the given URL.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("aegis-agent/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| crate::Error::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl CandidateLoader for HttpLoader {
    async fn read(&self) -> Result<Bytes, LoadError> {
        debug!("fetching candidate from {}", self.url);
        let response = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?;

        let expected = response.content_length();
        let body = response.bytes().await?;

        if let Some(expected) = expected {
            let got = body.len() as u64;
            if got != expected {
                return Err(LoadError::Truncated { expected, got });
            }
        }

        Ok(body)
    }
}

/// Serves a fixed byte sequence from memory.
///
/// Used by tests and embedded fixtures; interchangeable with the file and
/// network loaders.
#[derive(Debug, Clone)]
pub struct MemoryLoader {
    bytes: Bytes,
}

impl MemoryLoader {
    /// Create a loader over the given bytes.
    #[must_use]
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }
}

impl CandidateLoader for MemoryLoader {
    async fn read(&self) -> Result<Bytes, LoadError> {
        Ok(self.bytes.clone())
    }
}

/// Config-driven loader dispatch.
#[derive(Debug, Clone)]
pub enum Source {
    /// Local file source.
    File(FileLoader),
    /// HTTP(S) source.
    Http(HttpLoader),
    /// In-memory source.
    Memory(MemoryLoader),
}

impl Source {
    /// Build a source from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &SourceConfig) -> crate::Result<Self> {
        match config {
            SourceConfig::File { path } => Ok(Self::File(FileLoader::new(path.clone()))),
            SourceConfig::Http { url } => Ok(Self::Http(HttpLoader::new(url.clone())?)),
        }
    }
}

impl CandidateLoader for Source {
    async fn read(&self) -> Result<Bytes, LoadError> {
        match self {
            Self::File(loader) => loader.read().await,
            Self::Http(loader) => loader.read().await,
            Self::Memory(loader) => loader.read().await,
        }
    }
}
