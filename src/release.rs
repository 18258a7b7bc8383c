//! Release manifest monitor.
//!
//! Checks an optional JSON release manifest for a version newer than the
//! running one. Checking is on-demand only; scheduling and retry policy
//! belong to the caller.

use crate::error::{Error, Result};
use semver::Version;
use serde::Deserialize;
use tracing::{debug, info};

/// An available upgrade advertised by the release manifest.
#[derive(Debug, Clone)]
pub struct ReleaseInfo {
    /// The newer version.
    pub version: Version,
    /// Download URL for the candidate binary.
    pub download_url: String,
    /// Hex-encoded detached signature published with the release.
    pub signature_hex: String,
    /// Release notes.
    pub notes: String,
}

/// Wire format of the release manifest.
#[derive(Debug, Deserialize)]
struct ManifestWire {
    version: String,
    download_url: String,
    #[serde(default)]
    signature: String,
    #[serde(default)]
    notes: String,
}

/// Fetches and evaluates the release manifest.
pub struct ReleaseMonitor {
    manifest_url: Option<String>,
    current_version: Version,
    client: reqwest::Client,
}

impl ReleaseMonitor {
    /// Create a monitor for the given manifest URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(manifest_url: Option<String>) -> Result<Self> {
        let current_version = Version::parse(env!("CARGO_PKG_VERSION"))
            .unwrap_or_else(|_| Version::new(0, 0, 0));
        let client = reqwest::Client::builder()
            .user_agent(concat!("aegis-agent/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Release(e.to_string()))?;

        Ok(Self {
            manifest_url,
            current_version,
            client,
        })
    }

    /// The version this agent is running.
    #[must_use]
    pub fn current_version(&self) -> &Version {
        &self.current_version
    }

    /// Fetch the manifest and report an available upgrade, if any.
    ///
    /// Returns `Ok(None)` when no manifest URL is configured or the
    /// advertised version is not newer than the running one.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest cannot be fetched or parsed.
    pub async fn check(&self) -> Result<Option<ReleaseInfo>> {
        let Some(url) = &self.manifest_url else {
            debug!("no release manifest configured");
            return Ok(None);
        };

        debug!("checking release manifest at {url}");
        let wire: ManifestWire = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Release(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::Release(e.to_string()))?
            .json()
            .await
            .map_err(|e| Error::Release(e.to_string()))?;

        self.evaluate(wire)
    }

    /// Compare an advertised release against the running version.
    fn evaluate(&self, wire: ManifestWire) -> Result<Option<ReleaseInfo>> {
        let version = Version::parse(wire.version.trim_start_matches('v'))
            .map_err(|e| Error::Release(format!("bad manifest version {:?}: {e}", wire.version)))?;

        if version > self.current_version {
            info!("release {version} available (running {})", self.current_version);
            Ok(Some(ReleaseInfo {
                version,
                download_url: wire.download_url,
                signature_hex: wire.signature,
                notes: wire.notes,
            }))
        } else {
            debug!("no newer release ({version} <= {})", self.current_version);
            Ok(None)
        }
    }
}
