//! Configuration for aegis-agent.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Address the HTTP surface listens on.
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Self-update configuration.
    #[serde(default)]
    pub update: UpdateConfig,

    /// Release check configuration.
    #[serde(default)]
    pub release: ReleaseConfig,
}

/// Self-update configuration.
///
/// Key and signature material are carried as opaque text and only parsed
/// when an update is applied; a malformed value surfaces as an update
/// failure, not a startup failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// Path of the binary to replace. Defaults to the running executable.
    #[serde(default)]
    pub target: Option<PathBuf>,

    /// PEM-encoded ECDSA P-384 public key pinned for release verification.
    #[serde(default)]
    pub public_key_pem: String,

    /// Hex-encoded detached DER signature over the candidate's SHA-256
    /// checksum.
    #[serde(default)]
    pub signature_hex: String,

    /// Where the candidate binary comes from.
    #[serde(default)]
    pub source: SourceConfig,
}

/// Candidate binary source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    /// Read the candidate from a local file.
    File {
        /// Path to the candidate binary.
        path: PathBuf,
    },
    /// Fetch the candidate over HTTP(S).
    Http {
        /// Download URL for the candidate binary.
        url: String,
    },
}

/// Release check configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReleaseConfig {
    /// URL of a JSON release manifest. When unset, `/check` reports no
    /// upgrade.
    #[serde(default)]
    pub manifest_url: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            log_level: default_log_level(),
            update: UpdateConfig::default(),
            release: ReleaseConfig::default(),
        }
    }
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            target: None,
            public_key_pem: String::new(),
            signature_hex: String::new(),
            source: SourceConfig::default(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self::File {
            path: PathBuf::from("candidate.bin"),
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AgentConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &std::path::Path) -> crate::Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = AgentConfig::default();
        assert_eq!(config.bind, SocketAddr::from(([127, 0, 0, 1], 8080)));
        assert_eq!(config.log_level, "info");
        assert!(config.update.public_key_pem.is_empty());
        assert!(config.release.manifest_url.is_none());
    }

    #[test]
    fn parse_minimal_toml() {
        let config: AgentConfig = toml::from_str("").unwrap();
        assert_eq!(config.bind, default_bind());
        assert!(matches!(config.update.source, SourceConfig::File { .. }));
    }

    #[test]
    fn parse_http_source() {
        let toml = r#"
            [update]
            signature_hex = "3066023100aa"

            [update.source]
            kind = "http"
            url = "https://releases.example.com/agent-v2"
        "#;
        let config: AgentConfig = toml::from_str(toml).unwrap();
        match config.update.source {
            SourceConfig::Http { url } => {
                assert_eq!(url, "https://releases.example.com/agent-v2");
            }
            SourceConfig::File { .. } => panic!("expected http source"),
        }
        assert_eq!(config.update.signature_hex, "3066023100aa");
    }

    #[test]
    fn roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = AgentConfig::default();
        config.update.target = Some(PathBuf::from("/usr/bin/aegis-agent"));
        config.release.manifest_url = Some("https://releases.example.com/manifest.json".into());
        config.to_file(&path).unwrap();

        let loaded = AgentConfig::from_file(&path).unwrap();
        assert_eq!(
            loaded.update.target.as_deref(),
            Some(std::path::Path::new("/usr/bin/aegis-agent"))
        );
        assert_eq!(
            loaded.release.manifest_url.as_deref(),
            Some("https://releases.example.com/manifest.json")
        );
    }
}
