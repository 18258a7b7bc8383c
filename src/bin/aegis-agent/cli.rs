//! Command-line interface definition.

use aegis_agent::config::{AgentConfig, SourceConfig};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Self-updating service agent with signed-release verification.
#[derive(Parser, Debug)]
#[command(name = "aegis-agent")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Address the HTTP surface listens on.
    #[arg(long, env = "AEGIS_BIND")]
    pub bind: Option<SocketAddr>,

    /// Path of the binary to replace (defaults to the running executable).
    #[arg(long, env = "AEGIS_TARGET")]
    pub target: Option<PathBuf>,

    /// File containing the PEM-encoded release verification public key.
    #[arg(long, env = "AEGIS_PUBLIC_KEY_FILE")]
    pub public_key_file: Option<PathBuf>,

    /// Hex-encoded detached signature over the candidate binary.
    #[arg(long, env = "AEGIS_SIGNATURE", conflicts_with = "signature_file")]
    pub signature: Option<String>,

    /// File containing the hex-encoded detached signature.
    #[arg(long, env = "AEGIS_SIGNATURE_FILE")]
    pub signature_file: Option<PathBuf>,

    /// Path of the candidate binary to install.
    #[arg(long, env = "AEGIS_CANDIDATE", conflicts_with = "candidate_url")]
    pub candidate: Option<PathBuf>,

    /// URL to fetch the candidate binary from.
    #[arg(long, env = "AEGIS_CANDIDATE_URL")]
    pub candidate_url: Option<String>,

    /// URL of the JSON release manifest used by /check.
    #[arg(long, env = "AEGIS_MANIFEST_URL")]
    pub manifest_url: Option<String>,

    /// Log level.
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// Path to configuration file.
    #[arg(long, short)]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Convert CLI arguments into an `AgentConfig`.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file is specified but cannot be loaded,
    /// or a key/signature file cannot be read.
    pub fn into_config(self) -> color_eyre::Result<AgentConfig> {
        // Start with default config or load from file
        let mut config = if let Some(ref path) = self.config {
            AgentConfig::from_file(path)?
        } else {
            AgentConfig::default()
        };

        // Override with CLI arguments
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(target) = self.target {
            config.update.target = Some(target);
        }
        if let Some(ref path) = self.public_key_file {
            config.update.public_key_pem = std::fs::read_to_string(path)?;
        }
        if let Some(signature) = self.signature {
            config.update.signature_hex = signature;
        } else if let Some(ref path) = self.signature_file {
            config.update.signature_hex = std::fs::read_to_string(path)?.trim().to_string();
        }
        if let Some(path) = self.candidate {
            config.update.source = SourceConfig::File { path };
        } else if let Some(url) = self.candidate_url {
            config.update.source = SourceConfig::Http { url };
        }
        if let Some(url) = self.manifest_url {
            config.release.manifest_url = Some(url);
        }
        config.log_level = self.log_level;

        Ok(config)
    }
}
