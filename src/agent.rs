//! Agent assembly and lifecycle.

use crate::config::AgentConfig;
use crate::error::Result;
use crate::loader::Source;
use crate::release::ReleaseMonitor;
use crate::server::{self, AppState};
use crate::update::{self, SecureUpdater, UpdateOptions};
use std::path::PathBuf;
use tracing::{info, warn};

/// A configured agent, ready to serve.
pub struct Agent {
    config: AgentConfig,
    state: AppState,
}

impl Agent {
    /// Build an agent from configuration.
    ///
    /// Resolves the update target (defaulting to the running executable),
    /// cleans up any backup left behind by a previous swap, and assembles
    /// the updater and release monitor.
    ///
    /// # Errors
    ///
    /// Returns an error if the target cannot be resolved or the HTTP client
    /// cannot be built.
    pub fn new(config: AgentConfig) -> Result<Self> {
        let target = resolve_target(&config)?;
        info!("update target: {}", target.display());

        match update::remove_stale_backup(&target) {
            Ok(true) => info!("removed stale backup from a previous update"),
            Ok(false) => {}
            Err(e) => warn!("could not remove stale backup: {e}"),
        }

        let source = Source::from_config(&config.update.source)?;
        let updater = SecureUpdater::new(
            source,
            UpdateOptions {
                public_key_pem: config.update.public_key_pem.clone(),
                signature_hex: config.update.signature_hex.clone(),
                target,
            },
        );
        let monitor = ReleaseMonitor::new(config.release.manifest_url.clone())?;
        let state = AppState::new(updater, monitor);

        Ok(Self { config, state })
    }

    /// Serve the HTTP surface until shutdown is requested.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound or the server fails.
    pub async fn run(self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(self.config.bind).await?;
        info!("listening on {}", listener.local_addr()?);

        let router = server::router(self.state);
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("agent stopped");
        Ok(())
    }
}

fn resolve_target(config: &AgentConfig) -> Result<PathBuf> {
    match &config.update.target {
        Some(path) => Ok(path.clone()),
        None => Ok(std::env::current_exe()?),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {e}");
        return;
    }
    info!("received shutdown signal");
}
