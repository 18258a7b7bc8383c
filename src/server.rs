//! HTTP surface for status, release checks, and update triggers.
//!
//! Thin boundary over [`SecureUpdater`] and [`ReleaseMonitor`]: `GET /` and
//! `GET /status` report versions, `GET /check` refreshes release
//! information, `POST /install` applies the configured update. Every
//! failure, including response serialization, surfaces as a response to the
//! caller; nothing in the request path aborts the process.

use crate::loader::Source;
use crate::release::{ReleaseInfo, ReleaseMonitor};
use crate::update::{SecureUpdater, UpdateError};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Shared state behind the HTTP surface.
#[derive(Clone)]
pub struct AppState {
    updater: Arc<SecureUpdater<Source>>,
    monitor: Arc<ReleaseMonitor>,
    latest: Arc<RwLock<Option<ReleaseInfo>>>,
}

impl AppState {
    /// Assemble state from the agent's components.
    #[must_use]
    pub fn new(updater: SecureUpdater<Source>, monitor: ReleaseMonitor) -> Self {
        Self {
            updater: Arc::new(updater),
            monitor: Arc::new(monitor),
            latest: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build the agent's router.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/status", get(status))
        .route("/check", get(check))
        .route("/install", post(install))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Version status payload.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Running version.
    pub version: String,
    /// Newer version advertised by the last release check, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_version: Option<String>,
}

/// Release check payload.
#[derive(Debug, Serialize)]
pub struct CheckResponse {
    /// Running version.
    pub version: String,
    /// Newer version advertised by the manifest, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_version: Option<String>,
    /// Release notes for the advertised version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Error message when the check itself failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Install outcome payload.
#[derive(Debug, Serialize)]
pub struct InstallResponse {
    /// `"updated"` or `"failed"`.
    pub status: &'static str,
    /// Bytes written on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_written: Option<u64>,
    /// Hex SHA-256 checksum of the installed binary on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    /// Stable failure reason on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    /// Human-readable failure detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let latest = state.latest.read().await;
    Json(StatusResponse {
        version: state.monitor.current_version().to_string(),
        new_version: latest.as_ref().map(|info| info.version.to_string()),
    })
}

async fn check(State(state): State<AppState>) -> (StatusCode, Json<CheckResponse>) {
    let version = state.monitor.current_version().to_string();
    match state.monitor.check().await {
        Ok(info) => {
            let response = CheckResponse {
                version,
                new_version: info.as_ref().map(|i| i.version.to_string()),
                notes: info.as_ref().and_then(|i| {
                    if i.notes.is_empty() {
                        None
                    } else {
                        Some(i.notes.clone())
                    }
                }),
                error: None,
            };
            *state.latest.write().await = info;
            (StatusCode::OK, Json(response))
        }
        Err(e) => {
            warn!("release check failed: {e}");
            (
                StatusCode::BAD_GATEWAY,
                Json(CheckResponse {
                    version,
                    new_version: None,
                    notes: None,
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}

async fn install(State(state): State<AppState>) -> (StatusCode, Json<InstallResponse>) {
    match state.updater.apply().await {
        Ok(receipt) => (
            StatusCode::OK,
            Json(InstallResponse {
                status: "updated",
                bytes_written: Some(receipt.bytes_written),
                checksum: Some(receipt.checksum),
                reason: None,
                message: None,
            }),
        ),
        Err(e) => {
            warn!(reason = e.reason(), "update failed: {e}");
            (
                status_for(&e),
                Json(InstallResponse {
                    status: "failed",
                    bytes_written: None,
                    checksum: None,
                    reason: Some(e.reason()),
                    message: Some(e.to_string()),
                }),
            )
        }
    }
}

/// Map update failures onto response codes: upstream load failures are a bad
/// gateway, a rejected candidate is unprocessable, everything else is on the
/// agent itself.
fn status_for(error: &UpdateError) -> StatusCode {
    match error {
        UpdateError::Load(_) => StatusCode::BAD_GATEWAY,
        UpdateError::Verification => StatusCode::UNPROCESSABLE_ENTITY,
        UpdateError::SignatureEncoding(_)
        | UpdateError::PublicKey(_)
        | UpdateError::Replacement { .. }
        | UpdateError::ReplacementUnrestored { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
