//! Health check endpoints
//!
//! - /health, /healthz - liveness probe, always 200 while the process runs
//! - /version - build information
//!
//! The body reports whether the database is configured and whether a
//! connection has been opened yet. Neither check touches the database.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;

use crate::routes::json_response;
use crate::server::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub healthy: bool,
    /// 'online' or 'degraded' (no connection string for the target)
    pub status: &'static str,
    pub version: &'static str,
    /// Seconds since the server state was built
    pub uptime: u64,
    pub timestamp: String,
    pub mode: &'static str,
    pub database: DatabaseHealth,
}

#[derive(Serialize)]
pub struct DatabaseHealth {
    /// `online` or `local`
    pub target: &'static str,
    /// `mongodb` or `memory`
    pub store: &'static str,
    pub configured: bool,
    pub connected: bool,
}

fn build_health_response(state: &AppState) -> HealthResponse {
    let (configured, connected) = match &state.provider {
        Some(provider) => (provider.is_configured(), provider.is_connected()),
        // Fixture store: always ready
        None => (true, true),
    };

    HealthResponse {
        healthy: true,
        status: if configured { "online" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        mode: if state.args.dev_mode {
            "development"
        } else {
            "production"
        },
        database: DatabaseHealth {
            target: state.args.db_target.as_str(),
            store: state.store.kind(),
            configured,
            connected,
        },
    }
}

/// Handle liveness probe (/health, /healthz)
pub fn health_check(state: &AppState) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &build_health_response(state))
}

#[derive(Serialize)]
pub struct VersionResponse {
    pub version: &'static str,
    pub commit: &'static str,
    pub commit_full: &'static str,
    pub build_time: &'static str,
    pub service: &'static str,
}

/// Handle version endpoint (/version)
pub fn version_info() -> Response<Full<Bytes>> {
    let response = VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
        commit: option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
        commit_full: option_env!("GIT_COMMIT_FULL").unwrap_or("unknown"),
        build_time: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
        service: "chastor",
    };
    json_response(StatusCode::OK, &response)
}
