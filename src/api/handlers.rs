//! HTTP API handlers.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use time::OffsetDateTime;

use crate::hub::connection::{ConnectionState, HubConnection};
use crate::metrics;

/// Application state shared with handlers.
#[derive(Clone)]
pub struct AppState {
    /// The hub connection being observed.
    pub hub: Arc<HubConnection>,
    /// Process start time, for uptime reporting.
    pub started_at: OffsetDateTime,
}

impl AppState {
    /// Create state around a connection handle.
    pub fn new(hub: Arc<HubConnection>) -> Self {
        Self {
            hub,
            started_at: OffsetDateTime::now_utc(),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status: "ok".
    pub status: &'static str,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    /// Whether the hub connection is up.
    pub ready: bool,
    /// Current connection state.
    pub connection: String,
}

/// Status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Current connection state.
    pub connection: String,
    /// Whether a reconnect is scheduled.
    pub reconnect_pending: bool,
    /// Last known OS-level online state.
    pub online: bool,
    /// Number of recorded subscription commands.
    pub subscriptions: usize,
    /// Number of buffered unpaired update halves.
    pub buffered_halves: usize,
    /// Seconds since process start.
    pub uptime_s: i64,
}

fn state_name(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Disconnected => "disconnected",
        ConnectionState::Connecting => "connecting",
        ConnectionState::Connected => "connected",
    }
}

/// Health check handler - always returns 200.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// Readiness check handler - returns 200 when connected, 503 otherwise.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let connection = state.hub.state();
    let is_ready = connection == ConnectionState::Connected;

    let response = ReadyResponse {
        ready: is_ready,
        connection: state_name(connection).to_string(),
    };

    if is_ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Status handler - returns connection status and sync-layer counters.
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let hub_status = state.hub.status();

    Json(StatusResponse {
        connection: state_name(hub_status.state).to_string(),
        reconnect_pending: hub_status.reconnect_pending,
        online: hub_status.online,
        subscriptions: hub_status.recorded_commands,
        buffered_halves: hub_status.buffered_halves,
        uptime_s: (OffsetDateTime::now_utc() - state.started_at).whole_seconds(),
    })
}

/// Prometheus exposition handler.
pub async fn prometheus() -> impl IntoResponse {
    metrics::render_prometheus()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::model::ViewerIdentity;
    use crate::cache::InMemoryDarkPoolCache;
    use crate::hub::connection::HubConfig;
    use crate::hub::mock::MockTransport;

    fn app_state() -> AppState {
        let (transport, _remotes) = MockTransport::new();
        let hub = HubConnection::new(
            HubConfig::default(),
            ViewerIdentity {
                originator_id: "trader7".to_string(),
                firm: None,
                is_broker: false,
            },
            transport,
            Arc::new(InMemoryDarkPoolCache::new()),
        );
        AppState::new(hub)
    }

    #[tokio::test]
    async fn status_reports_disconnected_before_connect() {
        let state = app_state();
        let response = status(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn state_names() {
        assert_eq!(state_name(ConnectionState::Disconnected), "disconnected");
        assert_eq!(state_name(ConnectionState::Connecting), "connecting");
        assert_eq!(state_name(ConnectionState::Connected), "connected");
    }
}
