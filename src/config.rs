//! Application configuration loaded from environment variables.

use std::time::Duration;

use serde::Deserialize;

use crate::book::model::ViewerIdentity;
use crate::hub::connection::HubConfig;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Hub Connection ===
    /// WebSocket URL of the market-data hub.
    pub hub_ws_url: String,

    /// Keep-alive ping interval in seconds.
    #[serde(default = "default_keep_alive_interval_s")]
    pub keep_alive_interval_s: u64,

    /// Hard server-side timeout in seconds; must exceed the keep-alive
    /// interval.
    #[serde(default = "default_server_timeout_s")]
    pub server_timeout_s: u64,

    /// Fixed reconnect delay in milliseconds.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Eviction TTL in seconds for a buffered half-update whose
    /// counterpart never arrives.
    #[serde(default = "default_pair_buffer_ttl_s")]
    pub pair_buffer_ttl_s: u64,

    // === Viewer Identity ===
    /// Originator identity the venue knows this session by.
    pub viewer_id: String,

    /// The viewer's firm.
    #[serde(default)]
    pub viewer_firm: Option<String>,

    /// Whether the viewer holds a broker role.
    #[serde(default)]
    pub viewer_is_broker: bool,

    // === Server Configuration ===
    /// HTTP server port for health/metrics endpoints.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,

    /// Enable verbose logging.
    #[serde(default)]
    pub verbose: bool,
}

fn default_keep_alive_interval_s() -> u64 {
    15
}

fn default_server_timeout_s() -> u64 {
    45
}

fn default_reconnect_delay_ms() -> u64 {
    5000
}

fn default_pair_buffer_ttl_s() -> u64 {
    30
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), String> {
        if self.hub_ws_url.is_empty() {
            return Err("HUB_WS_URL is required".to_string());
        }

        if !self.hub_ws_url.starts_with("ws://") && !self.hub_ws_url.starts_with("wss://") {
            return Err("HUB_WS_URL must start with ws:// or wss://".to_string());
        }

        if self.viewer_id.is_empty() {
            return Err("VIEWER_ID is required".to_string());
        }

        if self.keep_alive_interval_s == 0 {
            return Err("KEEP_ALIVE_INTERVAL_S must be positive".to_string());
        }

        if self.server_timeout_s <= self.keep_alive_interval_s {
            return Err(
                "SERVER_TIMEOUT_S must be greater than KEEP_ALIVE_INTERVAL_S".to_string(),
            );
        }

        if self.reconnect_delay_ms == 0 {
            return Err("RECONNECT_DELAY_MS must be positive".to_string());
        }

        Ok(())
    }

    /// Connection timing parameters.
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            keep_alive_interval: Duration::from_secs(self.keep_alive_interval_s),
            server_timeout: Duration::from_secs(self.server_timeout_s),
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            pair_buffer_ttl: Duration::from_secs(self.pair_buffer_ttl_s),
        }
    }

    /// Viewer identity used for status derivation.
    pub fn viewer(&self) -> ViewerIdentity {
        ViewerIdentity {
            originator_id: self.viewer_id.clone(),
            firm: self.viewer_firm.clone(),
            is_broker: self.viewer_is_broker,
        }
    }
}
