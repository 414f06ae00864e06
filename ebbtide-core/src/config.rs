//! Centralized configuration for Ebbtide.
//!
//! All tunable parameters live here so values are not hard-coded across
//! the codebase. Supports environment variable overrides for runtime
//! customization.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// Central configuration for all Ebbtide components.
#[derive(Debug, Clone, Default)]
pub struct EbbtideConfig {
    pub server: ServerConfig,
    pub network: NetworkConfig,
    pub delivery: DeliveryConfig,
}

/// HTTP streaming server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the listener to
    pub bind_address: IpAddr,
    /// Listening port; `None` disables the HTTP server entirely
    pub port: Option<u16>,
    /// Suppress the HTTP server and only report torrent contents
    pub list_only: bool,
    /// How long a request may wait for a torrent to become active
    /// before the server answers 503
    pub ready_timeout: Duration,
    /// When true, requests without a `Range` header get `200 OK`.
    /// The default keeps `206 Partial Content` for every served file,
    /// which some media players require.
    pub full_response_ok: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: Some(8000),
            list_only: false,
            ready_timeout: Duration::from_secs(600),
            full_response_ok: false,
        }
    }
}

/// Network communication configuration.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Timeout for fetching a remote .torrent file
    pub fetch_timeout: Duration,
    /// User agent for HTTP requests
    pub user_agent: &'static str,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(30),
            user_agent: "ebbtide/0.1.0",
        }
    }
}

/// Delivery parameters for the in-memory swarm engine.
///
/// Controls how the bundled engine simulates piece arrival. Production
/// deployments plug a real `SwarmEngine` implementation into `Client`
/// and ignore this section.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Piece granularity for availability tracking
    pub piece_size: u64,
    /// Simulated download speed in bytes per second
    pub delivery_rate: u64,
    /// Delay before a magnet-only torrent reports its metadata
    pub metadata_delay: Duration,
    /// File length fabricated for magnet-only torrents
    pub magnet_file_length: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            piece_size: 16 * 1024,
            delivery_rate: 4 * 1024 * 1024,
            metadata_delay: Duration::from_millis(500),
            magnet_file_length: 64 * 1024 * 1024,
        }
    }
}

impl EbbtideConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime configuration via environment variables while
    /// maintaining sensible defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(port) = std::env::var("EBBTIDE_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                config.server.port = Some(port);
            }
        }

        if let Ok(timeout) = std::env::var("EBBTIDE_READY_TIMEOUT") {
            if let Ok(seconds) = timeout.parse::<u64>() {
                config.server.ready_timeout = Duration::from_secs(seconds);
            }
        }

        if let Ok(value) = std::env::var("EBBTIDE_FULL_RESPONSE_OK") {
            config.server.full_response_ok = value == "1" || value.eq_ignore_ascii_case("true");
        }

        if let Ok(timeout) = std::env::var("EBBTIDE_FETCH_TIMEOUT") {
            if let Ok(seconds) = timeout.parse::<u64>() {
                config.network.fetch_timeout = Duration::from_secs(seconds);
            }
        }

        if let Ok(rate) = std::env::var("EBBTIDE_DELIVERY_RATE") {
            if let Ok(rate) = rate.parse::<u64>() {
                config.delivery.delivery_rate = rate;
            }
        }

        config
    }
}
