//! Resolved server configuration.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use mockwire_settings::{Settings, resolve_listen_addr};

/// Everything the listeners need, with addresses already resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// HTTP + persistent-session listener.
    pub http_addr: SocketAddr,
    /// gRPC streaming-call listener.
    pub stream_addr: SocketAddr,
    /// Per-write deadline on persistent sessions.
    pub write_timeout: Duration,
    /// Largest accepted WebSocket or gRPC message in bytes.
    pub max_message_size: usize,
    /// Upper bound for `/delay/{seconds}`.
    pub max_delay_secs: u64,
    /// Permissive CORS on the HTTP listener.
    pub cors: bool,
    /// Responses per `ServerStream` call.
    pub server_stream_count: u32,
    /// Gap between `ServerStream` responses.
    pub server_stream_interval: Duration,
    /// Deadline applied to every streaming call.
    pub call_timeout: Option<Duration>,
    /// How long shutdown waits for listener tasks.
    pub shutdown_timeout: Duration,
}

impl ServerConfig {
    /// Resolve listen addresses and copy the rest from `settings`.
    pub fn from_settings(settings: &Settings) -> mockwire_settings::Result<Self> {
        Ok(Self {
            http_addr: resolve_listen_addr("server.http_addr", &settings.server.http_addr)?,
            stream_addr: resolve_listen_addr("server.stream_addr", &settings.server.stream_addr)?,
            write_timeout: settings.websocket.write_timeout(),
            max_message_size: settings.websocket.max_message_size,
            max_delay_secs: settings.server.max_delay_secs,
            cors: settings.server.cors,
            server_stream_count: settings.stream.server_stream_count,
            server_stream_interval: settings.stream.server_stream_interval(),
            call_timeout: settings.stream.call_timeout(),
            shutdown_timeout: settings.server.shutdown_timeout(),
        })
    }
}

/// Loopback listeners on ephemeral ports with the stock timings.
impl Default for ServerConfig {
    fn default() -> Self {
        let loopback = SocketAddr::from((Ipv4Addr::LOCALHOST, 0));
        Self {
            http_addr: loopback,
            stream_addr: loopback,
            write_timeout: Duration::from_secs(10),
            max_message_size: 16 * 1024 * 1024,
            max_delay_secs: 30,
            cors: true,
            server_stream_count: 5,
            server_stream_interval: Duration::from_millis(100),
            call_timeout: None,
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}
