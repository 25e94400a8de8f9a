//! Settings shapes.
//!
//! Every struct is `#[serde(default)]`, so a config file or environment layer
//! only needs to name the keys it changes. Keys are snake_case to line up with
//! `MOCKWIRE_<SECTION>__<KEY>` environment variables.

use std::time::Duration;

use mockwire_core::LogFormat;
use serde::{Deserialize, Serialize};

/// Root settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Listeners and process lifecycle.
    pub server: ServerSettings,
    /// Persistent-session transport.
    pub websocket: WebSocketSettings,
    /// Streaming-call service.
    pub stream: StreamSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

/// Listener addresses and HTTP behaviour.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// HTTP + WebSocket listener. `:port` binds all interfaces.
    pub http_addr: String,
    /// gRPC streaming-call listener. `:port` binds all interfaces.
    pub stream_addr: String,
    /// How long shutdown waits for listener tasks to drain.
    pub shutdown_timeout_secs: u64,
    /// Upper bound accepted by `/delay/{seconds}`.
    pub max_delay_secs: u64,
    /// Apply permissive CORS headers.
    pub cors: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            http_addr: "0.0.0.0:8080".to_string(),
            stream_addr: "0.0.0.0:50051".to_string(),
            shutdown_timeout_secs: 10,
            max_delay_secs: 30,
            cors: true,
        }
    }
}

impl ServerSettings {
    /// Shutdown drain timeout.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Persistent-session transport settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSocketSettings {
    /// Per-send write deadline.
    pub write_timeout_secs: u64,
    /// Largest inbound message accepted, in bytes.
    pub max_message_size: usize,
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            write_timeout_secs: 10,
            max_message_size: 16 * 1024 * 1024,
        }
    }
}

impl WebSocketSettings {
    /// Per-send write deadline.
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

/// Streaming-call service settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// Responses produced by `ServerStream`.
    pub server_stream_count: u32,
    /// Gap between `ServerStream` responses.
    pub server_stream_interval_ms: u64,
    /// Deadline applied to every call; unset means no deadline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_timeout_secs: Option<u64>,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            server_stream_count: 5,
            server_stream_interval_ms: 100,
            call_timeout_secs: None,
        }
    }
}

impl StreamSettings {
    /// Gap between `ServerStream` responses.
    pub fn server_stream_interval(&self) -> Duration {
        Duration::from_millis(self.server_stream_interval_ms)
    }

    /// Per-call deadline, if configured.
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_secs.map(Duration::from_secs)
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}
