//! # mockwire
//!
//! Server binary: loads settings, starts the HTTP and streaming-call
//! listeners, and drains them on SIGINT or SIGTERM.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use mockwire_core::LogFormat;
use mockwire_core::logging::init_subscriber;
use mockwire_server::metrics::install_recorder;
use mockwire_server::{MockServer, ServerConfig};
use mockwire_settings::{Settings, load_settings, validate};

/// Protocol test double for WebSocket and streaming-call clients.
#[derive(Parser, Debug)]
#[command(name = "mockwire", about = "Protocol test double server")]
struct Cli {
    /// JSON settings file layered over the defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// HTTP and WebSocket listen address (`host:port` or `:port`).
    #[arg(long)]
    http_addr: Option<String>,

    /// Streaming-call listen address.
    #[arg(long)]
    stream_addr: Option<String>,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long)]
    log_level: Option<String>,

    /// `compact` or `json`.
    #[arg(long)]
    log_format: Option<LogFormat>,
}

impl Cli {
    /// Flags win over every settings layer.
    fn apply(&self, settings: &mut Settings) {
        if let Some(ref addr) = self.http_addr {
            settings.server.http_addr.clone_from(addr);
        }
        if let Some(ref addr) = self.stream_addr {
            settings.server.stream_addr.clone_from(addr);
        }
        if let Some(ref level) = self.log_level {
            settings.logging.level.clone_from(level);
        }
        if let Some(format) = self.log_format {
            settings.logging.format = format;
        }
    }
}

fn resolve_settings(cli: &Cli) -> Result<Settings> {
    let mut settings =
        load_settings(cli.config.as_deref()).context("Failed to load settings")?;
    cli.apply(&mut settings);
    validate(&settings).context("Invalid command-line override")?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = resolve_settings(&cli)?;
    init_subscriber(&settings.logging.level, settings.logging.format);

    let config = ServerConfig::from_settings(&settings).context("Failed to resolve listeners")?;
    let mut server = MockServer::new(config.clone());
    match install_recorder() {
        Ok(handle) => server = server.with_metrics(handle),
        Err(e) => tracing::warn!(error = %e, "metrics recorder unavailable, /metrics will be empty"),
    }

    let listening = server.listen().await.context("Failed to start listeners")?;
    let http = listening.http_addr;
    tracing::info!("mockwire listening on http://{http}");
    tracing::info!("  GET  http://{http}/health");
    tracing::info!("  GET  http://{http}/echo  POST http://{http}/echo");
    tracing::info!("  GET  http://{http}/delay/{{seconds}}  GET http://{http}/status/{{code}}");
    tracing::info!("  GET  http://{http}/metrics");
    tracing::info!("  WS   ws://{http}/ws/echo  ws://{http}/ws/broadcast  ws://{http}/ws/chat/{{room}}");
    tracing::info!(
        "  GRPC {} mock.MockService/{{Echo,ServerStream,ClientStream,BidiStream}} (reflection on)",
        listening.stream_addr
    );

    wait_for_signal().await?;

    tracing::info!("Shutting down...");
    let drained = server
        .shutdown()
        .graceful_shutdown(listening.handles, config.shutdown_timeout)
        .await;
    if drained {
        tracing::info!("Shutdown complete");
    } else {
        tracing::warn!(
            timeout_secs = config.shutdown_timeout.as_secs(),
            "listeners did not drain before the shutdown timeout"
        );
    }
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = signal(SignalKind::terminate()).context("Failed to listen for SIGTERM")?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res.context("Failed to listen for ctrl-c")?,
        _ = term.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn flags_parse() {
        let cli = Cli::try_parse_from([
            "mockwire",
            "--http-addr",
            ":9000",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.http_addr.as_deref(), Some(":9000"));
        assert_eq!(cli.log_format, Some(LogFormat::Json));
        assert!(cli.stream_addr.is_none());
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        assert!(Cli::try_parse_from(["mockwire", "--log-format", "xml"]).is_err());
    }

    #[test]
    fn flags_override_settings() {
        let cli = Cli::try_parse_from([
            "mockwire",
            "--stream-addr",
            "127.0.0.1:6000",
            "--log-level",
            "debug",
        ])
        .unwrap();
        let mut settings = Settings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.stream_addr, "127.0.0.1:6000");
        assert_eq!(settings.server.http_addr, Settings::default().server.http_addr);
        assert_eq!(settings.logging.level, "debug");
    }

    #[test]
    fn bad_override_fails_validation() {
        let cli = Cli::try_parse_from(["mockwire", "--http-addr", "not an address"]).unwrap();
        let mut settings = Settings::default();
        cli.apply(&mut settings);
        assert!(validate(&settings).is_err());
    }

    #[test]
    fn flags_win_over_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mockwire.json");
        std::fs::write(
            &path,
            r#"{"server":{"http_addr":"127.0.0.1:7000","max_delay_secs":5}}"#,
        )
        .unwrap();
        let cli = Cli::try_parse_from([
            "mockwire",
            "--config",
            path.to_str().unwrap(),
            "--http-addr",
            "127.0.0.1:7001",
        ])
        .unwrap();
        let settings = resolve_settings(&cli).unwrap();
        assert_eq!(settings.server.http_addr, "127.0.0.1:7001");
        assert_eq!(settings.server.max_delay_secs, 5);
    }

    #[tokio::test]
    async fn server_boots_and_drains() {
        let server = MockServer::new(ServerConfig::default());
        let listening = server.listen().await.unwrap();

        let resp = reqwest::get(format!("http://{}/health", listening.http_addr))
            .await
            .unwrap();
        assert!(resp.status().is_success());
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "healthy");

        server.shutdown().shutdown();
        assert!(
            server
                .shutdown()
                .graceful_shutdown(listening.handles, Duration::from_secs(5))
                .await
        );
    }
}
