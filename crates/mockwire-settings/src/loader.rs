//! Settings loading.
//!
//! Layers, lowest priority first:
//! 1. Compiled [`Settings::default()`]
//! 2. Optional JSON file (a missing file contributes nothing)
//! 3. `MOCKWIRE_`-prefixed env vars, `__` between section and key
//!    (`MOCKWIRE_WEBSOCKET__WRITE_TIMEOUT_SECS=5`)
//! 4. Bare `HTTP_ADDR`, `GRPC_ADDR` and `STREAM_ADDR` listener overrides
//!
//! The result is validated before it is handed out.

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;

use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized};
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::Settings;

/// Prefix of structured env overrides.
pub const ENV_PREFIX: &str = "MOCKWIRE_";

/// Build the layered figment without extracting it.
pub fn figment(config_path: Option<&Path>) -> Figment {
    let mut figment = Figment::from(Serialized::defaults(Settings::default()));
    if let Some(path) = config_path {
        debug!(?path, "layering settings file");
        figment = figment.merge(Json::file(path));
    }
    figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Load, apply legacy listener overrides, and validate.
pub fn load_settings(config_path: Option<&Path>) -> Result<Settings> {
    let mut settings: Settings = figment(config_path).extract()?;
    apply_legacy_env(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Apply the bare listener env vars.
///
/// `STREAM_ADDR` wins over `GRPC_ADDR` when both are set.
pub fn apply_legacy_env(settings: &mut Settings) {
    if let Some(v) = read_env_string("HTTP_ADDR") {
        settings.server.http_addr = v;
    }
    if let Some(v) = read_env_string("GRPC_ADDR") {
        settings.server.stream_addr = v;
    }
    if let Some(v) = read_env_string("STREAM_ADDR") {
        settings.server.stream_addr = v;
    }
}

/// Reject settings the server cannot run with.
pub fn validate(settings: &Settings) -> Result<()> {
    let _ = resolve_listen_addr("server.http_addr", &settings.server.http_addr)?;
    let _ = resolve_listen_addr("server.stream_addr", &settings.server.stream_addr)?;
    if settings.websocket.write_timeout_secs == 0 {
        return Err(SettingsError::InvalidValue(
            "websocket.write_timeout_secs must be at least 1".into(),
        ));
    }
    if settings.websocket.max_message_size == 0 {
        return Err(SettingsError::InvalidValue(
            "websocket.max_message_size must be at least 1".into(),
        ));
    }
    if settings.stream.server_stream_count == 0 {
        return Err(SettingsError::InvalidValue(
            "stream.server_stream_count must be at least 1".into(),
        ));
    }
    if settings.stream.call_timeout_secs == Some(0) {
        return Err(SettingsError::InvalidValue(
            "stream.call_timeout_secs must be at least 1 when set".into(),
        ));
    }
    Ok(())
}

/// Turn a listen address into a socket address.
///
/// Accepts `host:port`, `ip:port` and the `:port` shorthand for all
/// interfaces.
pub fn resolve_listen_addr(key: &'static str, value: &str) -> Result<SocketAddr> {
    let normalized = normalize_listen_addr(value);
    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }
    normalized
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| SettingsError::InvalidAddress {
            key,
            value: value.to_owned(),
        })
}

/// Expand `:port` to `0.0.0.0:port`; anything else is trimmed and returned.
pub fn normalize_listen_addr(value: &str) -> String {
    let value = value.trim();
    if value.starts_with(':') {
        format!("0.0.0.0{value}")
    } else {
        value.to_owned()
    }
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use figment::Jail;
    use mockwire_core::LogFormat;

    #[test]
    fn defaults_without_file_or_env() {
        Jail::expect_with(|_jail| {
            let settings = load_settings(None).unwrap();
            assert_eq!(settings, Settings::default());
            Ok(())
        });
    }

    #[test]
    fn missing_file_is_empty_layer() {
        Jail::expect_with(|_jail| {
            let settings = load_settings(Some(Path::new("absent.json"))).unwrap();
            assert_eq!(settings, Settings::default());
            Ok(())
        });
    }

    #[test]
    fn file_overrides_defaults() {
        Jail::expect_with(|jail| {
            let _ = jail.create_file(
                "mockwire.json",
                r#"{"server": {"http_addr": "127.0.0.1:9000"}, "stream": {"server_stream_count": 3}}"#,
            )?;
            let settings = load_settings(Some(Path::new("mockwire.json"))).unwrap();
            assert_eq!(settings.server.http_addr, "127.0.0.1:9000");
            assert_eq!(settings.stream.server_stream_count, 3);
            assert_eq!(settings.stream.server_stream_interval_ms, 100);
            Ok(())
        });
    }

    #[test]
    fn file_from_tempdir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"logging": {"level": "debug", "format": "json"}}"#).unwrap();
        Jail::expect_with(|_jail| {
            let settings = load_settings(Some(&path)).unwrap();
            assert_eq!(settings.logging.level, "debug");
            assert_eq!(settings.logging.format, LogFormat::Json);
            Ok(())
        });
    }

    #[test]
    fn invalid_json_file_is_an_error() {
        Jail::expect_with(|jail| {
            let _ = jail.create_file("bad.json", "not json")?;
            let result = load_settings(Some(Path::new("bad.json")));
            assert_matches!(result, Err(SettingsError::Load(_)));
            Ok(())
        });
    }

    #[test]
    fn prefixed_env_overrides_file() {
        Jail::expect_with(|jail| {
            let _ = jail.create_file("mockwire.json", r#"{"websocket": {"write_timeout_secs": 4}}"#)?;
            jail.set_env("MOCKWIRE_WEBSOCKET__WRITE_TIMEOUT_SECS", "7");
            jail.set_env("MOCKWIRE_SERVER__CORS", "false");
            jail.set_env("MOCKWIRE_STREAM__CALL_TIMEOUT_SECS", "3");
            let settings = load_settings(Some(Path::new("mockwire.json"))).unwrap();
            assert_eq!(settings.websocket.write_timeout_secs, 7);
            assert!(!settings.server.cors);
            assert_eq!(settings.stream.call_timeout_secs, Some(3));
            Ok(())
        });
    }

    #[test]
    fn legacy_listener_env_wins() {
        Jail::expect_with(|jail| {
            jail.set_env("MOCKWIRE_SERVER__HTTP_ADDR", "127.0.0.1:1111");
            jail.set_env("HTTP_ADDR", ":8081");
            jail.set_env("GRPC_ADDR", ":50052");
            let settings = load_settings(None).unwrap();
            assert_eq!(settings.server.http_addr, ":8081");
            assert_eq!(settings.server.stream_addr, ":50052");
            Ok(())
        });
    }

    #[test]
    fn stream_addr_beats_grpc_addr() {
        Jail::expect_with(|jail| {
            jail.set_env("GRPC_ADDR", ":50052");
            jail.set_env("STREAM_ADDR", ":50053");
            let settings = load_settings(None).unwrap();
            assert_eq!(settings.server.stream_addr, ":50053");
            Ok(())
        });
    }

    #[test]
    fn zero_write_timeout_rejected() {
        Jail::expect_with(|jail| {
            jail.set_env("MOCKWIRE_WEBSOCKET__WRITE_TIMEOUT_SECS", "0");
            assert_matches!(load_settings(None), Err(SettingsError::InvalidValue(_)));
            Ok(())
        });
    }

    #[test]
    fn zero_stream_count_rejected() {
        let mut settings = Settings::default();
        settings.stream.server_stream_count = 0;
        assert_matches!(validate(&settings), Err(SettingsError::InvalidValue(_)));
    }

    #[test]
    fn bad_address_rejected() {
        let mut settings = Settings::default();
        settings.server.stream_addr = "not an address".into();
        assert_matches!(
            validate(&settings),
            Err(SettingsError::InvalidAddress { key: "server.stream_addr", .. })
        );
    }

    #[test]
    fn port_shorthand_binds_all_interfaces() {
        assert_eq!(normalize_listen_addr(":8080"), "0.0.0.0:8080");
        assert_eq!(normalize_listen_addr(" 127.0.0.1:1 "), "127.0.0.1:1");
        let addr = resolve_listen_addr("server.http_addr", ":8080").unwrap();
        assert!(addr.ip().is_unspecified());
        assert_eq!(addr.port(), 8080);
    }

    #[test]
    fn resolves_ipv6_and_loopback() {
        let v6 = resolve_listen_addr("server.http_addr", "[::1]:9000").unwrap();
        assert!(v6.is_ipv6());
        let v4 = resolve_listen_addr("server.http_addr", "127.0.0.1:0").unwrap();
        assert_eq!(v4.port(), 0);
    }
}
