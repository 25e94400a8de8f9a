//! # mockwire-settings
//!
//! Layered configuration for the mockwire server.
//!
//! Sources, in priority order (lowest first):
//! 1. **Compiled defaults** ([`Settings::default()`])
//! 2. **JSON file** passed with `--config` (optional)
//! 3. **`MOCKWIRE_*` env vars**, e.g. `MOCKWIRE_SERVER__MAX_DELAY_SECS=5`
//! 4. **Listener env vars** `HTTP_ADDR`, `GRPC_ADDR`, `STREAM_ADDR`
//!
//! CLI flags are applied on top by the binary.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{figment, load_settings, normalize_listen_addr, resolve_listen_addr, validate};
pub use types::{LoggingSettings, ServerSettings, Settings, StreamSettings, WebSocketSettings};
