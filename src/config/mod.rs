//! TOML configuration with environment variable overrides.
//!
//! Resolution order: explicit `SERIAL_BRIDGE_CONFIG` path, then
//! `./serial-bridge.toml`, then the platform config directory, then built-in
//! defaults. Any value can be overridden with a
//! `SERIAL_BRIDGE_<SECTION>_<KEY>` environment variable, e.g.
//! `SERIAL_BRIDGE_ENGINE_IDLE_THRESHOLD_MS=50`.

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load, load_from, resolve_config_path};
pub use schema::{Config, EngineSection, LoggingSection, SerialSection};
