//! Configuration loading: file resolution plus environment overrides.

use super::error::{ConfigError, ConfigResult};
use super::schema::Config;
use std::path::{Path, PathBuf};

/// Environment variable prefix for overrides.
const ENV_PREFIX: &str = "SERIAL_BRIDGE";

/// Config file name looked up in the standard locations.
const CONFIG_FILE_NAME: &str = "serial-bridge.toml";

/// Environment variable naming an explicit config path.
const CONFIG_PATH_ENV: &str = "SERIAL_BRIDGE_CONFIG";

/// Load configuration using the standard resolution order.
///
/// Priority (highest first):
/// 1. `SERIAL_BRIDGE_CONFIG` environment variable (explicit path)
/// 2. `./serial-bridge.toml`
/// 3. `~/.config/serial-bridge/serial-bridge.toml` (`%APPDATA%` on Windows)
/// 4. Built-in defaults
///
/// Environment variables override file values in every case.
pub fn load() -> ConfigResult<Config> {
    let mut config = match resolve_config_path() {
        Some(path) => load_from_file(&path)?,
        None => Config::default(),
    };
    apply_env_overrides(&mut config)?;
    Ok(config)
}

/// Load configuration from an explicit file path, then apply env overrides.
pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Config> {
    let mut config = load_from_file(path.as_ref())?;
    apply_env_overrides(&mut config)?;
    Ok(config)
}

/// Resolve the configuration file path using the standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    let cwd_config = PathBuf::from(CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    if let Some(config_dir) = platform_config_dir() {
        let app_config = config_dir.join("serial-bridge").join(CONFIG_FILE_NAME);
        if app_config.exists() {
            return Some(app_config);
        }
    }

    None
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }
}

fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    toml::from_str(&content).map_err(ConfigError::Parse)
}

/// Apply `SERIAL_BRIDGE_<SECTION>_<KEY>` environment overrides.
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    if let Ok(val) = std::env::var(format!("{ENV_PREFIX}_SERIAL_DEFAULT_BAUD")) {
        config.serial.default_baud = parse_env(&val, "SERIAL_DEFAULT_BAUD", "baud rate")?;
    }
    if let Ok(val) = std::env::var(format!("{ENV_PREFIX}_SERIAL_READ_TIMEOUT_MS")) {
        config.serial.read_timeout_ms = parse_env(&val, "SERIAL_READ_TIMEOUT_MS", "timeout")?;
    }
    if let Ok(val) = std::env::var(format!("{ENV_PREFIX}_SERIAL_READ_CHUNK_SIZE")) {
        config.serial.read_chunk_size = parse_env(&val, "SERIAL_READ_CHUNK_SIZE", "size")?;
    }
    if let Ok(val) = std::env::var(format!("{ENV_PREFIX}_ENGINE_IDLE_THRESHOLD_MS")) {
        config.engine.idle_threshold_ms = parse_env(&val, "ENGINE_IDLE_THRESHOLD_MS", "timeout")?;
    }
    if let Ok(val) = std::env::var(format!("{ENV_PREFIX}_ENGINE_SYNC_CHANNEL_CAP")) {
        config.engine.sync_channel_cap = parse_env(&val, "ENGINE_SYNC_CHANNEL_CAP", "size")?;
    }
    if let Ok(val) = std::env::var(format!("{ENV_PREFIX}_ENGINE_ASYNC_STORE_CAP")) {
        config.engine.async_store_cap = parse_env(&val, "ENGINE_ASYNC_STORE_CAP", "size")?;
    }
    if let Ok(val) = std::env::var(format!("{ENV_PREFIX}_ENGINE_RESPONSE_BUFFER_CAP")) {
        config.engine.response_buffer_cap =
            parse_env(&val, "ENGINE_RESPONSE_BUFFER_CAP", "size")?;
    }
    if let Ok(val) = std::env::var(format!("{ENV_PREFIX}_LOGGING_LEVEL")) {
        config.logging.level = val;
    }
    Ok(())
}

fn parse_env<T: std::str::FromStr>(val: &str, key: &str, what: &str) -> ConfigResult<T> {
    val.parse().map_err(|_| {
        ConfigError::env_parse(format!("{ENV_PREFIX}_{key}"), format!("invalid {what}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Tests mutating process environment must not interleave.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults_without_file() {
        let config = Config::default();
        assert_eq!(config.serial.default_baud, 115_200);
    }

    #[test]
    fn env_override_applies() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("SERIAL_BRIDGE_ENGINE_IDLE_THRESHOLD_MS", "250");
        let mut config = Config::default();
        apply_env_overrides(&mut config).unwrap();
        assert_eq!(config.engine.idle_threshold_ms, 250);
        env::remove_var("SERIAL_BRIDGE_ENGINE_IDLE_THRESHOLD_MS");
    }

    #[test]
    fn bad_env_value_is_a_typed_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("SERIAL_BRIDGE_SERIAL_DEFAULT_BAUD", "fast");
        let mut config = Config::default();
        let err = apply_env_overrides(&mut config).unwrap_err();
        assert!(matches!(err, ConfigError::EnvParse { .. }));
        env::remove_var("SERIAL_BRIDGE_SERIAL_DEFAULT_BAUD");
    }
}
