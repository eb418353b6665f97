//! Start-up configuration – reads `~/.rover/config.toml`.
//!
//! The file is optional and never written; anything the operator changes in
//! the console lives only as long as the process.
//!
//! ```toml
//! transport = "stream"        # or "request"
//! host = "192.168.18.250"
//! stream_port = 81
//! request_timeout_ms = 2000
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use rover_bridge::BridgeConfig;
use rover_types::TransportKind;
use tracing::warn;

/// Return the path to `~/.rover/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".rover").join("config.toml")
}

/// The file at [`config_path`] (or defaults when it is absent) with
/// `ROVER_*` environment overrides applied.
pub fn resolve() -> Result<BridgeConfig, String> {
    let mut cfg = load_from(&config_path())?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Load the config from a specific path.  Returns `None` if the file does not
/// exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<BridgeConfig>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `ROVER_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `ROVER_HOST` | `host` |
/// | `ROVER_TRANSPORT` | `transport` (`request` / `stream`) |
/// | `ROVER_STREAM_PORT` | `stream_port` |
/// | `ROVER_REQUEST_TIMEOUT_MS` | `request_timeout_ms` |
///
/// Unparsable values are logged and ignored.
pub fn apply_env_overrides(cfg: &mut BridgeConfig) {
    apply_overrides(cfg, |key| std::env::var(key).ok());
}

fn apply_overrides(cfg: &mut BridgeConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("ROVER_HOST") {
        cfg.host = v;
    }
    if let Some(v) = lookup("ROVER_TRANSPORT") {
        match v.parse::<TransportKind>() {
            Ok(kind) => cfg.transport = kind,
            Err(e) => warn!(value = %v, error = %e, "ignoring ROVER_TRANSPORT"),
        }
    }
    if let Some(v) = lookup("ROVER_STREAM_PORT") {
        match v.trim().parse::<u16>() {
            Ok(port) => cfg.stream_port = port,
            Err(_) => warn!(value = %v, "ignoring ROVER_STREAM_PORT: not a port number"),
        }
    }
    if let Some(v) = lookup("ROVER_REQUEST_TIMEOUT_MS") {
        match v.trim().parse::<u64>() {
            Ok(ms) => cfg.request_timeout_ms = Some(ms),
            Err(_) => warn!(value = %v, "ignoring ROVER_REQUEST_TIMEOUT_MS: not a number"),
        }
    }
}
