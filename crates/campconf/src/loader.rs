//! Finding config files, overlaying them key by key, then applying
//! `CAMPFIRE_*` environment overrides.

use crate::{CampConfig, ConfigError};
use std::env;
use std::path::{Path, PathBuf};

/// Provenance of the effective configuration, for `campfire config`.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Files applied, first to last.
    pub files: Vec<PathBuf>,
    /// Names of environment variables that changed a value.
    pub env_overrides: Vec<String>,
}

/// Existing config files in the standard locations, system first.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Like [`discover_config_files`], but an existing `cli_path` takes the
/// place of `./campfire.toml`.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/campfire/config.toml");
    if system.exists() {
        files.push(system);
    }

    // $XDG_CONFIG_HOME/campfire or ~/.config/campfire
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("campfire/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("campfire.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read a TOML file and overlay every key it sets onto `config`.
///
/// Keys the file does not mention keep their current value, so applying
/// files in discovery order gives "later wins" semantics per key.
pub fn apply_file(config: &mut CampConfig, path: &Path) -> Result<(), ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    apply_toml(config, &contents, path)
}

fn apply_toml(config: &mut CampConfig, contents: &str, path: &Path) -> Result<(), ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    if let Some(relay) = table.get("relay").and_then(|v| v.as_table()) {
        if let Some(v) = relay.get("channel").and_then(|v| v.as_str()) {
            config.infra.relay.channel = v.to_string();
        }
        if let Some(v) = relay.get("history_limit").and_then(|v| v.as_integer()) {
            config.infra.relay.history_limit = non_negative(v, path, "relay.history_limit")? as usize;
        }
        if let Some(v) = relay.get("timeout_ms").and_then(|v| v.as_integer()) {
            config.infra.relay.timeout_ms = non_negative(v, path, "relay.timeout_ms")?;
        }
    }

    if let Some(timing) = table.get("timing").and_then(|v| v.as_table()) {
        if let Some(v) = timing.get("arbitration_interval_ms").and_then(|v| v.as_integer()) {
            config.infra.timing.arbitration_interval_ms =
                non_negative(v, path, "timing.arbitration_interval_ms")?;
        }
        if let Some(v) = timing.get("bpm_ramp_ms").and_then(|v| v.as_integer()) {
            config.infra.timing.bpm_ramp_ms = non_negative(v, path, "timing.bpm_ramp_ms")?;
        }
    }

    if let Some(telemetry) = table.get("telemetry").and_then(|v| v.as_table()) {
        if let Some(v) = telemetry.get("log_level").and_then(|v| v.as_str()) {
            config.infra.telemetry.log_level = v.to_string();
        }
        if let Some(v) = telemetry.get("otlp_endpoint").and_then(|v| v.as_str()) {
            config.infra.telemetry.otlp_endpoint = Some(v.to_string());
        }
    }

    if let Some(bootstrap) = table.get("bootstrap").and_then(|v| v.as_table()) {
        if let Some(session) = bootstrap.get("session").and_then(|v| v.as_table()) {
            if let Some(v) = session.get("bpm").and_then(as_number) {
                config.bootstrap.session.bpm = v;
            }
            if let Some(v) = session.get("window_cycles").and_then(|v| v.as_integer()) {
                config.bootstrap.session.window_cycles =
                    non_negative(v, path, "bootstrap.session.window_cycles")? as u32;
            }
            if let Some(v) = session.get("autoplay").and_then(|v| v.as_bool()) {
                config.bootstrap.session.autoplay = v;
            }
        }

        if let Some(identity) = bootstrap.get("identity").and_then(|v| v.as_table()) {
            if let Some(v) = identity.get("name").and_then(|v| v.as_str()) {
                config.bootstrap.identity.name = Some(v.to_string());
            }
            if let Some(v) = identity.get("color").and_then(|v| v.as_str()) {
                config.bootstrap.identity.color = Some(v.to_string());
            }
        }
    }

    Ok(())
}

/// TOML distinguishes `120` from `120.0`; tempo accepts both.
fn as_number(value: &toml::Value) -> Option<f64> {
    value
        .as_float()
        .or_else(|| value.as_integer().map(|i| i as f64))
}

fn non_negative(value: i64, path: &Path, key: &str) -> Result<u64, ConfigError> {
    u64::try_from(value).map_err(|_| ConfigError::Parse {
        path: path.to_path_buf(),
        message: format!("{} must not be negative (got {})", key, value),
    })
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut CampConfig, sources: &mut ConfigSources) {
    if let Ok(v) = env::var("CAMPFIRE_CHANNEL") {
        config.infra.relay.channel = v;
        sources.env_overrides.push("CAMPFIRE_CHANNEL".to_string());
    }
    if let Ok(v) = env::var("CAMPFIRE_HISTORY_LIMIT") {
        if let Ok(limit) = v.parse() {
            config.infra.relay.history_limit = limit;
            sources.env_overrides.push("CAMPFIRE_HISTORY_LIMIT".to_string());
        }
    }
    if let Ok(v) = env::var("CAMPFIRE_RELAY_TIMEOUT_MS") {
        if let Ok(ms) = v.parse() {
            config.infra.relay.timeout_ms = ms;
            sources.env_overrides.push("CAMPFIRE_RELAY_TIMEOUT_MS".to_string());
        }
    }
    if let Ok(v) = env::var("CAMPFIRE_ARBITRATION_INTERVAL_MS") {
        if let Ok(ms) = v.parse() {
            config.infra.timing.arbitration_interval_ms = ms;
            sources
                .env_overrides
                .push("CAMPFIRE_ARBITRATION_INTERVAL_MS".to_string());
        }
    }

    if let Ok(v) = env::var("CAMPFIRE_OTLP_ENDPOINT") {
        config.infra.telemetry.otlp_endpoint = Some(v);
        sources.env_overrides.push("CAMPFIRE_OTLP_ENDPOINT".to_string());
    }
    // OTEL_EXPORTER_OTLP_ENDPOINT is honored too
    if let Ok(v) = env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
        config.infra.telemetry.otlp_endpoint = Some(v);
        sources
            .env_overrides
            .push("OTEL_EXPORTER_OTLP_ENDPOINT".to_string());
    }
    if let Ok(v) = env::var("CAMPFIRE_LOG_LEVEL") {
        config.infra.telemetry.log_level = v;
        sources.env_overrides.push("CAMPFIRE_LOG_LEVEL".to_string());
    }
    // RUST_LOG as a fallback log filter
    if let Ok(v) = env::var("RUST_LOG") {
        config.infra.telemetry.log_level = v;
        sources.env_overrides.push("RUST_LOG".to_string());
    }

    if let Ok(v) = env::var("CAMPFIRE_BPM") {
        if let Ok(bpm) = v.parse() {
            config.bootstrap.session.bpm = bpm;
            sources.env_overrides.push("CAMPFIRE_BPM".to_string());
        }
    }
    if let Ok(v) = env::var("CAMPFIRE_NAME") {
        config.bootstrap.identity.name = Some(v);
        sources.env_overrides.push("CAMPFIRE_NAME".to_string());
    }
    if let Ok(v) = env::var("CAMPFIRE_COLOR") {
        config.bootstrap.identity.color = Some(v);
        sources.env_overrides.push("CAMPFIRE_COLOR".to_string());
    }
}
