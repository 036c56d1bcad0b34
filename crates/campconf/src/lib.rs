//! Minimal configuration loading for Campfire.
//!
//! Configuration is split into two categories, the same way every
//! Campfire process sees it:
//!
//! - **Infrastructure** (`InfraConfig`): how this peer talks to the relay,
//!   its timer cadence, and where telemetry goes. Fixed for the life of
//!   the process.
//!
//! - **Bootstrap** (`BootstrapConfig`): values that seed a brand new
//!   session (tempo, composition window, autoplay) and this peer's display
//!   identity. Once a session exists, the shared session state is the
//!   source of truth and these values are ignored.
//!
//! The musical limits (step count, BPM range, loop caps) are not
//! configurable; they live in `campproto` as constants.
//!
//! # Sources
//!
//! Applied in this order, each overriding the last:
//! 1. `/etc/campfire/config.toml` (system)
//! 2. `~/.config/campfire/config.toml` (user)
//! 3. `./campfire.toml` (local override, or `--config <path>`)
//! 4. Environment variables (`CAMPFIRE_*`)
//!
//! # Example
//!
//! ```toml
//! [relay]
//! channel = "campfire:lobby"
//! history_limit = 25
//! timeout_ms = 5000
//!
//! [timing]
//! arbitration_interval_ms = 1000
//! bpm_ramp_ms = 250
//!
//! [telemetry]
//! log_level = "info"
//! otlp_endpoint = "127.0.0.1:4317"
//!
//! [bootstrap.session]
//! bpm = 120
//! window_cycles = 4
//! autoplay = true
//!
//! [bootstrap.identity]
//! name = "ember"
//! color = "#f97316"
//! ```

pub mod bootstrap;
pub mod infra;
pub mod loader;

pub use bootstrap::{BootstrapConfig, IdentityConfig, SessionSeedConfig};
pub use infra::{InfraConfig, RelayConfig, TelemetryConfig, TimingConfig};
pub use loader::{discover_config_files_with_override, ConfigSources};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// A config file could not be read or parsed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Complete Campfire configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CampConfig {
    /// Relay, timing, and telemetry settings for this process.
    #[serde(flatten)]
    pub infra: InfraConfig,

    /// Bootstrap - seeds a new session.
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

impl CampConfig {
    /// Effective configuration from every source, later sources winning:
    /// 1. Compiled defaults
    /// 2. `/etc/campfire/config.toml`
    /// 3. `~/.config/campfire/config.toml`
    /// 4. `./campfire.toml`
    /// 5. Environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration with an explicit file replacing `./campfire.toml`.
    pub fn load_from(config_path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load, optionally replacing `./campfire.toml` with `config_path`, and
    /// report which files and variables contributed.
    pub fn load_with_sources_from(
        config_path: Option<&std::path::Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = CampConfig::default();

        for path in loader::discover_config_files_with_override(config_path) {
            loader::apply_file(&mut config, &path)?;
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Render the configuration as a commented TOML document.
    pub fn to_toml(&self) -> String {
        let mut output = String::new();

        output.push_str("# Campfire Configuration\n\n");

        output.push_str("[relay]\n");
        output.push_str(&format!("channel = \"{}\"\n", self.infra.relay.channel));
        output.push_str(&format!(
            "history_limit = {}\n",
            self.infra.relay.history_limit
        ));
        output.push_str(&format!("timeout_ms = {}\n", self.infra.relay.timeout_ms));

        output.push_str("\n[timing]\n");
        output.push_str(&format!(
            "arbitration_interval_ms = {}\n",
            self.infra.timing.arbitration_interval_ms
        ));
        output.push_str(&format!(
            "bpm_ramp_ms = {}\n",
            self.infra.timing.bpm_ramp_ms
        ));

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!(
            "log_level = \"{}\"\n",
            self.infra.telemetry.log_level
        ));
        if let Some(endpoint) = &self.infra.telemetry.otlp_endpoint {
            output.push_str(&format!("otlp_endpoint = \"{}\"\n", endpoint));
        }

        output.push_str("\n[bootstrap.session]\n");
        output.push_str(&format!("bpm = {}\n", self.bootstrap.session.bpm));
        output.push_str(&format!(
            "window_cycles = {}\n",
            self.bootstrap.session.window_cycles
        ));
        output.push_str(&format!("autoplay = {}\n", self.bootstrap.session.autoplay));

        output.push_str("\n[bootstrap.identity]\n");
        if let Some(name) = &self.bootstrap.identity.name {
            output.push_str(&format!("name = \"{}\"\n", name));
        }
        if let Some(color) = &self.bootstrap.identity.color {
            output.push_str(&format!("color = \"{}\"\n", color));
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = CampConfig::default();
        assert_eq!(config.infra.relay.channel, "campfire:lobby");
        assert_eq!(config.infra.timing.arbitration_interval_ms, 1000);
        assert_eq!(config.bootstrap.session.window_cycles, 4);
    }

    #[test]
    fn test_to_toml_roundtrips_through_loader() {
        let mut config = CampConfig::default();
        config.infra.relay.channel = "campfire:roundtrip".to_string();
        config.bootstrap.identity.name = Some("ash".to_string());

        let text = config.to_toml();
        assert!(text.contains("[relay]"));
        assert!(text.contains("[bootstrap.session]"));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("campfire.toml");
        std::fs::write(&path, text).unwrap();

        let mut reloaded = CampConfig::default();
        loader::apply_file(&mut reloaded, &path).unwrap();
        assert_eq!(reloaded.infra.relay.channel, "campfire:roundtrip");
        assert_eq!(reloaded.bootstrap.identity.name.as_deref(), Some("ash"));
    }

    #[test]
    fn test_load_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[bootstrap.session]\nbpm = 96\n").unwrap();

        let (config, sources) = CampConfig::load_with_sources_from(Some(&path)).unwrap();
        assert_eq!(config.bootstrap.session.bpm, 96.0);
        assert!(sources.files.contains(&path));
    }
}
