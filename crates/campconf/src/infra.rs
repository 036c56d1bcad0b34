//! Infrastructure configuration - things that cannot change at runtime.

use serde::{Deserialize, Serialize};

/// How this peer reaches the relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Session channel name. Peers on the same channel share one session.
    /// Default: campfire:lobby
    #[serde(default = "RelayConfig::default_channel")]
    pub channel: String,

    /// How many recent messages to request from relay history on join.
    /// Default: 25
    #[serde(default = "RelayConfig::default_history_limit")]
    pub history_limit: usize,

    /// Upper bound for any single relay operation (connect, publish,
    /// presence, history). Default: 5000
    #[serde(default = "RelayConfig::default_timeout_ms")]
    pub timeout_ms: u64,
}

impl RelayConfig {
    fn default_channel() -> String {
        "campfire:lobby".to_string()
    }

    fn default_history_limit() -> usize {
        25
    }

    fn default_timeout_ms() -> u64 {
        5_000
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            channel: Self::default_channel(),
            history_limit: Self::default_history_limit(),
            timeout_ms: Self::default_timeout_ms(),
        }
    }
}

/// Timer cadence for the peer runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Leader re-evaluation interval for turn arbitration.
    /// Default: 1000
    #[serde(default = "TimingConfig::default_arbitration_interval_ms")]
    pub arbitration_interval_ms: u64,

    /// Delay between a tempo change and the playback resync that follows it.
    /// Default: 250
    #[serde(default = "TimingConfig::default_bpm_ramp_ms")]
    pub bpm_ramp_ms: u64,
}

impl TimingConfig {
    fn default_arbitration_interval_ms() -> u64 {
        1_000
    }

    fn default_bpm_ramp_ms() -> u64 {
        250
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            arbitration_interval_ms: Self::default_arbitration_interval_ms(),
            bpm_ramp_ms: Self::default_bpm_ramp_ms(),
        }
    }
}

/// Telemetry and observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level or EnvFilter directive (trace, debug, info, warn, error).
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,

    /// OTLP gRPC endpoint. Span export is disabled when unset.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
            otlp_endpoint: None,
        }
    }
}

/// Complete infrastructure configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct InfraConfig {
    #[serde(default)]
    pub relay: RelayConfig,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}
