//! Bootstrap configuration - seeds a new session, then the session owns it.

use serde::{Deserialize, Serialize};

/// Values used only when this peer creates the session.
///
/// Out-of-range values are accepted here and clamped when the genesis
/// state is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSeedConfig {
    #[serde(default = "SessionSeedConfig::default_bpm")]
    pub bpm: f64,

    #[serde(default = "SessionSeedConfig::default_window_cycles")]
    pub window_cycles: u32,

    /// Start the shared transport as soon as the session exists.
    #[serde(default = "SessionSeedConfig::default_autoplay")]
    pub autoplay: bool,
}

impl SessionSeedConfig {
    fn default_bpm() -> f64 {
        120.0
    }

    fn default_window_cycles() -> u32 {
        4
    }

    fn default_autoplay() -> bool {
        true
    }
}

impl Default for SessionSeedConfig {
    fn default() -> Self {
        Self {
            bpm: Self::default_bpm(),
            window_cycles: Self::default_window_cycles(),
            autoplay: Self::default_autoplay(),
        }
    }
}

/// Display identity. Missing fields are generated per join.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IdentityConfig {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub color: Option<String>,
}

/// Complete bootstrap configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BootstrapConfig {
    #[serde(default)]
    pub session: SessionSeedConfig,

    #[serde(default)]
    pub identity: IdentityConfig,
}
