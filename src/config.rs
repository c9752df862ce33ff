// src/config.rs
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BridgeConfig {
    pub endpoint: EndpointConfig,
    pub filter: FilterConfig,
    pub classifier: ClassifierConfig,
    pub resolver: ResolverConfig,
    pub emitter: EmitterConfig,
    pub connection: ConnectionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub host: String,
    pub port: u16,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8885,
        }
    }
}

impl EndpointConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub min_cutoff: f64, // Hz, lower = smoother at rest
    pub beta: f64,       // speed coefficient, higher = less lag
    pub d_cutoff: f64,   // derivative cutoff, Hz
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_cutoff: 1.0,
            beta: 0.007,
            d_cutoff: 1.0,
        }
    }
}

/// Ratio thresholds. All values are fractions of the hand-size reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub pinch_low: f64,
    pub pinch_high: f64,
    pub zoom_threshold: f64,
    pub pointer_ratio: f64,
    pub min_hand_size: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            pinch_low: 0.25,
            pinch_high: 0.50,
            zoom_threshold: 0.30,
            pointer_ratio: 0.30,
            min_hand_size: 0.01,
        }
    }
}

/// Zoom delta multipliers.
///
/// `pinch_zoom_scale` multiplies a change in thumb/index ratio (hand-size
/// units); `expansion_zoom_scale` multiplies a change in the distance
/// between the two middle fingertips (normalized image units). The image
/// distance moves over a smaller range, hence the larger default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub pinch_zoom_scale: f64,
    pub expansion_zoom_scale: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            pinch_zoom_scale: 2.0,
            expansion_zoom_scale: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitterConfig {
    pub throttle_ms: u64,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self { throttle_ms: 16 }
    }
}

impl EmitterConfig {
    pub fn throttle_interval(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub reconnect_delay_ms: u64,
    pub connect_timeout_ms: u64,
    pub write_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: 1000,
            connect_timeout_ms: 2000,
            write_timeout_ms: 1000,
        }
    }
}

impl ConnectionConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl BridgeConfig {
    /// Per-user config location, e.g. `~/.config/gesture-bridge/config.json`.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "gesturebridge", "gesture-bridge")
            .map(|dirs| dirs.config_dir().join("config.json"))
    }

    /// Loads `path` if given (it must exist), else the per-user config file
    /// if one exists, else built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(p) => Self::from_file(p)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(p) => Self::from_file(&p)?,
                None => {
                    debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let c = &self.classifier;
        if c.pinch_low >= c.pinch_high {
            bail!(
                "pinch_low ({}) must be below pinch_high ({})",
                c.pinch_low,
                c.pinch_high
            );
        }
        if c.min_hand_size <= 0.0 {
            bail!("min_hand_size must be positive");
        }
        if self.filter.min_cutoff <= 0.0 || self.filter.d_cutoff <= 0.0 {
            bail!("filter cutoffs must be positive");
        }
        if self.filter.beta < 0.0 {
            bail!("filter beta must not be negative");
        }
        if self.endpoint.port == 0 {
            bail!("endpoint port must be non-zero");
        }
        Ok(())
    }
}
