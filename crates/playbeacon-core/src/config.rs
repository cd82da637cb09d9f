//! Session and telemetry configuration
//!
//! Device and player details are injected here rather than read from
//! process-wide state, so several sessions can coexist.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use url::Url;

/// Default collector domain appended to the workspace id
pub const DEFAULT_BEACON_DOMAIN: &str = ".metrix.example.io";

/// Chunk beacon throttling limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Beacons allowed per category within one window
    pub max_events_per_window: u32,
    /// Shortest window length in milliseconds
    pub min_window_ms: i64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max_events_per_window: 10,
            min_window_ms: 1000,
        }
    }
}

/// Telemetry pipeline tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub throttle: ThrottleConfig,
    /// Beacons queued for delivery before new ones are dropped
    pub channel_capacity: usize,
    /// Engine position poll interval in milliseconds
    pub position_poll_interval_ms: u64,
    /// Log every dispatched event at info level
    pub enable_logging: bool,
    /// Forward engine `PlayerError` callbacks as `Error` events
    pub automatic_error_tracking: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            throttle: ThrottleConfig::default(),
            channel_capacity: 1000,
            position_poll_interval_ms: 150,
            enable_logging: false,
            automatic_error_tracking: true,
        }
    }
}

/// Player software description sent with every beacon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerInfo {
    pub name: String,
    pub version: String,
    pub integration: String,
}

impl Default for PlayerInfo {
    fn default() -> Self {
        Self {
            name: "ExoPlayer".to_string(),
            version: "2.19.1".to_string(),
            integration: concat!("playbeacon/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Device description supplied by the host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceInfo {
    pub device_id: Option<String>,
    pub os_family: Option<String>,
    pub os_version: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub app_name: Option<String>,
    pub app_version: Option<String>,
    /// `wired`, `wifi`, `cellular` or `other`
    pub connection_type: Option<String>,
}

/// Everything a session needs from its host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub workspace_id: String,
    pub viewer_id: String,
    /// Domain used to derive the collector host from the workspace id
    pub beacon_domain: String,
    /// Explicit collector endpoint, overriding the derived one
    pub collector: Option<Url>,
    /// Extra headers sent with every beacon
    pub headers: BTreeMap<String, String>,
    pub player: PlayerInfo,
    pub device: DeviceInfo,
    pub telemetry: TelemetryConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            workspace_id: String::new(),
            viewer_id: String::new(),
            beacon_domain: DEFAULT_BEACON_DOMAIN.to_string(),
            collector: None,
            headers: BTreeMap::new(),
            player: PlayerInfo::default(),
            device: DeviceInfo::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Load a configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: SessionConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.telemetry.throttle.max_events_per_window == 0 {
            return Err(Error::config("throttle.max_events_per_window must be > 0"));
        }
        if self.telemetry.throttle.min_window_ms <= 0 {
            return Err(Error::config("throttle.min_window_ms must be > 0"));
        }
        if self.telemetry.channel_capacity == 0 {
            return Err(Error::config("channel_capacity must be > 0"));
        }
        if self.telemetry.position_poll_interval_ms == 0 {
            return Err(Error::config("position_poll_interval_ms must be > 0"));
        }
        Ok(())
    }
}
