//! Configuration types for the mesh-to-MQTT bridge
//!
//! This module provides the bridge configuration structures including the
//! discovery topic prefix, registry sizing, mesh transmission parameters,
//! and behavior options.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Maximum number of lamp registry slots
pub const MAX_LAMPS: usize = 20;

/// Mesh group address meaning "all nodes"
pub const BROADCAST_ADDR: u16 = 0xFFFF;

/// Value of a NetKey/AppKey index before provisioning/binding
pub const KEY_INDEX_UNUSED: u16 = 0xFFFF;

/// Maximum raw mesh lightness value
pub const LIGHTNESS_MAX: u16 = 65535;

/// Upper bound of the hue range in degrees
pub const HUE_MAX_DEGREES: f32 = 360.0;

/// Upper bound of the saturation/lightness percentage range
pub const PERCENT_MAX: f32 = 100.0;

/// Default TTL for outgoing mesh requests
pub const DEFAULT_TTL: u8 = 10;

/// Default MQTT topic prefix used by Home Assistant discovery
pub const DEFAULT_DISCOVERY_PREFIX: &str = "homeassistant";

/// Frame magic for the TCP mesh-gateway protocol (first 2 bytes)
pub const GATEWAY_MAGIC: u16 = 0xB1E5;

/// Main configuration for the lamp bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// MQTT topic prefix for command/state/config topics
    #[serde(default = "default_discovery_prefix")]
    pub discovery_prefix: String,

    /// Number of registry slots to scan
    #[serde(default = "default_max_lamps")]
    pub max_lamps: usize,

    /// On a registry match whose stored address fails to parse, fall back
    /// to the broadcast address instead of dropping the command. Off by
    /// default; kept for compatibility with deployments that relied on it.
    #[serde(default)]
    pub broadcast_fallback: bool,

    /// When set, periodically issue an OnOff Get to every registered lamp
    /// to reconcile SessionState with real device state
    #[serde(with = "humantime_opt", default)]
    pub status_poll: Option<Duration>,

    /// Mesh transmission parameters
    #[serde(default)]
    pub mesh: MeshConfig,
}

fn default_discovery_prefix() -> String {
    DEFAULT_DISCOVERY_PREFIX.to_string()
}

fn default_max_lamps() -> usize {
    MAX_LAMPS
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            discovery_prefix: default_discovery_prefix(),
            max_lamps: MAX_LAMPS,
            broadcast_fallback: false,
            status_poll: None,
            mesh: MeshConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Topic carrying Home Assistant birth messages, `<prefix>/status`
    pub fn status_topic(&self) -> String {
        format!("{}/status", self.discovery_prefix)
    }
}

/// Mesh transmission parameters applied to every outgoing request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshConfig {
    /// TTL for outgoing requests
    #[serde(default = "default_ttl")]
    pub ttl: u8,

    /// Request mesh-layer (segmented transport) acknowledgement
    #[serde(default = "default_transport_ack")]
    pub transport_ack: bool,

    /// Response timeout; `None` means the mesh stack's default applies
    #[serde(with = "humantime_opt", default)]
    pub message_timeout: Option<Duration>,
}

fn default_ttl() -> u8 {
    DEFAULT_TTL
}

fn default_transport_ack() -> bool {
    true
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            transport_ack: true,
            message_timeout: None,
        }
    }
}

/// Builder for [`BridgeConfig`]
#[derive(Debug, Default)]
pub struct BridgeConfigBuilder {
    config: BridgeConfig,
}

impl BridgeConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the MQTT topic prefix
    pub fn discovery_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.discovery_prefix = prefix.into();
        self
    }

    /// Set the number of registry slots
    pub fn max_lamps(mut self, max: usize) -> Self {
        self.config.max_lamps = max;
        self
    }

    /// Enable the legacy broadcast fallback on address-parse failure
    pub fn broadcast_fallback(mut self, enabled: bool) -> Self {
        self.config.broadcast_fallback = enabled;
        self
    }

    /// Enable the periodic status poll
    pub fn status_poll(mut self, interval: Duration) -> Self {
        self.config.status_poll = Some(interval);
        self
    }

    /// Set the mesh request TTL
    pub fn ttl(mut self, ttl: u8) -> Self {
        self.config.mesh.ttl = ttl;
        self
    }

    /// Build the configuration
    pub fn build(self) -> BridgeConfig {
        self.config
    }
}

// Custom serde module for Option<Duration> with humantime
mod humantime_opt {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&humantime::format_duration(*d).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = Option::<String>::deserialize(deserializer)?;
        s.map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
