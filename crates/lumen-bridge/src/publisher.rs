//! MQTT state and discovery publishing
//!
//! Every lamp owns a topic family under the discovery prefix:
//!
//! ```text
//! <prefix>/light/<name>/config   retained-less discovery announcement
//! <prefix>/light/<name>/set      inbound commands (subscribed, not published)
//! <prefix>/light/<name>/state    outbound state reports
//! ```
//!
//! Discovery payloads use Home Assistant's abbreviated key set with the
//! `~` base-topic shorthand. All publishes are QoS 0 without retain.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use crate::mqtt::{MqttClient, QoS};
use crate::error::Result;

/// Base topic of a lamp, `<prefix>/light/<name>`
pub fn base_topic(prefix: &str, name: &str) -> String {
    format!("{prefix}/light/{name}")
}

/// Command topic of a lamp
pub fn set_topic(prefix: &str, name: &str) -> String {
    format!("{}/set", base_topic(prefix, name))
}

/// State topic of a lamp
pub fn state_topic(prefix: &str, name: &str) -> String {
    format!("{}/state", base_topic(prefix, name))
}

/// Discovery config topic of a lamp
pub fn config_topic(prefix: &str, name: &str) -> String {
    format!("{}/config", base_topic(prefix, name))
}

/// Build the discovery announcement for one lamp
pub fn discovery_config(name: &str, base_topic: &str, address: &str) -> Value {
    json!({
        "name": name,
        "~": base_topic,
        "cmd_t": "~/set",
        "stat_t": "~/state",
        "schema": "json",
        "brightness": true,
        "color_mode": true,
        "bri_scl": 100,
        "supported_color_modes": ["hs"],
        "pl_on": "ON",
        "pl_off": "OFF",
        "dev": {
            "ids": [address],
            "name": "Lamp",
            "mf": "BLE-Mesh",
            "mdl": "HSL-Light"
        },
        "uniq_id": address
    })
}

/// Publishes lamp state and discovery announcements
#[derive(Clone)]
pub struct StatePublisher {
    client: Arc<dyn MqttClient>,
}

impl StatePublisher {
    /// Create a publisher over an MQTT client
    pub fn new(client: Arc<dyn MqttClient>) -> Self {
        Self { client }
    }

    async fn publish_json(&self, topic: &str, value: &Value) -> Result<()> {
        let payload = serde_json::to_vec(value)?;
        debug!(topic, payload = %value, "Publishing");
        self.client.publish(topic, payload, QoS::AtMostOnce, false).await
    }

    /// Announce a lamp to Home Assistant discovery
    pub async fn publish_discovery(&self, prefix: &str, name: &str, address: &str) -> Result<()> {
        let base = base_topic(prefix, name);
        let config = discovery_config(name, &base, address);
        self.publish_json(&config_topic(prefix, name), &config).await
    }

    /// Report an on/off state as the `"ON"`/`"OFF"` string form
    pub async fn publish_onoff(&self, topic: &str, on: bool) -> Result<()> {
        let state = if on { "ON" } else { "OFF" };
        self.publish_json(topic, &json!({ "state": state })).await
    }

    /// Report an on/off state in the numeric form used for mesh-originated
    /// status reports
    pub async fn publish_onoff_raw(&self, topic: &str, on: bool) -> Result<()> {
        self.publish_json(topic, &json!({ "state": u8::from(on) })).await
    }

    /// Report a brightness change
    pub async fn publish_brightness(&self, topic: &str, percent: f32) -> Result<()> {
        let value = json!({
            "state": "ON",
            "brightness": f64::from(percent).round() as i64,
        });
        self.publish_json(topic, &value).await
    }

    /// Report an HSL change
    pub async fn publish_hsl(
        &self,
        topic: &str,
        hue: f32,
        saturation: f32,
        lightness: f32,
    ) -> Result<()> {
        let value = json!({
            "state": "ON",
            "color": { "h": hue, "s": saturation },
            "lightness": lightness,
        });
        self.publish_json(topic, &value).await
    }

    /// Publish an arbitrary payload (birth-message nudge, tests)
    pub async fn publish_raw(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.client.publish(topic, payload, QoS::AtMostOnce, false).await
    }
}
