//! MQTT client abstraction
//!
//! The bridge publishes and subscribes through an [`MqttClient`]. Production
//! builds use the rumqttc backend (feature `rumqtt`); tests use the mock in
//! [`crate::test_utils`]. Connection lifecycle and inbound messages arrive
//! as [`MqttEvent`]s on the client's event channel.

use async_trait::async_trait;

use crate::error::Result;

#[cfg(feature = "rumqtt")]
pub mod rumqtt;

/// MQTT quality-of-service level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QoS {
    /// Fire and forget
    AtMostOnce,
    /// Acknowledged delivery
    AtLeastOnce,
    /// Exactly-once delivery
    ExactlyOnce,
}

/// An event from the broker connection
#[derive(Debug, Clone, PartialEq)]
pub enum MqttEvent {
    /// Connection (or reconnection) established
    Connected,
    /// An inbound message on a subscribed topic
    Data {
        /// Full topic the message arrived on
        topic: String,
        /// Raw payload bytes
        payload: Vec<u8>,
    },
    /// Connection lost; the backend keeps reconnecting
    Disconnected,
    /// Connection-level error
    Error(String),
}

/// Outbound half of an MQTT connection
#[async_trait]
pub trait MqttClient: Send + Sync {
    /// Publish a message
    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS, retain: bool) -> Result<()>;

    /// Subscribe to a topic filter
    async fn subscribe(&self, topic: &str) -> Result<()>;
}
