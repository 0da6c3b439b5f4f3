//! Mock transports and fixtures for testing
//!
//! A [`MockTransport`] and [`MockMqttClient`] record everything sent
//! through them, and [`TestFixture`] wires them together with in-memory
//! storage the way production wiring does.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use lumen_state::MemoryStore;

use crate::config::MeshConfig;
use crate::encoder::CommandEncoder;
use crate::error::{BridgeError, Result};
use crate::mqtt::{MqttClient, QoS};
use crate::publisher::StatePublisher;
use crate::registry::LampRegistry;
use crate::session::SessionStore;
use crate::transport::{MeshRequest, MeshTransport};

/// Mesh transport that records requests instead of sending them
#[derive(Default)]
pub struct MockTransport {
    sent: Mutex<Vec<MeshRequest>>,
    fail_next: Mutex<bool>,
}

impl MockTransport {
    /// Create a mock transport
    pub fn new() -> Self {
        Self::default()
    }

    /// All requests sent so far
    pub fn sent(&self) -> Vec<MeshRequest> {
        self.sent.lock().clone()
    }

    /// Make the next send fail
    pub fn fail_next(&self) {
        *self.fail_next.lock() = true;
    }
}

#[async_trait]
impl MeshTransport for MockTransport {
    async fn send(&self, request: MeshRequest) -> Result<()> {
        if std::mem::take(&mut *self.fail_next.lock()) {
            return Err(BridgeError::TransportSend {
                opcode: request.opcode,
                reason: "mock failure".to_string(),
            });
        }
        self.sent.lock().push(request);
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// One recorded publish
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    /// Target topic
    pub topic: String,
    /// Payload bytes
    pub payload: Vec<u8>,
    /// QoS level used
    pub qos: QoS,
    /// Retain flag used
    pub retain: bool,
}

/// MQTT client that records publishes and subscriptions
#[derive(Default)]
pub struct MockMqttClient {
    published: Mutex<Vec<PublishedMessage>>,
    subscriptions: Mutex<Vec<String>>,
}

impl MockMqttClient {
    /// Create a mock client
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages published so far
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().clone()
    }

    /// All publishes to one topic
    pub fn published_to(&self, topic: &str) -> Vec<PublishedMessage> {
        self.published
            .lock()
            .iter()
            .filter(|p| p.topic == topic)
            .cloned()
            .collect()
    }

    /// All topic filters subscribed so far
    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().clone()
    }
}

#[async_trait]
impl MqttClient for MockMqttClient {
    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS, retain: bool) -> Result<()> {
        self.published.lock().push(PublishedMessage {
            topic: topic.to_string(),
            payload,
            qos,
            retain,
        });
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<()> {
        self.subscriptions.lock().push(topic.to_string());
        Ok(())
    }
}

/// Fully wired set of bridge components over mocks and in-memory storage
pub struct TestFixture {
    /// Shared storage backing the registry and session
    pub storage: Arc<MemoryStore>,
    /// Lamp registry
    pub registry: LampRegistry,
    /// Session store
    pub session: Arc<SessionStore>,
    /// Recording mesh transport
    pub transport: Arc<MockTransport>,
    /// Recording MQTT client
    pub mqtt: Arc<MockMqttClient>,
    /// Encoder wired over the mocks
    pub encoder: CommandEncoder,
}

impl TestFixture {
    /// Build a fixture with default mesh parameters
    pub async fn new() -> Self {
        let storage = Arc::new(MemoryStore::new());
        let registry = LampRegistry::new(storage.clone());
        let session = Arc::new(
            SessionStore::open(storage.clone())
                .await
                .unwrap_or_else(|e| panic!("fixture session open failed: {e}")),
        );
        let transport = Arc::new(MockTransport::new());
        let mqtt = Arc::new(MockMqttClient::new());
        let encoder = CommandEncoder::new(
            transport.clone(),
            StatePublisher::new(mqtt.clone()),
            session.clone(),
            MeshConfig::default(),
        );
        Self {
            storage,
            registry,
            session,
            transport,
            mqtt,
            encoder,
        }
    }
}
