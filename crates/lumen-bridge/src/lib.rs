//! BLE-mesh lamp to MQTT bridge
//!
//! Connects a BLE mesh lighting network to an MQTT broker speaking Home
//! Assistant's JSON light schema, in both directions:
//!
//! - Inbound MQTT commands on per-lamp `set` topics are routed through the
//!   lamp registry, decoded into semantic light commands, scaled to raw
//!   mesh ranges, and sent as Generic OnOff / Light Lightness / Light HSL
//!   requests.
//! - Inbound mesh status events are reverse-resolved against the registry
//!   and reflected onto per-lamp `state` topics.
//!
//! # Architecture
//!
//! ```text
//! MQTT broker <-> MqttClient --+                +-- MeshTransport <-> mesh gateway
//!                              |                |
//!                         LampBridge (select loop)
//!                        /     |        \
//!               TopicRouter  CommandEncoder  EventDecoder
//!                        \     |        /
//!                    LampRegistry + SessionStore
//!                              |
//!                      lumen_state::Storage
//! ```
//!
//! The registry and session persist through [`lumen_state`], so lamp
//! definitions and mesh key indices survive restarts. Transports are
//! traits; production backends live behind the `tcp` and `rumqtt` features
//! and tests run entirely on the mocks in [`test_utils`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use lumen_bridge::{BridgeConfig, LampBridge, LampRegistry, SessionStore};
//! use lumen_bridge::transport::tcp::TcpTransport;
//! use lumen_state::SqliteStore;
//!
//! let storage = Arc::new(SqliteStore::open("bridge.db").await?);
//! let registry = LampRegistry::new(storage.clone());
//! let session = Arc::new(SessionStore::open(storage).await?);
//! let (transport, mesh_rx) = TcpTransport::connect("127.0.0.1:7005").await?;
//!
//! let (bridge, handle) = LampBridge::new(
//!     BridgeConfig::default(), registry, session,
//!     Arc::new(transport), mqtt_client, mqtt_rx, mesh_rx,
//! );
//! tokio::spawn(bridge.run());
//! ```

pub mod bridge;
pub mod command;
pub mod config;
pub mod encoder;
pub mod error;
pub mod events;
pub mod mqtt;
pub mod publisher;
pub mod registry;
pub mod router;
pub mod session;
pub mod test_utils;
pub mod transport;

pub use bridge::{BridgeHandle, BridgeStats, LampBridge};
pub use command::{parse_command, LightCommand};
pub use config::{BridgeConfig, BridgeConfigBuilder, MeshConfig};
pub use encoder::CommandEncoder;
pub use error::{BridgeError, Result};
pub use events::{EventDecoder, MeshEvent};
pub use mqtt::{MqttClient, MqttEvent, QoS};
pub use publisher::StatePublisher;
pub use registry::{parse_mesh_address, LampInfo, LampRegistry};
pub use router::{ResolvedTarget, TopicRouter};
pub use session::{SessionState, SessionStore};
pub use transport::{MeshBody, MeshOpcode, MeshParams, MeshRequest, MeshTransport};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
