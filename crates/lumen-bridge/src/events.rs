//! Inbound mesh event decoding
//!
//! Events arrive from the gateway connection: status responses to our
//! acknowledged sends, unsolicited publishes from lamps, send timeouts, and
//! provisioning lifecycle events. The decoder resolves the sender against
//! the lamp registry and reflects status onto the lamp's MQTT state topic.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{BridgeError, Result};
use crate::publisher::{state_topic, StatePublisher};
use crate::registry::LampRegistry;
use crate::session::SessionStore;
use crate::transport::MeshOpcode;

/// One event from the mesh gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MeshEvent {
    /// Status response to an OnOff Get
    GetStatus {
        /// Responding node address
        address: u16,
        /// Reported on/off state
        onoff: bool,
    },
    /// Status response to an acknowledged OnOff Set
    SetStatus {
        /// Responding node address
        address: u16,
        /// Reported on/off state
        onoff: bool,
    },
    /// Unsolicited status publish from a node
    Publish {
        /// Publishing node address
        address: u16,
        /// Reported on/off state
        onoff: bool,
    },
    /// An acknowledged send got no response within the timeout
    Timeout {
        /// Opcode of the timed-out request
        opcode: MeshOpcode,
        /// Destination address of the timed-out request
        address: u16,
    },
    /// Provisioning completed; the node joined a network
    Provisioned {
        /// Assigned NetKey index
        net_idx: u16,
        /// Assigned unicast address
        address: u16,
    },
    /// An AppKey was bound to the client models
    AppKeyBound {
        /// Bound AppKey index
        app_idx: u16,
    },
}

/// Decodes mesh events into MQTT state reports and session updates
pub struct EventDecoder {
    registry: LampRegistry,
    publisher: StatePublisher,
    session: Arc<SessionStore>,
    prefix: String,
}

impl EventDecoder {
    /// Create a decoder
    pub fn new(
        registry: LampRegistry,
        publisher: StatePublisher,
        session: Arc<SessionStore>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            publisher,
            session,
            prefix: prefix.into(),
        }
    }

    /// Handle one event
    ///
    /// Status from an address with no registry entry comes back as
    /// [`BridgeError::UnknownSender`], which callers treat as benign.
    pub async fn handle(&self, event: MeshEvent) -> Result<()> {
        match event {
            MeshEvent::GetStatus { address, onoff }
            | MeshEvent::Publish { address, onoff } => {
                self.report_status(address, onoff).await
            }
            MeshEvent::SetStatus { address, onoff } => {
                self.session.set_onoff(onoff);
                self.report_status(address, onoff).await
            }
            MeshEvent::Timeout { opcode, address } => {
                // The operation is abandoned; no resend.
                warn!(
                    opcode = ?opcode,
                    address = format!("0x{address:04X}"),
                    "Mesh send timed out"
                );
                Ok(())
            }
            MeshEvent::Provisioned { net_idx, address } => {
                info!(
                    net_idx = format!("0x{net_idx:04X}"),
                    address = format!("0x{address:04X}"),
                    "Provisioning complete"
                );
                self.session.set_net_idx(net_idx);
                Ok(())
            }
            MeshEvent::AppKeyBound { app_idx } => {
                info!(app_idx = format!("0x{app_idx:04X}"), "AppKey bound");
                self.session.set_app_idx(app_idx).await
            }
        }
    }

    /// Reverse-resolve the sender and reflect its state onto MQTT
    async fn report_status(&self, address: u16, onoff: bool) -> Result<()> {
        let (_, lamp) = self
            .registry
            .lookup_by_address(address)
            .await
            .ok_or(BridgeError::UnknownSender(address))?;
        let topic = state_topic(&self.prefix, &lamp.name);
        self.publisher.publish_onoff_raw(&topic, onoff).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KEY_INDEX_UNUSED;
    use crate::registry::LampInfo;
    use crate::test_utils::TestFixture;

    async fn decoder(fx: &TestFixture) -> EventDecoder {
        EventDecoder::new(
            fx.registry.clone(),
            StatePublisher::new(fx.mqtt.clone()),
            fx.session.clone(),
            "homeassistant",
        )
    }

    #[tokio::test]
    async fn test_publish_event_reflected_to_state_topic() {
        let fx = TestFixture::new().await;
        fx.registry.put(0, &LampInfo::new("kitchen", "0x14")).await.unwrap();
        let decoder = decoder(&fx).await;

        decoder
            .handle(MeshEvent::Publish { address: 0x14, onoff: true })
            .await
            .unwrap();

        let published = fx.mqtt.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "homeassistant/light/kitchen/state");
        assert_eq!(published[0].payload, br#"{"state":1}"#);
    }

    #[tokio::test]
    async fn test_unknown_sender_is_benign() {
        let fx = TestFixture::new().await;
        let decoder = decoder(&fx).await;

        let err = decoder
            .handle(MeshEvent::Publish { address: 0x99, onoff: false })
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::UnknownSender(0x99)));
        assert!(err.is_benign());
        assert!(fx.mqtt.published().is_empty());
    }

    #[tokio::test]
    async fn test_set_status_records_onoff() {
        let fx = TestFixture::new().await;
        fx.registry.put(0, &LampInfo::new("kitchen", "20")).await.unwrap();
        let decoder = decoder(&fx).await;

        decoder
            .handle(MeshEvent::SetStatus { address: 20, onoff: true })
            .await
            .unwrap();
        assert!(fx.session.snapshot().onoff);
        assert_eq!(fx.mqtt.published()[0].payload, br#"{"state":1}"#);
    }

    #[tokio::test]
    async fn test_timeout_does_not_resend() {
        let fx = TestFixture::new().await;
        let decoder = decoder(&fx).await;

        decoder
            .handle(MeshEvent::Timeout { opcode: MeshOpcode::OnOffSet, address: 20 })
            .await
            .unwrap();
        assert!(fx.transport.sent().is_empty());
        assert!(fx.mqtt.published().is_empty());
    }

    #[tokio::test]
    async fn test_provisioning_lifecycle_updates_session() {
        let fx = TestFixture::new().await;
        let decoder = decoder(&fx).await;

        decoder
            .handle(MeshEvent::Provisioned { net_idx: 0x0001, address: 0x0002 })
            .await
            .unwrap();
        let (net_idx, app_idx) = fx.session.indices();
        assert_eq!(net_idx, 0x0001);
        assert_eq!(app_idx, KEY_INDEX_UNUSED);

        decoder.handle(MeshEvent::AppKeyBound { app_idx: 0x0003 }).await.unwrap();
        let (_, app_idx) = fx.session.indices();
        assert_eq!(app_idx, 0x0003);
    }
}
