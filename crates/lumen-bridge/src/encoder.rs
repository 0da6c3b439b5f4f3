//! Semantic-command to mesh-request encoding
//!
//! The encoder owns the outbound path: validate the semantic values, scale
//! them to raw mesh ranges, stamp transmission parameters from the session,
//! and hand the request to the transport. For the unacknowledged models the
//! encoder also reports the new state on MQTT and records it in the session
//! after the send succeeds; acknowledged on/off sends report nothing here
//! because the status response drives the report.
//!
//! Validation runs before any transport call, so a rejected command has no
//! side effects.

use std::sync::Arc;

use tracing::debug;

use crate::command::{
    scale_hsl_lightness, scale_hue, scale_percent_to_lightness, scale_saturation,
    validate_hsl, validate_percent,
};
use crate::config::MeshConfig;
use crate::error::Result;
use crate::publisher::StatePublisher;
use crate::session::SessionStore;
use crate::transport::{MeshBody, MeshOpcode, MeshParams, MeshRequest, MeshTransport};

/// Encodes semantic commands into mesh requests
#[derive(Clone)]
pub struct CommandEncoder {
    transport: Arc<dyn MeshTransport>,
    publisher: StatePublisher,
    session: Arc<SessionStore>,
    mesh: MeshConfig,
}

impl CommandEncoder {
    /// Create an encoder
    pub fn new(
        transport: Arc<dyn MeshTransport>,
        publisher: StatePublisher,
        session: Arc<SessionStore>,
        mesh: MeshConfig,
    ) -> Self {
        Self { transport, publisher, session, mesh }
    }

    fn params(&self) -> MeshParams {
        let (net_idx, app_idx) = self.session.indices();
        MeshParams {
            ttl: self.mesh.ttl,
            tid: self.session.next_tid(),
            net_idx,
            app_idx,
            transport_ack: self.mesh.transport_ack,
            timeout: self.mesh.message_timeout,
        }
    }

    /// Send an acknowledged on/off set
    ///
    /// State is reported when the status response arrives, not here.
    pub async fn send_onoff(&self, address: u16, on: bool) -> Result<()> {
        let request = MeshRequest {
            opcode: MeshOpcode::OnOffSet,
            address,
            body: MeshBody::OnOff { on },
            params: self.params(),
        };
        debug!(address = format!("0x{address:04X}"), on, "Encoding on/off set");
        self.transport.send(request).await
    }

    /// Send an unacknowledged lightness set, report it, and record it
    pub async fn send_brightness(
        &self,
        address: u16,
        state_topic: &str,
        percent: f32,
    ) -> Result<()> {
        validate_percent("brightness", percent)?;
        let request = MeshRequest {
            opcode: MeshOpcode::LightnessSetUnack,
            address,
            body: MeshBody::Lightness {
                lightness: scale_percent_to_lightness(percent),
            },
            params: self.params(),
        };
        self.transport.send(request).await?;

        self.publisher.publish_brightness(state_topic, percent).await?;
        self.session.update_lightness(percent).await
    }

    /// Send an unacknowledged HSL set, report it, and record it
    pub async fn send_hsl(
        &self,
        address: u16,
        state_topic: &str,
        hue: f32,
        saturation: f32,
        lightness: f32,
    ) -> Result<()> {
        validate_hsl(hue, saturation, lightness)?;
        let request = MeshRequest {
            opcode: MeshOpcode::HslSetUnack,
            address,
            body: MeshBody::Hsl {
                hue: scale_hue(hue),
                saturation: scale_saturation(saturation),
                lightness: scale_hsl_lightness(lightness),
            },
            params: self.params(),
        };
        self.transport.send(request).await?;

        self.publisher.publish_hsl(state_topic, hue, saturation, lightness).await?;
        self.session.update_hsl(hue, saturation, lightness).await
    }

    /// Query a lamp's on/off state
    pub async fn get_onoff(&self, address: u16) -> Result<()> {
        let request = MeshRequest {
            opcode: MeshOpcode::OnOffGet,
            address,
            body: MeshBody::None,
            params: self.params(),
        };
        self.transport.send(request).await
    }
}
