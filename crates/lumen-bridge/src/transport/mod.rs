//! Mesh transport abstraction
//!
//! The bridge talks to the BLE mesh through a [`MeshTransport`]. Production
//! builds use the TCP gateway backend (feature `tcp`); tests use the mock
//! in [`crate::test_utils`].

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[cfg(feature = "tcp")]
pub mod tcp;

/// Mesh model opcodes the bridge emits
///
/// Raw values are the SIG-defined 2-byte opcodes for the Generic OnOff,
/// Light Lightness, and Light HSL models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MeshOpcode {
    /// Generic OnOff Get
    OnOffGet,
    /// Generic OnOff Set (acknowledged)
    OnOffSet,
    /// Generic OnOff Set Unacknowledged
    OnOffSetUnack,
    /// Light Lightness Set Unacknowledged
    LightnessSetUnack,
    /// Light HSL Set Unacknowledged
    HslSetUnack,
}

impl MeshOpcode {
    /// The SIG-assigned 2-byte opcode value
    pub fn raw(&self) -> u16 {
        match self {
            MeshOpcode::OnOffGet => 0x8201,
            MeshOpcode::OnOffSet => 0x8202,
            MeshOpcode::OnOffSetUnack => 0x8203,
            MeshOpcode::LightnessSetUnack => 0x824D,
            MeshOpcode::HslSetUnack => 0x8277,
        }
    }

    /// Whether the opcode solicits a status response from the target
    pub fn is_acknowledged(&self) -> bool {
        matches!(self, MeshOpcode::OnOffGet | MeshOpcode::OnOffSet)
    }
}

/// Model-specific body of a mesh request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MeshBody {
    /// No body (Get requests)
    None,
    /// Generic OnOff target state
    OnOff {
        /// Target on/off state
        on: bool,
    },
    /// Raw 16-bit lightness
    Lightness {
        /// Raw lightness value
        lightness: u16,
    },
    /// Raw 16-bit HSL triple
    Hsl {
        /// Raw hue
        hue: u16,
        /// Raw saturation
        saturation: u16,
        /// Raw lightness (half-range)
        lightness: u16,
    },
}

/// Transmission parameters attached to every request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshParams {
    /// Time to live
    pub ttl: u8,
    /// Transaction id, from the session counter
    pub tid: u8,
    /// NetKey index
    pub net_idx: u16,
    /// AppKey index
    pub app_idx: u16,
    /// Request segmented-transport acknowledgement
    pub transport_ack: bool,
    /// Response timeout; `None` lets the gateway apply its default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

/// One outgoing mesh request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshRequest {
    /// Model opcode
    pub opcode: MeshOpcode,
    /// Destination node or group address
    pub address: u16,
    /// Model-specific body
    pub body: MeshBody,
    /// Transmission parameters
    pub params: MeshParams,
}

/// Outbound half of a mesh connection
///
/// Implementations send one request and return. Delivery reports and status
/// responses come back asynchronously as [`crate::events::MeshEvent`]s on
/// the connection's event channel.
#[async_trait]
pub trait MeshTransport: Send + Sync {
    /// Send a single mesh request
    async fn send(&self, request: MeshRequest) -> Result<()>;

    /// Get the transport name for logging
    fn name(&self) -> &str;
}
