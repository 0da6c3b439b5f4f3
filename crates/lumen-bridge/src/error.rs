//! Error types for bridge operations
//!
//! Nothing in this crate is fatal to the process: every failure path is
//! logged by the event loop and control returns to await the next event.
//! The taxonomy distinguishes transport failures, validation rejections,
//! benign lookup misses, and parse errors.

use thiserror::Error;

use crate::transport::MeshOpcode;

/// Main error type for bridge operations
#[derive(Error, Debug)]
pub enum BridgeError {
    // ===== Transport Errors =====
    /// Mesh send failed; the operation is abandoned, no retry
    #[error("Mesh send failed for opcode {opcode:?}: {reason}")]
    TransportSend {
        /// Opcode of the failed request
        opcode: MeshOpcode,
        /// Failure reason
        reason: String,
    },

    /// MQTT publish failed
    #[error("MQTT publish to '{topic}' failed: {reason}")]
    Publish {
        /// Target topic
        topic: String,
        /// Failure reason
        reason: String,
    },

    /// MQTT subscribe failed
    #[error("MQTT subscribe to '{0}' failed")]
    Subscribe(String),

    // ===== Validation Errors =====
    /// A semantic value is outside its declared range; rejected pre-transport
    #[error("{field} out of range: {value}")]
    OutOfRange {
        /// Which value was rejected
        field: &'static str,
        /// The offending value
        value: f32,
    },

    // ===== Lookup Misses (benign) =====
    /// Inbound topic matched no registry entry
    #[error("No registry entry matches topic: {0}")]
    UnknownTopic(String),

    /// Mesh status arrived from an address not present in the registry
    #[error("Status from unknown mesh address 0x{0:04X}")]
    UnknownSender(u16),

    /// Registry slot is absent
    #[error("No lamp registered at slot {0}")]
    SlotNotFound(usize),

    // ===== Parse Errors =====
    /// Inbound payload is not valid JSON or matches no command shape
    #[error("Payload parse error: {0}")]
    PayloadParse(String),

    /// Registry entry's stored address does not parse as an integer
    #[error("Lamp '{name}' has unparseable address '{raw}'")]
    AddressParse {
        /// Lamp name
        name: String,
        /// The stored address text
        raw: String,
    },

    // ===== Gateway Framing Errors =====
    /// Invalid magic number in a gateway frame
    #[error("Invalid gateway magic: expected 0xB1E5, got 0x{got:04X}")]
    InvalidMagic {
        /// The received magic number
        got: u16,
    },

    /// Invalid gateway frame
    #[error("Invalid gateway frame: {0}")]
    InvalidFrame(String),

    // ===== General Errors =====
    /// Storage layer error
    #[error("Storage error: {0}")]
    Storage(#[from] lumen_state::StateError),

    /// Event/command channel closed
    #[error("Channel closed")]
    ChannelClosed,

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Lookup misses are expected during normal operation and are skipped
    /// without counting as failures
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            BridgeError::UnknownTopic(_)
                | BridgeError::UnknownSender(_)
                | BridgeError::SlotNotFound(_)
        )
    }

    /// Validation rejections happen before any transport side effect
    pub fn is_validation(&self) -> bool {
        matches!(self, BridgeError::OutOfRange { .. })
    }

    /// Get an error code for logging/metrics
    pub fn error_code(&self) -> &'static str {
        match self {
            BridgeError::TransportSend { .. } => "TRANSPORT_SEND",
            BridgeError::Publish { .. } => "MQTT_PUBLISH",
            BridgeError::Subscribe(_) => "MQTT_SUBSCRIBE",
            BridgeError::OutOfRange { .. } => "OUT_OF_RANGE",
            BridgeError::UnknownTopic(_) => "UNKNOWN_TOPIC",
            BridgeError::UnknownSender(_) => "UNKNOWN_SENDER",
            BridgeError::SlotNotFound(_) => "SLOT_NOT_FOUND",
            BridgeError::PayloadParse(_) => "PAYLOAD_PARSE",
            BridgeError::AddressParse { .. } => "ADDRESS_PARSE",
            BridgeError::InvalidMagic { .. } => "INVALID_MAGIC",
            BridgeError::InvalidFrame(_) => "INVALID_FRAME",
            BridgeError::Storage(_) => "STORAGE",
            BridgeError::ChannelClosed => "CHANNEL_CLOSED",
            BridgeError::Io(_) => "IO_ERROR",
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::PayloadParse(err.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for BridgeError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        BridgeError::ChannelClosed
    }
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;
