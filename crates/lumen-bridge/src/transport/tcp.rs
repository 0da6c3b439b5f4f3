//! TCP mesh-gateway transport
//!
//! Connects to a gateway daemon that fronts the BLE mesh stack. The wire
//! protocol is length-prefixed JSON frames:
//!
//! ```text
//! +--------+--------+----------------+
//! | magic  | length | JSON body      |
//! | u16 BE | u16 BE | `length` bytes |
//! +--------+--------+----------------+
//! ```
//!
//! Outgoing frames carry [`MeshRequest`], incoming frames carry
//! [`MeshEvent`]. A background reader task decodes incoming frames and
//! forwards them on an mpsc channel; the connection is done when that
//! channel closes.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::config::GATEWAY_MAGIC;
use crate::error::{BridgeError, Result};
use crate::events::MeshEvent;
use crate::transport::{MeshRequest, MeshTransport};

/// Incoming event channel depth
const EVENT_CHANNEL_SIZE: usize = 64;

/// Largest accepted frame body
const MAX_FRAME_LEN: usize = 16 * 1024;

/// Mesh transport over a TCP gateway connection
pub struct TcpTransport {
    writer: Arc<Mutex<OwnedWriteHalf>>,
    peer: String,
}

impl TcpTransport {
    /// Connect to a gateway and spawn the frame reader
    ///
    /// Returns the transport and the channel carrying decoded mesh events.
    pub async fn connect(addr: &str) -> Result<(Self, mpsc::Receiver<MeshEvent>)> {
        let stream = TcpStream::connect(addr).await?;
        info!(addr, "Connected to mesh gateway");

        let (read_half, write_half) = stream.into_split();
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);

        tokio::spawn(read_loop(read_half, event_tx));

        let transport = Self {
            writer: Arc::new(Mutex::new(write_half)),
            peer: addr.to_string(),
        };
        Ok((transport, event_rx))
    }
}

#[async_trait::async_trait]
impl MeshTransport for TcpTransport {
    async fn send(&self, request: MeshRequest) -> Result<()> {
        let opcode = request.opcode;
        let frame = encode_frame(&request)?;
        let mut writer = self.writer.lock().await;
        writer.write_all(&frame).await.map_err(|e| BridgeError::TransportSend {
            opcode,
            reason: e.to_string(),
        })?;
        writer.flush().await.map_err(|e| BridgeError::TransportSend {
            opcode,
            reason: e.to_string(),
        })?;
        debug!(opcode = ?opcode, address = format!("0x{:04X}", request.address), "Sent mesh request");
        Ok(())
    }

    fn name(&self) -> &str {
        &self.peer
    }
}

/// Encode one request into a wire frame
pub fn encode_frame(request: &MeshRequest) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(request)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(BridgeError::InvalidFrame(format!(
            "body of {} bytes exceeds maximum {}",
            body.len(),
            MAX_FRAME_LEN
        )));
    }
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&GATEWAY_MAGIC.to_be_bytes());
    frame.extend_from_slice(&(body.len() as u16).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Read one frame header and body, decoding the body as a mesh event
///
/// Returns `Ok(None)` on clean EOF at a frame boundary.
pub async fn read_event<R>(reader: &mut R) -> Result<Option<MeshEvent>>
where
    R: AsyncReadExt + Unpin,
{
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let magic = u16::from_be_bytes([header[0], header[1]]);
    if magic != GATEWAY_MAGIC {
        return Err(BridgeError::InvalidMagic { got: magic });
    }
    let len = u16::from_be_bytes([header[2], header[3]]) as usize;
    if len > MAX_FRAME_LEN {
        return Err(BridgeError::InvalidFrame(format!(
            "declared length {len} exceeds maximum {MAX_FRAME_LEN}"
        )));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;

    let event = serde_json::from_slice(&body)
        .map_err(|e| BridgeError::InvalidFrame(format!("undecodable event body: {e}")))?;
    Ok(Some(event))
}

async fn read_loop(mut reader: OwnedReadHalf, event_tx: mpsc::Sender<MeshEvent>) {
    loop {
        match read_event(&mut reader).await {
            Ok(Some(event)) => {
                if event_tx.send(event).await.is_err() {
                    debug!("Event channel closed, stopping gateway reader");
                    return;
                }
            }
            Ok(None) => {
                info!("Mesh gateway closed the connection");
                return;
            }
            Err(e) => {
                // Framing is unrecoverable once desynced
                warn!(error = %e, "Gateway read failed, closing connection");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MeshBody, MeshOpcode, MeshParams};
    use std::io::Cursor;

    fn request() -> MeshRequest {
        MeshRequest {
            opcode: MeshOpcode::OnOffSet,
            address: 0x0014,
            body: MeshBody::OnOff { on: true },
            params: MeshParams {
                ttl: 10,
                tid: 0,
                net_idx: 0,
                app_idx: 0,
                transport_ack: true,
                timeout: None,
            },
        }
    }

    #[test]
    fn test_frame_layout() {
        let frame = encode_frame(&request()).unwrap();
        assert_eq!(&frame[0..2], &[0xB1, 0xE5]);
        let len = u16::from_be_bytes([frame[2], frame[3]]) as usize;
        assert_eq!(frame.len(), 4 + len);
        let parsed: MeshRequest = serde_json::from_slice(&frame[4..]).unwrap();
        assert_eq!(parsed, request());
    }

    #[tokio::test]
    async fn test_read_event_roundtrip() {
        let event = MeshEvent::Publish { address: 0x0014, onoff: true };
        let body = serde_json::to_vec(&event).unwrap();
        let mut frame = Vec::new();
        frame.extend_from_slice(&GATEWAY_MAGIC.to_be_bytes());
        frame.extend_from_slice(&(body.len() as u16).to_be_bytes());
        frame.extend_from_slice(&body);

        let mut cursor = Cursor::new(frame);
        let decoded = read_event(&mut cursor).await.unwrap();
        assert_eq!(decoded, Some(event));

        // Cursor exhausted: clean EOF
        assert_eq!(read_event(&mut cursor).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_read_event_rejects_bad_magic() {
        let mut cursor = Cursor::new(vec![0xDE, 0xAD, 0x00, 0x02, b'{', b'}']);
        let err = read_event(&mut cursor).await.unwrap_err();
        assert!(matches!(err, BridgeError::InvalidMagic { got: 0xDEAD }));
    }

    #[tokio::test]
    async fn test_read_event_rejects_undecodable_body() {
        let body = b"not json";
        let mut frame = Vec::new();
        frame.extend_from_slice(&GATEWAY_MAGIC.to_be_bytes());
        frame.extend_from_slice(&(body.len() as u16).to_be_bytes());
        frame.extend_from_slice(body);

        let mut cursor = Cursor::new(frame);
        let err = read_event(&mut cursor).await.unwrap_err();
        assert!(matches!(err, BridgeError::InvalidFrame(_)));
    }
}
