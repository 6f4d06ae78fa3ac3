//! Datagram framing for the UDP transport.

use bincode::{deserialize, serialize};
use serde::{Deserialize, Serialize};
use shared::{Message, PeerId, TransportError};

pub const PROTOCOL_VERSION: u32 = 1;

/// The host always takes this id; guests are numbered from the next one up.
pub const HOST_PEER_ID: PeerId = 1;

/// Large enough for a full roster or result list of a capped room.
pub const MAX_DATAGRAM: usize = 4096;

/// Most guests a host admits, whatever it was asked for.
pub const MAX_ROOM_PEERS: usize = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Frame {
    Hello {
        version: u32,
    },
    Welcome {
        peer_id: PeerId,
        host_id: PeerId,
    },
    Rejected {
        reason: String,
    },
    /// A protocol message. `to: None` fans out to everyone but the sender.
    Relay {
        from: PeerId,
        to: Option<PeerId>,
        payload: Message,
    },
    /// Host to guests: someone dropped out of the room.
    Left {
        peer_id: PeerId,
    },
    Heartbeat,
    Goodbye,
}

/// Serializes a frame, refusing anything the receiver's buffer would truncate.
pub fn encode(frame: &Frame) -> Result<Vec<u8>, TransportError> {
    let bytes = serialize(frame)?;
    if bytes.len() > MAX_DATAGRAM {
        return Err(TransportError::FrameTooLarge {
            size: bytes.len(),
            limit: MAX_DATAGRAM,
        });
    }
    Ok(bytes)
}

pub fn decode(bytes: &[u8]) -> Result<Frame, TransportError> {
    Ok(deserialize(bytes)?)
}
