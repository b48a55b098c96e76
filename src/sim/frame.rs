//! Link-layer frame format for the simulated medium.
//!
//! Every frame a device transmits begins with a fixed header carrying
//! the markers the capture layer classifies on: the frame kind, PAN ID,
//! the sender's extended address (whitelist filtering), network
//! addresses, and the hop limit.
//!
//! ## Header (46 bytes)
//!
//! ```text
//! [kind:1][pan_id:2 LE][src_ext:8][src_ip:16][dst_ip:16][hop_limit:1][payload_len:2 LE]
//! ```
//!
//! | Kind | Meaning       | Payload                      |
//! |------|---------------|------------------------------|
//! | 0x01 | MLE           | command byte + TLV sequence  |
//! | 0x02 | Echo request  | identifier + sequence number |
//! | 0x03 | Echo reply    | identifier + sequence number |
//!
//! Other kind bytes are out-of-protocol noise; the capture layer drops
//! them without recording anything.

use crate::addr::{DeviceId, ExtAddr, PanId};
use std::net::Ipv6Addr;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Size of the fixed frame header.
pub const FRAME_HEADER_SIZE: usize = 46;

/// Errors related to frame parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame too short: expected at least {expected}, got {got}")]
    TooShort { expected: usize, got: usize },

    #[error("frame payload length mismatch: declared {declared}, got {got}")]
    PayloadLengthMismatch { declared: usize, got: usize },
}

/// Frame kind discriminator byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    /// MLE protocol traffic.
    Mle = 0x01,
    /// Echo request (reachability probe).
    EchoRequest = 0x02,
    /// Echo reply.
    EchoReply = 0x03,
}

impl FrameKind {
    /// Try to convert from a byte.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(FrameKind::Mle),
            0x02 => Some(FrameKind::EchoRequest),
            0x03 => Some(FrameKind::EchoReply),
            _ => None,
        }
    }

    /// Convert to a byte.
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

/// A frame as observed on the medium.
///
/// `sender` and `timestamp_ms` are capture metadata supplied by the
/// medium; `data` is the raw wire image.
#[derive(Clone, Debug)]
pub struct RadioFrame {
    /// Which device transmitted this frame.
    pub sender: DeviceId,
    /// Transmission timestamp (Unix milliseconds).
    pub timestamp_ms: u64,
    /// Raw frame bytes (header + payload).
    pub data: Vec<u8>,
}

impl RadioFrame {
    /// Create a frame stamped with the current time.
    pub fn new(sender: DeviceId, data: Vec<u8>) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            sender,
            timestamp_ms,
            data,
        }
    }
}

/// Parsed frame header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    /// Raw kind byte; use [`FrameHeader::kind`] for the known kinds.
    pub kind_byte: u8,
    /// PAN the frame belongs to.
    pub pan_id: PanId,
    /// Sender's extended link-layer address.
    pub src_ext: ExtAddr,
    /// Source network address.
    pub src_addr: Ipv6Addr,
    /// Destination network address.
    pub dst_addr: Ipv6Addr,
    /// Remaining hop limit.
    pub hop_limit: u8,
    /// Declared payload length.
    pub payload_len: u16,
}

impl FrameHeader {
    /// Parse the fixed header from the start of a frame.
    pub fn parse(data: &[u8]) -> Result<Self, FrameError> {
        if data.len() < FRAME_HEADER_SIZE {
            return Err(FrameError::TooShort {
                expected: FRAME_HEADER_SIZE,
                got: data.len(),
            });
        }
        let kind_byte = data[0];
        let pan_id = PanId::new(u16::from_le_bytes([data[1], data[2]]));
        let mut ext = [0u8; 8];
        ext.copy_from_slice(&data[3..11]);
        let mut src = [0u8; 16];
        src.copy_from_slice(&data[11..27]);
        let mut dst = [0u8; 16];
        dst.copy_from_slice(&data[27..43]);
        let hop_limit = data[43];
        let payload_len = u16::from_le_bytes([data[44], data[45]]);
        Ok(Self {
            kind_byte,
            pan_id,
            src_ext: ExtAddr::from_bytes(ext),
            src_addr: Ipv6Addr::from(src),
            dst_addr: Ipv6Addr::from(dst),
            hop_limit,
            payload_len,
        })
    }

    /// The known frame kind, if the kind byte is recognized.
    pub fn kind(&self) -> Option<FrameKind> {
        FrameKind::from_byte(self.kind_byte)
    }
}

/// Build a complete frame from header fields and payload.
pub fn build_frame(
    kind: FrameKind,
    pan_id: PanId,
    src_ext: ExtAddr,
    src_addr: Ipv6Addr,
    dst_addr: Ipv6Addr,
    hop_limit: u8,
    payload: &[u8],
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    buf.push(kind.to_byte());
    buf.extend_from_slice(&pan_id.as_u16().to_le_bytes());
    buf.extend_from_slice(src_ext.as_bytes());
    buf.extend_from_slice(&src_addr.octets());
    buf.extend_from_slice(&dst_addr.octets());
    buf.push(hop_limit);
    buf.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Extract the payload, checking the declared length against the buffer.
pub fn frame_payload(data: &[u8]) -> Result<&[u8], FrameError> {
    let header = FrameHeader::parse(data)?;
    let actual = data.len() - FRAME_HEADER_SIZE;
    if actual != header.payload_len as usize {
        return Err(FrameError::PayloadLengthMismatch {
            declared: header.payload_len as usize,
            got: actual,
        });
    }
    Ok(&data[FRAME_HEADER_SIZE..])
}

// ============================================================================
// Echo Payload
// ============================================================================

/// Payload of an echo request or reply.
///
/// Wire format: `[identifier:2 BE][sequence:2 BE]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EchoPayload {
    /// Correlates replies with the requesting probe.
    pub identifier: u16,
    /// Probe sequence number.
    pub sequence: u16,
}

impl EchoPayload {
    /// Encode as payload bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4);
        buf.extend_from_slice(&self.identifier.to_be_bytes());
        buf.extend_from_slice(&self.sequence.to_be_bytes());
        buf
    }

    /// Decode from payload bytes.
    pub fn decode(payload: &[u8]) -> Result<Self, FrameError> {
        if payload.len() < 4 {
            return Err(FrameError::TooShort {
                expected: 4,
                got: payload.len(),
            });
        }
        Ok(Self {
            identifier: u16::from_be_bytes([payload[0], payload[1]]),
            sequence: u16::from_be_bytes([payload[2], payload[3]]),
        })
    }
}
