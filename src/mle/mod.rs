//! MLE message model.
//!
//! An MLE message body is a command byte followed by a TLV sequence.
//! Decoded messages also carry transport metadata captured off the
//! medium: source and destination network addresses, hop limit, and the
//! sending device's identity.
//!
//! The decoder is deliberately lenient about TLV sets: which TLVs a
//! given command must or may carry is conformance policy, not parse
//! validity. The per-command table lives in [`catalog`] and enforcement
//! happens in test assertions.

pub mod catalog;

use crate::addr::DeviceId;
use crate::tlv::{StructuredTlv, Tlv, TlvError, TlvType};
use std::fmt;
use std::net::Ipv6Addr;
use thiserror::Error;

/// Errors related to MLE message decoding.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MleError {
    #[error("empty mle payload")]
    EmptyPayload,

    #[error("unknown mle command: 0x{0:02x}")]
    UnknownCommand(u8),

    #[error("truncated mle message: {0}")]
    TruncatedMessage(#[from] TlvError),
}

// ============================================================================
// Command Types
// ============================================================================

/// MLE command type identifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandType {
    LinkRequest = 0,
    LinkAccept = 1,
    LinkAcceptAndRequest = 2,
    LinkReject = 3,
    Advertisement = 4,
    Update = 5,
    UpdateRequest = 6,
    DataRequest = 7,
    DataResponse = 8,
    ParentRequest = 9,
    ParentResponse = 10,
    ChildIdRequest = 11,
    ChildIdResponse = 12,
    ChildUpdateRequest = 13,
    ChildUpdateResponse = 14,
    Announce = 15,
    DiscoveryRequest = 16,
    DiscoveryResponse = 17,
}

impl CommandType {
    /// Try to convert from a byte.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(CommandType::LinkRequest),
            1 => Some(CommandType::LinkAccept),
            2 => Some(CommandType::LinkAcceptAndRequest),
            3 => Some(CommandType::LinkReject),
            4 => Some(CommandType::Advertisement),
            5 => Some(CommandType::Update),
            6 => Some(CommandType::UpdateRequest),
            7 => Some(CommandType::DataRequest),
            8 => Some(CommandType::DataResponse),
            9 => Some(CommandType::ParentRequest),
            10 => Some(CommandType::ParentResponse),
            11 => Some(CommandType::ChildIdRequest),
            12 => Some(CommandType::ChildIdResponse),
            13 => Some(CommandType::ChildUpdateRequest),
            14 => Some(CommandType::ChildUpdateResponse),
            15 => Some(CommandType::Announce),
            16 => Some(CommandType::DiscoveryRequest),
            17 => Some(CommandType::DiscoveryResponse),
            _ => None,
        }
    }

    /// Convert to a byte.
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// MLE Message
// ============================================================================

/// A decoded MLE message with its capture metadata.
///
/// Immutable once decoded. TLV order is preserved from the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MleMessage {
    /// Command type from the first payload byte.
    pub command: CommandType,
    /// Ordered TLV sequence.
    pub tlvs: Vec<Tlv>,
    /// Source network address of the carrying frame.
    pub src_addr: Ipv6Addr,
    /// Destination network address of the carrying frame.
    pub dst_addr: Ipv6Addr,
    /// Hop limit of the carrying frame.
    pub hop_limit: u8,
    /// Identity of the device that transmitted the frame.
    pub sender: DeviceId,
}

/// Capture metadata for a frame being decoded into an [`MleMessage`].
#[derive(Clone, Copy, Debug)]
pub struct MessageMeta {
    pub src_addr: Ipv6Addr,
    pub dst_addr: Ipv6Addr,
    pub hop_limit: u8,
    pub sender: DeviceId,
}

impl MleMessage {
    /// Decode an MLE payload (command byte + TLV sequence).
    ///
    /// Stops and reports an error if a TLV's declared length runs past
    /// the end of the buffer.
    pub fn decode(payload: &[u8], meta: MessageMeta) -> Result<Self, MleError> {
        let (&command_byte, tlv_bytes) = payload.split_first().ok_or(MleError::EmptyPayload)?;
        let command = CommandType::from_byte(command_byte)
            .ok_or(MleError::UnknownCommand(command_byte))?;
        let tlvs = Tlv::decode_all(tlv_bytes)?;
        Ok(Self {
            command,
            tlvs,
            src_addr: meta.src_addr,
            dst_addr: meta.dst_addr,
            hop_limit: meta.hop_limit,
            sender: meta.sender,
        })
    }

    /// Encode a command and TLV set into an MLE payload.
    pub fn encode_payload(command: CommandType, tlvs: &[Tlv]) -> Result<Vec<u8>, TlvError> {
        let mut buf = Vec::with_capacity(1 + tlvs.iter().map(Tlv::encoded_len).sum::<usize>());
        buf.push(command.to_byte());
        for tlv in tlvs {
            buf.extend_from_slice(&tlv.encode()?);
        }
        Ok(buf)
    }

    /// True if the message carries a TLV of the given type.
    pub fn has_tlv(&self, tlv_type: TlvType) -> bool {
        self.tlvs.iter().any(|t| t.tlv_type == tlv_type)
    }

    /// Same lookup as [`MleMessage::has_tlv`], for TLVs the protocol
    /// makes optional in this message: absence is informational, not a
    /// conformance failure.
    pub fn has_optional_tlv(&self, tlv_type: TlvType) -> bool {
        self.has_tlv(tlv_type)
    }

    /// Find the first TLV of the given type.
    pub fn get_tlv(&self, tlv_type: TlvType) -> Option<&Tlv> {
        self.tlvs.iter().find(|t| t.tlv_type == tlv_type)
    }

    /// Find and decode the first TLV of `T`'s type into its structured
    /// view. `Ok(None)` when the TLV is absent.
    pub fn get_tlv_as<T: StructuredTlv>(&self) -> Result<Option<T>, TlvError> {
        match self.get_tlv(T::TLV_TYPE) {
            Some(tlv) => Ok(Some(T::from_tlv(tlv)?)),
            None => Ok(None),
        }
    }

    /// The TLV types present, in wire order. Used in assertion context.
    pub fn tlv_types(&self) -> Vec<TlvType> {
        self.tlvs.iter().map(|t| t.tlv_type).collect()
    }
}

impl fmt::Display for MleMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} from {} ({} -> {}, hop_limit {}, tlvs [",
            self.command, self.sender, self.src_addr, self.dst_addr, self.hop_limit
        )?;
        for (i, ty) in self.tlv_types().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", ty)?;
        }
        write!(f, "])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tlv::{ModeTlv, ScanMaskTlv, SourceAddressTlv, StructuredTlv, VersionTlv};
    use crate::addr::ShortAddr;

    fn meta() -> MessageMeta {
        MessageMeta {
            src_addr: "fe80::1".parse().unwrap(),
            dst_addr: "ff02::2".parse().unwrap(),
            hop_limit: 255,
            sender: DeviceId::new(2),
        }
    }

    #[test]
    fn test_command_type_roundtrip() {
        for b in 0u8..=17 {
            let cmd = CommandType::from_byte(b).unwrap();
            assert_eq!(cmd.to_byte(), b);
        }
        assert!(CommandType::from_byte(18).is_none());
        assert!(CommandType::from_byte(0xff).is_none());
    }

    #[test]
    fn test_decode_message() {
        let tlvs = vec![
            ModeTlv::from_flags("rsdn").to_tlv(),
            ScanMaskTlv {
                router: true,
                end_device: false,
            }
            .to_tlv(),
            VersionTlv(2).to_tlv(),
        ];
        let payload = MleMessage::encode_payload(CommandType::ParentRequest, &tlvs).unwrap();
        let msg = MleMessage::decode(&payload, meta()).unwrap();

        assert_eq!(msg.command, CommandType::ParentRequest);
        assert_eq!(msg.tlvs.len(), 3);
        assert!(msg.has_tlv(TlvType::Mode));
        assert!(msg.has_tlv(TlvType::ScanMask));
        assert!(!msg.has_tlv(TlvType::Challenge));
        assert_eq!(msg.hop_limit, 255);

        let mask: ScanMaskTlv = msg.get_tlv_as().unwrap().unwrap();
        assert!(mask.router);
        assert!(!mask.end_device);
    }

    #[test]
    fn test_decode_empty_payload() {
        assert_eq!(MleMessage::decode(&[], meta()), Err(MleError::EmptyPayload));
    }

    #[test]
    fn test_decode_unknown_command() {
        assert_eq!(
            MleMessage::decode(&[0x99], meta()),
            Err(MleError::UnknownCommand(0x99))
        );
    }

    #[test]
    fn test_decode_truncated_tlv() {
        // Advertisement command, then a TLV claiming 8 bytes with 2 present
        let payload = [0x04, 0x00, 0x08, 0xaa, 0xbb];
        let err = MleMessage::decode(&payload, meta()).unwrap_err();
        assert!(matches!(err, MleError::TruncatedMessage(_)));
    }

    #[test]
    fn test_get_tlv_as_absent() {
        let payload = MleMessage::encode_payload(CommandType::Advertisement, &[]).unwrap();
        let msg = MleMessage::decode(&payload, meta()).unwrap();
        let source: Option<SourceAddressTlv> = msg.get_tlv_as().unwrap();
        assert!(source.is_none());
    }

    #[test]
    fn test_reference_messages_carry_mandatory_tlvs() {
        // For every command, a message built from the catalog's
        // mandatory set reports each of those TLVs present.
        for byte in 0u8..=17 {
            let command = CommandType::from_byte(byte).unwrap();
            let tlvs: Vec<Tlv> = crate::mle::catalog::mandatory_tlvs(command)
                .iter()
                .map(|&ty| Tlv::new(ty, vec![0u8; 4]))
                .collect();
            let payload = MleMessage::encode_payload(command, &tlvs).unwrap();
            let msg = MleMessage::decode(&payload, meta()).unwrap();
            for &ty in crate::mle::catalog::mandatory_tlvs(command) {
                assert!(msg.has_tlv(ty), "{} reference message missing {}", command, ty);
            }
        }
    }

    #[test]
    fn test_tlv_order_preserved() {
        let tlvs = vec![
            VersionTlv(2).to_tlv(),
            SourceAddressTlv(ShortAddr::from_u16(0x4400)).to_tlv(),
        ];
        let payload = MleMessage::encode_payload(CommandType::Advertisement, &tlvs).unwrap();
        let msg = MleMessage::decode(&payload, meta()).unwrap();
        assert_eq!(
            msg.tlv_types(),
            vec![TlvType::Version, TlvType::SourceAddress]
        );
    }
}
