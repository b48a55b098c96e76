//! Structured views over generic TLVs.
//!
//! Each known TLV type pairs a typed struct with a fixed decode/encode
//! implementation via [`StructuredTlv`]. Decoding from a payload of
//! unexpected shape fails with [`TlvError::InvalidPayload`]; the generic
//! container is never mutated.

use super::{Tlv, TlvError, TlvType};
use crate::addr::ShortAddr;
use std::net::Ipv6Addr;

/// A typed view over a generic [`Tlv`].
///
/// Implementations form the build-time registry of known TLV layouts:
/// one fixed decode/encode pair per type tag.
pub trait StructuredTlv: Sized {
    /// The type tag this structure decodes from and encodes to.
    const TLV_TYPE: TlvType;

    /// Parse the typed fields out of a generic TLV.
    fn from_tlv(tlv: &Tlv) -> Result<Self, TlvError>;

    /// Build the generic TLV carrying this structure.
    fn to_tlv(&self) -> Tlv;
}

fn check_type(tlv: &Tlv, expected: TlvType) -> Result<(), TlvError> {
    if tlv.tlv_type != expected {
        return Err(TlvError::WrongType {
            expected,
            got: tlv.tlv_type,
        });
    }
    Ok(())
}

fn check_len(tlv: &Tlv, expected: usize) -> Result<(), TlvError> {
    if tlv.value.len() != expected {
        return Err(TlvError::InvalidPayload {
            tlv_type: tlv.tlv_type,
            reason: format!("expected {} bytes, got {}", expected, tlv.value.len()),
        });
    }
    Ok(())
}

fn check_len_range(tlv: &Tlv, min: usize, max: usize) -> Result<(), TlvError> {
    let len = tlv.value.len();
    if len < min || len > max {
        return Err(TlvError::InvalidPayload {
            tlv_type: tlv.tlv_type,
            reason: format!("expected {}..={} bytes, got {}", min, max, len),
        });
    }
    Ok(())
}

// ============================================================================
// Address and Counter TLVs
// ============================================================================

/// Source Address TLV: the sender's mesh short address (RLOC16).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SourceAddressTlv(pub ShortAddr);

impl StructuredTlv for SourceAddressTlv {
    const TLV_TYPE: TlvType = TlvType::SourceAddress;

    fn from_tlv(tlv: &Tlv) -> Result<Self, TlvError> {
        check_type(tlv, Self::TLV_TYPE)?;
        check_len(tlv, 2)?;
        let raw = u16::from_be_bytes([tlv.value[0], tlv.value[1]]);
        Ok(Self(ShortAddr::from_u16(raw)))
    }

    fn to_tlv(&self) -> Tlv {
        Tlv::new(Self::TLV_TYPE, self.0.as_u16().to_be_bytes().to_vec())
    }
}

/// Address16 TLV: the short address assigned to an attaching child.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Address16Tlv(pub ShortAddr);

impl StructuredTlv for Address16Tlv {
    const TLV_TYPE: TlvType = TlvType::Address16;

    fn from_tlv(tlv: &Tlv) -> Result<Self, TlvError> {
        check_type(tlv, Self::TLV_TYPE)?;
        check_len(tlv, 2)?;
        let raw = u16::from_be_bytes([tlv.value[0], tlv.value[1]]);
        Ok(Self(ShortAddr::from_u16(raw)))
    }

    fn to_tlv(&self) -> Tlv {
        Tlv::new(Self::TLV_TYPE, self.0.as_u16().to_be_bytes().to_vec())
    }
}

/// Link-layer Frame Counter TLV.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinkFrameCounterTlv(pub u32);

impl StructuredTlv for LinkFrameCounterTlv {
    const TLV_TYPE: TlvType = TlvType::LinkLayerFrameCounter;

    fn from_tlv(tlv: &Tlv) -> Result<Self, TlvError> {
        check_type(tlv, Self::TLV_TYPE)?;
        check_len(tlv, 4)?;
        Ok(Self(u32::from_be_bytes([
            tlv.value[0],
            tlv.value[1],
            tlv.value[2],
            tlv.value[3],
        ])))
    }

    fn to_tlv(&self) -> Tlv {
        Tlv::new(Self::TLV_TYPE, self.0.to_be_bytes().to_vec())
    }
}

/// MLE Frame Counter TLV.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MleFrameCounterTlv(pub u32);

impl StructuredTlv for MleFrameCounterTlv {
    const TLV_TYPE: TlvType = TlvType::MleFrameCounter;

    fn from_tlv(tlv: &Tlv) -> Result<Self, TlvError> {
        check_type(tlv, Self::TLV_TYPE)?;
        check_len(tlv, 4)?;
        Ok(Self(u32::from_be_bytes([
            tlv.value[0],
            tlv.value[1],
            tlv.value[2],
            tlv.value[3],
        ])))
    }

    fn to_tlv(&self) -> Tlv {
        Tlv::new(Self::TLV_TYPE, self.0.to_be_bytes().to_vec())
    }
}

// ============================================================================
// Mode, Timeout, Version
// ============================================================================

/// Mode TLV: the device's operating mode flags.
///
/// Wire format (1 byte):
/// ```text
/// [....rsdn]  r = rx on when idle, s = secure data requests,
///             d = full thread device, n = full network data
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ModeTlv {
    pub rx_on_when_idle: bool,
    pub secure_data_requests: bool,
    pub device_type: bool,
    pub network_data: bool,
}

impl ModeTlv {
    const RX_ON_WHEN_IDLE: u8 = 0x08;
    const SECURE_DATA_REQUESTS: u8 = 0x04;
    const DEVICE_TYPE: u8 = 0x02;
    const NETWORK_DATA: u8 = 0x01;

    /// Parse a mode string of the letters `r`, `s`, `d`, `n`.
    pub fn from_flags(flags: &str) -> Self {
        Self {
            rx_on_when_idle: flags.contains('r'),
            secure_data_requests: flags.contains('s'),
            device_type: flags.contains('d'),
            network_data: flags.contains('n'),
        }
    }
}

impl StructuredTlv for ModeTlv {
    const TLV_TYPE: TlvType = TlvType::Mode;

    fn from_tlv(tlv: &Tlv) -> Result<Self, TlvError> {
        check_type(tlv, Self::TLV_TYPE)?;
        check_len(tlv, 1)?;
        let b = tlv.value[0];
        Ok(Self {
            rx_on_when_idle: b & Self::RX_ON_WHEN_IDLE != 0,
            secure_data_requests: b & Self::SECURE_DATA_REQUESTS != 0,
            device_type: b & Self::DEVICE_TYPE != 0,
            network_data: b & Self::NETWORK_DATA != 0,
        })
    }

    fn to_tlv(&self) -> Tlv {
        let mut b = 0u8;
        if self.rx_on_when_idle {
            b |= Self::RX_ON_WHEN_IDLE;
        }
        if self.secure_data_requests {
            b |= Self::SECURE_DATA_REQUESTS;
        }
        if self.device_type {
            b |= Self::DEVICE_TYPE;
        }
        if self.network_data {
            b |= Self::NETWORK_DATA;
        }
        Tlv::new(Self::TLV_TYPE, vec![b])
    }
}

/// Timeout TLV: child timeout in seconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeoutTlv(pub u32);

impl StructuredTlv for TimeoutTlv {
    const TLV_TYPE: TlvType = TlvType::Timeout;

    fn from_tlv(tlv: &Tlv) -> Result<Self, TlvError> {
        check_type(tlv, Self::TLV_TYPE)?;
        check_len(tlv, 4)?;
        Ok(Self(u32::from_be_bytes([
            tlv.value[0],
            tlv.value[1],
            tlv.value[2],
            tlv.value[3],
        ])))
    }

    fn to_tlv(&self) -> Tlv {
        Tlv::new(Self::TLV_TYPE, self.0.to_be_bytes().to_vec())
    }
}

/// Version TLV: protocol version of the sender.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VersionTlv(pub u16);

impl StructuredTlv for VersionTlv {
    const TLV_TYPE: TlvType = TlvType::Version;

    fn from_tlv(tlv: &Tlv) -> Result<Self, TlvError> {
        check_type(tlv, Self::TLV_TYPE)?;
        check_len(tlv, 2)?;
        Ok(Self(u16::from_be_bytes([tlv.value[0], tlv.value[1]])))
    }

    fn to_tlv(&self) -> Tlv {
        Tlv::new(Self::TLV_TYPE, self.0.to_be_bytes().to_vec())
    }
}

// ============================================================================
// Challenge / Response
// ============================================================================

/// Challenge TLV: random nonce the peer must echo back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChallengeTlv(pub Vec<u8>);

impl ChallengeTlv {
    /// Generate a fresh 8-byte challenge nonce.
    pub fn random() -> Self {
        use rand::Rng;
        let mut nonce = [0u8; 8];
        rand::thread_rng().fill(&mut nonce);
        Self(nonce.to_vec())
    }
}

impl StructuredTlv for ChallengeTlv {
    const TLV_TYPE: TlvType = TlvType::Challenge;

    fn from_tlv(tlv: &Tlv) -> Result<Self, TlvError> {
        check_type(tlv, Self::TLV_TYPE)?;
        check_len_range(tlv, 4, 8)?;
        Ok(Self(tlv.value.clone()))
    }

    fn to_tlv(&self) -> Tlv {
        Tlv::new(Self::TLV_TYPE, self.0.clone())
    }
}

/// Response TLV: echo of a previously received challenge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseTlv(pub Vec<u8>);

impl StructuredTlv for ResponseTlv {
    const TLV_TYPE: TlvType = TlvType::Response;

    fn from_tlv(tlv: &Tlv) -> Result<Self, TlvError> {
        check_type(tlv, Self::TLV_TYPE)?;
        check_len_range(tlv, 4, 8)?;
        Ok(Self(tlv.value.clone()))
    }

    fn to_tlv(&self) -> Tlv {
        Tlv::new(Self::TLV_TYPE, self.0.clone())
    }
}

// ============================================================================
// Topology TLVs
// ============================================================================

/// Route64 TLV: the sender's routing table view.
///
/// Wire format:
/// ```text
/// [id_sequence:1][router_mask:8][route_data: one byte per assigned router]
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Route64Tlv {
    /// Router ID set sequence number.
    pub id_sequence: u8,
    /// Bitmask of assigned router IDs (64 bits, MSB first).
    pub router_mask: [u8; 8],
    /// Link quality / route cost byte per assigned router.
    pub route_data: Vec<u8>,
}

impl Route64Tlv {
    /// Build a routing view containing only the given router IDs, each
    /// with direct-link quality.
    pub fn with_routers(id_sequence: u8, router_ids: &[u8]) -> Self {
        let mut router_mask = [0u8; 8];
        for &id in router_ids {
            router_mask[(id / 8) as usize] |= 0x80 >> (id % 8);
        }
        Self {
            id_sequence,
            router_mask,
            route_data: vec![0x01; router_ids.len()],
        }
    }
}

impl StructuredTlv for Route64Tlv {
    const TLV_TYPE: TlvType = TlvType::Route64;

    fn from_tlv(tlv: &Tlv) -> Result<Self, TlvError> {
        check_type(tlv, Self::TLV_TYPE)?;
        if tlv.value.len() < 9 {
            return Err(TlvError::InvalidPayload {
                tlv_type: tlv.tlv_type,
                reason: format!("expected at least 9 bytes, got {}", tlv.value.len()),
            });
        }
        let mut router_mask = [0u8; 8];
        router_mask.copy_from_slice(&tlv.value[1..9]);
        Ok(Self {
            id_sequence: tlv.value[0],
            router_mask,
            route_data: tlv.value[9..].to_vec(),
        })
    }

    fn to_tlv(&self) -> Tlv {
        let mut value = Vec::with_capacity(9 + self.route_data.len());
        value.push(self.id_sequence);
        value.extend_from_slice(&self.router_mask);
        value.extend_from_slice(&self.route_data);
        Tlv::new(Self::TLV_TYPE, value)
    }
}

/// Leader Data TLV: the sender's view of the network partition.
///
/// Wire format (8 bytes):
/// ```text
/// [partition_id:4][weighting:1][data_version:1][stable_data_version:1][leader_router_id:1]
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LeaderDataTlv {
    pub partition_id: u32,
    pub weighting: u8,
    pub data_version: u8,
    pub stable_data_version: u8,
    pub leader_router_id: u8,
}

impl StructuredTlv for LeaderDataTlv {
    const TLV_TYPE: TlvType = TlvType::LeaderData;

    fn from_tlv(tlv: &Tlv) -> Result<Self, TlvError> {
        check_type(tlv, Self::TLV_TYPE)?;
        check_len(tlv, 8)?;
        Ok(Self {
            partition_id: u32::from_be_bytes([
                tlv.value[0],
                tlv.value[1],
                tlv.value[2],
                tlv.value[3],
            ]),
            weighting: tlv.value[4],
            data_version: tlv.value[5],
            stable_data_version: tlv.value[6],
            leader_router_id: tlv.value[7],
        })
    }

    fn to_tlv(&self) -> Tlv {
        let mut value = Vec::with_capacity(8);
        value.extend_from_slice(&self.partition_id.to_be_bytes());
        value.push(self.weighting);
        value.push(self.data_version);
        value.push(self.stable_data_version);
        value.push(self.leader_router_id);
        Tlv::new(Self::TLV_TYPE, value)
    }
}

/// Network Data TLV: opaque network data blob.
///
/// The harness treats the contents as opaque; attach conformance only
/// checks its presence.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NetworkDataTlv(pub Vec<u8>);

impl StructuredTlv for NetworkDataTlv {
    const TLV_TYPE: TlvType = TlvType::NetworkData;

    fn from_tlv(tlv: &Tlv) -> Result<Self, TlvError> {
        check_type(tlv, Self::TLV_TYPE)?;
        Ok(Self(tlv.value.clone()))
    }

    fn to_tlv(&self) -> Tlv {
        Tlv::new(Self::TLV_TYPE, self.0.clone())
    }
}

/// Connectivity TLV: the sender's capacity as a parent.
///
/// Wire format (10 bytes):
/// ```text
/// [parent_priority:1][lq3:1][lq2:1][lq1:1][leader_cost:1][id_sequence:1]
/// [active_routers:1][sed_buffer_size:2][sed_datagram_count:1]
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectivityTlv {
    pub parent_priority: i8,
    pub link_quality_3: u8,
    pub link_quality_2: u8,
    pub link_quality_1: u8,
    pub leader_cost: u8,
    pub id_sequence: u8,
    pub active_routers: u8,
    pub sed_buffer_size: u16,
    pub sed_datagram_count: u8,
}

impl StructuredTlv for ConnectivityTlv {
    const TLV_TYPE: TlvType = TlvType::Connectivity;

    fn from_tlv(tlv: &Tlv) -> Result<Self, TlvError> {
        check_type(tlv, Self::TLV_TYPE)?;
        check_len(tlv, 10)?;
        Ok(Self {
            parent_priority: tlv.value[0] as i8,
            link_quality_3: tlv.value[1],
            link_quality_2: tlv.value[2],
            link_quality_1: tlv.value[3],
            leader_cost: tlv.value[4],
            id_sequence: tlv.value[5],
            active_routers: tlv.value[6],
            sed_buffer_size: u16::from_be_bytes([tlv.value[7], tlv.value[8]]),
            sed_datagram_count: tlv.value[9],
        })
    }

    fn to_tlv(&self) -> Tlv {
        let mut value = Vec::with_capacity(10);
        value.push(self.parent_priority as u8);
        value.push(self.link_quality_3);
        value.push(self.link_quality_2);
        value.push(self.link_quality_1);
        value.push(self.leader_cost);
        value.push(self.id_sequence);
        value.push(self.active_routers);
        value.extend_from_slice(&self.sed_buffer_size.to_be_bytes());
        value.push(self.sed_datagram_count);
        Tlv::new(Self::TLV_TYPE, value)
    }
}

// ============================================================================
// Request / Mask / Quality TLVs
// ============================================================================

/// TLV Request TLV: the set of TLV types the peer should include in its
/// reply.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TlvRequestTlv(pub Vec<TlvType>);

impl TlvRequestTlv {
    /// True if the request names the given type.
    pub fn contains(&self, tlv_type: TlvType) -> bool {
        self.0.contains(&tlv_type)
    }
}

impl StructuredTlv for TlvRequestTlv {
    const TLV_TYPE: TlvType = TlvType::TlvRequest;

    fn from_tlv(tlv: &Tlv) -> Result<Self, TlvError> {
        check_type(tlv, Self::TLV_TYPE)?;
        Ok(Self(tlv.value.iter().map(|&b| TlvType::from_byte(b)).collect()))
    }

    fn to_tlv(&self) -> Tlv {
        Tlv::new(
            Self::TLV_TYPE,
            self.0.iter().map(|t| t.to_byte()).collect(),
        )
    }
}

/// Scan Mask TLV: which device classes a parent request addresses.
///
/// Wire format (1 byte): router flag in bit 7, end-device flag in bit 6.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScanMaskTlv {
    pub router: bool,
    pub end_device: bool,
}

impl ScanMaskTlv {
    const ROUTER: u8 = 0x80;
    const END_DEVICE: u8 = 0x40;
}

impl StructuredTlv for ScanMaskTlv {
    const TLV_TYPE: TlvType = TlvType::ScanMask;

    fn from_tlv(tlv: &Tlv) -> Result<Self, TlvError> {
        check_type(tlv, Self::TLV_TYPE)?;
        check_len(tlv, 1)?;
        Ok(Self {
            router: tlv.value[0] & Self::ROUTER != 0,
            end_device: tlv.value[0] & Self::END_DEVICE != 0,
        })
    }

    fn to_tlv(&self) -> Tlv {
        let mut b = 0u8;
        if self.router {
            b |= Self::ROUTER;
        }
        if self.end_device {
            b |= Self::END_DEVICE;
        }
        Tlv::new(Self::TLV_TYPE, vec![b])
    }
}

/// Link Margin TLV: received signal margin in dB.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinkMarginTlv(pub u8);

impl StructuredTlv for LinkMarginTlv {
    const TLV_TYPE: TlvType = TlvType::LinkMargin;

    fn from_tlv(tlv: &Tlv) -> Result<Self, TlvError> {
        check_type(tlv, Self::TLV_TYPE)?;
        check_len(tlv, 1)?;
        Ok(Self(tlv.value[0]))
    }

    fn to_tlv(&self) -> Tlv {
        Tlv::new(Self::TLV_TYPE, vec![self.0])
    }
}

/// Status TLV.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusTlv(pub u8);

impl StructuredTlv for StatusTlv {
    const TLV_TYPE: TlvType = TlvType::Status;

    fn from_tlv(tlv: &Tlv) -> Result<Self, TlvError> {
        check_type(tlv, Self::TLV_TYPE)?;
        check_len(tlv, 1)?;
        Ok(Self(tlv.value[0]))
    }

    fn to_tlv(&self) -> Tlv {
        Tlv::new(Self::TLV_TYPE, vec![self.0])
    }
}

// ============================================================================
// Address Registration
// ============================================================================

/// One registered address inside an Address Registration TLV.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegisteredAddress {
    /// Full 16-byte IPv6 address (control byte 0x00).
    Full(Ipv6Addr),
    /// Context-compressed entry: 4-bit context ID plus 8-byte IID.
    Compressed { context_id: u8, iid: [u8; 8] },
}

/// Address Registration TLV: addresses an end device registers with its
/// parent. Router-capable devices never send this during attach.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AddressRegistrationTlv {
    pub entries: Vec<RegisteredAddress>,
}

impl StructuredTlv for AddressRegistrationTlv {
    const TLV_TYPE: TlvType = TlvType::AddressRegistration;

    fn from_tlv(tlv: &Tlv) -> Result<Self, TlvError> {
        check_type(tlv, Self::TLV_TYPE)?;
        let mut entries = Vec::new();
        let mut buf = &tlv.value[..];
        while !buf.is_empty() {
            let control = buf[0];
            if control & 0x80 != 0 {
                if buf.len() < 9 {
                    return Err(TlvError::InvalidPayload {
                        tlv_type: tlv.tlv_type,
                        reason: format!("compressed entry needs 9 bytes, got {}", buf.len()),
                    });
                }
                let mut iid = [0u8; 8];
                iid.copy_from_slice(&buf[1..9]);
                entries.push(RegisteredAddress::Compressed {
                    context_id: control & 0x0f,
                    iid,
                });
                buf = &buf[9..];
            } else {
                if buf.len() < 17 {
                    return Err(TlvError::InvalidPayload {
                        tlv_type: tlv.tlv_type,
                        reason: format!("full entry needs 17 bytes, got {}", buf.len()),
                    });
                }
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&buf[1..17]);
                entries.push(RegisteredAddress::Full(Ipv6Addr::from(octets)));
                buf = &buf[17..];
            }
        }
        Ok(Self { entries })
    }

    fn to_tlv(&self) -> Tlv {
        let mut value = Vec::new();
        for entry in &self.entries {
            match entry {
                RegisteredAddress::Full(addr) => {
                    value.push(0x00);
                    value.extend_from_slice(&addr.octets());
                }
                RegisteredAddress::Compressed { context_id, iid } => {
                    value.push(0x80 | (context_id & 0x0f));
                    value.extend_from_slice(iid);
                }
            }
        }
        Tlv::new(Self::TLV_TYPE, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_address_roundtrip() {
        let tlv = SourceAddressTlv(ShortAddr::from_u16(0x4400)).to_tlv();
        assert_eq!(tlv.value, vec![0x44, 0x00]);
        let back = SourceAddressTlv::from_tlv(&tlv).unwrap();
        assert_eq!(back.0.as_u16(), 0x4400);
    }

    #[test]
    fn test_source_address_bad_length() {
        let tlv = Tlv::new(TlvType::SourceAddress, vec![0x44]);
        assert!(matches!(
            SourceAddressTlv::from_tlv(&tlv),
            Err(TlvError::InvalidPayload { .. })
        ));
    }

    #[test]
    fn test_structured_wrong_type() {
        let tlv = Tlv::new(TlvType::Mode, vec![0x0f]);
        assert!(matches!(
            SourceAddressTlv::from_tlv(&tlv),
            Err(TlvError::WrongType { .. })
        ));
    }

    #[test]
    fn test_mode_flags() {
        let mode = ModeTlv::from_flags("rsdn");
        assert!(mode.rx_on_when_idle);
        assert!(mode.secure_data_requests);
        assert!(mode.device_type);
        assert!(mode.network_data);

        let tlv = mode.to_tlv();
        assert_eq!(tlv.value, vec![0x0f]);
        assert_eq!(ModeTlv::from_tlv(&tlv).unwrap(), mode);

        let sed = ModeTlv::from_flags("s");
        assert_eq!(sed.to_tlv().value, vec![0x04]);
    }

    #[test]
    fn test_scan_mask_bits() {
        let mask = ScanMaskTlv {
            router: true,
            end_device: false,
        };
        let tlv = mask.to_tlv();
        assert_eq!(tlv.value, vec![0x80]);
        assert_eq!(ScanMaskTlv::from_tlv(&tlv).unwrap(), mask);

        let both = ScanMaskTlv {
            router: true,
            end_device: true,
        };
        assert_eq!(both.to_tlv().value, vec![0xc0]);
    }

    #[test]
    fn test_challenge_random_length() {
        let c = ChallengeTlv::random();
        assert_eq!(c.0.len(), 8);
        let tlv = c.to_tlv();
        assert_eq!(ChallengeTlv::from_tlv(&tlv).unwrap(), c);
    }

    #[test]
    fn test_challenge_length_bounds() {
        assert!(ChallengeTlv::from_tlv(&Tlv::new(TlvType::Challenge, vec![1, 2, 3])).is_err());
        assert!(ChallengeTlv::from_tlv(&Tlv::new(TlvType::Challenge, vec![0; 9])).is_err());
        assert!(ChallengeTlv::from_tlv(&Tlv::new(TlvType::Challenge, vec![0; 4])).is_ok());
    }

    #[test]
    fn test_route64_with_routers() {
        let route = Route64Tlv::with_routers(1, &[17]);
        // router 17 -> byte 2, bit 0x40
        assert_eq!(route.router_mask[2], 0x40);
        assert_eq!(route.route_data.len(), 1);

        let tlv = route.to_tlv();
        assert_eq!(Route64Tlv::from_tlv(&tlv).unwrap(), route);
    }

    #[test]
    fn test_route64_too_short() {
        let tlv = Tlv::new(TlvType::Route64, vec![0; 8]);
        assert!(matches!(
            Route64Tlv::from_tlv(&tlv),
            Err(TlvError::InvalidPayload { .. })
        ));
    }

    #[test]
    fn test_leader_data_roundtrip() {
        let ld = LeaderDataTlv {
            partition_id: 0xdeadbeef,
            weighting: 64,
            data_version: 3,
            stable_data_version: 2,
            leader_router_id: 17,
        };
        let tlv = ld.to_tlv();
        assert_eq!(tlv.value.len(), 8);
        assert_eq!(LeaderDataTlv::from_tlv(&tlv).unwrap(), ld);
    }

    #[test]
    fn test_connectivity_roundtrip() {
        let conn = ConnectivityTlv {
            parent_priority: -1,
            link_quality_3: 1,
            link_quality_2: 0,
            link_quality_1: 0,
            leader_cost: 0,
            id_sequence: 1,
            active_routers: 1,
            sed_buffer_size: 1280,
            sed_datagram_count: 1,
        };
        let tlv = conn.to_tlv();
        assert_eq!(tlv.value.len(), 10);
        assert_eq!(ConnectivityTlv::from_tlv(&tlv).unwrap(), conn);
    }

    #[test]
    fn test_tlv_request_contains() {
        let req = TlvRequestTlv(vec![TlvType::LinkMargin, TlvType::Route64]);
        let tlv = req.to_tlv();
        assert_eq!(tlv.value, vec![16, 9]);

        let back = TlvRequestTlv::from_tlv(&tlv).unwrap();
        assert!(back.contains(TlvType::LinkMargin));
        assert!(!back.contains(TlvType::Address16));
    }

    #[test]
    fn test_address_registration_roundtrip() {
        let reg = AddressRegistrationTlv {
            entries: vec![
                RegisteredAddress::Compressed {
                    context_id: 0,
                    iid: [1, 2, 3, 4, 5, 6, 7, 8],
                },
                RegisteredAddress::Full("fe80::1".parse().unwrap()),
            ],
        };
        let tlv = reg.to_tlv();
        assert_eq!(AddressRegistrationTlv::from_tlv(&tlv).unwrap(), reg);
    }

    #[test]
    fn test_address_registration_truncated_entry() {
        let tlv = Tlv::new(TlvType::AddressRegistration, vec![0x80, 1, 2, 3]);
        assert!(matches!(
            AddressRegistrationTlv::from_tlv(&tlv),
            Err(TlvError::InvalidPayload { .. })
        ));
    }

    #[test]
    fn test_version_roundtrip() {
        let v = VersionTlv(2);
        let tlv = v.to_tlv();
        assert_eq!(tlv.value, vec![0x00, 0x02]);
        assert_eq!(VersionTlv::from_tlv(&tlv).unwrap(), v);
    }
}
