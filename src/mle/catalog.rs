//! Per-command TLV requirement table.
//!
//! For each MLE command this table lists the TLV types a conforming
//! message must carry and those it may carry. The decoder does not
//! consult it; conformance checks call [`mandatory_tlvs`] /
//! [`optional_tlvs`] and assert through the matcher, so a wrong or
//! missing TLV surfaces as a test failure rather than a parse error.

use super::CommandType;
use crate::tlv::TlvType;

use TlvType::*;

/// TLV types a conforming message of the given command must carry.
pub fn mandatory_tlvs(command: CommandType) -> &'static [TlvType] {
    match command {
        CommandType::LinkRequest => &[SourceAddress, LeaderData, Challenge, Version, TlvRequest],
        CommandType::LinkAccept | CommandType::LinkAcceptAndRequest => &[
            SourceAddress,
            LeaderData,
            Response,
            LinkLayerFrameCounter,
            Version,
            LinkMargin,
        ],
        CommandType::LinkReject => &[Status],
        CommandType::Advertisement => &[SourceAddress, LeaderData, Route64],
        CommandType::DataRequest => &[TlvRequest],
        CommandType::DataResponse => &[SourceAddress, LeaderData],
        CommandType::ParentRequest => &[Mode, Challenge, ScanMask, Version],
        CommandType::ParentResponse => &[
            SourceAddress,
            LeaderData,
            LinkLayerFrameCounter,
            Response,
            Challenge,
            LinkMargin,
            Connectivity,
            Version,
        ],
        CommandType::ChildIdRequest => &[
            Response,
            LinkLayerFrameCounter,
            Mode,
            Timeout,
            Version,
            TlvRequest,
        ],
        CommandType::ChildIdResponse => &[SourceAddress, LeaderData, Address16],
        CommandType::ChildUpdateRequest => &[Mode],
        CommandType::ChildUpdateResponse => &[SourceAddress, Mode],
        CommandType::Announce => &[Channel, PanId, ActiveTimestamp],
        CommandType::DiscoveryRequest | CommandType::DiscoveryResponse => &[Discovery],
        CommandType::Update | CommandType::UpdateRequest => &[],
    }
}

/// TLV types a conforming message of the given command may carry.
pub fn optional_tlvs(command: CommandType) -> &'static [TlvType] {
    match command {
        CommandType::LinkRequest => &[],
        CommandType::LinkAccept | CommandType::LinkAcceptAndRequest => {
            &[MleFrameCounter, Challenge, Route64, LinkQuality]
        }
        CommandType::Advertisement => &[],
        CommandType::DataResponse => &[NetworkData, ActiveDataset, PendingDataset],
        CommandType::ParentRequest => &[],
        CommandType::ParentResponse => &[MleFrameCounter],
        // AddressRegistration is allowed for end devices; router-capable
        // devices omit it and conformance tests assert its absence.
        CommandType::ChildIdRequest => &[MleFrameCounter, AddressRegistration, ActiveTimestamp],
        CommandType::ChildIdResponse => &[
            NetworkData,
            Route64,
            AddressRegistration,
            ActiveDataset,
            PendingDataset,
        ],
        CommandType::ChildUpdateRequest => &[Challenge, Timeout, AddressRegistration],
        CommandType::ChildUpdateResponse => &[Response, Timeout, AddressRegistration],
        _ => &[],
    }
}
