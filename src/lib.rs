//! mlecert: conformance harness for MLE attach sequences.
//!
//! Drives simulated mesh devices through the attach handshake of a
//! Mesh Link Establishment (MLE) network and checks the byte-level
//! protocol messages they exchange against the normative sequence.
//!
//! The crate has three layers:
//!
//! - **Codec**: [`tlv`] and [`mle`] decode and encode TLV-structured
//!   protocol messages with their transport metadata.
//! - **Capture**: [`capture`] ingests frames off the simulated medium,
//!   classifies them, and indexes decoded messages by sender; [`matcher`]
//!   exposes per-sender ordered cursors with content assertions.
//! - **Simulation**: [`sim`] provides the shared medium and a device
//!   controller with just enough protocol behavior to drive an attach
//!   exchange end to end.

pub mod addr;
pub mod capture;
pub mod config;
pub mod matcher;
pub mod mle;
pub mod sim;
pub mod tlv;

// Re-export addressing types
pub use addr::{
    random_mesh_local_eid, DeviceId, ExtAddr, PanId, ShortAddr, ALL_NODES_MULTICAST,
    ALL_ROUTERS_MULTICAST, MESH_LOCAL_PREFIX,
};

// Re-export config types
pub use config::{ConfigError, HarnessConfig};

// Re-export codec types
pub use tlv::{
    Address16Tlv, AddressRegistrationTlv, ChallengeTlv, ConnectivityTlv, LeaderDataTlv,
    LinkFrameCounterTlv, LinkMarginTlv, MleFrameCounterTlv, ModeTlv, NetworkDataTlv,
    RegisteredAddress, ResponseTlv, Route64Tlv, ScanMaskTlv, SourceAddressTlv, StatusTlv,
    StructuredTlv, TimeoutTlv, Tlv, TlvError, TlvRequestTlv, TlvType, VersionTlv,
};
pub use mle::{catalog, CommandType, MessageMeta, MleError, MleMessage};

// Re-export capture and matcher types
pub use capture::{CaptureEntry, CaptureError, CaptureStore, Sniffer, SnifferError};
pub use matcher::{AssertionError, MatchError, MessageAssertions, MessageStream};

// Re-export simulation types
pub use sim::{Device, DeviceError, Medium, MediumError, RadioFrame, Role};
