//! Message stream matcher: ordered consumption of captured traffic.
//!
//! A [`MessageStream`] is a per-sender cursor over the capture log.
//! `next_mle_message` encodes the causal-order contract of a protocol
//! exchange: the expected messages must occur in the given relative
//! order per sender, with unrelated traffic allowed in between.
//!
//! The stream is live: if the wanted message has not arrived yet the
//! call waits for new captures, bounded by the stream's timeout, and
//! fails with the commands it skipped so a broken exchange is
//! diagnosable without re-running.

use crate::addr::DeviceId;
use crate::capture::{CaptureEntry, CaptureLog};
use crate::mle::{CommandType, MleMessage};
use crate::sim::device::Device;
use crate::tlv::TlvType;
use std::net::Ipv6Addr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{timeout_at, Instant};
use tracing::debug;

/// Errors raised when an expected message never appears.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error(
        "no {command} message from {sender} within {waited:?} (skipped: {skipped:?})"
    )]
    MessageNotFound {
        sender: DeviceId,
        command: CommandType,
        waited: Duration,
        skipped: Vec<String>,
    },
}

/// Errors raised by content assertions on a matched message.
///
/// Each variant carries expected and actual values plus a rendering of
/// the message (command, addressing, TLV list) for diagnosis.
#[derive(Debug, Error)]
pub enum AssertionError {
    #[error("hop limit mismatch: expected {expected}, got {actual} in {message}")]
    HopLimit {
        expected: u8,
        actual: u8,
        message: String,
    },

    #[error("destination mismatch: expected {expected}, got {actual} in {message}")]
    Destination {
        expected: Ipv6Addr,
        actual: Ipv6Addr,
        message: String,
    },

    #[error("destination {actual} is none of the device's addresses {candidates:?} in {message}")]
    DestinationNotDevice {
        candidates: Vec<Ipv6Addr>,
        actual: Ipv6Addr,
        message: String,
    },

    #[error("missing {tlv_type} tlv in {message}")]
    MissingTlv { tlv_type: TlvType, message: String },

    #[error("forbidden {tlv_type} tlv present in {message}")]
    ForbiddenTlv { tlv_type: TlvType, message: String },
}

// ============================================================================
// Message Stream
// ============================================================================

/// A monotonically advancing cursor over one sender's captured messages.
pub struct MessageStream {
    log: Arc<CaptureLog>,
    sender: DeviceId,
    cursor: usize,
    timeout: Duration,
}

impl MessageStream {
    pub(crate) fn new(log: Arc<CaptureLog>, sender: DeviceId, timeout: Duration) -> Self {
        Self {
            log,
            sender,
            cursor: 0,
            timeout,
        }
    }

    /// Override the bounded-wait timeout for this stream.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Messages from this stream's sender not yet consumed by the
    /// cursor.
    pub fn remaining(&self) -> usize {
        let entries = self.log.entries.lock().expect("capture log lock poisoned");
        entries[self.cursor.min(entries.len())..]
            .iter()
            .filter(|e| matches!(e, CaptureEntry::Message(m) if m.sender == self.sender))
            .count()
    }

    /// Advance to the next message of the given command type.
    ///
    /// Messages of other command types (and error-marked frames) from
    /// this sender are skipped and become unreachable to this cursor.
    /// If the stream is still live the call waits for new captures up to
    /// the stream's timeout; it fails with [`MatchError::MessageNotFound`]
    /// rather than hanging when the expected traffic never appears.
    pub async fn next_mle_message(
        &mut self,
        command: CommandType,
    ) -> Result<MleMessage, MatchError> {
        let started = Instant::now();
        let deadline = started + self.timeout;
        let mut skipped = Vec::new();

        loop {
            // Register for the arrival signal before scanning so an
            // ingest between scan and wait cannot be missed.
            let log = Arc::clone(&self.log);
            let arrival = log.arrival.notified();

            if let Some(msg) = self.scan(command, &mut skipped) {
                debug!(sender = %self.sender, command = %command, "matched message");
                return Ok(msg);
            }

            if self.log.is_closed() {
                return Err(self.not_found(command, started.elapsed(), skipped));
            }

            if timeout_at(deadline, arrival).await.is_err() {
                return Err(self.not_found(command, started.elapsed(), skipped));
            }
        }
    }

    /// One pass over the unconsumed suffix of the log. Everything
    /// examined is consumed, matching or not.
    fn scan(&mut self, command: CommandType, skipped: &mut Vec<String>) -> Option<MleMessage> {
        let entries = self.log.entries.lock().expect("capture log lock poisoned");
        while self.cursor < entries.len() {
            let entry = &entries[self.cursor];
            self.cursor += 1;
            if entry.sender() != self.sender {
                continue;
            }
            match entry {
                CaptureEntry::Message(msg) if msg.command == command => {
                    return Some(msg.clone());
                }
                CaptureEntry::Message(msg) => {
                    skipped.push(msg.command.to_string());
                }
                CaptureEntry::MalformedMle { error, .. } => {
                    skipped.push(format!("malformed({})", error));
                }
            }
        }
        None
    }

    fn not_found(
        &self,
        command: CommandType,
        waited: Duration,
        skipped: Vec<String>,
    ) -> MatchError {
        MatchError::MessageNotFound {
            sender: self.sender,
            command,
            waited,
            skipped,
        }
    }
}

// ============================================================================
// Content Assertions
// ============================================================================

/// Content assertions on a single matched message.
///
/// These never re-scan the stream; they inspect only the message they
/// are called on.
pub trait MessageAssertions {
    /// Fail unless the message was sent with the given hop limit.
    fn assert_sent_with_hop_limit(&self, hop_limit: u8) -> Result<(), AssertionError>;

    /// Fail unless the message was sent to the given literal address.
    fn assert_sent_to_destination(&self, addr: Ipv6Addr) -> Result<(), AssertionError>;

    /// Fail unless the message was sent to one of the device's current
    /// addresses. Addresses are resolved at assertion time: a device
    /// acquires addresses as it attaches.
    fn assert_sent_to_device(&self, device: &Device) -> Result<(), AssertionError>;

    /// Fail unless a TLV of the given type is present (mandatory TLV).
    fn assert_contains_tlv(&self, tlv_type: TlvType) -> Result<(), AssertionError>;

    /// Record presence of an optional TLV. Absence is not a failure;
    /// this documents the optionality in the test and logs what was
    /// observed.
    fn assert_contains_optional_tlv(&self, tlv_type: TlvType) -> Result<(), AssertionError>;

    /// Fail if a TLV of the given type is present (forbidden TLV).
    fn assert_does_not_contain_tlv(&self, tlv_type: TlvType) -> Result<(), AssertionError>;
}

impl MessageAssertions for MleMessage {
    fn assert_sent_with_hop_limit(&self, hop_limit: u8) -> Result<(), AssertionError> {
        if self.hop_limit != hop_limit {
            return Err(AssertionError::HopLimit {
                expected: hop_limit,
                actual: self.hop_limit,
                message: self.to_string(),
            });
        }
        Ok(())
    }

    fn assert_sent_to_destination(&self, addr: Ipv6Addr) -> Result<(), AssertionError> {
        if self.dst_addr != addr {
            return Err(AssertionError::Destination {
                expected: addr,
                actual: self.dst_addr,
                message: self.to_string(),
            });
        }
        Ok(())
    }

    fn assert_sent_to_device(&self, device: &Device) -> Result<(), AssertionError> {
        let candidates = device.addresses();
        if !candidates.contains(&self.dst_addr) {
            return Err(AssertionError::DestinationNotDevice {
                candidates,
                actual: self.dst_addr,
                message: self.to_string(),
            });
        }
        Ok(())
    }

    fn assert_contains_tlv(&self, tlv_type: TlvType) -> Result<(), AssertionError> {
        if !self.has_tlv(tlv_type) {
            return Err(AssertionError::MissingTlv {
                tlv_type,
                message: self.to_string(),
            });
        }
        Ok(())
    }

    fn assert_contains_optional_tlv(&self, tlv_type: TlvType) -> Result<(), AssertionError> {
        debug!(
            command = %self.command,
            tlv = %tlv_type,
            present = self.has_optional_tlv(tlv_type),
            "optional tlv observed"
        );
        Ok(())
    }

    fn assert_does_not_contain_tlv(&self, tlv_type: TlvType) -> Result<(), AssertionError> {
        if self.has_tlv(tlv_type) {
            return Err(AssertionError::ForbiddenTlv {
                tlv_type,
                message: self.to_string(),
            });
        }
        Ok(())
    }
}
