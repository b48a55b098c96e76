//! Capture store: ingest, classify, and index sniffed frames.
//!
//! The store is an append-only log of decoded protocol messages in
//! arrival order. One writer (the sniffer's ingest task) appends;
//! any number of matcher cursors read concurrently without blocking it.
//!
//! Classification on ingest:
//! - frames that are not MLE traffic (echo probes, unknown kinds,
//!   unparseable headers) are dropped silently as out-of-protocol noise;
//! - MLE-tagged frames that fail to decode are retained as error-marked
//!   entries so a test can observe that a malformed message was sent;
//! - well-formed MLE frames become [`MleMessage`] entries indexed by
//!   sender.

mod sniffer;

pub use sniffer::{Sniffer, SnifferError};

use crate::addr::DeviceId;
use crate::matcher::MessageStream;
use crate::mle::{MessageMeta, MleMessage};
use crate::sim::frame::{frame_payload, FrameHeader, FrameKind, RadioFrame};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Default matcher wait when a store is used without explicit config.
pub const DEFAULT_MATCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors related to capture store misuse.
///
/// Malformed input is never an error here; only lifecycle misuse is.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CaptureError {
    #[error("capture not started")]
    NotStarted,

    #[error("capture already started")]
    AlreadyStarted,

    #[error("capture store closed")]
    Closed,
}

/// One entry in the capture log.
#[derive(Clone, Debug)]
pub enum CaptureEntry {
    /// A well-formed MLE message.
    Message(MleMessage),
    /// An MLE-tagged frame that failed to decode. Retained so tests can
    /// assert a malformed frame was (or was not) sent.
    MalformedMle {
        sender: DeviceId,
        error: String,
        raw: Vec<u8>,
    },
}

impl CaptureEntry {
    /// The device that transmitted this entry's frame.
    pub fn sender(&self) -> DeviceId {
        match self {
            CaptureEntry::Message(msg) => msg.sender,
            CaptureEntry::MalformedMle { sender, .. } => *sender,
        }
    }
}

/// Shared log state: the entry vector, arrival signal, and lifecycle.
pub(crate) struct CaptureLog {
    pub(crate) entries: Mutex<Vec<CaptureEntry>>,
    pub(crate) arrival: Notify,
    closed: AtomicBool,
}

impl CaptureLog {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Append-only log of captured, decoded messages.
///
/// Clones share the same underlying log.
#[derive(Clone)]
pub struct CaptureStore {
    log: Arc<CaptureLog>,
    match_timeout: Duration,
}

impl CaptureStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::with_match_timeout(DEFAULT_MATCH_TIMEOUT)
    }

    /// Create an empty store with a default timeout for its cursors.
    pub fn with_match_timeout(match_timeout: Duration) -> Self {
        Self {
            log: Arc::new(CaptureLog {
                entries: Mutex::new(Vec::new()),
                arrival: Notify::new(),
                closed: AtomicBool::new(false),
            }),
            match_timeout,
        }
    }

    /// Ingest one captured frame.
    ///
    /// Never fails on malformed input; fails only when the store has
    /// been closed.
    pub fn ingest(&self, frame: &RadioFrame) -> Result<(), CaptureError> {
        if self.log.is_closed() {
            return Err(CaptureError::Closed);
        }

        let header = match FrameHeader::parse(&frame.data) {
            Ok(header) => header,
            Err(error) => {
                debug!(sender = %frame.sender, %error, "unparseable frame dropped");
                return Ok(());
            }
        };

        match header.kind() {
            Some(FrameKind::Mle) => {}
            _ => {
                // Echo probes and unknown kinds are not protocol traffic.
                debug!(sender = %frame.sender, kind = header.kind_byte, "non-mle frame dropped");
                return Ok(());
            }
        }

        let meta = MessageMeta {
            src_addr: header.src_addr,
            dst_addr: header.dst_addr,
            hop_limit: header.hop_limit,
            sender: frame.sender,
        };

        let entry = match frame_payload(&frame.data)
            .map_err(|e| e.to_string())
            .and_then(|payload| {
                MleMessage::decode(payload, meta).map_err(|e| e.to_string())
            }) {
            Ok(msg) => {
                debug!(sender = %frame.sender, command = %msg.command, "captured mle message");
                CaptureEntry::Message(msg)
            }
            Err(error) => {
                warn!(sender = %frame.sender, %error, "malformed mle frame retained");
                CaptureEntry::MalformedMle {
                    sender: frame.sender,
                    error,
                    raw: frame.data.clone(),
                }
            }
        };

        self.log
            .entries
            .lock()
            .expect("capture log lock poisoned")
            .push(entry);
        self.log.arrival.notify_waiters();
        Ok(())
    }

    /// Close the store. Subsequent ingests fail; waiting cursors wake
    /// and observe the end of the stream.
    pub fn close(&self) {
        self.log.closed.store(true, Ordering::Release);
        self.log.arrival.notify_waiters();
    }

    /// Number of retained entries (messages plus error-marked frames).
    pub fn len(&self) -> usize {
        self.log.entries.lock().expect("capture log lock poisoned").len()
    }

    /// True if nothing has been retained yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A live, order-preserving cursor over messages from one sender.
    ///
    /// The view is growable: messages ingested after this call are
    /// visible to the cursor.
    pub fn messages_sent_by(&self, sender: DeviceId) -> MessageStream {
        MessageStream::new(Arc::clone(&self.log), sender, self.match_timeout)
    }

    /// Snapshot of all well-formed messages from one sender, in wire
    /// order, as of this call.
    pub fn snapshot_sent_by(&self, sender: DeviceId) -> Vec<MleMessage> {
        self.log
            .entries
            .lock()
            .expect("capture log lock poisoned")
            .iter()
            .filter_map(|entry| match entry {
                CaptureEntry::Message(msg) if msg.sender == sender => Some(msg.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of error-marked entries from one sender.
    pub fn malformed_count_by(&self, sender: DeviceId) -> usize {
        self.log
            .entries
            .lock()
            .expect("capture log lock poisoned")
            .iter()
            .filter(|entry| {
                matches!(entry, CaptureEntry::MalformedMle { sender: s, .. } if *s == sender)
            })
            .count()
    }
}

impl Default for CaptureStore {
    fn default() -> Self {
        Self::new()
    }
}
