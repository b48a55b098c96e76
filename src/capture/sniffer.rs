//! Passive sniffer: a background task feeding a capture store.

use super::{CaptureError, CaptureStore};
use crate::addr::DeviceId;
use crate::config::HarnessConfig;
use crate::matcher::MessageStream;
use crate::sim::medium::{Medium, MediumError};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Errors related to sniffer lifecycle.
#[derive(Debug, Error)]
pub enum SnifferError {
    #[error("medium error: {0}")]
    Medium(#[from] MediumError),

    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),
}

/// A passive capture point observing all frames on a medium.
///
/// Owns its capture store; nothing here is process-global, so multiple
/// independent sniffers (on separate mediums) can coexist in one test
/// process.
pub struct Sniffer {
    medium: Arc<Medium>,
    store: CaptureStore,
    task: Option<JoinHandle<()>>,
}

impl Sniffer {
    /// Create a sniffer for the given medium.
    pub fn new(medium: Arc<Medium>, config: &HarnessConfig) -> Self {
        Self {
            medium,
            store: CaptureStore::with_match_timeout(config.match_timeout()),
            task: None,
        }
    }

    /// Start capturing: takes the medium's sniffer tap and spawns the
    /// ingest task.
    pub fn start(&mut self) -> Result<(), SnifferError> {
        if self.task.is_some() {
            return Err(SnifferError::Capture(CaptureError::AlreadyStarted));
        }
        let mut tap = self.medium.sniffer_tap()?;
        let store = self.store.clone();
        info!("sniffer started");
        self.task = Some(tokio::spawn(async move {
            while let Some(frame) = tap.recv().await {
                if store.ingest(&frame).is_err() {
                    break;
                }
            }
            debug!("sniffer ingest task finished");
        }));
        Ok(())
    }

    /// Stop capturing. The store is closed; waiting cursors observe the
    /// end of the stream instead of hanging.
    pub fn stop(&mut self) {
        self.store.close();
        if let Some(task) = self.task.take() {
            task.abort();
            info!(captured = self.store.len(), "sniffer stopped");
        }
    }

    /// A live cursor over messages captured from one sender.
    pub fn messages_sent_by(&self, sender: DeviceId) -> Result<MessageStream, SnifferError> {
        if self.task.is_none() {
            return Err(SnifferError::Capture(CaptureError::NotStarted));
        }
        Ok(self.store.messages_sent_by(sender))
    }

    /// The underlying capture store.
    pub fn store(&self) -> &CaptureStore {
        &self.store
    }
}

impl Drop for Sniffer {
    fn drop(&mut self) {
        self.store.close();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr::{ExtAddr, PanId};
    use crate::mle::{CommandType, MleMessage};
    use crate::sim::frame::{build_frame, FrameKind};
    use crate::tlv::{StructuredTlv, VersionTlv};
    use std::time::Duration;

    #[tokio::test]
    async fn test_sniffer_captures_transmitted_frames() {
        let medium = Arc::new(Medium::new(16));
        let config = HarnessConfig::default();
        let mut sniffer = Sniffer::new(Arc::clone(&medium), &config);
        sniffer.start().unwrap();

        let sender = DeviceId::new(1);
        let payload =
            MleMessage::encode_payload(CommandType::Advertisement, &[VersionTlv(2).to_tlv()])
                .unwrap();
        let data = build_frame(
            FrameKind::Mle,
            PanId::new(0xface),
            ExtAddr::from_bytes([2, 0, 0, 0, 0, 0, 0, 1]),
            "fe80::1".parse().unwrap(),
            "ff02::1".parse().unwrap(),
            255,
            &payload,
        );
        medium.transmit(sender, data).await;

        let mut stream = sniffer
            .messages_sent_by(sender)
            .unwrap()
            .with_timeout(Duration::from_secs(1));
        let msg = stream
            .next_mle_message(CommandType::Advertisement)
            .await
            .unwrap();
        assert_eq!(msg.command, CommandType::Advertisement);

        sniffer.stop();
    }

    #[tokio::test]
    async fn test_messages_sent_by_before_start_fails() {
        let medium = Arc::new(Medium::new(16));
        let sniffer = Sniffer::new(medium, &HarnessConfig::default());
        assert!(matches!(
            sniffer.messages_sent_by(DeviceId::new(1)),
            Err(SnifferError::Capture(CaptureError::NotStarted))
        ));
    }

    #[tokio::test]
    async fn test_double_start_fails() {
        let medium = Arc::new(Medium::new(16));
        let mut sniffer = Sniffer::new(medium, &HarnessConfig::default());
        sniffer.start().unwrap();
        assert!(matches!(
            sniffer.start(),
            Err(SnifferError::Capture(CaptureError::AlreadyStarted))
        ));
        sniffer.stop();
    }
}
