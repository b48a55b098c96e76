//! Shared radio medium for simulated devices.
//!
//! The medium is a hub: every transmitted frame is delivered to every
//! other attached device and, unconditionally, to the sniffer tap.
//! Receiver-side filtering (PAN ID, whitelist) is the device's job.
//! A passive sniffer sees frames that an addressed device would reject.

use crate::addr::DeviceId;
use crate::sim::frame::RadioFrame;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

/// Channel sender for frames.
pub type FrameTx = tokio::sync::mpsc::Sender<RadioFrame>;

/// Channel receiver for frames.
pub type FrameRx = tokio::sync::mpsc::Receiver<RadioFrame>;

/// Create a frame channel with the given buffer size.
pub fn frame_channel(buffer: usize) -> (FrameTx, FrameRx) {
    tokio::sync::mpsc::channel(buffer)
}

/// Errors related to medium operations.
#[derive(Debug, Error)]
pub enum MediumError {
    #[error("device already attached: {0}")]
    AlreadyAttached(DeviceId),

    #[error("sniffer tap already taken")]
    SnifferTapTaken,
}

#[derive(Default)]
struct MediumInner {
    devices: HashMap<DeviceId, FrameTx>,
    sniffer: Option<FrameTx>,
}

/// The shared medium connecting simulated devices.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct Medium {
    inner: Mutex<MediumInner>,
    buffer: usize,
}

impl Medium {
    /// Create a medium whose taps use the given channel buffer size.
    pub fn new(buffer: usize) -> Self {
        Self {
            inner: Mutex::new(MediumInner::default()),
            buffer,
        }
    }

    /// Attach a device, returning its receive tap.
    pub fn attach(&self, id: DeviceId) -> Result<FrameRx, MediumError> {
        let mut inner = self.inner.lock().expect("medium lock poisoned");
        if inner.devices.contains_key(&id) {
            return Err(MediumError::AlreadyAttached(id));
        }
        let (tx, rx) = frame_channel(self.buffer);
        inner.devices.insert(id, tx);
        debug!(device = %id, "device attached to medium");
        Ok(rx)
    }

    /// Detach a device. Its tap's sender is dropped, closing the channel.
    pub fn detach(&self, id: DeviceId) {
        let mut inner = self.inner.lock().expect("medium lock poisoned");
        if inner.devices.remove(&id).is_some() {
            debug!(device = %id, "device detached from medium");
        }
    }

    /// Take the sniffer tap. Only one sniffer may observe a medium.
    pub fn sniffer_tap(&self) -> Result<FrameRx, MediumError> {
        let mut inner = self.inner.lock().expect("medium lock poisoned");
        if inner.sniffer.is_some() {
            return Err(MediumError::SnifferTapTaken);
        }
        let (tx, rx) = frame_channel(self.buffer);
        inner.sniffer = Some(tx);
        Ok(rx)
    }

    /// Transmit a frame: fan out to every other attached device and the
    /// sniffer.
    ///
    /// A full or closed tap drops the frame for that receiver only;
    /// a slow receiver never stalls the sender.
    pub async fn transmit(&self, sender: DeviceId, data: Vec<u8>) {
        let frame = RadioFrame::new(sender, data);

        // Collect receivers under the lock, send outside it.
        let (taps, sniffer) = {
            let inner = self.inner.lock().expect("medium lock poisoned");
            let taps: Vec<(DeviceId, FrameTx)> = inner
                .devices
                .iter()
                .filter(|(id, _)| **id != sender)
                .map(|(id, tx)| (*id, tx.clone()))
                .collect();
            (taps, inner.sniffer.clone())
        };

        if let Some(tx) = sniffer {
            if tx.send(frame.clone()).await.is_err() {
                debug!(device = %sender, "sniffer tap closed, frame not captured");
            }
        }

        for (id, tx) in taps {
            if tx.try_send(frame.clone()).is_err() {
                debug!(device = %id, "receiver tap full or closed, frame dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr::{ExtAddr, PanId};
    use crate::sim::frame::{build_frame, FrameKind};
    use std::sync::Arc;

    fn test_frame_bytes() -> Vec<u8> {
        build_frame(
            FrameKind::Mle,
            PanId::new(0xface),
            ExtAddr::from_bytes([2, 0, 0, 0, 0, 0, 0, 1]),
            "fe80::1".parse().unwrap(),
            "ff02::1".parse().unwrap(),
            255,
            &[0x04],
        )
    }

    #[tokio::test]
    async fn test_transmit_reaches_other_devices_not_sender() {
        let medium = Arc::new(Medium::new(8));
        let a = DeviceId::new(1);
        let b = DeviceId::new(2);
        let mut rx_a = medium.attach(a).unwrap();
        let mut rx_b = medium.attach(b).unwrap();

        medium.transmit(a, test_frame_bytes()).await;

        let frame = rx_b.recv().await.unwrap();
        assert_eq!(frame.sender, a);
        // Sender does not hear its own transmission.
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_sniffer_sees_all_frames() {
        let medium = Arc::new(Medium::new(8));
        let a = DeviceId::new(1);
        let b = DeviceId::new(2);
        let _rx_a = medium.attach(a).unwrap();
        let _rx_b = medium.attach(b).unwrap();
        let mut sniffer = medium.sniffer_tap().unwrap();

        medium.transmit(a, test_frame_bytes()).await;
        medium.transmit(b, test_frame_bytes()).await;

        assert_eq!(sniffer.recv().await.unwrap().sender, a);
        assert_eq!(sniffer.recv().await.unwrap().sender, b);
    }

    #[tokio::test]
    async fn test_double_attach_rejected() {
        let medium = Medium::new(8);
        let id = DeviceId::new(1);
        let _rx = medium.attach(id).unwrap();
        assert!(matches!(
            medium.attach(id),
            Err(MediumError::AlreadyAttached(_))
        ));
    }

    #[tokio::test]
    async fn test_single_sniffer_tap() {
        let medium = Medium::new(8);
        let _tap = medium.sniffer_tap().unwrap();
        assert!(matches!(
            medium.sniffer_tap(),
            Err(MediumError::SnifferTapTaken)
        ));
    }

    #[tokio::test]
    async fn test_detached_device_stops_receiving() {
        let medium = Arc::new(Medium::new(8));
        let a = DeviceId::new(1);
        let b = DeviceId::new(2);
        let _rx_a = medium.attach(a).unwrap();
        let mut rx_b = medium.attach(b).unwrap();

        medium.detach(b);
        medium.transmit(a, test_frame_bytes()).await;
        // Channel sender side dropped on detach.
        assert!(rx_b.recv().await.is_none());
    }
}
