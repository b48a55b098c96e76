//! In-process simulation: frames, the shared medium, and devices.

pub mod device;
pub mod frame;
pub mod medium;

pub use device::{Device, DeviceError, Role};
pub use frame::{
    build_frame, frame_payload, EchoPayload, FrameError, FrameHeader, FrameKind, RadioFrame,
    FRAME_HEADER_SIZE,
};
pub use medium::{frame_channel, FrameRx, FrameTx, Medium, MediumError};
