//! Shared protocol definitions for the Vrlobby headset client.
//!
//! Covers the live-feed hub vocabulary (named events with positional JSON
//! arguments), the signaling payload shapes, media command parsing, and the
//! management API DTOs.

pub mod messages;
pub mod types;

pub use messages::{HubFrame, MediaCommand, MediaKind, event};
pub use types::{
    AnswerPayload, HeadsetStatus, IceCandidateRecord, MediaItem, SasUrlResponse, SdpDescriptor,
    SdpKind, VrStartupConfig,
};
