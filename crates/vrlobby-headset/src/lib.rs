//! Vrlobby headset client library
//!
//! This crate provides the core functionality for the Vrlobby headset client:
//! hub signaling, the WebRTC live-feed pipeline, the session coordinator, and
//! the remote-commanded media playback pipeline.

pub mod device;
pub mod media;
pub mod network;
pub mod session;
pub mod state;
