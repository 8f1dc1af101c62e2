//! Media seams for the Vrlobby headset client.
//!
//! This crate defines the boundary between the streaming pipeline and the
//! rendering engine: the render target the camera draws into, the video
//! encoder that turns captured frames into H.264 access units, and the
//! outbound stream counters the stats watchdog samples.

pub mod codec;
pub mod source;
pub mod stats;

pub use codec::{CodecError, EncodedFrame, VideoEncoder};
pub use source::{RenderTarget, SourceError, TestPatternTarget, VideoFrame};
pub use stats::{OutboundStatsSample, StreamStats};
