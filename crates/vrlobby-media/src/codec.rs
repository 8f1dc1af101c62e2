use thiserror::Error;

use crate::source::VideoFrame;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("encoder unavailable: {0}")]
    Unavailable(String),

    #[error("frame rejected: {0}")]
    BadFrame(String),

    #[error("encode failed: {0}")]
    Encode(String),
}

/// One encoded H.264 access unit. An empty `data` means the encoder is still
/// buffering and produced no output for this input frame.
pub struct EncodedFrame {
    pub data: Vec<u8>,
    pub keyframe: bool,
}

impl EncodedFrame {
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Video encoder seam. The concrete implementation is platform/engine
/// specific; the streaming pipeline only needs frame-in, access-unit-out.
pub trait VideoEncoder: Send {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    fn encode(&mut self, frame: &VideoFrame) -> Result<EncodedFrame, CodecError>;

    /// Request an IDR frame as soon as possible, e.g. when the remote viewer
    /// joins mid-stream.
    fn force_keyframe(&mut self);
}
