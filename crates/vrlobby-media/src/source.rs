use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("render target backing resource is not allocated")]
    NotCreated,

    #[error("capture source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("frame capture failed: {0}")]
    Capture(String),
}

/// One captured frame, tightly packed RGB.
#[derive(Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>, // RGB data
}

/// The off-screen target the capture camera renders into.
///
/// The rendering engine owns the target and re-renders it every frame; the
/// streaming side only reads. Track creation requires the backing resource to
/// be allocated and at least one render pass to have completed, so the first
/// captured frame is real picture data rather than uninitialized memory.
pub trait RenderTarget: Send + Sync {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    /// Whether the backing GPU resource has been allocated.
    fn is_created(&self) -> bool;

    /// Force allocation of the backing resource if the engine has not done it
    /// lazily yet.
    fn ensure_created(&self) -> Result<(), SourceError>;

    /// Number of completed render passes into this target.
    fn render_pass_count(&self) -> u64;

    /// Ask the engine to render one frame into the target now.
    fn trigger_render(&self) -> Result<(), SourceError>;

    /// Copy out the most recently rendered frame.
    fn capture_frame(&self) -> Result<VideoFrame, SourceError>;
}

/// Built-in render target producing a moving test pattern.
///
/// Engine-less builds stream this instead of a camera view; a real
/// deployment binds the engine's render target. Like an engine target, the
/// backing allocation happens lazily on the first render pass.
pub struct TestPatternTarget {
    width: u32,
    height: u32,
    created: AtomicBool,
    render_passes: AtomicU64,
}

impl TestPatternTarget {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            created: AtomicBool::new(false),
            render_passes: AtomicU64::new(0),
        }
    }
}

impl RenderTarget for TestPatternTarget {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn is_created(&self) -> bool {
        self.created.load(Ordering::SeqCst)
    }

    fn ensure_created(&self) -> Result<(), SourceError> {
        self.created.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn render_pass_count(&self) -> u64 {
        self.render_passes.load(Ordering::SeqCst)
    }

    fn trigger_render(&self) -> Result<(), SourceError> {
        self.created.store(true, Ordering::SeqCst);
        self.render_passes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn capture_frame(&self) -> Result<VideoFrame, SourceError> {
        if !self.is_created() {
            return Err(SourceError::NotCreated);
        }
        let shift = self.render_passes.load(Ordering::SeqCst) as u32;
        let mut data = Vec::with_capacity((self.width * self.height * 3) as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                data.push(((x + shift) % 256) as u8);
                data.push((y % 256) as u8);
                data.push(((x + y + 2 * shift) % 256) as u8);
            }
        }
        Ok(VideoFrame {
            width: self.width,
            height: self.height,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_requires_a_render_pass() {
        let target = TestPatternTarget::new(64, 32);
        assert!(!target.is_created());
        assert!(matches!(
            target.capture_frame(),
            Err(SourceError::NotCreated)
        ));

        target.trigger_render().unwrap();
        assert!(target.is_created());
        assert_eq!(target.render_pass_count(), 1);

        let frame = target.capture_frame().unwrap();
        assert_eq!(frame.data.len(), 64 * 32 * 3);
    }

    #[test]
    fn pattern_moves_between_render_passes() {
        let target = TestPatternTarget::new(8, 8);
        target.trigger_render().unwrap();
        let first = target.capture_frame().unwrap();
        target.trigger_render().unwrap();
        let second = target.capture_frame().unwrap();
        assert_ne!(first.data, second.data);
    }
}
