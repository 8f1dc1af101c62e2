use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Snapshot of the outbound stream counters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutboundStatsSample {
    pub frames_encoded: u64,
    pub key_frames_encoded: u64,
    pub bytes_sent: u64,
    pub frames_per_second: f64,
}

/// Outbound stream counters maintained at the sample-writer seam.
///
/// The WebRTC engine transmits pre-encoded samples, so frame and keyframe
/// counts are only known where the encoder output is written; this keeps them
/// in lock-free counters the watchdog can snapshot from another task.
pub struct StreamStats {
    frames_encoded: AtomicU64,
    key_frames_encoded: AtomicU64,
    bytes_sent: AtomicU64,
    window: Mutex<FpsWindow>,
}

struct FpsWindow {
    anchor: Instant,
    anchor_frames: u64,
    fps: f64,
}

impl StreamStats {
    pub fn new() -> Self {
        Self {
            frames_encoded: AtomicU64::new(0),
            key_frames_encoded: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            window: Mutex::new(FpsWindow {
                anchor: Instant::now(),
                anchor_frames: 0,
                fps: 0.0,
            }),
        }
    }

    /// Record one encoded frame handed to the track.
    pub fn record_frame(&self, bytes: u64, keyframe: bool) {
        let frames = self.frames_encoded.fetch_add(1, Ordering::Relaxed) + 1;
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
        if keyframe {
            self.key_frames_encoded.fetch_add(1, Ordering::Relaxed);
        }

        if let Ok(mut window) = self.window.lock() {
            let elapsed = window.anchor.elapsed();
            if elapsed.as_secs_f64() >= 1.0 {
                window.fps = (frames - window.anchor_frames) as f64 / elapsed.as_secs_f64();
                window.anchor = Instant::now();
                window.anchor_frames = frames;
            }
        }
    }

    pub fn snapshot(&self) -> OutboundStatsSample {
        let fps = self.window.lock().map(|w| w.fps).unwrap_or(0.0);
        OutboundStatsSample {
            frames_encoded: self.frames_encoded.load(Ordering::Relaxed),
            key_frames_encoded: self.key_frames_encoded.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            frames_per_second: fps,
        }
    }
}

impl Default for StreamStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_frames_bytes_and_keyframes() {
        let stats = StreamStats::new();
        stats.record_frame(1000, true);
        stats.record_frame(200, false);
        stats.record_frame(300, false);

        let sample = stats.snapshot();
        assert_eq!(sample.frames_encoded, 3);
        assert_eq!(sample.key_frames_encoded, 1);
        assert_eq!(sample.bytes_sent, 1500);
    }

    #[test]
    fn empty_snapshot_is_zero() {
        let sample = StreamStats::new().snapshot();
        assert_eq!(sample.frames_encoded, 0);
        assert_eq!(sample.bytes_sent, 0);
        assert_eq!(sample.frames_per_second, 0.0);
    }
}
