//! Outbound stream watchdog and stats logging.
//!
//! Two polling loops per peer session: a zero-frame watchdog that raises a
//! diagnostic checklist when encoding never starts, and a stats logger for
//! observability. Both hold only a `Weak` session handle and stop when the
//! session is disposed.

use std::sync::Weak;
use std::time::Duration;

use crate::media::peer::SessionHandle;

pub const WATCHDOG_INTERVAL: Duration = Duration::from_secs(5);
pub const STATS_LOG_INTERVAL: Duration = Duration::from_secs(3);
/// How long a session may run with zero encoded frames before the watchdog
/// starts complaining.
pub const ZERO_FRAME_GRACE: Duration = Duration::from_secs(10);

/// Poll every [`WATCHDOG_INTERVAL`]; once the session is older than
/// [`ZERO_FRAME_GRACE`] with nothing encoded, emit the diagnostic checklist
/// on every poll until frames appear. Diagnostic only, no corrective action.
pub fn spawn_zero_frame_watchdog(handle: Weak<SessionHandle>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(WATCHDOG_INTERVAL);
        // consume the immediate tick; the first real poll is one interval in
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(handle) = handle.upgrade() else {
                break;
            };
            if !handle.is_live() {
                break;
            }
            let sample = handle.stats();
            if sample.frames_encoded == 0 && handle.age() > ZERO_FRAME_GRACE {
                handle.note_zero_frame_warning();
                tracing::warn!(
                    target_created = handle.target().is_created(),
                    render_passes = handle.target().render_pass_count(),
                    connection_state = %handle.connection_state(),
                    "frames_encoded still 0 after {}s; check the capture camera, \
                     its render target and the peer connection state; if the \
                     remote viewer is Safari/iOS try VP8 only",
                    ZERO_FRAME_GRACE.as_secs()
                );
            }
        }
        tracing::debug!("zero-frame watchdog stopped");
    })
}

/// Log outbound frame/byte/fps/keyframe counters every
/// [`STATS_LOG_INTERVAL`] while the session lives.
pub fn spawn_outbound_stats_logger(handle: Weak<SessionHandle>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(STATS_LOG_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(handle) = handle.upgrade() else {
                break;
            };
            if !handle.is_live() {
                break;
            }
            let sample = handle.stats();
            tracing::info!(
                frames = sample.frames_encoded,
                bytes = sample.bytes_sent,
                fps = sample.frames_per_second,
                key_frames = sample.key_frames_encoded,
                "outbound-rtp"
            );
        }
        tracing::debug!("outbound stats logger stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use vrlobby_media::{RenderTarget, SourceError, StreamStats, VideoFrame};

    struct IdleTarget;

    impl RenderTarget for IdleTarget {
        fn width(&self) -> u32 {
            960
        }
        fn height(&self) -> u32 {
            540
        }
        fn is_created(&self) -> bool {
            true
        }
        fn ensure_created(&self) -> Result<(), SourceError> {
            Ok(())
        }
        fn render_pass_count(&self) -> u64 {
            1
        }
        fn trigger_render(&self) -> Result<(), SourceError> {
            Ok(())
        }
        fn capture_frame(&self) -> Result<VideoFrame, SourceError> {
            Err(SourceError::Capture("idle".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn warns_once_per_poll_after_grace_until_frames_appear() {
        let live = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(StreamStats::new());
        let handle =
            SessionHandle::for_tests(live.clone(), stats.clone(), Arc::new(IdleTarget));
        let task = spawn_zero_frame_watchdog(Arc::downgrade(&handle));

        // polls at t=5 and t=10 are still inside the grace period
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(handle.zero_frame_warnings(), 0);

        // t=15 and t=20 both warn
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(handle.zero_frame_warnings(), 2);

        // once frames flow the warning stops
        stats.record_frame(1200, true);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(handle.zero_frame_warnings(), 2);

        // disposing the session ends the loop
        live.store(false, Ordering::SeqCst);
        tokio::time::timeout(Duration::from_secs(10), task)
            .await
            .expect("watchdog did not stop")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn loops_stop_when_the_session_handle_drops() {
        let live = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(StreamStats::new());
        let handle = SessionHandle::for_tests(live, stats, Arc::new(IdleTarget));
        let watchdog = spawn_zero_frame_watchdog(Arc::downgrade(&handle));
        let logger = spawn_outbound_stats_logger(Arc::downgrade(&handle));

        drop(handle);
        tokio::time::timeout(Duration::from_secs(10), watchdog)
            .await
            .expect("watchdog did not stop")
            .unwrap();
        tokio::time::timeout(Duration::from_secs(10), logger)
            .await
            .expect("stats logger did not stop")
            .unwrap();
    }
}
