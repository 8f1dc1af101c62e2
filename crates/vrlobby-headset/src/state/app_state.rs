use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Shared headset state: startup status, overlay, download progress and the
/// current playback view. The UI layer renders this; everything else mutates
/// it through the helpers.
#[derive(Debug, Clone)]
pub struct HeadsetState {
    inner: Arc<RwLock<HeadsetStateInner>>,
}

#[derive(Debug, Default)]
pub struct HeadsetStateInner {
    pub status_line: String,
    pub detail_line: String,
    pub progress: f32,
    pub overlay: OverlayState,
    pub hub_connected: bool,
    pub playback: PlaybackView,
    pub download: Option<DownloadProgress>,
}

/// Session overlay shown over the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlayState {
    #[default]
    Hidden,
    SessionStarting,
    SessionEnded,
}

/// What the headset is currently presenting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackView {
    #[default]
    Idle,
    Video {
        index: usize,
    },
    Photo {
        index: usize,
    },
}

#[derive(Debug, Clone)]
pub struct DownloadProgress {
    pub file_name: String,
    pub fraction: f32,
}

impl HeadsetState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HeadsetStateInner::default())),
        }
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, HeadsetStateInner> {
        self.inner.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, HeadsetStateInner> {
        self.inner.write().await
    }

    pub async fn set_status(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("startup: {}", message);
        self.inner.write().await.status_line = message;
    }

    pub async fn set_progress(&self, progress: f32) {
        self.inner.write().await.progress = progress.clamp(0.0, 1.0);
    }

    pub async fn set_overlay(&self, overlay: OverlayState) {
        self.inner.write().await.overlay = overlay;
    }

    pub async fn set_playback(&self, playback: PlaybackView) {
        self.inner.write().await.playback = playback;
    }

    pub async fn set_hub_connected(&self, connected: bool) {
        self.inner.write().await.hub_connected = connected;
    }

    pub async fn set_download(&self, file_name: &str, fraction: f32) {
        self.inner.write().await.download = Some(DownloadProgress {
            file_name: file_name.to_string(),
            fraction: fraction.clamp(0.0, 1.0),
        });
    }

    pub async fn clear_download(&self) {
        self.inner.write().await.download = None;
    }
}

impl Default for HeadsetState {
    fn default() -> Self {
        Self::new()
    }
}
