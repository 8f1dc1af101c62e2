//! Media library and remote command pipeline.
//!
//! Downloads the user's media items into the local cache, queues thumbnail
//! extraction, and applies `ReceiveMediaCommand` events from the media hub to
//! the player. The media hub connection has its own unbounded reconnect loop,
//! independent of the live-feed signaling session.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;

use vrlobby_protocol::{MediaCommand, MediaItem, MediaKind, event};

use crate::media::player::{MediaPlayer, Thumbnailer};
use crate::network::{ApiError, HubSignal, ManagementApi, SignalingChannel, TransportPreference};
use crate::state::{HeadsetState, OverlayState, PlaybackView};

pub const MEDIA_HUB_RECONNECT_BACKOFF: Duration = Duration::from_secs(2);
const THUMBNAIL_POSTER_SECONDS: f64 = 2.0;

pub struct MediaLibrary {
    api: ManagementApi,
    cache_dir: PathBuf,
    state: HeadsetState,
    player: Box<dyn MediaPlayer>,
    thumbnailer: Box<dyn Thumbnailer>,
    vr_user_id: u32,
    images: Vec<PathBuf>,
    videos: Vec<PathBuf>,
    thumbnails: Vec<PathBuf>,
    shutdown_tx: watch::Sender<bool>,
}

impl MediaLibrary {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        api: ManagementApi,
        cache_dir: PathBuf,
        state: HeadsetState,
        player: Box<dyn MediaPlayer>,
        thumbnailer: Box<dyn Thumbnailer>,
        vr_user_id: u32,
        shutdown_tx: watch::Sender<bool>,
    ) -> Self {
        Self {
            api,
            cache_dir,
            state,
            player,
            thumbnailer,
            vr_user_id,
            images: Vec::new(),
            videos: Vec::new(),
            thumbnails: Vec::new(),
            shutdown_tx,
        }
    }

    pub fn images(&self) -> &[PathBuf] {
        &self.images
    }

    pub fn videos(&self) -> &[PathBuf] {
        &self.videos
    }

    /// Fetch the media list and download every item not already cached.
    pub async fn refresh(&mut self) -> Result<(), ApiError> {
        self.images.clear();
        self.videos.clear();

        let items = self.api.media_for_user(self.vr_user_id).await?;
        let total = items.len().max(1);
        tracing::info!(count = items.len(), "media list fetched");

        for (done, item) in items.iter().enumerate() {
            match self.fetch_item(item).await {
                Ok(path) => {
                    if item.is_image() {
                        self.images.push(path);
                    } else if item.is_video() {
                        self.videos.push(path);
                    } else {
                        tracing::warn!(media_type = %item.media_type, "unknown media type, skipping");
                    }
                }
                Err(e) => {
                    tracing::error!(file = %item.file_name, "media download failed: {}", e);
                }
            }
            self.state
                .set_download(&item.file_name, (done + 1) as f32 / total as f32)
                .await;
        }
        self.state.clear_download().await;
        Ok(())
    }

    async fn fetch_item(&self, item: &MediaItem) -> Result<PathBuf, ApiError> {
        let local_path = self.cache_dir.join(&item.file_name);
        if local_path.exists() {
            tracing::debug!(path = ?local_path, "already cached");
            return Ok(local_path);
        }

        let sas = self.api.sas_url(&item.blob_path()).await?;
        self.download_to(&sas.sas_url, &item.file_name, &local_path)
            .await?;
        Ok(local_path)
    }

    async fn download_to(
        &self,
        url: &str,
        file_name: &str,
        local_path: &Path,
    ) -> Result<(), ApiError> {
        if let Some(parent) = local_path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                tracing::error!("failed to create media cache dir: {}", e);
            }
        }

        let response = self.api.download(url).await?;
        let total_bytes = response.content_length();

        let mut file = tokio::fs::File::create(local_path).await?;

        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if let Err(e) = file.write_all(&chunk).await {
                // leave no truncated file behind
                let _ = tokio::fs::remove_file(local_path).await;
                return Err(e.into());
            }
            written += chunk.len() as u64;
            if let Some(total) = total_bytes {
                self.state
                    .set_download(file_name, written as f32 / total as f32)
                    .await;
            }
        }
        tracing::info!(file_name, bytes = written, "media downloaded");
        Ok(())
    }

    /// Extract poster frames for everything in the library. Images are their
    /// own thumbnail; failures are logged and skipped.
    pub async fn generate_thumbnails(&mut self) {
        self.thumbnails.clear();
        for path in &self.images {
            self.thumbnails.push(path.clone());
        }
        for path in self.videos.clone() {
            match self.thumbnailer.extract(&path, THUMBNAIL_POSTER_SECONDS) {
                Ok(thumb) => self.thumbnails.push(thumb),
                Err(e) => tracing::warn!(path = ?path, "thumbnail skipped: {}", e),
            }
        }
        tracing::info!(count = self.thumbnails.len(), "thumbnails ready");
    }

    /// Apply one remote media command.
    pub async fn handle_command(&mut self, command: MediaCommand) {
        tracing::info!(?command, "media command");
        match command {
            MediaCommand::StartSession => {
                self.state.set_overlay(OverlayState::SessionStarting).await;
            }
            MediaCommand::EndSession => {
                self.player.pause();
                self.state.set_playback(PlaybackView::Idle).await;
                self.state.set_overlay(OverlayState::SessionEnded).await;
            }
            MediaCommand::Select { kind, index } => self.select(kind, index).await,
            MediaCommand::Pause => self.player.pause(),
            MediaCommand::Resume => self.player.resume(),
            MediaCommand::SetVolume { volume } => {
                self.player.set_volume(volume.clamp(0.0, 1.0));
            }
            MediaCommand::HideOverlay => {
                self.state.set_overlay(OverlayState::Hidden).await;
            }
            MediaCommand::ReloadContent => {
                if let Err(e) = self.refresh().await {
                    tracing::error!("content reload failed: {}", e);
                } else {
                    self.generate_thumbnails().await;
                }
            }
            MediaCommand::Shutdown => {
                tracing::info!("shutdown requested by remote");
                let _ = self.shutdown_tx.send(true);
            }
        }
    }

    async fn select(&mut self, kind: MediaKind, index: usize) {
        match kind {
            MediaKind::Video => {
                let Some(path) = self.videos.get(index).cloned() else {
                    tracing::warn!(index, "video index out of range, ignoring");
                    return;
                };
                if let Err(e) = self.player.play_video(&path) {
                    tracing::error!("video playback failed: {}", e);
                    return;
                }
                self.state.set_playback(PlaybackView::Video { index }).await;
            }
            MediaKind::Photo => {
                let Some(path) = self.images.get(index).cloned() else {
                    tracing::warn!(index, "photo index out of range, ignoring");
                    return;
                };
                self.player.pause();
                if let Err(e) = self.player.show_image(&path) {
                    tracing::error!("image display failed: {}", e);
                    return;
                }
                self.state.set_playback(PlaybackView::Photo { index }).await;
            }
        }
    }

    /// Media hub loop: connect, drain commands, reconnect after a short
    /// backoff when the connection drops. Runs until the remote sends
    /// `shutdown`.
    pub async fn run_media_hub(mut self, hub_url: String, transport: TransportPreference) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            if *shutdown_rx.borrow() {
                return;
            }

            let mut hub = match SignalingChannel::connect(&hub_url, transport).await {
                Ok(hub) => hub,
                Err(e) => {
                    tracing::warn!("media hub connect failed: {}", e);
                    tokio::time::sleep(MEDIA_HUB_RECONNECT_BACKOFF).await;
                    continue;
                }
            };
            let mut signals = match hub.take_signals() {
                Ok(signals) => signals,
                Err(e) => {
                    tracing::error!("media hub signals unavailable: {}", e);
                    tokio::time::sleep(MEDIA_HUB_RECONNECT_BACKOFF).await;
                    continue;
                }
            };
            let group = format!("vruser_{}", self.vr_user_id);
            hub.join_group(&group);

            loop {
                tokio::select! {
                    signal = signals.recv() => match signal {
                        Some(HubSignal::Event { target, arguments }) => {
                            if target == event::RECEIVE_MEDIA_COMMAND {
                                match parse_media_command(&arguments) {
                                    Some(command) => self.handle_command(command).await,
                                    None => tracing::warn!(?arguments, "unusable media command payload, dropping"),
                                }
                            } else {
                                tracing::debug!(event = %target, "unhandled media hub event");
                            }
                        }
                        Some(HubSignal::Error(e)) => tracing::warn!("media hub error: {}", e),
                        Some(HubSignal::Closed) | None => break,
                    },
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            hub.leave_group(&group);
                            return;
                        }
                    }
                }
            }

            tracing::info!(
                "media hub closed, reconnecting in {}s",
                MEDIA_HUB_RECONNECT_BACKOFF.as_secs()
            );
            tokio::time::sleep(MEDIA_HUB_RECONNECT_BACKOFF).await;
        }
    }
}

/// `ReceiveMediaCommand(command, data)`: the command name plus an optional
/// key/value map.
fn parse_media_command(arguments: &[Value]) -> Option<MediaCommand> {
    let command = arguments.first()?.as_str()?;
    let empty = Map::new();
    let data = arguments
        .get(1)
        .and_then(Value::as_object)
        .unwrap_or(&empty);
    MediaCommand::from_parts(command, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::Mutex;

    use crate::media::player::{NullThumbnailer, PlayerError};

    #[derive(Default)]
    struct Recording {
        played: Vec<PathBuf>,
        shown: Vec<PathBuf>,
        paused: usize,
        volume: Option<f64>,
    }

    struct RecordingPlayer(Arc<Mutex<Recording>>);

    impl MediaPlayer for RecordingPlayer {
        fn play_video(&mut self, path: &Path) -> Result<(), PlayerError> {
            self.0.lock().unwrap().played.push(path.to_path_buf());
            Ok(())
        }
        fn show_image(&mut self, path: &Path) -> Result<(), PlayerError> {
            self.0.lock().unwrap().shown.push(path.to_path_buf());
            Ok(())
        }
        fn pause(&mut self) {
            self.0.lock().unwrap().paused += 1;
        }
        fn resume(&mut self) {}
        fn set_volume(&mut self, volume: f64) {
            self.0.lock().unwrap().volume = Some(volume);
        }
        fn stop(&mut self) {}
    }

    fn test_library_in(
        cache_dir: PathBuf,
    ) -> (MediaLibrary, Arc<Mutex<Recording>>, watch::Receiver<bool>) {
        let recording = Arc::new(Mutex::new(Recording::default()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut library = MediaLibrary::new(
            ManagementApi::new("http://127.0.0.1:1"),
            cache_dir,
            HeadsetState::new(),
            Box::new(RecordingPlayer(recording.clone())),
            Box::new(NullThumbnailer),
            19,
            shutdown_tx,
        );
        library.videos = vec![PathBuf::from("/media/a.mp4"), PathBuf::from("/media/b.mp4")];
        library.images = vec![PathBuf::from("/media/c.jpg")];
        (library, recording, shutdown_rx)
    }

    fn test_library() -> (MediaLibrary, Arc<Mutex<Recording>>, watch::Receiver<bool>) {
        test_library_in(std::env::temp_dir().join("vrlobby-test-cache"))
    }

    #[tokio::test]
    async fn select_video_plays_and_updates_playback() {
        let (mut library, recording, _rx) = test_library();
        library
            .handle_command(MediaCommand::Select {
                kind: MediaKind::Video,
                index: 1,
            })
            .await;
        assert_eq!(
            recording.lock().unwrap().played,
            vec![PathBuf::from("/media/b.mp4")]
        );
        assert_eq!(
            library.state.read().await.playback,
            PlaybackView::Video { index: 1 }
        );
    }

    #[tokio::test]
    async fn out_of_range_selection_is_dropped() {
        let (mut library, recording, _rx) = test_library();
        library
            .handle_command(MediaCommand::Select {
                kind: MediaKind::Video,
                index: 7,
            })
            .await;
        assert!(recording.lock().unwrap().played.is_empty());
        assert_eq!(library.state.read().await.playback, PlaybackView::Idle);
    }

    #[tokio::test]
    async fn end_session_pauses_and_shows_overlay() {
        let (mut library, recording, _rx) = test_library();
        library.handle_command(MediaCommand::EndSession).await;
        assert_eq!(recording.lock().unwrap().paused, 1);
        assert_eq!(
            library.state.read().await.overlay,
            OverlayState::SessionEnded
        );
    }

    #[tokio::test]
    async fn volume_is_clamped() {
        let (mut library, recording, _rx) = test_library();
        library
            .handle_command(MediaCommand::SetVolume { volume: 3.5 })
            .await;
        assert_eq!(recording.lock().unwrap().volume, Some(1.0));
    }

    #[tokio::test]
    async fn shutdown_resolves_the_signal() {
        let (mut library, _recording, rx) = test_library();
        library.handle_command(MediaCommand::Shutdown).await;
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn cached_items_skip_the_network() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("clip.mp4"), b"cached").unwrap();
        // the API base points nowhere; a network round trip would fail
        let (library, _recording, _rx) = test_library_in(dir.path().to_path_buf());
        let item = MediaItem {
            file_name: "clip.mp4".into(),
            media_type: "Videos".into(),
            category: "Tours".into(),
        };
        let path = library.fetch_item(&item).await.unwrap();
        assert_eq!(path, dir.path().join("clip.mp4"));
    }

    #[test]
    fn media_command_arguments_parse() {
        let args = vec![json!("play"), json!({"mediaType": "video", "index": 0})];
        assert_eq!(
            parse_media_command(&args),
            Some(MediaCommand::Select {
                kind: MediaKind::Video,
                index: 0
            })
        );

        let args = vec![json!("pause")];
        assert_eq!(parse_media_command(&args), Some(MediaCommand::Pause));

        let args = vec![json!(42)];
        assert_eq!(parse_media_command(&args), None);
    }
}
