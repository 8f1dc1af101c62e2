//! Playback and thumbnail seams.
//!
//! The actual video player and frame extractor live in the rendering engine;
//! the library pipeline only drives these traits.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("playback failed: {0}")]
    Playback(String),

    #[error("thumbnail extraction failed: {0}")]
    Thumbnail(String),
}

pub trait MediaPlayer: Send {
    fn play_video(&mut self, path: &Path) -> Result<(), PlayerError>;
    fn show_image(&mut self, path: &Path) -> Result<(), PlayerError>;
    fn pause(&mut self);
    fn resume(&mut self);
    /// Volume in `0.0..=1.0`.
    fn set_volume(&mut self, volume: f64);
    fn stop(&mut self);
}

pub trait Thumbnailer: Send {
    /// Extract a poster frame from `media` and return the written thumbnail
    /// path.
    fn extract(&mut self, media: &Path, at_seconds: f64) -> Result<PathBuf, PlayerError>;
}

/// Log-only player for engine-less builds.
pub struct NullMediaPlayer;

impl MediaPlayer for NullMediaPlayer {
    fn play_video(&mut self, path: &Path) -> Result<(), PlayerError> {
        tracing::info!("play video {:?}", path);
        Ok(())
    }

    fn show_image(&mut self, path: &Path) -> Result<(), PlayerError> {
        tracing::info!("show image {:?}", path);
        Ok(())
    }

    fn pause(&mut self) {
        tracing::info!("pause playback");
    }

    fn resume(&mut self) {
        tracing::info!("resume playback");
    }

    fn set_volume(&mut self, volume: f64) {
        tracing::info!("set volume {}", volume);
    }

    fn stop(&mut self) {
        tracing::info!("stop playback");
    }
}

/// Thumbnailer that skips extraction.
pub struct NullThumbnailer;

impl Thumbnailer for NullThumbnailer {
    fn extract(&mut self, media: &Path, _at_seconds: f64) -> Result<PathBuf, PlayerError> {
        tracing::debug!("thumbnail extraction skipped for {:?}", media);
        Err(PlayerError::Thumbnail("no thumbnailer configured".into()))
    }
}
