//! Persistent client settings.
//!
//! Saved as a local JSON file; every field has a default so a missing or
//! partial file still yields a usable configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::network::TransportPreference;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Management API plus hub host.
    pub api_base_url: String,
    /// Live-feed (signaling) hub path on the API host.
    pub live_feed_hub_path: String,
    /// Media command hub path on the API host.
    pub media_hub_path: String,
    pub transport: TransportPreference,
    /// Overrides the hostname-derived headset name.
    pub headset_name: Option<String>,
    pub capture_width: u32,
    pub capture_height: u32,
    pub capture_fps: u32,
    pub stun_servers: Vec<String>,
    /// Overrides the platform data dir for downloaded media.
    pub media_cache_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: "https://lobby.example.com".to_string(),
            live_feed_hub_path: "/lobbycontrollivefeedhub".to_string(),
            media_hub_path: "/lobbymediahub".to_string(),
            transport: TransportPreference::WebSocket,
            headset_name: None,
            capture_width: 960,
            capture_height: 540,
            capture_fps: 30,
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            media_cache_dir: None,
        }
    }
}

impl Settings {
    fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("vrlobby").join("settings.json"))
    }

    /// Load settings from disk, falling back to defaults on any problem.
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else {
            tracing::warn!("Could not determine config directory");
            return Self::default();
        };

        if !path.exists() {
            tracing::debug!("Settings file does not exist, using defaults");
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(settings) => {
                    tracing::info!("Loaded settings from {:?}", path);
                    settings
                }
                Err(e) => {
                    tracing::error!("Failed to parse settings file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::error!("Failed to read settings file: {}", e);
                Self::default()
            }
        }
    }

    /// Save settings to disk, best effort.
    pub fn save(&self) {
        let Some(path) = Self::settings_path() else {
            tracing::warn!("Could not determine config directory");
            return;
        };

        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::error!("Failed to create config directory: {}", e);
                return;
            }
        }

        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&path, json) {
                    tracing::error!("Failed to write settings file: {}", e);
                } else {
                    tracing::debug!("Saved settings to {:?}", path);
                }
            }
            Err(e) => {
                tracing::error!("Failed to serialize settings: {}", e);
            }
        }
    }

    /// WebSocket URL of the live-feed signaling hub.
    pub fn live_feed_hub_url(&self) -> String {
        format!("{}{}", ws_base(&self.api_base_url), self.live_feed_hub_path)
    }

    /// WebSocket URL of the media command hub, scoped to this headset.
    pub fn media_hub_url(&self, headset_name: &str) -> String {
        format!(
            "{}{}?headsetName={}",
            ws_base(&self.api_base_url),
            self.media_hub_path,
            headset_name
        )
    }

    pub fn media_cache_dir(&self) -> PathBuf {
        self.media_cache_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("vrlobby")
                .join("media")
        })
    }
}

fn ws_base(api_base_url: &str) -> String {
    let base = api_base_url.trim_end_matches('/');
    if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let settings = Settings::default();
        assert_eq!(settings.capture_width, 960);
        assert_eq!(settings.capture_height, 540);
        assert!(!settings.stun_servers.is_empty());
    }

    #[test]
    fn hub_urls_use_websocket_scheme() {
        let settings = Settings {
            api_base_url: "https://lobby.example.com/".to_string(),
            ..Default::default()
        };
        assert_eq!(
            settings.live_feed_hub_url(),
            "wss://lobby.example.com/lobbycontrollivefeedhub"
        );
        assert_eq!(
            settings.media_hub_url("headset-7"),
            "wss://lobby.example.com/lobbymediahub?headsetName=headset-7"
        );

        let plain = Settings {
            api_base_url: "http://127.0.0.1:8080".to_string(),
            ..Default::default()
        };
        assert_eq!(
            plain.live_feed_hub_url(),
            "ws://127.0.0.1:8080/lobbycontrollivefeedhub"
        );
    }

    #[test]
    fn partial_settings_fill_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"api_base_url": "http://10.0.0.1"}"#).unwrap();
        assert_eq!(settings.api_base_url, "http://10.0.0.1");
        assert_eq!(settings.capture_fps, 30);
    }
}
