//! Management API client.
//!
//! Thin typed wrappers over the hosted media-management endpoints: startup
//! config lookup, media library listing, SAS URL resolution and headset
//! status upload.

use serde::de::DeserializeOwned;
use thiserror::Error;

use vrlobby_protocol::{HeadsetStatus, MediaItem, SasUrlResponse, VrStartupConfig};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request failed with status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone)]
pub struct ManagementApi {
    base_url: String,
    client: reqwest::Client,
}

impl ManagementApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn startup_config(&self, headset_name: &str) -> Result<VrStartupConfig, ApiError> {
        self.get(&format!(
            "/api/MediaManagement/GetVrStartupConfig/{headset_name}"
        ))
        .await
    }

    pub async fn media_for_user(&self, vr_user_id: u32) -> Result<Vec<MediaItem>, ApiError> {
        self.get(&format!("/api/MediaManagement/GetMediaForVrUser/{vr_user_id}"))
            .await
    }

    /// Resolve a short-lived download URL for one blob path.
    pub async fn sas_url(&self, blob_path: &str) -> Result<SasUrlResponse, ApiError> {
        self.get(&format!("/api/MediaManagement/GenerateSasToken/{blob_path}"))
            .await
    }

    pub async fn update_headset_status(&self, status: &HeadsetStatus) -> Result<(), ApiError> {
        let response = self
            .client
            .post(format!("{}/api/MediaManagement/UpdateHeadsetStatus", self.base_url))
            .json(status)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    /// Raw GET used for media downloads; the SAS URL is absolute.
    pub async fn download(&self, url: &str) -> Result<reqwest::Response, ApiError> {
        let response = self.client.get(url).send().await?;
        Self::check(response).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Status { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let api = ManagementApi::new("https://lobby.example.com/");
        assert_eq!(api.base_url(), "https://lobby.example.com");
    }
}
