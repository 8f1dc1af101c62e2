use serde::{Deserialize, Serialize};

/// Session description direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// An SDP blob plus its direction, as carried in `SendOffer` and produced by
/// answer normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SdpDescriptor {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SdpDescriptor {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// `ReceiveAnswer` arrives either as the bare SDP string or wrapped in a
/// `{"sdp": ...}` map depending on which hub client relayed it. Both shapes
/// normalize to the same [`SdpDescriptor`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum AnswerPayload {
    Raw(String),
    Structured { sdp: String },
}

impl AnswerPayload {
    pub fn normalize(self) -> SdpDescriptor {
        match self {
            AnswerPayload::Raw(sdp) => SdpDescriptor::answer(sdp),
            AnswerPayload::Structured { sdp } => SdpDescriptor::answer(sdp),
        }
    }
}

/// One ICE candidate as exchanged over the hub. Field names mirror the
/// browser-side `RTCIceCandidateInit` and must stay bit-exact on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidateRecord {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default)]
    pub sdp_m_line_index: Option<u16>,
}

/// Startup configuration resolved from the headset name by the management API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VrStartupConfig {
    pub vr_user_id: u32,
    pub session_type: String,
}

/// One entry of a user's media library listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub file_name: String,
    pub media_type: String,
    pub category: String,
}

impl MediaItem {
    pub fn is_image(&self) -> bool {
        self.media_type.eq_ignore_ascii_case("images")
    }

    pub fn is_video(&self) -> bool {
        self.media_type.eq_ignore_ascii_case("videos")
    }

    /// Blob storage path for this item, as the management API expects it.
    pub fn blob_path(&self) -> String {
        format!(
            "library/{}/{}/{}",
            self.media_type.to_lowercase(),
            self.category.to_lowercase().replace(' ', "_"),
            self.file_name
        )
    }
}

/// Short-lived download URL for one blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SasUrlResponse {
    pub sas_url: String,
}

/// Periodic device status report uploaded to the management API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadsetStatus {
    pub headset_name: String,
    pub wifi_name: String,
    pub battery_level: String,
}
