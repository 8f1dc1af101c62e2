use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One hub message: a named target with positional JSON arguments.
///
/// The hub speaks an RPC-style publish/subscribe protocol; every frame on the
/// wire is a single JSON object of this shape, one per WebSocket text message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubFrame {
    pub target: String,
    #[serde(default)]
    pub arguments: Vec<Value>,
}

impl HubFrame {
    pub fn new(target: impl Into<String>, arguments: Vec<Value>) -> Self {
        Self {
            target: target.into(),
            arguments,
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Hub event names. These are part of the hosted hub contract and must stay
/// bit-exact.
pub mod event {
    pub const JOIN_GROUP: &str = "JoinGroup";
    pub const LEAVE_GROUP: &str = "LeaveGroup";
    pub const READY_FOR_OFFER: &str = "ReadyForOffer";
    pub const SEND_OFFER: &str = "SendOffer";
    pub const SEND_ICE_CANDIDATE: &str = "SendIceCandidate";
    pub const RECEIVE_ANSWER: &str = "ReceiveAnswer";
    pub const RECEIVE_ICE_CANDIDATE: &str = "ReceiveIceCandidate";
    pub const RECEIVE_OFFER: &str = "ReceiveOffer";
    pub const RECEIVE_MEDIA_COMMAND: &str = "ReceiveMediaCommand";
}

/// Which library a media selection refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Photo,
}

impl MediaKind {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "video" => Some(MediaKind::Video),
            "photo" => Some(MediaKind::Photo),
            _ => None,
        }
    }
}

/// A remote media command delivered over the media hub as
/// `ReceiveMediaCommand(command, data)`.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaCommand {
    StartSession,
    EndSession,
    /// `play`, `next` and `back` all carry the resolved selection; the remote
    /// controller computes the target index, the headset just seeks to it.
    Select { kind: MediaKind, index: usize },
    Pause,
    Resume,
    SetVolume { volume: f64 },
    HideOverlay,
    ReloadContent,
    Shutdown,
}

impl MediaCommand {
    /// Parse a raw `(command, data)` pair. Returns `None` for unknown
    /// commands or selection commands with an unusable payload; callers log
    /// and drop those.
    pub fn from_parts(command: &str, data: &Map<String, Value>) -> Option<Self> {
        match command {
            "startSession" => Some(MediaCommand::StartSession),
            "endSession" => Some(MediaCommand::EndSession),
            "play" | "next" | "back" => {
                let kind = data.get("mediaType").and_then(Value::as_str).and_then(MediaKind::parse)?;
                let index = data.get("index").and_then(value_as_usize)?;
                Some(MediaCommand::Select { kind, index })
            }
            "pause" => Some(MediaCommand::Pause),
            "resumeMedia" => Some(MediaCommand::Resume),
            "setVolume" => {
                let volume = data.get("volume").and_then(value_as_f64)?;
                Some(MediaCommand::SetVolume { volume })
            }
            "hideOverlay" => Some(MediaCommand::HideOverlay),
            "reloadContent" => Some(MediaCommand::ReloadContent),
            "shutdown" => Some(MediaCommand::Shutdown),
            _ => None,
        }
    }
}

/// The hub serializes numbers inconsistently depending on the sender; accept
/// both JSON numbers and numeric strings.
fn value_as_usize(v: &Value) -> Option<usize> {
    match v {
        Value::Number(n) => n.as_u64().map(|n| n as usize),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn value_as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn frame_round_trip() {
        let frame = HubFrame::new(event::SEND_OFFER, vec![json!(19), json!({"type": "offer", "sdp": "v=0"})]);
        let decoded = HubFrame::decode(&frame.encode().unwrap()).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn frame_without_arguments_decodes() {
        let decoded = HubFrame::decode(r#"{"target":"ReadyForOffer"}"#).unwrap();
        assert_eq!(decoded.target, "ReadyForOffer");
        assert!(decoded.arguments.is_empty());
    }

    #[test]
    fn parses_selection_commands() {
        let data = json!({"mediaType": "video", "index": 2});
        let data = data.as_object().unwrap();
        for cmd in ["play", "next", "back"] {
            assert_eq!(
                MediaCommand::from_parts(cmd, data),
                Some(MediaCommand::Select {
                    kind: MediaKind::Video,
                    index: 2
                })
            );
        }
    }

    #[test]
    fn selection_accepts_string_index() {
        let data = json!({"mediaType": "photo", "index": "4"});
        assert_eq!(
            MediaCommand::from_parts("play", data.as_object().unwrap()),
            Some(MediaCommand::Select {
                kind: MediaKind::Photo,
                index: 4
            })
        );
    }

    #[test]
    fn rejects_unknown_command_and_bad_selection() {
        let empty = Map::new();
        assert_eq!(MediaCommand::from_parts("discombobulate", &empty), None);

        let data = json!({"mediaType": "hologram", "index": 0});
        assert_eq!(MediaCommand::from_parts("play", data.as_object().unwrap()), None);

        let data = json!({"mediaType": "video"});
        assert_eq!(MediaCommand::from_parts("next", data.as_object().unwrap()), None);
    }

    #[test]
    fn parses_set_volume() {
        let data = json!({"volume": 0.5});
        assert_eq!(
            MediaCommand::from_parts("setVolume", data.as_object().unwrap()),
            Some(MediaCommand::SetVolume { volume: 0.5 })
        );
    }
}
