//! End-to-end session flow tests against an in-process mock hub.
//!
//! The mock plays the server side of the live-feed hub over a real WebSocket:
//! it observes the startup sequence, answers the offer with a real WebRTC
//! answer, and drops the connection to exercise the reconnect loop.

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use webrtc::api::APIBuilder;
use webrtc::api::media_engine::MediaEngine;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_codec::{
    RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType,
};

use vrlobby_headset::media::peer::{EncoderFactory, PeerConfig};
use vrlobby_headset::network::TransportPreference;
use vrlobby_headset::session::{CoordinatorConfig, SessionCoordinator};
use vrlobby_headset::state::HeadsetState;
use vrlobby_media::{
    CodecError, EncodedFrame, RenderTarget, SourceError, TestPatternTarget, VideoEncoder,
    VideoFrame,
};
use vrlobby_protocol::HubFrame;

type Hub = WebSocketStream<TcpStream>;

struct StubEncoder {
    width: u32,
    height: u32,
}

impl VideoEncoder for StubEncoder {
    fn width(&self) -> u32 {
        self.width
    }
    fn height(&self) -> u32 {
        self.height
    }
    fn encode(&mut self, frame: &VideoFrame) -> Result<EncodedFrame, CodecError> {
        Ok(EncodedFrame {
            data: frame.data[..16.min(frame.data.len())].to_vec(),
            keyframe: true,
        })
    }
    fn force_keyframe(&mut self) {}
}

fn stub_encoder_factory() -> EncoderFactory {
    Arc::new(|width, height| Ok(Box::new(StubEncoder { width, height }) as Box<dyn VideoEncoder>))
}

/// Render target whose capture camera is missing: every render attempt
/// fails, which the coordinator must treat as a configuration error.
struct DeadTarget;

impl RenderTarget for DeadTarget {
    fn width(&self) -> u32 {
        960
    }
    fn height(&self) -> u32 {
        540
    }
    fn is_created(&self) -> bool {
        false
    }
    fn ensure_created(&self) -> Result<(), SourceError> {
        Err(SourceError::SourceUnavailable("no capture camera".into()))
    }
    fn render_pass_count(&self) -> u64 {
        0
    }
    fn trigger_render(&self) -> Result<(), SourceError> {
        Err(SourceError::SourceUnavailable("no capture camera".into()))
    }
    fn capture_frame(&self) -> Result<VideoFrame, SourceError> {
        Err(SourceError::NotCreated)
    }
}

fn spawn_coordinator(
    hub_addr: std::net::SocketAddr,
    target: Arc<dyn RenderTarget>,
) -> tokio::task::JoinHandle<()> {
    let coordinator = SessionCoordinator::new(
        CoordinatorConfig {
            hub_url: format!("ws://{hub_addr}"),
            transport: TransportPreference::WebSocket,
            vr_user_id: 19,
            capture_width: 960,
            capture_height: 540,
            reconnect_backoff: Duration::from_millis(200),
        },
        target,
        stub_encoder_factory(),
        PeerConfig {
            ice_servers: vec![],
            capture_fps: 30,
        },
        HeadsetState::new(),
    );
    tokio::spawn(coordinator.run())
}

async fn accept_hub(listener: &TcpListener) -> Hub {
    let (stream, _) = tokio::time::timeout(Duration::from_secs(10), listener.accept())
        .await
        .expect("no hub connection")
        .expect("accept failed");
    tokio_tungstenite::accept_async(stream)
        .await
        .expect("websocket handshake failed")
}

async fn next_frame(hub: &mut Hub) -> HubFrame {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(10), hub.next())
            .await
            .expect("timed out waiting for hub frame")
            .expect("hub connection ended")
            .expect("hub read failed");
        match message {
            Message::Text(text) => return HubFrame::decode(&text).expect("bad hub frame"),
            _ => continue,
        }
    }
}

async fn send_frame(hub: &mut Hub, target: &str, arguments: Vec<serde_json::Value>) {
    let text = HubFrame::new(target, arguments).encode().unwrap();
    hub.send(Message::Text(text.into())).await.unwrap();
}

/// Build the viewer side: apply the offer, produce a real answer.
async fn answer_for(offer_sdp: &str) -> String {
    let mut media_engine = MediaEngine::default();
    media_engine
        .register_codec(
            RTCRtpCodecParameters {
                capability: RTCRtpCodecCapability {
                    mime_type: "video/H264".to_string(),
                    clock_rate: 90000,
                    channels: 0,
                    sdp_fmtp_line:
                        "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42e01f"
                            .to_string(),
                    rtcp_feedback: vec![],
                },
                payload_type: 96,
                ..Default::default()
            },
            RTPCodecType::Video,
        )
        .unwrap();
    let api = APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(Registry::new())
        .build();
    let pc = api
        .new_peer_connection(RTCConfiguration::default())
        .await
        .unwrap();
    let offer = RTCSessionDescription::offer(offer_sdp.to_string()).unwrap();
    pc.set_remote_description(offer).await.unwrap();
    let answer = pc.create_answer(None).await.unwrap();
    pc.set_local_description(answer.clone()).await.unwrap();
    let sdp = answer.sdp;
    pc.close().await.unwrap();
    sdp
}

/// One full startup sequence as observed from the hub side, through the
/// offer. Returns the offer SDP.
async fn expect_startup_sequence(hub: &mut Hub) -> String {
    let join = next_frame(hub).await;
    assert_eq!(join.target, "JoinGroup");
    assert_eq!(join.arguments, vec![json!("vruser_19")]);

    let ready = next_frame(hub).await;
    assert_eq!(ready.target, "ReadyForOffer");
    assert_eq!(ready.arguments, vec![json!(19)]);

    let offer = next_frame(hub).await;
    assert_eq!(offer.target, "SendOffer");
    assert_eq!(offer.arguments[0], json!(19));
    assert_eq!(offer.arguments[1]["type"], json!("offer"));
    let sdp = offer.arguments[1]["sdp"].as_str().expect("offer sdp missing");
    assert!(sdp.contains("m=video"), "offer has no video line:\n{sdp}");
    sdp.to_string()
}

#[tokio::test]
async fn full_session_flow_and_reconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _driver = spawn_coordinator(addr, Arc::new(TestPatternTarget::new(960, 540)));

    // first attempt: strict startup order, then signaling
    let mut hub = accept_hub(&listener).await;
    let offer_sdp = expect_startup_sequence(&mut hub).await;

    let answer_sdp = answer_for(&offer_sdp).await;
    send_frame(&mut hub, "ReceiveAnswer", vec![json!({ "sdp": answer_sdp })]).await;

    // trailing ICE, a duplicate answer, an ignored offer and junk must all be
    // tolerated without killing the session
    send_frame(
        &mut hub,
        "ReceiveIceCandidate",
        vec![json!({
            "candidate": "candidate:1 1 udp 2122260223 127.0.0.1 50000 typ host",
            "sdpMid": "0",
            "sdpMLineIndex": 0
        })],
    )
    .await;
    send_frame(&mut hub, "ReceiveAnswer", vec![json!(answer_sdp)]).await;
    send_frame(&mut hub, "ReceiveOffer", vec![json!("{}")]).await;
    send_frame(&mut hub, "ReceiveAnswer", vec![json!(42)]).await;
    send_frame(&mut hub, "SomethingUnexpected", vec![]).await;

    // server drops the connection; the client must rerun the whole sequence
    hub.close(None).await.unwrap();
    drop(hub);

    let mut hub = accept_hub(&listener).await;
    let second_offer = expect_startup_sequence(&mut hub).await;
    assert!(second_offer.contains("m=video"));

    // and once more, to show the loop is unbounded
    hub.close(None).await.unwrap();
    drop(hub);
    let mut hub = accept_hub(&listener).await;
    expect_startup_sequence(&mut hub).await;
}

#[tokio::test]
async fn missing_capture_source_aborts_without_offer() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _driver = spawn_coordinator(addr, Arc::new(DeadTarget));

    let mut hub = accept_hub(&listener).await;
    let join = next_frame(&mut hub).await;
    assert_eq!(join.target, "JoinGroup");

    // configuration failure: the attempt aborts before ReadyForOffer, and no
    // offer is ever sent on this connection
    let quiet = tokio::time::timeout(Duration::from_millis(800), hub.next()).await;
    assert!(quiet.is_err(), "expected silence after config failure, got {quiet:?}");

    // the close-driven restart still applies
    hub.close(None).await.unwrap();
    drop(hub);
    let mut hub = accept_hub(&listener).await;
    let join = next_frame(&mut hub).await;
    assert_eq!(join.target, "JoinGroup");
}
