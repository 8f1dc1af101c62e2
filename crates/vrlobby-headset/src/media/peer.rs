//! WebRTC peer connection controller for the live feed.
//!
//! Owns exactly one peer connection and its local video track, and performs
//! the broadcaster side of the offer/answer/ICE protocol. The coordinator
//! owns this controller and serializes every call; the only concurrent actors
//! are the frame pump and the engine callbacks, which communicate through
//! channels and the session liveness flag.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use thiserror::Error;
use tokio::sync::mpsc;
use webrtc::api::APIBuilder;
use webrtc::api::media_engine::MediaEngine;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_codec::{
    RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType,
};
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use vrlobby_media::{CodecError, OutboundStatsSample, RenderTarget, StreamStats, VideoEncoder};
use vrlobby_protocol::{IceCandidateRecord, SdpDescriptor};

/// Channel for surfacing locally discovered ICE candidates to the owner.
pub type IceCandidateSender = mpsc::UnboundedSender<IceCandidateRecord>;

/// Builds an encoder for the negotiated capture dimensions.
pub type EncoderFactory =
    Arc<dyn Fn(u32, u32) -> Result<Box<dyn VideoEncoder>, CodecError> + Send + Sync>;

#[derive(Debug, Error)]
pub enum PeerError {
    #[error("render target is not ready: {0}")]
    ResourceNotReady(String),

    #[error("negotiation failed: {0}")]
    Negotiation(String),

    #[error("answer SDP is empty")]
    InvalidAnswer,

    #[error("no outbound sender bound")]
    StatsUnavailable,

    #[error("no active peer session")]
    NoSession,

    #[error("encoder unavailable: {0}")]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Engine(#[from] webrtc::Error),
}

#[derive(Debug, Clone)]
pub struct PeerConfig {
    pub ice_servers: Vec<String>,
    pub capture_fps: u32,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            capture_fps: 30,
        }
    }
}

/// Shared view of a live peer session for the watchdog loops. Holders keep a
/// `Weak` so a disposed session does not outlive its resources.
pub struct SessionHandle {
    live: Arc<AtomicBool>,
    started: Instant,
    stats: Arc<StreamStats>,
    target: Arc<dyn RenderTarget>,
    pc_state: Arc<Mutex<RTCPeerConnectionState>>,
    zero_frame_warnings: AtomicU64,
}

impl SessionHandle {
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    pub fn age(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn stats(&self) -> OutboundStatsSample {
        self.stats.snapshot()
    }

    pub fn target(&self) -> &dyn RenderTarget {
        self.target.as_ref()
    }

    pub fn connection_state(&self) -> RTCPeerConnectionState {
        self.pc_state
            .lock()
            .map(|s| *s)
            .unwrap_or(RTCPeerConnectionState::Unspecified)
    }

    pub(crate) fn note_zero_frame_warning(&self) {
        self.zero_frame_warnings.fetch_add(1, Ordering::Relaxed);
    }

    /// How many zero-frame diagnostics the watchdog has emitted for this
    /// session.
    pub fn zero_frame_warnings(&self) -> u64 {
        self.zero_frame_warnings.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    pub(crate) fn for_tests(
        live: Arc<AtomicBool>,
        stats: Arc<StreamStats>,
        target: Arc<dyn RenderTarget>,
    ) -> Arc<Self> {
        Arc::new(Self {
            live,
            started: Instant::now(),
            stats,
            target,
            pc_state: Arc::new(Mutex::new(RTCPeerConnectionState::New)),
            zero_frame_warnings: AtomicU64::new(0),
        })
    }
}

struct PeerSession {
    pc: Arc<RTCPeerConnection>,
    live: Arc<AtomicBool>,
    pc_state: Arc<Mutex<RTCPeerConnectionState>>,
    track: Option<Arc<TrackLocalStaticSample>>,
    sender: Option<Arc<RTCRtpSender>>,
    handle: Option<Arc<SessionHandle>>,
    pump: Option<tokio::task::JoinHandle<()>>,
    answer_applied: bool,
}

pub struct PeerController {
    config: PeerConfig,
    encoder_factory: EncoderFactory,
    ice_tx: IceCandidateSender,
    session: Option<PeerSession>,
}

impl PeerController {
    pub fn new(config: PeerConfig, encoder_factory: EncoderFactory, ice_tx: IceCandidateSender) -> Self {
        Self {
            config,
            encoder_factory,
            ice_tx,
            session: None,
        }
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Build a fresh peer connection for a new session attempt, disposing any
    /// previous one first.
    pub async fn create_session(&mut self) -> Result<(), PeerError> {
        if self.session.is_some() {
            self.dispose().await;
        }

        let mut media_engine = MediaEngine::default();
        media_engine.register_codec(
            RTCRtpCodecParameters {
                capability: h264_capability(),
                payload_type: 96,
                ..Default::default()
            },
            RTPCodecType::Video,
        )?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(Registry::new())
            .build();

        let ice_servers: Vec<RTCIceServer> = self
            .config
            .ice_servers
            .iter()
            .map(|url| RTCIceServer {
                urls: vec![url.clone()],
                ..Default::default()
            })
            .collect();

        let pc = Arc::new(
            api.new_peer_connection(RTCConfiguration {
                ice_servers,
                ..Default::default()
            })
            .await?,
        );

        let live = Arc::new(AtomicBool::new(true));
        let pc_state = Arc::new(Mutex::new(RTCPeerConnectionState::New));

        let state_slot = pc_state.clone();
        pc.on_peer_connection_state_change(Box::new(move |state| {
            tracing::info!("peer connection state: {}", state);
            if let Ok(mut slot) = state_slot.lock() {
                *slot = state;
            }
            Box::pin(async {})
        }));

        let ice_tx = self.ice_tx.clone();
        let ice_live = live.clone();
        pc.on_ice_candidate(Box::new(move |candidate| {
            let tx = ice_tx.clone();
            let live = ice_live.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else { return };
                if !live.load(Ordering::SeqCst) {
                    // session disposed while the engine was still gathering
                    return;
                }
                match candidate.to_json() {
                    Ok(json) => {
                        let record = IceCandidateRecord {
                            candidate: json.candidate,
                            sdp_mid: json.sdp_mid,
                            sdp_m_line_index: json.sdp_mline_index,
                        };
                        tracing::debug!(candidate = %record.candidate, "local ice candidate");
                        let _ = tx.send(record);
                    }
                    Err(e) => tracing::warn!("failed to serialize local ice candidate: {}", e),
                }
            })
        }));

        self.session = Some(PeerSession {
            pc,
            live,
            pc_state,
            track: None,
            sender: None,
            handle: None,
            pump: None,
            answer_applied: false,
        });
        Ok(())
    }

    /// Create the local video track sourced from `target` and start the frame
    /// pump. The target must have its backing resource allocated and at least
    /// one completed render pass, so the first sample is real picture data.
    pub async fn bind_video_source(
        &mut self,
        target: Arc<dyn RenderTarget>,
        width: u32,
        height: u32,
    ) -> Result<(), PeerError> {
        let session = self.session.as_mut().ok_or(PeerError::NoSession)?;

        if !target.is_created() || target.render_pass_count() == 0 {
            return Err(PeerError::ResourceNotReady(format!(
                "created={}, render_passes={}",
                target.is_created(),
                target.render_pass_count()
            )));
        }

        let track = Arc::new(TrackLocalStaticSample::new(
            h264_capability(),
            "video".to_string(),
            "livefeed-local".to_string(),
        ));
        let sender = session.pc.add_track(track.clone()).await?;

        let encoder = (self.encoder_factory)(width, height)?;
        let stats = Arc::new(StreamStats::new());
        let handle = Arc::new(SessionHandle {
            live: session.live.clone(),
            started: Instant::now(),
            stats: stats.clone(),
            target: target.clone(),
            pc_state: session.pc_state.clone(),
            zero_frame_warnings: AtomicU64::new(0),
        });

        let pump = spawn_frame_pump(
            track.clone(),
            target,
            encoder,
            stats,
            session.live.clone(),
            self.config.capture_fps,
        );

        session.track = Some(track);
        session.sender = Some(sender);
        session.handle = Some(handle);
        session.pump = Some(pump);
        tracing::info!(width, height, "video track bound to render target");
        Ok(())
    }

    /// Create the offer and set it as the local description. Both steps must
    /// succeed or the whole operation fails.
    pub async fn create_offer(&mut self) -> Result<SdpDescriptor, PeerError> {
        let session = self.session.as_mut().ok_or(PeerError::NoSession)?;

        let offer = session
            .pc
            .create_offer(None)
            .await
            .map_err(|e| PeerError::Negotiation(e.to_string()))?;
        session
            .pc
            .set_local_description(offer.clone())
            .await
            .map_err(|e| PeerError::Negotiation(e.to_string()))?;

        tracing::info!(
            has_video = offer.sdp.contains("m=video"),
            "offer created, local description set"
        );
        Ok(SdpDescriptor::offer(offer.sdp))
    }

    /// Apply the remote answer. A second answer for the same session is a
    /// protocol violation; it is logged and ignored rather than applied.
    pub async fn apply_answer(&mut self, sdp: &str) -> Result<(), PeerError> {
        if sdp.trim().is_empty() {
            return Err(PeerError::InvalidAnswer);
        }
        let Some(session) = self.session.as_mut() else {
            tracing::warn!("answer received with no active peer session, dropping");
            return Ok(());
        };
        if session.answer_applied {
            tracing::warn!("duplicate answer for this session, ignoring");
            return Ok(());
        }

        tracing::debug!(
            len = sdp.len(),
            has_video = sdp.contains("m=video"),
            "applying remote answer"
        );
        let answer = RTCSessionDescription::answer(sdp.to_string())
            .map_err(|e| PeerError::Negotiation(e.to_string()))?;
        session
            .pc
            .set_remote_description(answer)
            .await
            .map_err(|e| PeerError::Negotiation(e.to_string()))?;
        session.answer_applied = true;
        tracing::info!("remote answer applied");
        Ok(())
    }

    /// Add an ICE candidate from the remote viewer. Before the peer
    /// connection exists this is a warn-logged no-op, never a fault.
    pub async fn add_remote_ice_candidate(&self, record: IceCandidateRecord) {
        let Some(session) = self.session.as_ref() else {
            tracing::warn!("remote ice candidate before peer connection exists, dropping");
            return;
        };

        tracing::debug!(candidate = %record.candidate, "adding remote ice candidate");
        let init = RTCIceCandidateInit {
            candidate: record.candidate,
            sdp_mid: record.sdp_mid,
            sdp_mline_index: record.sdp_m_line_index,
            ..Default::default()
        };
        if let Err(e) = session.pc.add_ice_candidate(init).await {
            tracing::warn!("failed to add remote ice candidate: {}", e);
        }
    }

    /// Snapshot of the outbound stream counters for the bound sender.
    pub fn outbound_stats(&self) -> Result<OutboundStatsSample, PeerError> {
        let session = self.session.as_ref().ok_or(PeerError::StatsUnavailable)?;
        if session.sender.is_none() {
            return Err(PeerError::StatsUnavailable);
        }
        let handle = session.handle.as_ref().ok_or(PeerError::StatsUnavailable)?;
        Ok(handle.stats())
    }

    /// Watchdog view of the current session, if one is bound.
    pub fn session_handle(&self) -> Option<Arc<SessionHandle>> {
        self.session.as_ref().and_then(|s| s.handle.clone())
    }

    /// Tear down the current session. Idempotent; the liveness flag flips
    /// first so the pump, engine callbacks and watchdog loops abort quietly
    /// before the connection is released.
    pub async fn dispose(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        session.live.store(false, Ordering::SeqCst);
        if let Some(pump) = session.pump.take() {
            let _ = pump.await;
        }
        session.track = None;
        session.sender = None;
        if let Err(e) = session.pc.close().await {
            tracing::warn!("peer connection close failed: {}", e);
        }
        tracing::info!("peer session disposed");
    }
}

fn h264_capability() -> RTCRtpCodecCapability {
    RTCRtpCodecCapability {
        mime_type: "video/H264".to_string(),
        clock_rate: 90000,
        channels: 0,
        // Baseline profile, level 3.1, NAL unit packetization
        sdp_fmtp_line:
            "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42e01f".to_string(),
        rtcp_feedback: vec![],
    }
}

/// Capture -> encode -> write_sample loop. Runs until the session liveness
/// flag drops.
fn spawn_frame_pump(
    track: Arc<TrackLocalStaticSample>,
    target: Arc<dyn RenderTarget>,
    mut encoder: Box<dyn VideoEncoder>,
    stats: Arc<StreamStats>,
    live: Arc<AtomicBool>,
    fps: u32,
) -> tokio::task::JoinHandle<()> {
    let frame_interval = Duration::from_millis(1_000 / fps.max(1) as u64);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(frame_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if !live.load(Ordering::SeqCst) {
                break;
            }
            if let Err(e) = target.trigger_render() {
                tracing::debug!("render trigger failed: {}", e);
                continue;
            }
            let frame = match target.capture_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::debug!("frame capture failed: {}", e);
                    continue;
                }
            };
            let encoded = match encoder.encode(&frame) {
                Ok(encoded) => encoded,
                Err(e) => {
                    tracing::warn!("encode failed: {}", e);
                    continue;
                }
            };
            if encoded.is_empty() {
                // encoder still buffering
                continue;
            }
            stats.record_frame(encoded.data.len() as u64, encoded.keyframe);
            let sample = Sample {
                data: encoded.data.into(),
                duration: frame_interval,
                ..Default::default()
            };
            if let Err(e) = track.write_sample(&sample).await {
                if !live.load(Ordering::SeqCst) {
                    break;
                }
                tracing::debug!("write_sample failed: {}", e);
            }
        }
        tracing::debug!("frame pump stopped");
    })
}
