//! End-to-end session coordinator.
//!
//! Runs the ordered startup sequence (connect hub, join group, verify the
//! render target, bind the track, start the watchdog, announce readiness,
//! send the offer), routes inbound signaling into the peer controller, and
//! owns the reconnect policy: every hub closure leads to a fresh attempt
//! after a fixed backoff, with no retry cap.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::mpsc;

use vrlobby_media::RenderTarget;
use vrlobby_protocol::{AnswerPayload, IceCandidateRecord, event};

use crate::media::peer::{EncoderFactory, PeerConfig, PeerController, PeerError};
use crate::network::{HubSignal, SignalingChannel, TransportPreference};
use crate::session::watchdog;
use crate::state::HeadsetState;

pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub hub_url: String,
    pub transport: TransportPreference,
    pub vr_user_id: u32,
    pub capture_width: u32,
    pub capture_height: u32,
    pub reconnect_backoff: Duration,
}

impl CoordinatorConfig {
    pub fn group_id(&self) -> String {
        format!("vruser_{}", self.vr_user_id)
    }
}

pub struct SessionCoordinator {
    config: CoordinatorConfig,
    target: Arc<dyn RenderTarget>,
    controller: PeerController,
    ice_rx: mpsc::UnboundedReceiver<IceCandidateRecord>,
    state: HeadsetState,
}

impl SessionCoordinator {
    pub fn new(
        config: CoordinatorConfig,
        target: Arc<dyn RenderTarget>,
        encoder_factory: EncoderFactory,
        peer_config: PeerConfig,
        state: HeadsetState,
    ) -> Self {
        let (ice_tx, ice_rx) = mpsc::unbounded_channel();
        let controller = PeerController::new(peer_config, encoder_factory, ice_tx);
        Self {
            config,
            target,
            controller,
            ice_rx,
            state,
        }
    }

    /// Run attempts forever. Each hub closure triggers exactly one fresh
    /// attempt after the fixed backoff.
    pub async fn run(mut self) {
        loop {
            self.attempt().await;
            tracing::info!(
                "restarting live-feed session in {}s",
                self.config.reconnect_backoff.as_secs()
            );
            tokio::time::sleep(self.config.reconnect_backoff).await;
            self.controller.dispose().await;
        }
    }

    /// One full session attempt: startup sequence, then inbound routing until
    /// the hub connection dies.
    async fn attempt(&mut self) {
        self.state.set_hub_connected(false).await;

        let mut hub =
            match SignalingChannel::connect(&self.config.hub_url, self.config.transport).await {
                Ok(hub) => hub,
                Err(e) => {
                    tracing::warn!("hub connect failed: {}", e);
                    return;
                }
            };
        let mut signals = match hub.take_signals() {
            Ok(signals) => signals,
            Err(e) => {
                tracing::error!("hub signals unavailable: {}", e);
                return;
            }
        };
        self.state.set_hub_connected(true).await;

        let group = self.config.group_id();
        hub.join_group(&group);
        tracing::info!(%group, "joined session group");

        // Candidates left over from a previous session are useless to the
        // remote viewer; drop them before the new negotiation starts.
        while self.ice_rx.try_recv().is_ok() {}

        if let Err(e) = self.start_streaming(&hub).await {
            self.controller.dispose().await;
            match e {
                PeerError::ResourceNotReady(_) | PeerError::Codec(_) => {
                    // Configuration problem; retrying the same attempt cannot
                    // fix it, so streaming stays off until the next
                    // close-driven restart.
                    tracing::error!("live feed unavailable, streaming disabled: {}", e);
                }
                e => {
                    tracing::error!("live feed startup failed: {}", e);
                    return;
                }
            }
        }

        // Single-consumer routing: every inbound event and every local ICE
        // candidate is handled here, so peer session state is only ever
        // mutated from this task.
        loop {
            tokio::select! {
                signal = signals.recv() => match signal {
                    Some(HubSignal::Event { target, arguments }) => {
                        self.route_event(target, arguments).await;
                    }
                    Some(HubSignal::Error(e)) => tracing::error!("hub error: {}", e),
                    Some(HubSignal::Closed) | None => {
                        tracing::info!("hub closed");
                        break;
                    }
                },
                Some(candidate) = self.ice_rx.recv() => {
                    self.forward_local_candidate(&hub, candidate);
                }
            }
        }
    }

    /// Startup steps 3-7; strictly ordered, each step completes before the
    /// next begins.
    async fn start_streaming(&mut self, hub: &SignalingChannel) -> Result<(), PeerError> {
        self.state.set_status("Preparing live feed...").await;

        // Warm-up render pass plus forced allocation, so the track never
        // reads an uninitialized target.
        self.target
            .trigger_render()
            .map_err(|e| PeerError::ResourceNotReady(e.to_string()))?;
        if !self.target.is_created() {
            self.target
                .ensure_created()
                .map_err(|e| PeerError::ResourceNotReady(e.to_string()))?;
            tracing::info!("render target backing resource was missing, forced allocation");
        }

        self.controller.create_session().await?;
        self.controller
            .bind_video_source(
                self.target.clone(),
                self.config.capture_width,
                self.config.capture_height,
            )
            .await?;

        if let Some(handle) = self.controller.session_handle() {
            watchdog::spawn_outbound_stats_logger(Arc::downgrade(&handle));
            watchdog::spawn_zero_frame_watchdog(Arc::downgrade(&handle));
        }

        hub.send(event::READY_FOR_OFFER, vec![json!(self.config.vr_user_id)]);

        let offer = self.controller.create_offer().await?;
        let payload = serde_json::to_value(&offer).unwrap_or_else(|e| {
            tracing::error!("failed to serialize offer payload: {}", e);
            Value::Null
        });
        hub.send(event::SEND_OFFER, vec![json!(self.config.vr_user_id), payload]);
        tracing::info!("offer sent, waiting for answer/ice");

        self.state.set_status("Live feed streaming").await;
        Ok(())
    }

    async fn route_event(&mut self, target: String, arguments: Vec<Value>) {
        match target.as_str() {
            event::RECEIVE_ANSWER => {
                let Some(raw) = arguments.into_iter().next() else {
                    tracing::warn!("ReceiveAnswer with no payload, dropping");
                    return;
                };
                match serde_json::from_value::<AnswerPayload>(raw) {
                    Ok(payload) => {
                        let answer = payload.normalize();
                        if let Err(e) = self.controller.apply_answer(&answer.sdp).await {
                            // Retryable through the reconnect loop; the
                            // session itself stays up.
                            tracing::error!("applying answer failed: {}", e);
                        }
                    }
                    Err(e) => {
                        tracing::warn!("ReceiveAnswer with unexpected payload shape, dropping: {}", e);
                    }
                }
            }
            event::RECEIVE_ICE_CANDIDATE => {
                let Some(raw) = arguments.into_iter().next() else {
                    tracing::warn!("ReceiveIceCandidate with no payload, dropping");
                    return;
                };
                match serde_json::from_value::<IceCandidateRecord>(raw) {
                    Ok(record) => self.controller.add_remote_ice_candidate(record).await,
                    Err(e) => {
                        tracing::warn!("ReceiveIceCandidate with unexpected payload, dropping: {}", e);
                    }
                }
            }
            event::RECEIVE_OFFER => {
                tracing::debug!("ReceiveOffer ignored (broadcaster role)");
            }
            event::READY_FOR_OFFER => {
                tracing::debug!(?arguments, "remote viewer ready for offer");
            }
            other => tracing::warn!(event = other, "unhandled hub event"),
        }
    }

    fn forward_local_candidate(&self, hub: &SignalingChannel, candidate: IceCandidateRecord) {
        tracing::debug!(candidate = %candidate.candidate, "forwarding local ice candidate");
        let payload = serde_json::to_value(&candidate).unwrap_or_else(|e| {
            tracing::error!("failed to serialize ice candidate: {}", e);
            Value::Null
        });
        hub.send(
            event::SEND_ICE_CANDIDATE,
            vec![json!(self.config.vr_user_id), payload],
        );
    }
}
