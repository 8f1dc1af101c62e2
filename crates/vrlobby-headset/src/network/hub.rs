//! Hub connection: named-event JSON frames over a WebSocket.
//!
//! One [`SignalingChannel`] wraps one transport for one connection attempt.
//! Once the transport drops the channel is dead; reconnecting means building
//! a new instance. Inbound traffic is delivered through a single-consumer
//! receiver so all handling is serialized on the consumer's task.

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite, tungstenite::Message};

use vrlobby_protocol::{HubFrame, event};

#[derive(Debug, Error)]
pub enum HubError {
    #[error("hub connect failed: {0}")]
    Connect(#[from] tungstenite::Error),

    #[error("event stream already taken")]
    EventsTaken,
}

/// Preferred transport for the hub connection. Long polling exists for
/// settings compatibility with older deployments; this client always speaks
/// WebSocket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportPreference {
    #[default]
    WebSocket,
    LongPolling,
}

/// Everything the hub delivers to its single consumer.
#[derive(Debug)]
pub enum HubSignal {
    /// A named event with positional arguments.
    Event { target: String, arguments: Vec<Value> },
    /// Transport-level error; `Closed` follows.
    Error(String),
    /// The connection is gone. Terminal; no further signals arrive.
    Closed,
}

pub struct SignalingChannel {
    outbound: mpsc::UnboundedSender<HubFrame>,
    signals: Option<mpsc::UnboundedReceiver<HubSignal>>,
}

impl SignalingChannel {
    /// Connect to the hub. The returned channel is connected and ready to
    /// send; waiting for a separate connected notification is not needed.
    pub async fn connect(url: &str, transport: TransportPreference) -> Result<Self, HubError> {
        if transport == TransportPreference::LongPolling {
            tracing::warn!("long-polling transport preferred but unsupported, using websocket");
        }

        let (ws_stream, _) = connect_async(url).await?;
        tracing::info!(url, "hub connected");

        let (mut write, mut read) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<HubFrame>();
        let (sig_tx, sig_rx) = mpsc::unbounded_channel::<HubSignal>();

        // Outgoing frames. Ends when the channel handle is dropped or the
        // transport rejects a write.
        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                let text = match frame.encode() {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!("failed to serialize hub frame: {}", e);
                        continue;
                    }
                };
                if write.send(Message::Text(text.into())).await.is_err() {
                    tracing::warn!("hub transport rejected write, stopping sender");
                    break;
                }
            }
        });

        // Incoming frames. The single signal sender guarantees serialized
        // delivery; `Closed` is always the last signal.
        tokio::spawn(async move {
            while let Some(result) = read.next().await {
                match result {
                    Ok(Message::Text(text)) => match HubFrame::decode(&text) {
                        Ok(frame) => {
                            let _ = sig_tx.send(HubSignal::Event {
                                target: frame.target,
                                arguments: frame.arguments,
                            });
                        }
                        Err(e) => {
                            tracing::warn!("dropping undecodable hub frame: {}", e);
                        }
                    },
                    Ok(Message::Ping(_)) => {
                        // Pong is handled automatically by tungstenite
                    }
                    Ok(Message::Close(_)) => {
                        tracing::info!("hub closed by server");
                        break;
                    }
                    Err(e) => {
                        let _ = sig_tx.send(HubSignal::Error(e.to_string()));
                        break;
                    }
                    _ => {}
                }
            }
            let _ = sig_tx.send(HubSignal::Closed);
        });

        Ok(Self {
            outbound: out_tx,
            signals: Some(sig_rx),
        })
    }

    /// Take the inbound signal stream. May be called once.
    pub fn take_signals(&mut self) -> Result<mpsc::UnboundedReceiver<HubSignal>, HubError> {
        self.signals.take().ok_or(HubError::EventsTaken)
    }

    /// Send a named event. After the connection closed this is a no-op that
    /// logs a warning rather than an error.
    pub fn send(&self, target: &str, arguments: Vec<Value>) {
        if self
            .outbound
            .send(HubFrame::new(target, arguments))
            .is_err()
        {
            tracing::warn!(event = target, "hub connection closed, dropping outbound event");
        }
    }

    pub fn join_group(&self, group_id: &str) {
        self.send(event::JOIN_GROUP, vec![json!(group_id)]);
    }

    pub fn leave_group(&self, group_id: &str) {
        self.send(event::LEAVE_GROUP, vec![json!(group_id)]);
    }
}
